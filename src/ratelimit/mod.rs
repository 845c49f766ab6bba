//! Rate limiting logic and state management.

mod clock;
mod key;
mod limiter;
mod log;
mod policy;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::ClientKey;
pub use limiter::{Decision, SlidingWindowLimiter};
pub use log::RequestLog;
pub use policy::Policy;
pub use sweeper::spawn_sweeper;
