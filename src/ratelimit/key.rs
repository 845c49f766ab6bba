//! Client key generation and handling.

use std::fmt;
use std::net::IpAddr;

/// A key that identifies the origin of a request for rate limit accounting.
///
/// The empty key is the anonymous key. Every request whose origin cannot be
/// determined shares that single bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a key from an arbitrary identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a key from an IP address.
    ///
    /// IPv4-mapped IPv6 addresses are collapsed to their IPv4 form so a client
    /// seen over both stacks lands in one bucket.
    pub fn from_ip(ip: IpAddr) -> Self {
        let ip = match ip {
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            },
            v4 => v4,
        };
        Self(ip.to_string())
    }

    /// The shared key for requests with no discoverable origin.
    pub fn anonymous() -> Self {
        Self(String::new())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anonymous() {
            write!(f, "<anonymous>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<IpAddr> for ClientKey {
    fn from(ip: IpAddr) -> Self {
        Self::from_ip(ip)
    }
}

impl From<&str> for ClientKey {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientKey {
    fn from(id: String) -> Self {
        Self(id)
    }
}
