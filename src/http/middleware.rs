//! Axum middleware that consults the rate limiter before running a handler.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::debug;

use crate::ratelimit::{ClientKey, Clock, Decision, SlidingWindowLimiter, SystemClock};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const REJECT_MESSAGE: &str = "Too many requests. Please try again later.";

/// Derives the [`ClientKey`] for an incoming request.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyExtractor {
    /// Prefer the first `X-Forwarded-For` address over the peer address.
    /// Only enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl KeyExtractor {
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            trust_forwarded_for,
        }
    }

    /// Falls back to the anonymous key when no origin is discoverable.
    pub fn extract(&self, request: &Request) -> ClientKey {
        if self.trust_forwarded_for {
            if let Some(ip) = forwarded_for(request.headers()) {
                return ClientKey::from_ip(ip);
            }
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| ClientKey::from_ip(addr.ip()))
            .unwrap_or_else(ClientKey::anonymous)
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(X_FORWARDED_FOR)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Shared state for the [`rate_limit`] middleware.
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: Arc<SlidingWindowLimiter>,
    clock: Arc<dyn Clock>,
    extractor: KeyExtractor,
}

impl RateLimitGuard {
    /// Create a guard reading the system clock and keying on the peer address.
    pub fn new(limiter: Arc<SlidingWindowLimiter>) -> Self {
        Self {
            limiter,
            clock: Arc::new(SystemClock),
            extractor: KeyExtractor::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_key_extractor(mut self, extractor: KeyExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    /// Run the limiter for one request.
    pub fn check(&self, request: &Request) -> (ClientKey, Decision) {
        let key = self.extractor.extract(request);
        let decision = self.limiter.admit(&key, self.clock.now());
        (key, decision)
    }
}

/// Reject requests over the client's quota with `429 Too Many Requests`.
///
/// Admitted requests reach the inner handler and gain `x-ratelimit-*`
/// headers on the way out.
pub async fn rate_limit(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Response {
    let limit = guard.limiter.policy().max_requests();
    let (key, decision) = guard.check(&request);

    match decision {
        Decision::Admit { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
            response
        }
        Decision::Reject { retry_after } => {
            let retry_after_secs = retry_after_secs(retry_after);
            debug!(
                key = %key,
                retry_after_secs,
                method = %request.method(),
                path = %request.uri().path(),
                "Request rate limited"
            );
            too_many_requests(limit, retry_after_secs)
        }
    }
}

/// Whole seconds for a `Retry-After` header, rounded up and at least one.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after
        .as_secs()
        .saturating_add(u64::from(retry_after.subsec_nanos() > 0));
    secs.max(1)
}

fn too_many_requests(limit: u64, retry_after_secs: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            (header::RETRY_AFTER, HeaderValue::from(retry_after_secs)),
            (X_RATELIMIT_LIMIT, HeaderValue::from(limit)),
            (X_RATELIMIT_REMAINING, HeaderValue::from(0u64)),
        ],
        Json(json!({ "message": REJECT_MESSAGE })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    use crate::ratelimit::{ManualClock, Policy};

    fn app(guard: RateLimitGuard) -> Router {
        Router::new()
            .route("/", get(|| async { "hello" }))
            .route_layer(axum::middleware::from_fn_with_state(guard, rate_limit))
    }

    fn guard(max_requests: u64, clock: Arc<ManualClock>) -> RateLimitGuard {
        let policy = Policy::new(Duration::from_secs(10), max_requests).unwrap();
        RateLimitGuard::new(Arc::new(SlidingWindowLimiter::new(policy))).with_clock(clock)
    }

    fn request_from(peer: Option<&str>, forwarded: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        if let Some(forwarded) = forwarded {
            builder = builder.header(X_FORWARDED_FOR, forwarded);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[tokio::test]
    async fn test_admitted_request_reaches_handler() {
        let app = app(guard(2, Arc::new(ManualClock::new())));

        let response = app
            .oneshot(request_from(Some("10.0.0.1:4000"), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&X_RATELIMIT_LIMIT], "2");
        assert_eq!(response.headers()[&X_RATELIMIT_REMAINING], "1");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn test_over_limit_returns_429_with_retry_after() {
        let clock = Arc::new(ManualClock::new());
        let app = app(guard(1, clock.clone()));

        let first = app
            .clone()
            .oneshot(request_from(Some("10.0.0.1:4000"), None))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        clock.advance(Duration::from_millis(2500));
        let second = app
            .oneshot(request_from(Some("10.0.0.1:4001"), None))
            .await
            .unwrap();

        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()[header::RETRY_AFTER], "8");
        assert_eq!(second.headers()[&X_RATELIMIT_REMAINING], "0");

        let body = to_bytes(second.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], REJECT_MESSAGE);
    }

    #[tokio::test]
    async fn test_window_reopens_after_clock_advance() {
        let clock = Arc::new(ManualClock::new());
        let app = app(guard(1, clock.clone()));

        let peer = Some("10.0.0.1:4000");
        assert_eq!(
            app.clone().oneshot(request_from(peer, None)).await.unwrap().status(),
            StatusCode::OK
        );
        assert_eq!(
            app.clone().oneshot(request_from(peer, None)).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );

        clock.advance(Duration::from_secs(10));
        assert_eq!(
            app.oneshot(request_from(peer, None)).await.unwrap().status(),
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_peers_are_limited_independently() {
        let app = app(guard(1, Arc::new(ManualClock::new())));

        for peer in ["10.0.0.1:4000", "10.0.0.2:4000", "[::1]:4000"] {
            let response = app
                .clone()
                .oneshot(request_from(Some(peer), None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "peer {}", peer);
        }
    }

    struct LevelRecorder(Arc<parking_lot::Mutex<Vec<tracing::Level>>>);

    impl<S: tracing::Subscriber> Layer<S> for LevelRecorder {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().push(*event.metadata().level());
        }
    }

    #[tokio::test]
    async fn test_rejections_logged_at_debug_or_below() {
        let levels = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(LevelRecorder(levels.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let app = app(guard(1, Arc::new(ManualClock::new())));
        let peer = Some("10.0.0.1:4000");
        app.clone().oneshot(request_from(peer, None)).await.unwrap();
        let response = app.oneshot(request_from(peer, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let levels = levels.lock();
        assert!(levels.contains(&tracing::Level::DEBUG));
        assert!(levels.iter().all(|level| *level >= tracing::Level::DEBUG));
    }

    #[test]
    fn test_forwarded_for_ignored_unless_trusted() {
        let request = request_from(Some("10.0.0.1:4000"), Some("203.0.113.9, 10.0.0.1"));

        let untrusted = KeyExtractor::default().extract(&request);
        assert_eq!(untrusted.as_str(), "10.0.0.1");

        let trusted = KeyExtractor::new(true).extract(&request);
        assert_eq!(trusted.as_str(), "203.0.113.9");
    }

    #[test]
    fn test_malformed_forwarded_for_falls_back_to_peer() {
        let request = request_from(Some("10.0.0.1:4000"), Some("not-an-ip"));
        let key = KeyExtractor::new(true).extract(&request);
        assert_eq!(key.as_str(), "10.0.0.1");
    }

    #[test]
    fn test_missing_origin_is_anonymous() {
        let request = request_from(None, None);
        assert!(KeyExtractor::new(true).extract(&request).is_anonymous());
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
        assert_eq!(retry_after_secs(Duration::from_millis(3001)), 4);
        assert_eq!(retry_after_secs(Duration::from_millis(10)), 1);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::MAX), u64::MAX);
    }
}
