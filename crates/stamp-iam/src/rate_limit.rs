//! API key rate limiting
//!
//! Each API key carries a policy string such as `125/15m` owned by the scorer
//! service. The policy is normalized to requests per minute, cached per key,
//! and enforced over fixed one-minute windows counted in the shared cache.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use stamp_common::cache::hashed_key;
use stamp_common::{KeyValueCache, RateLimitError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::ApiError;

/// Header carrying the caller's API key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// How long a normalized allowance is cached
pub const ALLOWANCE_TTL: Duration = Duration::from_secs(5 * 60);

const WINDOW: Duration = Duration::from_secs(60);

const MAX_API_KEY_LEN: usize = 256;

/// Source of per-key rate limit policies
#[async_trait]
pub trait RateLimitSource: Send + Sync {
    /// Policy string for a key; `None` or empty means unlimited
    async fn rate_limit_spec(&self, api_key: &str) -> Result<Option<String>>;
}

/// Requests per minute allowed by a `<count>/<amount><unit>` policy.
///
/// Units are `s`, `m`, `h` and `d`. An absent or empty policy is unlimited.
pub fn parse_rate_limit(spec: Option<&str>) -> std::result::Result<f64, RateLimitError> {
    let spec = match spec.map(str::trim) {
        None | Some("") => return Ok(f64::INFINITY),
        Some(spec) => spec,
    };
    let invalid = || RateLimitError::InvalidSpec(spec.to_string());

    let (count, period) = spec.split_once('/').ok_or_else(invalid)?;
    let count: u64 = count.trim().parse().map_err(|_| invalid())?;

    let period = period.trim();
    let unit = period.chars().last().ok_or_else(invalid)?;
    let amount: u64 = period[..period.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;

    let minutes = match unit {
        's' => amount as f64 / 60.0,
        'm' => amount as f64,
        'h' => amount as f64 * 60.0,
        'd' => amount as f64 * 1440.0,
        _ => return Err(invalid()),
    };
    if minutes <= 0.0 {
        return Err(invalid());
    }

    Ok(count as f64 / minutes)
}

/// Per-key request budget backed by the shared cache
pub struct RateLimiter {
    source: Arc<dyn RateLimitSource>,
    cache: Arc<dyn KeyValueCache>,
}

impl RateLimiter {
    pub fn new(source: Arc<dyn RateLimitSource>, cache: Arc<dyn KeyValueCache>) -> Self {
        Self { source, cache }
    }

    /// Requests per minute allowed for an API key
    #[instrument(skip(self, api_key))]
    pub async fn allowance(&self, api_key: &str) -> Result<f64> {
        let key = hashed_key("rate-limit", api_key);

        match self.cache.get(&key).await {
            Ok(Some(cached)) => {
                if let Ok(allowance) = cached.parse::<f64>() {
                    debug!(allowance, "Rate limit cache hit");
                    return Ok(allowance);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Rate limit cache read failed"),
        }

        let spec = self.source.rate_limit_spec(api_key).await?;
        let allowance = parse_rate_limit(spec.as_deref())?;

        if let Err(e) = self.cache.set(&key, &allowance.to_string(), ALLOWANCE_TTL).await {
            warn!(error = %e, "Rate limit cache write failed");
        }
        Ok(allowance)
    }

    /// Count one request against the key's current window
    #[instrument(skip(self, api_key))]
    pub async fn check(&self, api_key: &str) -> Result<()> {
        let allowance = self.allowance(api_key).await?;
        if allowance.is_infinite() {
            return Ok(());
        }

        let count = match self.cache.incr(&hashed_key("rate-window", api_key), WINDOW).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Rate limit window unavailable, allowing request");
                return Ok(());
            }
        };

        if count as f64 > allowance.floor() {
            debug!(count, allowance, "Rate limit exceeded");
            return Err(RateLimitError::Exceeded.into());
        }
        Ok(())
    }
}

/// Whether a header value has the shape of an API key: a single token of
/// ASCII letters, digits, `.`, `_` or `-`, and not a relative path segment
pub fn is_api_key_token(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_API_KEY_LEN
        && key != "."
        && key != ".."
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

/// Middleware gating a router on the caller's API key
pub async fn enforce(State(limiter): State<Arc<RateLimiter>>, request: Request, next: Next) -> Response {
    let Some(api_key) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| is_api_key_token(v))
        .map(str::to_string)
    else {
        return ApiError::unauthorized("Unauthorized").into_response();
    };

    match limiter.check(&api_key).await {
        Ok(()) => next.run(request).await,
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stamp_common::{InMemoryCache, StampError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        spec: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateLimitSource for CountingSource {
        async fn rate_limit_spec(&self, _api_key: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.spec.map(str::to_string))
        }
    }

    fn limiter(spec: Option<&'static str>) -> (RateLimiter, Arc<CountingSource>) {
        let source = Arc::new(CountingSource {
            spec,
            calls: AtomicUsize::new(0),
        });
        (
            RateLimiter::new(source.clone(), Arc::new(InMemoryCache::default())),
            source,
        )
    }

    #[test]
    fn test_parse_rate_limit() {
        assert_eq!(parse_rate_limit(Some("1000/1m")).unwrap(), 1000.0);
        assert_eq!(parse_rate_limit(Some("1000/1s")).unwrap(), 60000.0);
        assert_eq!(parse_rate_limit(Some("60/1h")).unwrap(), 1.0);
        assert_eq!(parse_rate_limit(Some("2880/2d")).unwrap(), 1.0);
        assert_eq!(parse_rate_limit(Some("125/15m")).unwrap(), 125.0 / 15.0);
        assert_eq!(parse_rate_limit(Some("")).unwrap(), f64::INFINITY);
        assert_eq!(parse_rate_limit(None).unwrap(), f64::INFINITY);
    }

    #[test]
    fn test_parse_rate_limit_rejects_malformed() {
        for spec in ["1000/1x", "1000", "abc/1m", "10/m", "10/0m", "10/1"] {
            assert!(
                matches!(parse_rate_limit(Some(spec)), Err(RateLimitError::InvalidSpec(_))),
                "{} should be rejected",
                spec
            );
        }
    }

    #[test]
    fn test_api_key_token_shape() {
        assert!(is_api_key_token("abc123.DEF_456-xyz"));
        assert!(!is_api_key_token(""));
        assert!(!is_api_key_token(".."));
        assert!(!is_api_key_token("x/../../../internal/score/v2/1/0xabc?"));
        assert!(!is_api_key_token("key?x=1"));
        assert!(!is_api_key_token("key%2F"));
        assert!(!is_api_key_token(&"a".repeat(MAX_API_KEY_LEN + 1)));
    }

    #[tokio::test]
    async fn test_allowance_cached_per_key() {
        let (limiter, source) = limiter(Some("60/1h"));

        assert_eq!(limiter.allowance("key-a").await.unwrap(), 1.0);
        assert_eq!(limiter.allowance("key-a").await.unwrap(), 1.0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        limiter.allowance("key-b").await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unlimited_is_cached_too() {
        let (limiter, source) = limiter(None);
        assert!(limiter.allowance("k").await.unwrap().is_infinite());
        assert!(limiter.allowance("k").await.unwrap().is_infinite());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_window_enforced() {
        let (limiter, _) = limiter(Some("2/1m"));

        assert!(limiter.check("k").await.is_ok());
        assert!(limiter.check("k").await.is_ok());
        assert!(matches!(
            limiter.check("k").await,
            Err(StampError::RateLimit(RateLimitError::Exceeded))
        ));
        assert!(limiter.check("other").await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_policy_is_an_error() {
        let (limiter, _) = limiter(Some("lots"));
        assert!(matches!(
            limiter.check("k").await,
            Err(StampError::RateLimit(RateLimitError::InvalidSpec(_)))
        ));
    }
}
