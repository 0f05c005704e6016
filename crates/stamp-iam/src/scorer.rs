//! Scorer service client
//!
//! The scorer owns aggregate scores, bans, revocations and API key policies.
//! All calls go to its internal API, authenticated with a shared key.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Url};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use stamp_common::{Result, StampError};
use stamp_verify::filter::{BanCheckRequest, BanStatus, RevocationStatus};
use stamp_verify::{BanService, RevocationService};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::rate_limit::RateLimitSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Aggregate score lookup
#[async_trait]
pub trait ScoreService: Send + Sync {
    async fn score(&self, scorer_id: u32, address: &str) -> Result<f64>;
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: serde_json::Value,
}

/// `rateLimit` must be present; `null` or `""` means unlimited
#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    #[serde(rename = "rateLimit", alias = "rate_limit", deserialize_with = "nullable")]
    rate_limit: Option<String>,
}

fn nullable<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Option::<String>::deserialize(deserializer)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RevocationRequest {
    proof_values: Vec<String>,
}

/// HTTP client for the scorer's internal API
#[derive(Debug, Clone)]
pub struct ScorerClient {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl ScorerClient {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StampError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let endpoint = Url::parse(endpoint)
            .map_err(|e| StampError::Config(format!("Invalid scorer endpoint {}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(StampError::Config(format!("Invalid scorer endpoint {}", endpoint)));
        }

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
        })
    }

    /// Endpoint URL with each segment appended as one percent-encoded path segment
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `label` names the call in logs and errors in place of the full URL
    async fn get_json<T: DeserializeOwned>(&self, label: &str, url: Url) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header("Authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| network_error(label, &e))?;
        decode(label, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(&path.trim_start_matches('/').split('/').collect::<Vec<_>>());
        let response = self
            .client
            .post(url)
            .header("Authorization", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| network_error(path, &e))?;
        decode(path, response).await
    }
}

#[async_trait]
impl ScoreService for ScorerClient {
    #[instrument(skip(self))]
    async fn score(&self, scorer_id: u32, address: &str) -> Result<f64> {
        let scorer_id = scorer_id.to_string();
        let url = self.url(&["internal", "score", "v2", &scorer_id, address]);
        let response: ScoreResponse = self.get_json("/internal/score/v2", url).await?;
        parse_score(&response.score)
    }
}

#[async_trait]
impl BanService for ScorerClient {
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    async fn check_bans(&self, requests: Vec<BanCheckRequest>) -> Result<Vec<BanStatus>> {
        self.post_json("/internal/check-bans", &requests).await
    }
}

#[async_trait]
impl RevocationService for ScorerClient {
    #[instrument(skip(self, proof_values), fields(count = proof_values.len()))]
    async fn check_revocations(&self, proof_values: Vec<String>) -> Result<Vec<RevocationStatus>> {
        self.post_json("/internal/check-revocations", &RevocationRequest { proof_values })
            .await
    }
}

#[async_trait]
impl RateLimitSource for ScorerClient {
    #[instrument(skip(self, api_key))]
    async fn rate_limit_spec(&self, api_key: &str) -> Result<Option<String>> {
        let url = self.url(&["internal", "api-key", api_key, "rate-limit"]);
        let response: RateLimitResponse = self.get_json("/internal/api-key/rate-limit", url).await?;
        Ok(response.rate_limit)
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(StampError::Network(format!("{} returned {}", path, status)));
    }
    debug!(path, %status, "Scorer responded");
    response
        .json()
        .await
        .map_err(|e| StampError::Serialization(format!("{}: {}", path, e)))
}

fn network_error(path: &str, error: &reqwest::Error) -> StampError {
    let reason = if error.is_connect() {
        "connection refused or unreachable"
    } else if error.is_timeout() {
        "connection timed out"
    } else {
        "request failed"
    };
    StampError::Network(format!("{}: {}", path, reason))
}

/// Scores arrive either as JSON numbers or as decimal strings
fn parse_score(value: &serde_json::Value) -> Result<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| StampError::Serialization(format!("Unexpected score {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score(&json!(23.45)).unwrap(), 23.45);
        assert_eq!(parse_score(&json!("23.45000")).unwrap(), 23.45);
        assert!(parse_score(&json!(null)).is_err());
        assert!(parse_score(&json!("abc")).is_err());
    }

    #[test]
    fn test_rate_limit_response_aliases() {
        let camel: RateLimitResponse = serde_json::from_value(json!({"rateLimit": "10/1m"})).unwrap();
        assert_eq!(camel.rate_limit.as_deref(), Some("10/1m"));

        let snake: RateLimitResponse = serde_json::from_value(json!({"rate_limit": ""})).unwrap();
        assert_eq!(snake.rate_limit.as_deref(), Some(""));

        let null: RateLimitResponse = serde_json::from_value(json!({"rateLimit": null})).unwrap();
        assert_eq!(null.rate_limit, None);
    }

    #[test]
    fn test_rate_limit_field_required() {
        assert!(serde_json::from_value::<RateLimitResponse>(json!({})).is_err());
        assert!(serde_json::from_value::<RateLimitResponse>(json!({"score": "1"})).is_err());
    }

    #[test]
    fn test_path_segments_are_escaped() {
        let client = ScorerClient::new("http://scorer", "key").unwrap();
        let url = client.url(&[
            "internal",
            "api-key",
            "x/../../../internal/score/v2/1/0xabc?",
            "rate-limit",
        ]);

        assert_eq!(url.query(), None);
        assert!(url.path().starts_with("/internal/api-key/"));
        assert!(url.path().ends_with("/rate-limit"));
        assert_eq!(url.path_segments().unwrap().count(), 4);
        assert!(!url.path().contains("/internal/score"));
    }

    #[test]
    fn test_revocation_request_shape() {
        let body = serde_json::to_value(RevocationRequest {
            proof_values: vec!["z1".into()],
        })
        .unwrap();
        assert_eq!(body, json!({"proofValues": ["z1"]}));
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let client = ScorerClient::new("http://scorer/", "key").unwrap();
        assert_eq!(
            client.url(&["internal", "check-bans"]).as_str(),
            "http://scorer/internal/check-bans"
        );

        let nested = ScorerClient::new("http://scorer/api/", "key").unwrap();
        assert_eq!(
            nested.url(&["internal", "check-bans"]).as_str(),
            "http://scorer/api/internal/check-bans"
        );
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        assert!(ScorerClient::new("not a url", "key").is_err());
        assert!(ScorerClient::new("mailto:scorer@example.com", "key").is_err());
    }
}
