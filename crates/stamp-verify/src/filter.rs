//! Ban and revocation filters
//!
//! Post-verification filters backed by the scorer service:
//! - bans replace an issued credential with a 403 error, failing open when
//!   the ban service is unreachable
//! - revocations drop revoked credentials, and drop credentials that carry no
//!   proof value to look up

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stamp_common::{CredentialResponse, Result, VerifiableCredential};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// One credential sent to the ban service, tagged with its position in the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanCheckRequest {
    pub id: String,
    pub credential: VerifiableCredential,
}

/// Ban service verdict for one request id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanStatus {
    pub id: String,
    pub is_banned: bool,
    #[serde(default)]
    pub ban_type: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl BanStatus {
    /// User-facing explanation of the ban
    pub fn message(&self) -> String {
        let mut message = format!(
            "Credential is banned. Type={}, End={}",
            self.ban_type.as_deref().unwrap_or("unknown"),
            self.end_time.as_deref().unwrap_or("(indefinite)")
        );
        if let Some(reason) = &self.reason {
            message.push_str(&format!(", Reason={}", reason));
        }
        message
    }
}

/// Revocation verdict for one proof value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationStatus {
    pub proof_value: String,
    pub is_revoked: bool,
}

/// External ban lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BanService: Send + Sync {
    async fn check_bans(&self, requests: Vec<BanCheckRequest>) -> Result<Vec<BanStatus>>;
}

/// External revocation lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RevocationService: Send + Sync {
    async fn check_revocations(&self, proof_values: Vec<String>) -> Result<Vec<RevocationStatus>>;
}

/// Applies ban and revocation checks to issued credentials
pub struct BanRevocationFilter {
    bans: Arc<dyn BanService>,
    revocations: Arc<dyn RevocationService>,
}

impl BanRevocationFilter {
    pub fn new(bans: Arc<dyn BanService>, revocations: Arc<dyn RevocationService>) -> Self {
        Self { bans, revocations }
    }

    /// Replace banned credentials with an error response.
    ///
    /// Entries without a credential pass through. If the ban service fails
    /// the responses are returned unchanged.
    #[instrument(skip(self, responses), fields(count = responses.len()))]
    pub async fn filter_bans(&self, responses: Vec<CredentialResponse>) -> Vec<CredentialResponse> {
        let requests: Vec<BanCheckRequest> = responses
            .iter()
            .enumerate()
            .filter_map(|(index, response)| {
                response.credential.as_ref().map(|credential| BanCheckRequest {
                    id: index.to_string(),
                    credential: credential.clone(),
                })
            })
            .collect();

        if requests.is_empty() {
            return responses;
        }

        let statuses = match self.bans.check_bans(requests).await {
            Ok(statuses) => statuses,
            Err(e) => {
                warn!(error = %e, "Ban check failed, returning credentials unfiltered");
                return responses;
            }
        };

        let banned: HashMap<String, BanStatus> = statuses
            .into_iter()
            .filter(|s| s.is_banned)
            .map(|s| (s.id.clone(), s))
            .collect();

        responses
            .into_iter()
            .enumerate()
            .map(|(index, response)| match banned.get(&index.to_string()) {
                Some(ban) if response.credential.is_some() => {
                    info!(provider = %response.credential.as_ref().map(|c| c.provider()).unwrap_or_default(), "Credential is banned");
                    CredentialResponse::error(ban.message(), 403)
                }
                _ => response,
            })
            .collect()
    }

    /// Drop revoked credentials and credentials without a proof value
    #[instrument(skip(self, credentials), fields(count = credentials.len()))]
    pub async fn filter_revocations(
        &self,
        credentials: Vec<VerifiableCredential>,
    ) -> Result<Vec<VerifiableCredential>> {
        let checkable: Vec<VerifiableCredential> = credentials
            .into_iter()
            .filter(|c| c.proof_value().is_some())
            .collect();

        if checkable.is_empty() {
            return Ok(checkable);
        }

        let proof_values = checkable
            .iter()
            .filter_map(|c| c.proof_value().map(str::to_string))
            .collect();

        let revoked: HashSet<String> = self
            .revocations
            .check_revocations(proof_values)
            .await?
            .into_iter()
            .filter(|s| s.is_revoked)
            .map(|s| s.proof_value)
            .collect();

        Ok(checkable
            .into_iter()
            .filter(|c| c.proof_value().map(|v| !revoked.contains(v)).unwrap_or(false))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stamp_common::{CredentialProof, CredentialSubject, StampError};

    fn credential(provider: &str, proof_value: Option<&str>) -> VerifiableCredential {
        VerifiableCredential {
            context: vec![],
            credential_type: vec!["VerifiableCredential".to_string()],
            issuer: "did:key:z6Mk".to_string(),
            issuance_date: "2024-01-01T00:00:00Z".to_string(),
            expiration_date: "2099-01-01T00:00:00Z".to_string(),
            credential_subject: CredentialSubject {
                id: "did:pkh:eip155:1:0xabc".to_string(),
                provider: provider.to_string(),
                hash: Some(format!("v0.0.0:{}", provider)),
                ..Default::default()
            },
            proof: proof_value.map(|v| CredentialProof {
                proof_type: "Ed25519Signature2020".to_string(),
                proof_purpose: "assertionMethod".to_string(),
                verification_method: "did:key:z6Mk#z6Mk".to_string(),
                created: "2024-01-01T00:00:00Z".to_string(),
                proof_value: v.to_string(),
            }),
        }
    }

    fn issued(provider: &str) -> CredentialResponse {
        CredentialResponse::issued(Default::default(), credential(provider, Some(provider)))
    }

    fn filter(bans: MockBanService, revocations: MockRevocationService) -> BanRevocationFilter {
        BanRevocationFilter::new(Arc::new(bans), Arc::new(revocations))
    }

    #[tokio::test]
    async fn test_banned_entry_replaced() {
        let mut bans = MockBanService::new();
        bans.expect_check_bans()
            .withf(|requests| {
                requests.iter().map(|r| r.id.as_str()).collect::<Vec<_>>() == vec!["0", "2"]
            })
            .times(1)
            .returning(|_| {
                Ok(vec![
                    BanStatus {
                        id: "0".into(),
                        is_banned: false,
                        ban_type: None,
                        reason: None,
                        end_time: None,
                    },
                    BanStatus {
                        id: "2".into(),
                        is_banned: true,
                        ban_type: Some("account".into()),
                        reason: Some("sybil".into()),
                        end_time: None,
                    },
                ])
            });

        let responses = vec![
            issued("Github"),
            CredentialResponse::error("Unable to verify provider", 403),
            issued("Google"),
        ];
        let filtered = filter(bans, MockRevocationService::new())
            .filter_bans(responses.clone())
            .await;

        assert_eq!(filtered[0], responses[0]);
        assert_eq!(filtered[1], responses[1]);
        assert_eq!(
            filtered[2],
            CredentialResponse::error(
                "Credential is banned. Type=account, End=(indefinite), Reason=sybil",
                403
            )
        );
    }

    #[tokio::test]
    async fn test_ban_service_failure_fails_open() {
        let mut bans = MockBanService::new();
        bans.expect_check_bans()
            .returning(|_| Err(StampError::Network("scorer unreachable".into())));

        let responses = vec![issued("Github"), issued("Google")];
        let filtered = filter(bans, MockRevocationService::new())
            .filter_bans(responses.clone())
            .await;
        assert_eq!(filtered, responses);
    }

    #[tokio::test]
    async fn test_no_credentials_skips_ban_service() {
        let mut bans = MockBanService::new();
        bans.expect_check_bans().times(0);

        let responses = vec![CredentialResponse::error("nope", 403)];
        let filtered = filter(bans, MockRevocationService::new())
            .filter_bans(responses.clone())
            .await;
        assert_eq!(filtered, responses);
    }

    #[test]
    fn test_ban_message_with_end_time() {
        let ban = BanStatus {
            id: "0".into(),
            is_banned: true,
            ban_type: Some("single_stamp".into()),
            reason: None,
            end_time: Some("2030-01-01T00:00:00Z".into()),
        };
        assert_eq!(
            ban.message(),
            "Credential is banned. Type=single_stamp, End=2030-01-01T00:00:00Z"
        );
    }

    #[tokio::test]
    async fn test_revocations_drop_revoked_and_unprovable() {
        let mut revocations = MockRevocationService::new();
        revocations
            .expect_check_revocations()
            .withf(|values| values == &vec!["a".to_string(), "b".to_string()])
            .returning(|_| {
                Ok(vec![
                    RevocationStatus { proof_value: "a".into(), is_revoked: true },
                    RevocationStatus { proof_value: "b".into(), is_revoked: false },
                ])
            });

        let credentials = vec![
            credential("Github", Some("a")),
            credential("Google", Some("b")),
            credential("Discord", None),
        ];
        let kept = filter(MockBanService::new(), revocations)
            .filter_revocations(credentials)
            .await
            .unwrap();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].provider(), "Google");
    }

    #[tokio::test]
    async fn test_revocation_service_failure_propagates() {
        let mut revocations = MockRevocationService::new();
        revocations
            .expect_check_revocations()
            .returning(|_| Err(StampError::Network("down".into())));

        let result = filter(MockBanService::new(), revocations)
            .filter_revocations(vec![credential("Github", Some("a"))])
            .await;
        assert!(result.is_err());
    }
}
