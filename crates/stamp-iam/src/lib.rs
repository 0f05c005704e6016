//! # Stamp IAM
//!
//! HTTP front of the stamp pipeline: challenges, verification, and signed
//! on-chain attestations, gated by per-key rate limits.

pub mod config;
pub mod error;
pub mod oracle;
pub mod providers;
pub mod rate_limit;
pub mod routes;
pub mod scorer;
pub mod state;

pub use config::IamConfig;
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;

/// Service version
pub const IAM_VERSION: &str = env!("CARGO_PKG_VERSION");
