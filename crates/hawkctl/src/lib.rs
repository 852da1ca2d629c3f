//! hawkctl: CostHawk operator CLI
//!
//! Analyzes an AWS account for underutilized resources, narrates the
//! savings with an LLM (or a deterministic fallback), keeps per-user
//! history, and guards instances with CPU limits.

#![forbid(unsafe_code)]

pub mod app;
pub mod config;
pub mod error;

pub use app::{AnalyzeOutput, App, CredentialSummary};
pub use config::HawkConfig;
pub use error::{CtlError, CtlResult};

use hawk_cloud::{CloudProvider, FixtureCloud};
use std::path::Path;
use std::sync::Arc;

/// The cloud backend: a fixture file when given, otherwise live AWS when
/// compiled with the `aws` feature.
pub fn cloud_provider(fixture: Option<&Path>) -> CtlResult<Arc<dyn CloudProvider>> {
    if let Some(path) = fixture {
        return Ok(Arc::new(FixtureCloud::from_json_file(path)?));
    }
    live_provider()
}

#[cfg(feature = "aws")]
fn live_provider() -> CtlResult<Arc<dyn CloudProvider>> {
    Ok(Arc::new(hawk_cloud::AwsCloud::new()))
}

#[cfg(not(feature = "aws"))]
fn live_provider() -> CtlResult<Arc<dyn CloudProvider>> {
    Err(CtlError::Config(
        "no cloud backend: pass --fixture <file> or build with --features aws".to_string(),
    ))
}
