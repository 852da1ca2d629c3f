//! CLI error types

use hawk_advisor::LlmError;
use hawk_analyzer::AnalysisError;
use hawk_cloud::CloudError;
use hawk_guard::MonitorError;
use hawk_persist::PersistError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CtlError {
    #[error("config error: {0}")]
    Config(String),

    #[error("no AWS credentials for user '{0}': pass --access-key and --secret-key")]
    CredentialsMissing(String),

    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("analysis timed out after {0}s")]
    Timeout(u64),

    #[error("cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("advisor error: {0}")]
    Llm(#[from] LlmError),

    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CtlResult<T> = Result<T, CtlError>;
