//! Per-instance CPU limits with alert, countdown and auto-shutdown.
//!
//! The [`LimitMonitor`] is polled with one CPU sample at a time. Each call
//! evaluates the sample against the persisted [`InstanceLimit`] and the
//! in-memory [`MonitoringState`] for that (user, instance) and reports a
//! [`MonitorAction`]. Breach counters are durable; countdown state is not.

#![forbid(unsafe_code)]

pub mod monitor;
pub mod state;

pub use monitor::{ActiveAlert, DEFAULT_GRACE_SECS, LimitMonitor, MonitorOutcome};
pub use state::{MonitorKey, MonitoringState, Phase};

pub use hawk_proto::{InstanceLimit, MonitorAction};

use hawk_persist::PersistError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid CPU limit {0}: must be greater than 0 and at most 100")]
    InvalidLimit(f64),

    #[error("invalid CPU sample {0}")]
    InvalidSample(f64),

    #[error("limit store error: {0}")]
    Store(#[from] PersistError),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
