//! Run-level error handling.
//!
//! Only the fatal classes live here: anything recoverable is absorbed
//! where it happens (DNS failures become UNKNOWN answers, zero-row store
//! updates are reported on the per-IP record) and never surfaces as a
//! [`RunError`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::db::DbError;
use crate::tracker::TrackerError;

/// Fatal conditions that abort the run with a non-zero exit.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration invalid: {0}")]
    Config(#[from] ConfigError),

    #[error("throttle store failure: {0}")]
    Store(#[from] DbError),

    #[error("issue tracker failure: {0}")]
    Tracker(#[from] TrackerError),

    #[error("run deadline of {0}s exceeded")]
    DeadlineExceeded(u64),
}

impl RunError {
    /// Static error code for the final structured error record.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Store(_) => "store_fatal",
            Self::Tracker(TrackerError::Auth(_)) => "tracker_auth",
            Self::Tracker(_) => "tracker_fatal",
            Self::DeadlineExceeded(_) => "run_deadline",
        }
    }
}
