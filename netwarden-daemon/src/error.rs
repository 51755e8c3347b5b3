//! Daemon error types and exit code mapping.

use netwarden_core::error::{CaptureError, NetwardenError};

/// Daemon-level error with a distinct exit code per phase.
///
/// The split matters operationally: a bind failure means the monitor
/// never sat on the forwarding path ("never started"), while a runtime
/// failure means traffic was being inspected until the error.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// NFQUEUE bind failure at startup — the daemon never started.
    #[error("bind failed: {0}")]
    Bind(String),

    /// Fatal error after a successful bind.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl DaemonError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                   |
    /// |------|-------------------------------------------|
    /// | 0    | Normal shutdown after unbind              |
    /// | 1    | Fatal runtime error ("started then stopped") |
    /// | 2    | Configuration error                       |
    /// | 3    | Bind failure ("never started")            |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Bind(_) => 3,
            Self::Runtime(_) => 1,
        }
    }

    /// Classify a start() failure: bind errors get their own code.
    pub fn from_start_failure(error: NetwardenError) -> Self {
        match &error {
            NetwardenError::Capture(CaptureError::Bind { .. })
            | NetwardenError::Capture(CaptureError::Unsupported(_)) => {
                Self::Bind(error.to_string())
            }
            _ => Self::Runtime(error.to_string()),
        }
    }
}
