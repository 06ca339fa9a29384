use crate::types::Resolution;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Frame read failed: {0}")]
    TransientReadFailure(String),
    #[error("Reconfiguration failed: {reason}")]
    ReconfigurationFailure {
        reason: String,
        negotiated: Option<Resolution>,
    },
    #[error("Encoding error: {0}")]
    EncodeFailure(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CameraError {
    pub fn reconfiguration(reason: impl Into<String>) -> Self {
        CameraError::ReconfigurationFailure {
            reason: reason.into(),
            negotiated: None,
        }
    }

    /// Mode the device actually applied before the change was rejected, if known.
    pub fn negotiated(&self) -> Option<Resolution> {
        match self {
            CameraError::ReconfigurationFailure { negotiated, .. } => *negotiated,
            _ => None,
        }
    }
}

impl From<config::ConfigError> for CameraError {
    fn from(e: config::ConfigError) -> Self {
        CameraError::Config(e.to_string())
    }
}
