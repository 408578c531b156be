use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permissions::Capability;

/// Failures of a single capture pipeline invocation.
///
/// Only [`PipelineError::Busy`] is returned to callers of `run`; every other
/// variant is folded into an [`ErrorInfo`] on the run itself.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a capture is already in flight")]
    Busy,

    #[error("{capability} permission denied (hard: {hard})")]
    PermissionDenied { capability: Capability, hard: bool },

    #[error("image acquisition failed: {0}")]
    Acquisition(#[from] AcquireError),

    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("capture is only available in an active session")]
    NotActive,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("capture task ended unexpectedly: {0}")]
    Interrupted(String),
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("image source unavailable: {0}")]
    Unavailable(String),

    #[error("could not read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image source did not answer in time")]
    TimedOut,

    #[error("host reported: {0}")]
    Host(String),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("service rejected the image: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AnalysisError::Malformed(err.to_string())
        } else {
            AnalysisError::Transport {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("{0} is not supported on this platform")]
    Unsupported(Capability),

    #[error("permission broker unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no pending bridge request with id {0}")]
    UnknownRequest(uuid::Uuid),

    #[error("bridge request {0} timed out")]
    TimedOut(uuid::Uuid),

    #[error("bridge closed before replying")]
    Closed,

    #[error("failed to emit bridge request: {0}")]
    Emit(String),

    #[error("unexpected reply for {call}")]
    UnexpectedReply { call: &'static str },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    PermissionDenied,
    Acquisition,
    Transport,
    MalformedResponse,
}

/// What the single button of the error view does.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorAction {
    Acknowledge,
    OpenSettings,
}

/// User-facing error attached to a failed run. Never carries transport details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub action: ErrorAction,
}

impl ErrorInfo {
    pub fn from_pipeline_error(err: &PipelineError) -> Self {
        match err {
            PipelineError::PermissionDenied { capability, hard } => Self {
                kind: ErrorKind::PermissionDenied,
                message: format!(
                    "{} access is needed to capture an image for analysis.",
                    capability.display_name()
                ),
                action: if *hard {
                    ErrorAction::OpenSettings
                } else {
                    ErrorAction::Acknowledge
                },
            },
            PipelineError::Acquisition(_) => Self {
                kind: ErrorKind::Acquisition,
                message: "Couldn't capture an image. Please try again.".into(),
                action: ErrorAction::Acknowledge,
            },
            PipelineError::Analysis(AnalysisError::Malformed(_)) => Self {
                kind: ErrorKind::MalformedResponse,
                message: "Something went wrong. Please try again.".into(),
                action: ErrorAction::Acknowledge,
            },
            PipelineError::Analysis(_) | PipelineError::Busy => Self {
                kind: ErrorKind::Transport,
                message: "Failed to analyze image. Please try again.".into(),
                action: ErrorAction::Acknowledge,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_details_are_not_leaked() {
        let err = PipelineError::Analysis(AnalysisError::Transport {
            status: Some(500),
            message: "Server error: 500".into(),
        });
        let info = ErrorInfo::from_pipeline_error(&err);
        assert_eq!(info.kind, ErrorKind::Transport);
        assert!(!info.message.contains("500"));
    }

    #[test]
    fn hard_denial_routes_to_settings() {
        let err = PipelineError::PermissionDenied {
            capability: Capability::Camera,
            hard: true,
        };
        let info = ErrorInfo::from_pipeline_error(&err);
        assert_eq!(info.action, ErrorAction::OpenSettings);
        assert!(info.message.starts_with("Camera"));

        let soft = PipelineError::PermissionDenied {
            capability: Capability::Camera,
            hard: false,
        };
        assert_eq!(
            ErrorInfo::from_pipeline_error(&soft).action,
            ErrorAction::Acknowledge
        );
    }
}
