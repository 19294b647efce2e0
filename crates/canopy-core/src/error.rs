//! Error types for the canopy-core crate

use crate::messages::VersionAction;
use crate::resource::Artifact;
use crate::rpc::SinkError;
use canopy_objectstore::ObjectStoreError;
use thiserror::Error;
use tonic::metadata::MetadataValue;
use tonic::{Code, Status};

/// Result type alias using `RegistryError`
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Metadata key marking a status whose session termination outcome is unknown
pub const TERMINATION_METADATA_KEY: &str = "x-canopy-termination";

/// Errors surfaced by registry calls
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Transport read error on a client or backend leg
    #[error("Failed to receive {artifact}.")]
    ReceiveFailed {
        artifact: Artifact,
        #[source]
        source: Status,
    },

    /// Write to the client failed while sending stored data
    #[error("Failed to send {artifact}.")]
    SendFailed {
        artifact: Artifact,
        #[source]
        source: SinkError,
    },

    /// Write to the client failed while relaying a backend stream
    #[error("Failed to forward {artifact}.")]
    ForwardFailed {
        artifact: Artifact,
        #[source]
        source: SinkError,
    },

    /// Object store rejected the write
    #[error("Failed to upload {artifact}.")]
    UploadFailed {
        artifact: Artifact,
        #[source]
        source: ObjectStoreError,
    },

    /// Object store read failed
    #[error("Failed to download {artifact}.")]
    DownloadFailed {
        artifact: Artifact,
        #[source]
        source: ObjectStoreError,
    },

    /// Bytes read differ from the declared object length
    #[error("Failed to download {artifact}: read {actual} of {expected} bytes.")]
    ContentLengthMismatch {
        artifact: Artifact,
        expected: u64,
        actual: u64,
    },

    /// Terminal version action outside DISCARD / PUBLISH
    #[error("Unknown Version manager action requested.")]
    UnknownAction(i32),

    /// Backend failed a terminal action, the session may or may not be closed
    #[error("{action} of session {session} did not complete: {}", .source.message())]
    TerminationUncertain {
        session: String,
        action: VersionAction,
        #[source]
        source: Status,
    },

    /// Backend could not be reached
    #[error("Failed to connect to {service} service.")]
    BackendUnavailable { service: &'static str },

    /// Backend status passed through unchanged
    #[error("{}", .0.message())]
    Backend(#[from] Status),

    /// Resource metadata failed validation
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// Lifecycle operation not valid in the current state
    #[error("cannot {operation} a version that is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// Bucket bootstrap failed at startup
    #[error("Failed to initialize bucket for storage.")]
    BucketInitialization(#[source] ObjectStoreError),

    /// The call was cancelled by the caller
    #[error("call cancelled")]
    Cancelled,

    /// The call deadline passed
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl RegistryError {
    /// Status code this error maps to on the wire
    pub fn code(&self) -> Code {
        match self {
            RegistryError::Backend(status) => status.code(),
            RegistryError::TerminationUncertain { source, .. } => source.code(),
            RegistryError::UnknownAction(_) | RegistryError::InvalidResource(_) => {
                Code::InvalidArgument
            }
            RegistryError::DownloadFailed { source, .. } if source.is_not_found() => Code::NotFound,
            RegistryError::BackendUnavailable { .. } => Code::Unavailable,
            RegistryError::InvalidState { .. } => Code::FailedPrecondition,
            RegistryError::Cancelled => Code::Cancelled,
            RegistryError::DeadlineExceeded => Code::DeadlineExceeded,
            _ => Code::Unknown,
        }
    }

    /// Whether the call ended because the caller went away
    pub fn is_cancellation(&self) -> bool {
        matches!(self, RegistryError::Cancelled | RegistryError::DeadlineExceeded)
    }
}

impl From<RegistryError> for Status {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Backend(status) => status,
            err => {
                let mut status = Status::new(err.code(), err.to_string());
                if matches!(err, RegistryError::TerminationUncertain { .. }) {
                    status.metadata_mut().insert(
                        TERMINATION_METADATA_KEY,
                        MetadataValue::from_static("uncertain"),
                    );
                }
                status
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_status_passes_through() {
        let status: Status =
            RegistryError::Backend(Status::not_found("no such module")).into();

        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "no such module");
    }

    #[test]
    fn test_unknown_action_status() {
        let status: Status = RegistryError::UnknownAction(7).into();

        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "Unknown Version manager action requested.");
    }

    #[test]
    fn test_artifact_messages() {
        let status: Status = RegistryError::ReceiveFailed {
            artifact: Artifact::SourceZip,
            source: Status::internal("reset"),
        }
        .into();

        assert_eq!(status.code(), Code::Unknown);
        assert_eq!(status.message(), "Failed to receive source zip.");
    }

    #[test]
    fn test_backend_unavailable_status() {
        let status: Status = RegistryError::BackendUnavailable {
            service: "Version manager",
        }
        .into();

        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), "Failed to connect to Version manager service.");
    }

    #[test]
    fn test_termination_uncertain_is_marked() {
        let status: Status = RegistryError::TerminationUncertain {
            session: "abc-123".to_string(),
            action: VersionAction::Publish,
            source: Status::unavailable("connection reset"),
        }
        .into();

        assert_eq!(status.code(), Code::Unavailable);
        assert!(status.message().contains("abc-123"));
        assert_eq!(
            status
                .metadata()
                .get(TERMINATION_METADATA_KEY)
                .and_then(|v| v.to_str().ok()),
            Some("uncertain")
        );
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let err = RegistryError::DownloadFailed {
            artifact: Artifact::SourceZip,
            source: ObjectStoreError::NotFound {
                bucket: "registry".to_string(),
                key: "cie/vpc/aws/1.0.0.zip".to_string(),
            },
        };

        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(Status::from(err).message(), "Failed to download source zip.");
    }

    #[test]
    fn test_cancellation_codes() {
        assert_eq!(RegistryError::Cancelled.code(), Code::Cancelled);
        assert_eq!(RegistryError::DeadlineExceeded.code(), Code::DeadlineExceeded);
        assert!(RegistryError::Cancelled.is_cancellation());
    }
}
