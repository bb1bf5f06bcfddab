//! Error types for locus-core.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported to the consumer that issued a request.
///
/// These never abort the process; the coordinator turns them into an
/// [`ErrorPayload`] and delivers it to the request's reply target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// Authorization is missing, denied or restricted.
    #[error("{0}")]
    PermissionDenied(String),

    /// `clearWatch` named an id with no active subscription.
    #[error("no active watch with id '{0}'")]
    InvalidWatchId(String),

    /// Malformed request payload.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// A request of the same kind is already pending.
    #[error("{0}")]
    Busy(String),

    /// The one-shot request exceeded its deadline.
    #[error("timed out after {0} ms waiting for a location")]
    Timeout(u128),

    /// The provider reported an error; the message is passed through.
    #[error("{0}")]
    ProviderFailure(String),

    /// The provider reported a state this build cannot interpret.
    #[error("{0}")]
    Unknown(String),
}

impl LocationError {
    /// Stable wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::InvalidWatchId(_) => "INVALID_WATCH_ID",
            Self::InvalidArguments(_) => "INVALID_OPTIONS",
            Self::Busy(_) => "BUSY",
            Self::Timeout(_) => "TIMEOUT",
            Self::ProviderFailure(_) => "LOCATION_ERROR",
            Self::Unknown(_) => "UNKNOWN",
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            error_code: self.code().to_string(),
            error_message: self.to_string(),
        }
    }
}

/// Structured error body; errors are never delivered as bare strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_code: String,
    pub error_message: String,
}

impl From<LocationError> for ErrorPayload {
    fn from(err: LocationError) -> Self {
        err.to_payload()
    }
}

/// Errors from loading or saving [`crate::settings::Settings`].
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Parse error on load, with the offending file.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SettingsError {
    SettingsError::Io {
        path: path.into(),
        source,
    }
}
