use std::path::PathBuf;

use thiserror::Error;

use locus_core::LocationError;

/// Error surface for the coordinator runtime, protocol and scenario replay.
///
/// Consumer-facing failures travel as [`LocationError`] on reply targets;
/// this type is for the process driving the coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings error: {0}")]
    Settings(#[from] locus_core::SettingsError),

    #[error("failed to parse scenario at {path}: {source}")]
    Scenario {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// A consumer operation was rejected; returned by handle methods that
    /// answer directly instead of through a reply target.
    #[error(transparent)]
    Location(#[from] LocationError),

    #[error("coordinator task failed: {0}")]
    Join(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoordinatorError {
    CoordinatorError::Io {
        path: path.into(),
        source,
    }
}
