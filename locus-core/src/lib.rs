//! Locus core library: domain types, consumer-facing errors, settings.
//!
//! Public API surface:
//! - [`types`]: ids, authorization enums, locations and payloads
//! - [`error`]: [`LocationError`], [`ErrorPayload`], [`SettingsError`]
//! - [`settings`]: load / save

pub mod error;
pub mod settings;
pub mod types;

pub use error::{ErrorPayload, LocationError, SettingsError};
pub use settings::Settings;
pub use types::{
    AccuracyHint, AccuracyLevel, AccuracyPayload, AuthorizationStatus, CallbackId,
    DesiredAccuracy, Location, LocationPayload, PermissionLevel, PermissionPayload,
    PositionOptions, RawPositionOptions, StatusPayload, WatchId, WatchPayload,
};
