//! Domain types shared by the coordinator, the invocation protocol and the CLI.
//!
//! Raw provider codes are mapped into closed enums here; everything the
//! consumer sees is serde-serializable with camelCase field names.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LocationError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of an active watch subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchId(pub String);

impl WatchId {
    /// A fresh random id, used when the consumer does not supply one.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for WatchId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for WatchId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Transport-assigned identifier of a reply target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackId(pub String);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CallbackId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CallbackId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// OS-level permission state governing whether location may be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedAlways,
    AuthorizedWhenInUse,
    Unknown,
}

impl AuthorizationStatus {
    /// Map the provider's raw status code. Codes follow the platform order
    /// `0..=4`; anything else is a status this build does not know about.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => Self::NotDetermined,
            1 => Self::Restricted,
            2 => Self::Denied,
            3 => Self::AuthorizedAlways,
            4 => Self::AuthorizedWhenInUse,
            _ => Self::Unknown,
        }
    }

    /// Raw code for this status; `Unknown` has none.
    pub fn to_raw(self) -> Option<i32> {
        match self {
            Self::NotDetermined => Some(0),
            Self::Restricted => Some(1),
            Self::Denied => Some(2),
            Self::AuthorizedAlways => Some(3),
            Self::AuthorizedWhenInUse => Some(4),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotDetermined => "NotDetermined",
            Self::Restricted => "Restricted",
            Self::Denied => "Denied",
            Self::AuthorizedAlways => "AuthorizedAlways",
            Self::AuthorizedWhenInUse => "AuthorizedWhenInUse",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for AuthorizationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', '-', ' '], "").as_str() {
            "notdetermined" => Ok(Self::NotDetermined),
            "restricted" => Ok(Self::Restricted),
            "denied" => Ok(Self::Denied),
            "authorizedalways" | "always" => Ok(Self::AuthorizedAlways),
            "authorizedwheninuse" | "wheninuse" => Ok(Self::AuthorizedWhenInUse),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown authorization status '{other}'")),
        }
    }
}

/// Full-precision vs reduced-precision grant, independent of authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccuracyLevel {
    Precise,
    Coarse,
    Unknown,
}

impl AccuracyLevel {
    /// Map the provider's raw accuracy authorization. `None` means the
    /// platform has no reduced-accuracy mode, so every grant is precise.
    pub fn from_raw(code: Option<i32>) -> Self {
        match code {
            None | Some(0) => Self::Precise,
            Some(1) => Self::Coarse,
            Some(_) => Self::Unknown,
        }
    }
}

impl fmt::Display for AccuracyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precise => write!(f, "Precise"),
            Self::Coarse => write!(f, "Coarse"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Level requested by `requestPermission`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionLevel {
    WhenInUse,
    Always,
}

impl FromStr for PermissionLevel {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "always" => Ok(Self::Always),
            "wheninuse" => Ok(Self::WhenInUse),
            other => Err(LocationError::InvalidArguments(format!(
                "unknown permission level '{other}'; expected: always, whenInUse"
            ))),
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WhenInUse => write!(f, "whenInUse"),
            Self::Always => write!(f, "always"),
        }
    }
}

/// Accuracy the consumer would like for a one-shot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyHint {
    #[default]
    Precise,
    Coarse,
}

/// Desired-accuracy setting pushed to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DesiredAccuracy {
    #[default]
    Best,
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// A single fix as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in metres.
    pub accuracy: f64,
    pub altitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl Location {
    /// Age of the fix relative to `now`. Fixes from the future count as fresh.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn to_payload(&self) -> LocationPayload {
        LocationPayload::from(self)
    }
}

/// Consumer-facing location result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub altitude: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl From<&Location> for LocationPayload {
    fn from(location: &Location) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            accuracy: location.accuracy,
            altitude: location.altitude,
            timestamp: location.timestamp.timestamp_millis(),
        }
    }
}

/// Result of a resolved permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionPayload {
    pub status: AuthorizationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<AccuracyLevel>,
}

/// `getPermissionStatus` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: AuthorizationStatus,
}

/// `getAccuracyAuthorization` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyPayload {
    pub accuracy_level: AccuracyLevel,
}

/// First keep-open reply of `watchLocation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchPayload {
    pub watch_id: WatchId,
}

// ---------------------------------------------------------------------------
// One-shot options
// ---------------------------------------------------------------------------

/// `getCurrentPosition` options exactly as they arrive from the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPositionOptions {
    #[serde(default)]
    pub timeout: Option<i64>,
    #[serde(default)]
    pub maximum_age: Option<i64>,
    #[serde(default)]
    pub accuracy_level: Option<String>,
}

/// Validated `getCurrentPosition` options. A zero timeout means no timeout;
/// a zero maximum age disables the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionOptions {
    pub timeout: Duration,
    pub maximum_age: Duration,
    pub accuracy: AccuracyHint,
}

impl PositionOptions {
    pub fn new(timeout: Duration, maximum_age: Duration) -> Self {
        Self {
            timeout,
            maximum_age,
            accuracy: AccuracyHint::Precise,
        }
    }
}

impl TryFrom<RawPositionOptions> for PositionOptions {
    type Error = LocationError;

    fn try_from(raw: RawPositionOptions) -> Result<Self, Self::Error> {
        let timeout = non_negative_ms("timeout", raw.timeout)?;
        let maximum_age = non_negative_ms("maximumAge", raw.maximum_age)?;
        let accuracy = match raw.accuracy_level.as_deref().map(str::to_ascii_lowercase) {
            None => AccuracyHint::Precise,
            Some(level) if level == "precise" || level == "high" => AccuracyHint::Precise,
            Some(level) if level == "coarse" || level == "approximate" => AccuracyHint::Coarse,
            Some(other) => {
                return Err(LocationError::InvalidArguments(format!(
                    "unknown accuracyLevel '{other}'; expected: precise, coarse"
                )))
            }
        };
        Ok(Self {
            timeout,
            maximum_age,
            accuracy,
        })
    }
}

fn non_negative_ms(field: &str, value: Option<i64>) -> Result<Duration, LocationError> {
    match value {
        None => Ok(Duration::ZERO),
        Some(ms) if ms >= 0 => Ok(Duration::from_millis(ms as u64)),
        Some(ms) => Err(LocationError::InvalidArguments(format!(
            "{field} must be >= 0, got {ms}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
