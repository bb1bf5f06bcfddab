//! Provider adapter: the seam between the coordinator and the platform
//! location service.
//!
//! A [`LocationProvider`] issues commands synchronously and reports results
//! through a single [`ProviderEvent`] channel shared by every consumer. The
//! coordinator owns the receiving end and is the only reader.

use tokio::sync::mpsc;

use locus_core::{DesiredAccuracy, Location, PermissionLevel};

/// Everything the provider can tell the coordinator asynchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// A batch of fixes, oldest first.
    LocationUpdate(Vec<Location>),
    /// The provider failed to produce a fix.
    Failure(String),
    /// Authorization changed; carries the raw platform status code.
    AuthorizationChanged(i32),
}

pub type ProviderEventSender = mpsc::UnboundedSender<ProviderEvent>;
pub type ProviderEventReceiver = mpsc::UnboundedReceiver<ProviderEvent>;

/// Create the channel a provider uses to report events.
pub fn event_channel() -> (ProviderEventSender, ProviderEventReceiver) {
    mpsc::unbounded_channel()
}

/// Platform location service.
///
/// Implementations hold a handle and nothing else: every decision about when
/// to start, stop or reconfigure lives in the coordinator.
pub trait LocationProvider: Send + Sync + 'static {
    /// Whether location services are switched on device-wide.
    fn location_services_enabled(&self) -> bool;

    /// Raw authorization status code (platform order `0..=4`).
    fn authorization_status(&self) -> i32;

    /// Raw accuracy authorization, or `None` on platforms without a
    /// reduced-accuracy mode.
    fn accuracy_authorization(&self) -> Option<i32>;

    /// Most recent fix the platform has cached, if any.
    fn last_known_location(&self) -> Option<Location>;

    fn set_desired_accuracy(&self, accuracy: DesiredAccuracy);

    /// Minimum movement in metres between reported fixes.
    fn set_distance_filter(&self, meters: f64);

    /// Start continuous updates. Results arrive as [`ProviderEvent`]s.
    fn start_updates(&self);

    fn stop_updates(&self);

    /// Show the platform permission prompt for `level`. The outcome arrives
    /// as [`ProviderEvent::AuthorizationChanged`].
    fn request_authorization(&self, level: PermissionLevel);
}
