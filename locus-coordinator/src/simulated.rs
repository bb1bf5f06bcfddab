//! In-memory [`LocationProvider`] used by the replay CLI and the test suites.
//!
//! It records every command it receives and lets the caller inject events as
//! if the platform had produced them.

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use locus_core::{
    AccuracyLevel, AuthorizationStatus, DesiredAccuracy, Location, PermissionLevel,
};

use crate::provider::{LocationProvider, ProviderEvent, ProviderEventSender};

#[derive(Debug, Clone)]
struct SimulatedState {
    enabled: bool,
    authorization: i32,
    accuracy: Option<i32>,
    last_known: Option<Location>,
    desired_accuracy: Option<DesiredAccuracy>,
    distance_filter: Option<f64>,
    updating: bool,
    start_calls: usize,
    stop_calls: usize,
    prompts: Vec<PermissionLevel>,
}

/// Scriptable provider. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct SimulatedProvider {
    state: Mutex<SimulatedState>,
    events: ProviderEventSender,
}

impl SimulatedProvider {
    /// Services enabled, authorization `AuthorizedWhenInUse`, precise accuracy.
    pub fn new(events: ProviderEventSender) -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                enabled: true,
                authorization: 4,
                accuracy: Some(0),
                last_known: None,
                desired_accuracy: None,
                distance_filter: None,
                updating: false,
                start_calls: 0,
                stop_calls: 0,
                prompts: Vec::new(),
            }),
            events,
        }
    }

    pub fn with_enabled(self, enabled: bool) -> Self {
        self.set_enabled(enabled);
        self
    }

    /// Flip the system-wide location switch.
    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    pub fn with_authorization(self, status: AuthorizationStatus) -> Self {
        self.set_authorization_raw(status.to_raw().unwrap_or(99));
        self
    }

    /// Install a raw status code, including codes outside the known range.
    pub fn set_authorization_raw(&self, code: i32) {
        self.state.lock().authorization = code;
    }

    pub fn with_accuracy(self, level: AccuracyLevel) -> Self {
        self.state.lock().accuracy = match level {
            AccuracyLevel::Precise => Some(0),
            AccuracyLevel::Coarse => Some(1),
            AccuracyLevel::Unknown => Some(99),
        };
        self
    }

    /// Pretend the platform has no reduced-accuracy mode.
    pub fn without_accuracy_authorization(self) -> Self {
        self.state.lock().accuracy = None;
        self
    }

    pub fn set_last_known(&self, location: Option<Location>) {
        self.state.lock().last_known = location;
    }

    // -- event injection ----------------------------------------------------

    /// Deliver a single fix and remember it as the last known location.
    pub fn emit_location(&self, location: Location) {
        self.emit_batch(vec![location]);
    }

    pub fn emit_batch(&self, locations: Vec<Location>) {
        if let Some(last) = locations.last() {
            self.state.lock().last_known = Some(last.clone());
        }
        self.send(ProviderEvent::LocationUpdate(locations));
    }

    pub fn emit_failure(&self, message: impl Into<String>) {
        self.send(ProviderEvent::Failure(message.into()));
    }

    /// Change authorization and notify, as the platform does after a prompt.
    pub fn change_authorization(&self, status: AuthorizationStatus) {
        let code = status.to_raw().unwrap_or(99);
        self.set_authorization_raw(code);
        self.send(ProviderEvent::AuthorizationChanged(code));
    }

    fn send(&self, event: ProviderEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("simulated provider event dropped: coordinator gone");
        }
    }

    // -- inspection ---------------------------------------------------------

    pub fn is_updating(&self) -> bool {
        self.state.lock().updating
    }

    pub fn start_calls(&self) -> usize {
        self.state.lock().start_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.state.lock().stop_calls
    }

    pub fn desired_accuracy(&self) -> Option<DesiredAccuracy> {
        self.state.lock().desired_accuracy
    }

    pub fn distance_filter(&self) -> Option<f64> {
        self.state.lock().distance_filter
    }

    pub fn prompts(&self) -> Vec<PermissionLevel> {
        self.state.lock().prompts.clone()
    }
}

impl LocationProvider for SimulatedProvider {
    fn location_services_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    fn authorization_status(&self) -> i32 {
        self.state.lock().authorization
    }

    fn accuracy_authorization(&self) -> Option<i32> {
        self.state.lock().accuracy
    }

    fn last_known_location(&self) -> Option<Location> {
        self.state.lock().last_known.clone()
    }

    fn set_desired_accuracy(&self, accuracy: DesiredAccuracy) {
        self.state.lock().desired_accuracy = Some(accuracy);
    }

    fn set_distance_filter(&self, meters: f64) {
        self.state.lock().distance_filter = Some(meters);
    }

    fn start_updates(&self) {
        let mut state = self.state.lock();
        state.updating = true;
        state.start_calls += 1;
    }

    fn stop_updates(&self) {
        let mut state = self.state.lock();
        state.updating = false;
        state.stop_calls += 1;
    }

    fn request_authorization(&self, level: PermissionLevel) {
        self.state.lock().prompts.push(level);
    }
}

/// A fix at the given coordinates taken `age` ago.
pub fn fix(latitude: f64, longitude: f64, age: std::time::Duration) -> Location {
    let age = ChronoDuration::from_std(age).unwrap_or_else(|_| ChronoDuration::zero());
    Location {
        latitude,
        longitude,
        accuracy: 5.0,
        altitude: 0.0,
        timestamp: Utc::now() - age,
    }
}
