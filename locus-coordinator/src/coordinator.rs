//! Request coordinator: the state machine behind every consumer action and
//! every provider event.
//!
//! `Coordinator` is plain synchronous state. The runtime owns exactly one and
//! feeds it commands, provider events and timer expiries from a single task,
//! so no two of these ever interleave.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use locus_core::{
    AccuracyLevel, AuthorizationStatus, DesiredAccuracy, LocationError, PermissionLevel,
    PermissionPayload, PositionOptions, Settings, WatchId, WatchPayload,
};

use crate::dispatch::{fan_out, location_body, Delivery};
use crate::provider::{LocationProvider, ProviderEvent};
use crate::registry::{PendingCurrentPosition, PendingPermissionRequest, SubscriptionRegistry};
use crate::reply::{ReplyBody, ReplyTarget};
use crate::timeout::{TimeoutSupervisor, TimerSender, TimerToken};

/// Last command issued to the provider's update stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamCommand {
    Started,
    Stopped,
}

/// Point-in-time view of the coordinator, for status output and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorSnapshot {
    pub stream_running: bool,
    pub watch_ids: Vec<WatchId>,
    pub current_position_pending: bool,
    pub permission_pending: bool,
    pub timer_armed: bool,
}

pub struct Coordinator {
    provider: Arc<dyn LocationProvider>,
    registry: SubscriptionRegistry,
    timeouts: TimeoutSupervisor,
    stream: StreamCommand,
}

impl Coordinator {
    pub fn new(provider: Arc<dyn LocationProvider>, timer_fired: TimerSender) -> Self {
        Self {
            provider,
            registry: SubscriptionRegistry::new(),
            timeouts: TimeoutSupervisor::new(timer_fired),
            stream: StreamCommand::Stopped,
        }
    }

    /// Push static provider configuration.
    pub fn configure(&self, settings: &Settings) {
        self.provider.set_desired_accuracy(DesiredAccuracy::Best);
        self.provider.set_distance_filter(settings.distance_filter_m);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn is_location_enabled(&self) -> bool {
        self.provider.location_services_enabled()
    }

    pub fn permission_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::from_raw(self.provider.authorization_status())
    }

    pub fn accuracy_authorization(&self) -> AccuracyLevel {
        AccuracyLevel::from_raw(self.provider.accuracy_authorization())
    }

    pub fn stream_running(&self) -> bool {
        self.stream == StreamCommand::Started
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            stream_running: self.stream_running(),
            watch_ids: self.registry.watch_ids(),
            current_position_pending: self.registry.has_current(),
            permission_pending: self.registry.has_permission(),
            timer_armed: self.timeouts.is_armed(),
        }
    }

    // -----------------------------------------------------------------------
    // Watches
    // -----------------------------------------------------------------------

    /// Register a watch and make sure fixes flow. The first keep-open reply
    /// on `target` carries the watch id.
    pub fn start_watch(&mut self, id: Option<WatchId>, target: ReplyTarget) -> WatchId {
        let id = id.unwrap_or_else(WatchId::generate);
        target.send_open(Ok(ReplyBody::Watch(WatchPayload {
            watch_id: id.clone(),
        })));
        if !self.is_location_enabled() {
            // Stays registered: fixes flow once services come back.
            tracing::warn!(watch = %id, "watch started with location services disabled");
            target.send_open(Err(services_disabled()));
        }

        if let Some(replaced) = self.registry.insert_watch(id.clone(), target) {
            tracing::info!(
                watch = %id,
                replaced_callback = %replaced.callback_id(),
                "watch id reused; previous subscriber replaced",
            );
        } else {
            tracing::info!(watch = %id, watches = self.registry.watch_count(), "watch registered");
        }

        self.provider.set_desired_accuracy(DesiredAccuracy::Best);
        self.reconcile_stream();
        id
    }

    pub fn stop_watch(&mut self, id: &WatchId) -> Result<(), LocationError> {
        if self.registry.remove_watch(id).is_none() {
            tracing::debug!(watch = %id, "clear for unknown watch id");
            return Err(LocationError::InvalidWatchId(id.0.clone()));
        }
        tracing::info!(watch = %id, watches = self.registry.watch_count(), "watch removed");
        self.reconcile_stream();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Permission
    // -----------------------------------------------------------------------

    pub fn request_permission(&mut self, level: PermissionLevel, target: ReplyTarget) {
        if self.registry.has_permission() {
            target.fail(LocationError::Busy(
                "a permission request is already pending".to_string(),
            ));
            return;
        }

        let status = self.permission_status();
        match (status, level) {
            (AuthorizationStatus::NotDetermined, _)
            | (AuthorizationStatus::AuthorizedWhenInUse, PermissionLevel::Always) => {
                tracing::info!(%status, requested = %level, "permission prompt issued");
                self.registry.set_permission(PendingPermissionRequest {
                    target,
                    requested: level,
                });
                self.provider.request_authorization(level);
            }
            (AuthorizationStatus::AuthorizedWhenInUse, PermissionLevel::WhenInUse)
            | (AuthorizationStatus::AuthorizedAlways, _) => {
                target.succeed(self.permission_body(status));
            }
            (AuthorizationStatus::Denied | AuthorizationStatus::Restricted, _) => {
                target.fail(permission_denied(status));
            }
            (AuthorizationStatus::Unknown, _) => {
                target.fail(LocationError::Unknown(format!(
                    "unrecognised authorization status {}",
                    self.provider.authorization_status()
                )));
            }
        }
    }

    fn authorization_changed(&mut self, code: i32) {
        let status = AuthorizationStatus::from_raw(code);
        let Some(pending) = self.registry.take_permission() else {
            tracing::debug!(%status, "authorization changed with no pending request");
            return;
        };

        match status {
            AuthorizationStatus::NotDetermined => {
                // Delivered before the user has answered; keep waiting.
                self.registry.set_permission(pending);
            }
            AuthorizationStatus::AuthorizedAlways | AuthorizationStatus::AuthorizedWhenInUse => {
                tracing::info!(%status, requested = %pending.requested, "permission resolved");
                pending.target.succeed(self.permission_body(status));
            }
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted => {
                tracing::info!(%status, requested = %pending.requested, "permission refused");
                pending.target.fail(permission_denied(status));
            }
            AuthorizationStatus::Unknown => {
                pending.target.fail(LocationError::Unknown(format!(
                    "unrecognised authorization status {code}"
                )));
            }
        }
    }

    fn permission_body(&self, status: AuthorizationStatus) -> ReplyBody {
        ReplyBody::Permission(PermissionPayload {
            status,
            accuracy: Some(self.accuracy_authorization()),
        })
    }

    // -----------------------------------------------------------------------
    // One-shot
    // -----------------------------------------------------------------------

    pub fn current_position(&mut self, options: PositionOptions, target: ReplyTarget) {
        let status = self.permission_status();
        if matches!(
            status,
            AuthorizationStatus::NotDetermined
                | AuthorizationStatus::Denied
                | AuthorizationStatus::Restricted
        ) {
            target.fail(permission_denied(status));
            return;
        }

        if let Some(cached) = self.provider.last_known_location() {
            let age = cached.age_at(Utc::now());
            if age < options.maximum_age {
                tracing::debug!(
                    age_ms = age.as_millis(),
                    max_age_ms = options.maximum_age.as_millis(),
                    "current position served from cache",
                );
                target.succeed(location_body(&cached));
                return;
            }
        }

        if !self.is_location_enabled() {
            tracing::warn!("current position requested with location services disabled");
            target.fail(services_disabled());
            return;
        }

        let pending = PendingCurrentPosition {
            target,
            timeout: options.timeout,
            timer: None,
        };
        if let Err(rejected) = self.registry.set_current(pending) {
            rejected.target.fail(LocationError::Busy(
                "a current position request is already pending".to_string(),
            ));
            return;
        }

        tracing::info!(
            timeout_ms = options.timeout.as_millis(),
            accuracy = ?options.accuracy,
            "current position pending",
        );
        self.provider.set_desired_accuracy(DesiredAccuracy::Best);
        self.reconcile_stream();

        if !options.timeout.is_zero() {
            let token = self.timeouts.arm(options.timeout);
            self.registry.set_current_timer(token);
        }
    }

    pub fn timer_fired(&mut self, token: TimerToken) {
        self.timeouts.fired(token);
        let Some(pending) = self.registry.take_current_for_timer(token) else {
            tracing::debug!(?token, "stale timeout ignored");
            return;
        };
        tracing::info!(callback = %pending.target.callback_id(), "current position timed out");
        pending
            .target
            .fail(LocationError::Timeout(pending.timeout.as_millis()));
        self.reconcile_stream();
    }

    // -----------------------------------------------------------------------
    // Provider events
    // -----------------------------------------------------------------------

    pub fn handle_event(&mut self, event: ProviderEvent) {
        match event {
            ProviderEvent::LocationUpdate(batch) => {
                let Some(latest) = batch.last() else {
                    return;
                };
                let delivery = fan_out(&mut self.registry, Ok(location_body(latest)));
                self.after_delivery("location", delivery);
            }
            ProviderEvent::Failure(message) => {
                tracing::warn!(error = %message, "provider failure");
                let delivery = fan_out(
                    &mut self.registry,
                    Err(LocationError::ProviderFailure(message)),
                );
                self.after_delivery("failure", delivery);
            }
            ProviderEvent::AuthorizationChanged(code) => self.authorization_changed(code),
        }
    }

    fn after_delivery(&mut self, kind: &'static str, delivery: Delivery) {
        tracing::debug!(
            kind,
            watches = delivery.watches,
            one_shot = delivery.one_shot.is_some(),
            "event dispatched",
        );
        if let Some(resolved) = delivery.one_shot {
            if let Some(token) = resolved.timer {
                self.timeouts.disarm(token);
            }
            tracing::info!(callback = %resolved.callback_id, kind, "current position resolved");
            self.reconcile_stream();
        }
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// The host session ended: drop every consumer without delivering.
    pub fn end_session(&mut self) {
        let dropped = self.registry.clear();
        self.timeouts.disarm_any();
        self.reconcile_stream();
        tracing::info!(dropped, "session ended");
    }

    /// Bring the provider stream in line with current demand.
    fn reconcile_stream(&mut self) {
        let wanted = self.registry.wants_stream();
        match (wanted, self.stream) {
            (true, StreamCommand::Stopped) => {
                self.provider.start_updates();
                self.stream = StreamCommand::Started;
                tracing::info!("provider stream started");
            }
            (false, StreamCommand::Started) => {
                self.provider.stop_updates();
                self.stream = StreamCommand::Stopped;
                tracing::info!("provider stream stopped");
            }
            _ => {}
        }
    }
}

fn permission_denied(status: AuthorizationStatus) -> LocationError {
    LocationError::PermissionDenied(format!("location permission not granted ({status})"))
}

fn services_disabled() -> LocationError {
    LocationError::ProviderFailure("location services are not enabled".to_string())
}
