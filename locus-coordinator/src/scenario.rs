//! Scripted sessions against the simulated provider.
//!
//! A scenario describes the provider's initial state and a sequence of
//! steps: consumer invocations interleaved with provider events and waits.
//! [`replay`] runs it on a fresh coordinator and returns every reply in the
//! order the coordinator produced them.
//!
//! ```yaml
//! initial:
//!   authorization: AuthorizedWhenInUse
//! steps:
//!   - step: invoke
//!     callbackId: w1
//!     action: watchLocation
//!   - step: location
//!     latitude: 51.5
//!     longitude: -0.12
//!   - step: wait
//!     ms: 200
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use locus_core::{AccuracyLevel, AuthorizationStatus, CallbackId, Location, Settings};

use crate::coordinator::CoordinatorSnapshot;
use crate::error::{io_err, CoordinatorError};
use crate::protocol::{dispatch, Invocation};
use crate::provider::event_channel;
use crate::reply::{reply_channel, Reply};
use crate::runtime::{join, spawn};
use crate::simulated::{fix, SimulatedProvider};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub initial: InitialState,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialState {
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default = "authorization_default")]
    pub authorization: AuthorizationStatus,
    #[serde(default = "accuracy_default")]
    pub accuracy: AccuracyLevel,
    /// Fix the platform already holds when the session starts.
    #[serde(default)]
    pub last_known: Option<Fix>,
}

impl Default for InitialState {
    fn default() -> Self {
        Self {
            enabled: enabled_default(),
            authorization: authorization_default(),
            accuracy: accuracy_default(),
            last_known: None,
        }
    }
}

fn enabled_default() -> bool {
    true
}

fn authorization_default() -> AuthorizationStatus {
    AuthorizationStatus::AuthorizedWhenInUse
}

fn accuracy_default() -> AccuracyLevel {
    AccuracyLevel::Precise
}

/// A fix relative to the moment the step runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "fix_accuracy_default")]
    pub accuracy: f64,
    #[serde(default)]
    pub altitude: f64,
    /// How old the fix is, in milliseconds.
    #[serde(default)]
    pub age_ms: u64,
}

fn fix_accuracy_default() -> f64 {
    5.0
}

impl Fix {
    fn to_location(&self) -> Location {
        let mut location = fix(
            self.latitude,
            self.longitude,
            Duration::from_millis(self.age_ms),
        );
        location.accuracy = self.accuracy;
        location.altitude = self.altitude;
        location
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum Step {
    /// A consumer invocation.
    #[serde(rename_all = "camelCase")]
    Invoke {
        callback_id: CallbackId,
        action: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// The provider reports a fix.
    Location(Fix),
    /// The provider reports a failure.
    Failure { message: String },
    /// Authorization changes, as after the user answers a prompt.
    Authorize { status: AuthorizationStatus },
    /// Replace the platform's cached fix without emitting an event.
    CacheLocation(Fix),
    /// Let time pass so timeouts can fire.
    Wait { ms: u64 },
    /// The host session ends.
    EndSession,
}

/// Replies plus the coordinator's final state.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub replies: Vec<Reply>,
    pub final_state: CoordinatorSnapshot,
}

pub fn load(path: &Path) -> Result<Scenario, CoordinatorError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse(&contents).map_err(|source| CoordinatorError::Scenario {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse(contents: &str) -> Result<Scenario, serde_yaml::Error> {
    serde_yaml::from_str(contents)
}

/// Run `scenario` on a fresh coordinator over a [`SimulatedProvider`].
pub async fn replay(
    scenario: &Scenario,
    settings: &Settings,
) -> Result<ReplayOutcome, CoordinatorError> {
    let (events_tx, events_rx) = event_channel();
    let initial = &scenario.initial;
    let provider = Arc::new(
        SimulatedProvider::new(events_tx)
            .with_enabled(initial.enabled)
            .with_authorization(initial.authorization)
            .with_accuracy(initial.accuracy),
    );
    provider.set_last_known(initial.last_known.as_ref().map(Fix::to_location));

    let (handle, task) = spawn(provider.clone(), events_rx, settings);
    let (sink, mut replies_rx) = reply_channel();

    for (index, step) in scenario.steps.iter().enumerate() {
        tracing::debug!(index, ?step, "replaying step");
        match step {
            Step::Invoke {
                callback_id,
                action,
                args,
            } => {
                let invocation = Invocation::new(callback_id.clone(), action.clone(), args.clone());
                dispatch(&handle, invocation, &sink).await?;
            }
            Step::Location(fix) => provider.emit_location(fix.to_location()),
            Step::Failure { message } => provider.emit_failure(message.clone()),
            Step::Authorize { status } => provider.change_authorization(*status),
            Step::CacheLocation(fix) => provider.set_last_known(Some(fix.to_location())),
            Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
            Step::EndSession => handle.end_session().await?,
        }
        handle.snapshot().await?;
    }

    let final_state = handle.snapshot().await?;
    handle.shutdown();
    join(task).await?;
    drop(sink);

    let mut replies = Vec::new();
    while let Some(reply) = replies_rx.recv().await {
        replies.push(reply);
    }
    Ok(ReplayOutcome {
        replies,
        final_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_step_kind() {
        let scenario = parse(
            r#"
initial:
  authorization: NotDetermined
  accuracy: Coarse
  lastKnown: { latitude: 1.0, longitude: 2.0, ageMs: 5000 }
steps:
  - step: invoke
    callbackId: p1
    action: requestPermission
    args: [whenInUse]
  - step: authorize
    status: AuthorizedWhenInUse
  - step: location
    latitude: 3.0
    longitude: 4.0
  - step: failure
    message: no signal
  - step: cacheLocation
    latitude: 5.0
    longitude: 6.0
    ageMs: 100
  - step: wait
    ms: 10
  - step: endSession
"#,
        )
        .expect("parse");

        assert_eq!(scenario.initial.authorization, AuthorizationStatus::NotDetermined);
        assert_eq!(scenario.initial.accuracy, AccuracyLevel::Coarse);
        assert!(scenario.initial.enabled);
        assert_eq!(scenario.steps.len(), 7);
        assert!(matches!(scenario.steps[6], Step::EndSession));
    }

    #[test]
    fn unknown_step_is_a_parse_error() {
        assert!(parse("steps:\n  - step: teleport\n").is_err());
    }

    #[test]
    fn load_reports_the_failing_path() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let good = dir.path().join("ok.yaml");
        std::fs::write(&good, "steps:\n  - step: endSession\n").expect("write");
        assert_eq!(load(&good).expect("load").steps.len(), 1);

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "steps: [ {step: 12").expect("write");
        let err = load(&bad).unwrap_err();
        assert!(matches!(err, CoordinatorError::Scenario { .. }));
        assert!(err.to_string().contains("bad.yaml"));

        let missing = load(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(missing, CoordinatorError::Io { .. }));
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn replay_collects_replies_in_order() {
        let scenario = parse(
            r#"
steps:
  - step: invoke
    callbackId: w1
    action: watchLocation
    args: [w]
  - step: invoke
    callbackId: c1
    action: getCurrentPosition
    args: [{ timeout: 100 }]
  - step: location
    latitude: 1.0
    longitude: 2.0
  - step: invoke
    callbackId: x1
    action: clearWatch
    args: [w]
"#,
        )
        .expect("parse");

        let outcome = replay(&scenario, &Settings::default()).await.expect("replay");
        let ids: Vec<&str> = outcome
            .replies
            .iter()
            .map(|r| r.callback_id.0.as_str())
            .collect();
        assert_eq!(ids, vec!["w1", "w1", "c1", "x1"]);
        assert!(!outcome.final_state.stream_running);
        assert!(outcome.final_state.watch_ids.is_empty());
    }

    #[tokio::test]
    async fn replay_with_services_disabled_reports_location_errors() {
        let scenario = parse(
            r#"
initial:
  enabled: false
steps:
  - step: invoke
    callbackId: w1
    action: watchLocation
    args: [w]
  - step: invoke
    callbackId: c1
    action: getCurrentPosition
    args: [{ timeout: 0 }]
"#,
        )
        .expect("parse");

        let outcome = replay(&scenario, &Settings::default()).await.expect("replay");
        let seen: Vec<(&str, Option<&str>)> = outcome
            .replies
            .iter()
            .map(|r| (r.callback_id.0.as_str(), r.error_code()))
            .collect();
        assert_eq!(
            seen,
            vec![
                ("w1", None),
                ("w1", Some("LOCATION_ERROR")),
                ("c1", Some("LOCATION_ERROR")),
            ]
        );
        assert_eq!(outcome.final_state.watch_ids.len(), 1);
        assert!(!outcome.final_state.current_position_pending);
    }
}
