//! Invocation protocol: turns transport records into coordinator calls.
//!
//! A transport hands over an [`Invocation`] (callback id, action name,
//! positional JSON arguments) plus the sink its replies should go to.
//! Malformed arguments are answered with `INVALID_OPTIONS` here and never
//! reach the coordinator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use locus_core::{
    AccuracyPayload, CallbackId, LocationError, PermissionLevel, PositionOptions,
    RawPositionOptions, StatusPayload, WatchId,
};

use crate::error::CoordinatorError;
use crate::reply::{ReplyBody, ReplySink, ReplyTarget};
use crate::runtime::CoordinatorHandle;

/// One consumer request as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub callback_id: CallbackId,
    pub action: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Invocation {
    pub fn new(
        callback_id: impl Into<CallbackId>,
        action: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            callback_id: callback_id.into(),
            action: action.into(),
            args,
        }
    }
}

/// Consumer actions understood by [`dispatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    IsLocationEnabled,
    GetPermissionStatus,
    GetAccuracyAuthorization,
    RequestPermission(PermissionLevel),
    WatchLocation(Option<WatchId>),
    ClearWatch(WatchId),
    GetCurrentPosition(PositionOptions),
}

impl Action {
    /// Decode an action name and its positional arguments.
    pub fn parse(action: &str, args: &[Value]) -> Result<Self, LocationError> {
        match action {
            "isLocationEnabled" => Ok(Self::IsLocationEnabled),
            "getPermissionStatus" => Ok(Self::GetPermissionStatus),
            "getAccuracyAuthorization" | "getAccuracyLevel" => Ok(Self::GetAccuracyAuthorization),
            "requestPermission" => {
                let level = required_str(args, 0, "permission level")?;
                Ok(Self::RequestPermission(level.parse()?))
            }
            "watchLocation" => {
                let id = optional_str(args, 0, "watchId")?
                    .filter(|id| !id.is_empty())
                    .map(WatchId::from);
                Ok(Self::WatchLocation(id))
            }
            "clearWatch" => {
                let id = required_str(args, 0, "watchId")?;
                Ok(Self::ClearWatch(WatchId::from(id)))
            }
            "getCurrentPosition" => {
                let raw = match args.first() {
                    None | Some(Value::Null) => RawPositionOptions::default(),
                    Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
                        .map_err(|e| LocationError::InvalidArguments(format!("options: {e}")))?,
                    Some(other) => {
                        return Err(LocationError::InvalidArguments(format!(
                            "options must be an object, got {other}"
                        )))
                    }
                };
                Ok(Self::GetCurrentPosition(PositionOptions::try_from(raw)?))
            }
            other => Err(LocationError::InvalidArguments(format!(
                "unknown action '{other}'"
            ))),
        }
    }
}

/// Route one invocation to the coordinator.
///
/// Consumer-level failures are answered on the reply sink; the returned error
/// is reserved for a coordinator that is no longer running.
pub async fn dispatch(
    handle: &CoordinatorHandle,
    invocation: Invocation,
    sink: &ReplySink,
) -> Result<(), CoordinatorError> {
    let target = ReplyTarget::new(invocation.callback_id, sink.clone());
    let action = match Action::parse(&invocation.action, &invocation.args) {
        Ok(action) => action,
        Err(err) => {
            tracing::debug!(action = %invocation.action, error = %err, "invocation rejected");
            target.fail(err);
            return Ok(());
        }
    };

    match action {
        Action::IsLocationEnabled => {
            let enabled = handle.is_location_enabled().await?;
            target.succeed(ReplyBody::Enabled(enabled));
        }
        Action::GetPermissionStatus => {
            let status = handle.permission_status().await?;
            target.succeed(ReplyBody::Status(StatusPayload { status }));
        }
        Action::GetAccuracyAuthorization => {
            let accuracy_level = handle.accuracy_authorization().await?;
            target.succeed(ReplyBody::Accuracy(AccuracyPayload { accuracy_level }));
        }
        Action::RequestPermission(level) => handle.request_permission(level, target).await?,
        Action::WatchLocation(id) => {
            handle.start_watch(id, target).await?;
        }
        Action::ClearWatch(id) => match handle.stop_watch(id).await {
            Ok(()) => target.succeed(ReplyBody::Message("Location watch cleared.".to_string())),
            Err(CoordinatorError::Location(err)) => target.fail(err),
            Err(err) => return Err(err),
        },
        Action::GetCurrentPosition(options) => handle.current_position(options, target).await?,
    }
    Ok(())
}

fn optional_str<'a>(
    args: &'a [Value],
    index: usize,
    name: &str,
) -> Result<Option<&'a str>, LocationError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(LocationError::InvalidArguments(format!(
            "{name} must be a string, got {other}"
        ))),
    }
}

fn required_str<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str, LocationError> {
    optional_str(args, index, name)?
        .ok_or_else(|| LocationError::InvalidArguments(format!("missing {name}")))
}
