//! Reply targets: how results travel back to whichever consumer asked.
//!
//! The transport owns the receiving side of a [`ReplySink`]; the coordinator
//! only ever holds [`ReplyTarget`]s. A terminal send consumes the target, so
//! nothing can be delivered to a request after it has been resolved.

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use locus_core::{
    AccuracyPayload, CallbackId, ErrorPayload, LocationError, LocationPayload, PermissionPayload,
    StatusPayload, WatchPayload,
};

/// Success bodies a consumer can receive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReplyBody {
    Enabled(bool),
    Status(StatusPayload),
    Accuracy(AccuracyPayload),
    Permission(PermissionPayload),
    Watch(WatchPayload),
    Location(LocationPayload),
    Message(String),
}

/// One result as seen by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub callback_id: CallbackId,
    pub outcome: Result<ReplyBody, ErrorPayload>,
    /// `true` when more results may follow on the same callback.
    pub keep_open: bool,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error_code(&self) -> Option<&str> {
        self.outcome.as_ref().err().map(|e| e.error_code.as_str())
    }

    pub fn location(&self) -> Option<&LocationPayload> {
        match &self.outcome {
            Ok(ReplyBody::Location(payload)) => Some(payload),
            _ => None,
        }
    }

    /// `{callbackId, ok, keepOpen, payload}`.
    pub fn to_json(&self) -> Value {
        let payload = match &self.outcome {
            Ok(body) => serde_json::to_value(body).unwrap_or(Value::Null),
            Err(err) => serde_json::to_value(err).unwrap_or(Value::Null),
        };
        json!({
            "callbackId": self.callback_id,
            "ok": self.is_ok(),
            "keepOpen": self.keep_open,
            "payload": payload,
        })
    }
}

pub type ReplySink = mpsc::UnboundedSender<Reply>;
pub type ReplyReceiver = mpsc::UnboundedReceiver<Reply>;

pub fn reply_channel() -> (ReplySink, ReplyReceiver) {
    mpsc::unbounded_channel()
}

/// Capability to answer one consumer request.
#[derive(Debug)]
pub struct ReplyTarget {
    callback_id: CallbackId,
    sink: ReplySink,
}

impl ReplyTarget {
    pub fn new(callback_id: impl Into<CallbackId>, sink: ReplySink) -> Self {
        Self {
            callback_id: callback_id.into(),
            sink,
        }
    }

    pub fn callback_id(&self) -> &CallbackId {
        &self.callback_id
    }

    /// Deliver a non-terminal result; the target stays usable.
    pub fn send_open(&self, outcome: Result<ReplyBody, LocationError>) {
        self.send(outcome, true);
    }

    /// Deliver the final result and give up the target.
    pub fn send_terminal(self, outcome: Result<ReplyBody, LocationError>) {
        self.send(outcome, false);
    }

    pub fn succeed(self, body: ReplyBody) {
        self.send_terminal(Ok(body));
    }

    pub fn fail(self, err: LocationError) {
        self.send_terminal(Err(err));
    }

    fn send(&self, outcome: Result<ReplyBody, LocationError>, keep_open: bool) {
        let reply = Reply {
            callback_id: self.callback_id.clone(),
            outcome: outcome.map_err(ErrorPayload::from),
            keep_open,
        };
        if self.sink.send(reply).is_err() {
            tracing::debug!(callback = %self.callback_id, "reply dropped: transport gone");
        }
    }
}
