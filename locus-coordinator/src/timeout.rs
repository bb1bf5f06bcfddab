//! Timeout supervisor for the pending one-shot request.
//!
//! Expiry is not acted on here. The sleeping task only posts its token back
//! to the coordinator, which resolves the request if and only if the token
//! still belongs to the pending request. Aborting the task on disarm is an
//! optimisation; a token that no longer matches is ignored either way.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Identifies one arming of the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

pub type TimerSender = mpsc::UnboundedSender<TimerToken>;
pub type TimerReceiver = mpsc::UnboundedReceiver<TimerToken>;

pub fn timer_channel() -> (TimerSender, TimerReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug)]
struct ArmedTimer {
    token: TimerToken,
    task: JoinHandle<()>,
}

/// Holds at most one armed timer.
#[derive(Debug)]
pub struct TimeoutSupervisor {
    next: u64,
    armed: Option<ArmedTimer>,
    fired: TimerSender,
}

impl TimeoutSupervisor {
    pub fn new(fired: TimerSender) -> Self {
        Self {
            next: 0,
            armed: None,
            fired,
        }
    }

    /// Arm a fresh timer, replacing any armed one. Must run inside a tokio
    /// runtime.
    pub fn arm(&mut self, after: Duration) -> TimerToken {
        self.disarm_any();
        self.next += 1;
        let token = TimerToken(self.next);
        let fired = self.fired.clone();
        let deadline = Instant::now() + after;
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = fired.send(token);
        });
        tracing::debug!(token = token.0, after_ms = after.as_millis(), "timeout armed");
        self.armed = Some(ArmedTimer { token, task });
        token
    }

    /// Disarm `token` if it is the armed timer.
    pub fn disarm(&mut self, token: TimerToken) {
        if self.armed.as_ref().map(|a| a.token) == Some(token) {
            self.disarm_any();
        }
    }

    pub fn disarm_any(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
            tracing::debug!(token = armed.token.0, "timeout disarmed");
        }
    }

    /// Forget the armed timer after it fired. The task has already finished.
    pub fn fired(&mut self, token: TimerToken) {
        if self.armed.as_ref().map(|a| a.token) == Some(token) {
            self.armed = None;
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }
}

impl Drop for TimeoutSupervisor {
    fn drop(&mut self) {
        self.disarm_any();
    }
}
