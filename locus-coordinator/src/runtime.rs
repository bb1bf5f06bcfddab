//! Coordinator runtime: one task owns the [`Coordinator`] and serialises
//! consumer commands, provider events and timer expiries into it.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use locus_core::{
    AccuracyLevel, AuthorizationStatus, LocationError, PermissionLevel, PositionOptions,
    Settings, WatchId,
};

use crate::coordinator::{Coordinator, CoordinatorSnapshot};
use crate::error::CoordinatorError;
use crate::provider::{LocationProvider, ProviderEventReceiver};
use crate::reply::ReplyTarget;
use crate::timeout::{timer_channel, TimerReceiver};

enum Command {
    IsLocationEnabled {
        respond_to: oneshot::Sender<bool>,
    },
    PermissionStatus {
        respond_to: oneshot::Sender<AuthorizationStatus>,
    },
    AccuracyAuthorization {
        respond_to: oneshot::Sender<AccuracyLevel>,
    },
    StartWatch {
        id: Option<WatchId>,
        target: ReplyTarget,
        respond_to: oneshot::Sender<WatchId>,
    },
    StopWatch {
        id: WatchId,
        respond_to: oneshot::Sender<Result<(), LocationError>>,
    },
    RequestPermission {
        level: PermissionLevel,
        target: ReplyTarget,
    },
    CurrentPosition {
        options: PositionOptions,
        target: ReplyTarget,
    },
    EndSession,
    Snapshot {
        respond_to: oneshot::Sender<CoordinatorSnapshot>,
    },
}

/// Cheap, cloneable access to a running coordinator.
///
/// Methods return as soon as the coordinator has accepted the command;
/// deferred results arrive on the [`ReplyTarget`] passed in.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    shutdown: broadcast::Sender<()>,
}

impl CoordinatorHandle {
    pub async fn is_location_enabled(&self) -> Result<bool, CoordinatorError> {
        self.ask(|respond_to| Command::IsLocationEnabled { respond_to })
            .await
    }

    pub async fn permission_status(&self) -> Result<AuthorizationStatus, CoordinatorError> {
        self.ask(|respond_to| Command::PermissionStatus { respond_to })
            .await
    }

    pub async fn accuracy_authorization(&self) -> Result<AccuracyLevel, CoordinatorError> {
        self.ask(|respond_to| Command::AccuracyAuthorization { respond_to })
            .await
    }

    /// Resolves once the watch is registered, so no later event can miss it.
    pub async fn start_watch(
        &self,
        id: Option<WatchId>,
        target: ReplyTarget,
    ) -> Result<WatchId, CoordinatorError> {
        self.ask(|respond_to| Command::StartWatch {
            id,
            target,
            respond_to,
        })
        .await
    }

    pub async fn stop_watch(&self, id: WatchId) -> Result<(), CoordinatorError> {
        self.ask(|respond_to| Command::StopWatch { id, respond_to })
            .await?
            .map_err(CoordinatorError::from)
    }

    pub async fn request_permission(
        &self,
        level: PermissionLevel,
        target: ReplyTarget,
    ) -> Result<(), CoordinatorError> {
        self.send(Command::RequestPermission { level, target }).await
    }

    pub async fn current_position(
        &self,
        options: PositionOptions,
        target: ReplyTarget,
    ) -> Result<(), CoordinatorError> {
        self.send(Command::CurrentPosition { options, target }).await
    }

    pub async fn end_session(&self) -> Result<(), CoordinatorError> {
        self.send(Command::EndSession).await
    }

    /// Also serves as a barrier: provider events queued before the call are
    /// applied before the snapshot is taken.
    pub async fn snapshot(&self) -> Result<CoordinatorSnapshot, CoordinatorError> {
        self.ask(|respond_to| Command::Snapshot { respond_to })
            .await
    }

    /// Ask the coordinator task to stop. Pending consumers are dropped.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    async fn send(&self, command: Command) -> Result<(), CoordinatorError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoordinatorError::ChannelClosed("coordinator commands"))
    }

    async fn ask<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await
            .map_err(|_| CoordinatorError::ChannelClosed("coordinator response"))
    }
}

/// Spawn the coordinator task on the current tokio runtime.
pub fn spawn(
    provider: Arc<dyn LocationProvider>,
    events: ProviderEventReceiver,
    settings: &Settings,
) -> (CoordinatorHandle, JoinHandle<Result<(), CoordinatorError>>) {
    let (command_tx, command_rx) = mpsc::channel(settings.command_queue_capacity.max(1));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let (timer_tx, timer_rx) = timer_channel();

    let coordinator = Coordinator::new(provider, timer_tx);
    coordinator.configure(settings);

    let task = tokio::spawn(run(coordinator, command_rx, events, timer_rx, shutdown_rx));
    let handle = CoordinatorHandle {
        commands: command_tx,
        shutdown: shutdown_tx,
    };
    (handle, task)
}

async fn run(
    mut coordinator: Coordinator,
    mut commands: mpsc::Receiver<Command>,
    mut events: ProviderEventReceiver,
    mut timers: TimerReceiver,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), CoordinatorError> {
    let mut events_open = true;
    tracing::info!("coordinator started");

    loop {
        // Events before commands: a command sent after an event was emitted
        // always observes that event's effects.
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            event = events.recv(), if events_open => match event {
                Some(event) => coordinator.handle_event(event),
                None => {
                    tracing::warn!("provider event channel closed");
                    events_open = false;
                }
            },
            Some(token) = timers.recv() => coordinator.timer_fired(token),
            command = commands.recv() => {
                let Some(command) = command else { break };
                apply(&mut coordinator, command);
            }
        }
    }

    coordinator.end_session();
    tracing::info!("coordinator stopped");
    Ok(())
}

fn apply(coordinator: &mut Coordinator, command: Command) {
    match command {
        Command::IsLocationEnabled { respond_to } => {
            let _ = respond_to.send(coordinator.is_location_enabled());
        }
        Command::PermissionStatus { respond_to } => {
            let _ = respond_to.send(coordinator.permission_status());
        }
        Command::AccuracyAuthorization { respond_to } => {
            let _ = respond_to.send(coordinator.accuracy_authorization());
        }
        Command::StartWatch {
            id,
            target,
            respond_to,
        } => {
            let id = coordinator.start_watch(id, target);
            let _ = respond_to.send(id);
        }
        Command::StopWatch { id, respond_to } => {
            let _ = respond_to.send(coordinator.stop_watch(&id));
        }
        Command::RequestPermission { level, target } => {
            coordinator.request_permission(level, target);
        }
        Command::CurrentPosition { options, target } => {
            coordinator.current_position(options, target);
        }
        Command::EndSession => coordinator.end_session(),
        Command::Snapshot { respond_to } => {
            let _ = respond_to.send(coordinator.snapshot());
        }
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over
/// `default_filter`; repeated calls are harmless.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Await the coordinator task and flatten join failures.
pub async fn join(task: JoinHandle<Result<(), CoordinatorError>>) -> Result<(), CoordinatorError> {
    match task.await {
        Ok(inner) => inner,
        Err(err) => Err(CoordinatorError::Join(err.to_string())),
    }
}
