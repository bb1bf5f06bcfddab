//! Locus coordinator: shares one location provider between any number of
//! watches, a single one-shot request and a single permission request.
//!
//! - [`provider`]: the [`LocationProvider`] seam and its event channel
//! - [`coordinator`]: the state machine
//! - [`runtime`]: the task that owns it, and [`CoordinatorHandle`]
//! - [`protocol`]: transport invocations to coordinator calls
//! - [`scenario`]: scripted replay over [`SimulatedProvider`]

pub mod coordinator;
pub mod dispatch;
mod error;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod reply;
pub mod runtime;
pub mod scenario;
pub mod simulated;
pub mod timeout;

pub use coordinator::{Coordinator, CoordinatorSnapshot};
pub use error::CoordinatorError;
pub use protocol::{dispatch as dispatch_invocation, Action, Invocation};
pub use provider::{event_channel, LocationProvider, ProviderEvent, ProviderEventSender};
pub use reply::{reply_channel, Reply, ReplyBody, ReplyReceiver, ReplySink, ReplyTarget};
pub use runtime::{init_tracing, join, spawn, CoordinatorHandle};
pub use simulated::SimulatedProvider;
