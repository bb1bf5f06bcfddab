//! Result dispatch: fan a provider outcome out to every interested target.

use locus_core::{CallbackId, Location, LocationError};

use crate::registry::SubscriptionRegistry;
use crate::reply::ReplyBody;
use crate::timeout::TimerToken;

/// The one-shot request a fan-out answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOneShot {
    pub callback_id: CallbackId,
    /// Its armed timer, which the caller must disarm.
    pub timer: Option<TimerToken>,
}

/// What a single fan-out reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub watches: usize,
    pub one_shot: Option<ResolvedOneShot>,
}

pub fn location_body(location: &Location) -> ReplyBody {
    ReplyBody::Location(location.to_payload())
}

/// Non-terminal to every watch, then terminal to the pending one-shot, which
/// is cleared.
///
/// Watches are never removed here: a failure is just another event for them.
pub fn fan_out(
    registry: &mut SubscriptionRegistry,
    outcome: Result<ReplyBody, LocationError>,
) -> Delivery {
    let mut watches = 0;
    for target in registry.watches() {
        target.send_open(outcome.clone());
        watches += 1;
    }

    let one_shot = registry.take_current().map(|pending| {
        let resolved = ResolvedOneShot {
            callback_id: pending.target.callback_id().clone(),
            timer: pending.timer,
        };
        pending.target.send_terminal(outcome);
        resolved
    });

    Delivery { watches, one_shot }
}
