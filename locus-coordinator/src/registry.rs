//! Subscription registry: the only mutable state the coordinator owns.

use std::collections::HashMap;
use std::time::Duration;

use locus_core::{PermissionLevel, WatchId};

use crate::reply::ReplyTarget;
use crate::timeout::TimerToken;

/// The single outstanding `getCurrentPosition` request.
#[derive(Debug)]
pub struct PendingCurrentPosition {
    pub target: ReplyTarget,
    /// Reported back in the `TIMEOUT` error.
    pub timeout: Duration,
    pub timer: Option<TimerToken>,
}

/// The single outstanding `requestPermission` request.
#[derive(Debug)]
pub struct PendingPermissionRequest {
    pub target: ReplyTarget,
    pub requested: PermissionLevel,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    watches: HashMap<WatchId, ReplyTarget>,
    current: Option<PendingCurrentPosition>,
    permission: Option<PendingPermissionRequest>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watch. Returns the target it replaced, if the id was taken.
    pub fn insert_watch(&mut self, id: WatchId, target: ReplyTarget) -> Option<ReplyTarget> {
        self.watches.insert(id, target)
    }

    pub fn remove_watch(&mut self, id: &WatchId) -> Option<ReplyTarget> {
        self.watches.remove(id)
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Sorted, for stable output.
    pub fn watch_ids(&self) -> Vec<WatchId> {
        let mut ids: Vec<WatchId> = self.watches.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn watches(&self) -> impl Iterator<Item = &ReplyTarget> {
        self.watches.values()
    }

    // -- one-shot -----------------------------------------------------------

    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }

    /// Install the pending one-shot. Hands the request back if one is
    /// already pending.
    pub fn set_current(
        &mut self,
        pending: PendingCurrentPosition,
    ) -> Result<(), PendingCurrentPosition> {
        if self.current.is_some() {
            return Err(pending);
        }
        self.current = Some(pending);
        Ok(())
    }

    pub fn current_timer(&self) -> Option<TimerToken> {
        self.current.as_ref().and_then(|p| p.timer)
    }

    pub fn set_current_timer(&mut self, token: TimerToken) {
        if let Some(pending) = self.current.as_mut() {
            pending.timer = Some(token);
        }
    }

    pub fn take_current(&mut self) -> Option<PendingCurrentPosition> {
        self.current.take()
    }

    /// Take the pending one-shot only if `token` is its armed timer.
    pub fn take_current_for_timer(&mut self, token: TimerToken) -> Option<PendingCurrentPosition> {
        if self.current_timer() == Some(token) {
            self.current.take()
        } else {
            None
        }
    }

    // -- permission ---------------------------------------------------------

    pub fn has_permission(&self) -> bool {
        self.permission.is_some()
    }

    pub fn set_permission(&mut self, pending: PendingPermissionRequest) {
        self.permission = Some(pending);
    }

    pub fn take_permission(&mut self) -> Option<PendingPermissionRequest> {
        self.permission.take()
    }

    // -- derived ------------------------------------------------------------

    /// Whether the provider stream must be running right now.
    pub fn wants_stream(&self) -> bool {
        !self.watches.is_empty() || self.current.is_some()
    }

    /// Drop everything without delivering. Returns how many entries went.
    pub fn clear(&mut self) -> usize {
        let dropped = self.watches.len()
            + usize::from(self.current.is_some())
            + usize::from(self.permission.is_some());
        self.watches.clear();
        self.current = None;
        self.permission = None;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::reply_channel;

    fn pending(sink: &crate::reply::ReplySink, id: &str) -> PendingCurrentPosition {
        PendingCurrentPosition {
            target: ReplyTarget::new(id, sink.clone()),
            timeout: Duration::ZERO,
            timer: None,
        }
    }

    #[test]
    fn stream_wanted_while_watch_or_one_shot_present() {
        let (sink, _rx) = reply_channel();
        let mut registry = SubscriptionRegistry::new();
        assert!(!registry.wants_stream());

        registry.insert_watch(WatchId::from("a"), ReplyTarget::new("w", sink.clone()));
        assert!(registry.wants_stream());

        registry.set_current(pending(&sink, "c")).expect("free slot");
        registry.remove_watch(&WatchId::from("a"));
        assert!(registry.wants_stream(), "one-shot alone keeps the stream");

        registry.take_current();
        assert!(!registry.wants_stream());
    }

    #[test]
    fn duplicate_watch_id_replaces_target() {
        let (sink, _rx) = reply_channel();
        let mut registry = SubscriptionRegistry::new();
        assert!(registry
            .insert_watch(WatchId::from("a"), ReplyTarget::new("first", sink.clone()))
            .is_none());
        let replaced = registry
            .insert_watch(WatchId::from("a"), ReplyTarget::new("second", sink))
            .expect("replaced");
        assert_eq!(replaced.callback_id().0, "first");
        assert_eq!(registry.watch_count(), 1);
    }

    #[test]
    fn second_one_shot_is_handed_back() {
        let (sink, _rx) = reply_channel();
        let mut registry = SubscriptionRegistry::new();
        registry.set_current(pending(&sink, "first")).expect("free slot");
        let rejected = registry.set_current(pending(&sink, "second")).unwrap_err();
        assert_eq!(rejected.target.callback_id().0, "second");
    }

    #[test]
    fn clear_counts_everything() {
        let (sink, _rx) = reply_channel();
        let mut registry = SubscriptionRegistry::new();
        registry.insert_watch(WatchId::from("a"), ReplyTarget::new("w1", sink.clone()));
        registry.insert_watch(WatchId::from("b"), ReplyTarget::new("w2", sink.clone()));
        registry.set_current(pending(&sink, "c")).expect("free slot");
        registry.set_permission(PendingPermissionRequest {
            target: ReplyTarget::new("p", sink),
            requested: PermissionLevel::Always,
        });
        assert_eq!(registry.clear(), 4);
        assert!(!registry.wants_stream());
        assert!(!registry.has_permission());
    }
}
