//! End-to-end properties of the coordinator, driven through the runtime
//! handle and the simulated provider.

use std::sync::Arc;
use std::time::Duration;

use locus_coordinator::simulated::fix;
use locus_coordinator::timeout::timer_channel;
use locus_coordinator::{
    dispatch_invocation, event_channel, join, reply_channel, spawn, Coordinator,
    CoordinatorHandle, Invocation, ProviderEvent, Reply, ReplyReceiver, ReplySink, ReplyTarget,
    SimulatedProvider,
};
use locus_core::{AuthorizationStatus, PositionOptions, Settings, WatchId};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::advance;

struct Session {
    provider: Arc<SimulatedProvider>,
    handle: CoordinatorHandle,
    task: JoinHandle<Result<(), locus_coordinator::CoordinatorError>>,
    sink: ReplySink,
    replies: ReplyReceiver,
}

impl Session {
    fn start() -> Self {
        let (events_tx, events_rx) = event_channel();
        let provider = Arc::new(SimulatedProvider::new(events_tx));
        let (handle, task) = spawn(provider.clone(), events_rx, &Settings::default());
        let (sink, replies) = reply_channel();
        Self {
            provider,
            handle,
            task,
            sink,
            replies,
        }
    }

    fn target(&self, id: &str) -> ReplyTarget {
        ReplyTarget::new(id, self.sink.clone())
    }

    async fn settle(&self) {
        self.handle.snapshot().await.expect("snapshot");
    }

    fn drain(&mut self) -> Vec<Reply> {
        let mut out = Vec::new();
        while let Ok(reply) = self.replies.try_recv() {
            out.push(reply);
        }
        out
    }

    async fn finish(self) {
        self.handle.shutdown();
        join(self.task).await.expect("clean exit");
    }
}

fn options(timeout_ms: u64, max_age_ms: u64) -> PositionOptions {
    PositionOptions::new(
        Duration::from_millis(timeout_ms),
        Duration::from_millis(max_age_ms),
    )
}

#[tokio::test]
async fn one_update_fans_out_to_three_watches_and_one_shot() {
    let mut session = Session::start();
    for id in ["a", "b", "c"] {
        session
            .handle
            .start_watch(Some(WatchId::from(id)), session.target(id))
            .await
            .expect("watch");
    }
    session
        .handle
        .current_position(options(0, 0), session.target("once"))
        .await
        .expect("one-shot");
    session.settle().await;
    session.drain();

    session.provider.emit_location(fix(48.85, 2.35, Duration::ZERO));
    session.settle().await;

    let replies = session.drain();
    let open = replies.iter().filter(|r| r.keep_open).count();
    let terminal: Vec<_> = replies.iter().filter(|r| !r.keep_open).collect();
    assert_eq!(open, 3);
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].callback_id.0, "once");
    assert!(replies.iter().all(|r| r.location().is_some()));

    let snapshot = session.handle.snapshot().await.expect("snapshot");
    assert!(snapshot.stream_running, "watches still need the stream");
    assert!(!snapshot.current_position_pending);
    session.finish().await;
}

#[tokio::test]
async fn cache_short_circuit_depends_on_age() {
    let mut session = Session::start();
    session
        .provider
        .set_last_known(Some(fix(1.0, 1.0, Duration::from_secs(10))));
    session
        .handle
        .current_position(options(0, 60_000), session.target("fresh"))
        .await
        .expect("one-shot");
    session.settle().await;
    let replies = session.drain();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].is_ok());
    assert_eq!(session.provider.start_calls(), 0);

    session
        .provider
        .set_last_known(Some(fix(1.0, 1.0, Duration::from_secs(120))));
    session
        .handle
        .current_position(options(0, 60_000), session.target("stale"))
        .await
        .expect("one-shot");
    session.settle().await;
    assert!(session.drain().is_empty());
    assert!(session.provider.is_updating());

    session.provider.set_last_known(None);
    session.finish().await;
}

#[tokio::test(start_paused = true, flavor = "current_thread")]
async fn update_at_50ms_beats_timeout_at_100ms() {
    let mut session = Session::start();
    session
        .handle
        .current_position(options(100, 0), session.target("c"))
        .await
        .expect("one-shot");
    session.settle().await;

    advance(Duration::from_millis(50)).await;
    session.provider.emit_location(fix(1.0, 2.0, Duration::ZERO));
    session.settle().await;

    advance(Duration::from_millis(100)).await;
    session.settle().await;

    let replies = session.drain();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].is_ok());
    assert!(!session.provider.is_updating());
    session.finish().await;
}

#[tokio::test(start_paused = true, flavor = "current_thread")]
async fn timeout_at_100ms_then_update_is_ignored() {
    let mut session = Session::start();
    session
        .handle
        .current_position(options(100, 0), session.target("c"))
        .await
        .expect("one-shot");
    session.settle().await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    session.settle().await;
    session.provider.emit_location(fix(1.0, 2.0, Duration::ZERO));
    session.settle().await;

    let replies = session.drain();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].error_code(), Some("TIMEOUT"));
    assert!(!session.provider.is_updating());
    session.finish().await;
}

#[tokio::test]
async fn busy_one_shot_leaves_the_first_intact() {
    let mut session = Session::start();
    session
        .handle
        .current_position(options(0, 0), session.target("first"))
        .await
        .expect("first");
    session
        .handle
        .current_position(options(0, 0), session.target("second"))
        .await
        .expect("second");
    session.settle().await;

    let replies = session.drain();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].callback_id.0, "second");
    assert_eq!(replies[0].error_code(), Some("BUSY"));
    assert!(session
        .handle
        .snapshot()
        .await
        .expect("snapshot")
        .current_position_pending);
    session.finish().await;
}

#[tokio::test]
async fn clearing_only_watch_with_pending_one_shot_keeps_stream() {
    let mut session = Session::start();
    let id = session
        .handle
        .start_watch(None, session.target("w"))
        .await
        .expect("watch");
    session
        .handle
        .current_position(options(0, 0), session.target("c"))
        .await
        .expect("one-shot");
    session.handle.stop_watch(id).await.expect("clear");
    session.settle().await;
    assert!(session.provider.is_updating());
    assert_eq!(session.provider.stop_calls(), 0);

    session.provider.emit_failure("no satellites");
    session.settle().await;
    assert!(!session.provider.is_updating());
    assert_eq!(session.provider.stop_calls(), 1);

    let replies = session.drain();
    assert_eq!(
        replies.last().and_then(|r| r.error_code()),
        Some("LOCATION_ERROR")
    );
    session.finish().await;
}

#[tokio::test]
async fn disabled_services_reach_watch_and_one_shot() {
    let (events_tx, events_rx) = event_channel();
    let provider = Arc::new(SimulatedProvider::new(events_tx).with_enabled(false));
    let (handle, task) = spawn(provider.clone(), events_rx, &Settings::default());
    let (sink, mut replies) = reply_channel();

    dispatch_invocation(
        &handle,
        Invocation::new("w", "watchLocation", vec![json!("a")]),
        &sink,
    )
    .await
    .expect("watch");
    dispatch_invocation(
        &handle,
        Invocation::new("c", "getCurrentPosition", vec![json!({"timeout": 0})]),
        &sink,
    )
    .await
    .expect("one-shot");
    handle.snapshot().await.expect("barrier");
    handle.snapshot().await.expect("barrier");

    let mut received = Vec::new();
    while let Ok(reply) = replies.try_recv() {
        let code = reply.error_code().map(str::to_owned);
        received.push((reply.callback_id.0.clone(), code, reply.keep_open));
    }
    assert_eq!(
        received,
        vec![
            ("w".to_string(), None, true),
            ("w".to_string(), Some("LOCATION_ERROR".to_string()), true),
            ("c".to_string(), Some("LOCATION_ERROR".to_string()), false),
        ]
    );

    let snapshot = handle.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.watch_ids, vec![WatchId::from("a")]);
    assert!(!snapshot.current_position_pending);

    handle.shutdown();
    join(task).await.expect("clean exit");
}

#[tokio::test]
async fn permission_flow_through_runtime() {
    let (events_tx, events_rx) = event_channel();
    let provider = Arc::new(
        SimulatedProvider::new(events_tx).with_authorization(AuthorizationStatus::NotDetermined),
    );
    let (handle, task) = spawn(provider.clone(), events_rx, &Settings::default());
    let (sink, mut replies) = reply_channel();

    handle
        .current_position(options(0, 0), ReplyTarget::new("early", sink.clone()))
        .await
        .expect("one-shot");
    handle
        .request_permission(
            locus_core::PermissionLevel::WhenInUse,
            ReplyTarget::new("perm", sink),
        )
        .await
        .expect("permission");
    handle.snapshot().await.expect("barrier");

    provider.change_authorization(AuthorizationStatus::AuthorizedWhenInUse);
    handle.snapshot().await.expect("barrier");

    let early = replies.try_recv().expect("early");
    assert_eq!(early.error_code(), Some("PERMISSION_DENIED"));
    let perm = replies.try_recv().expect("perm");
    assert!(perm.is_ok());
    assert!(replies.try_recv().is_err());

    handle.shutdown();
    join(task).await.expect("clean exit");
}

/// Every sequence of four operations drawn from {watch a, watch b, clear a,
/// clear b, one-shot, update, failure} keeps the stream running exactly when
/// someone needs it.
#[tokio::test]
async fn run_state_invariant_over_all_short_interleavings() {
    #[derive(Debug, Clone, Copy)]
    enum Op {
        WatchA,
        WatchB,
        ClearA,
        ClearB,
        OneShot,
        Update,
        Failure,
    }
    const OPS: [Op; 7] = [
        Op::WatchA,
        Op::WatchB,
        Op::ClearA,
        Op::ClearB,
        Op::OneShot,
        Op::Update,
        Op::Failure,
    ];
    const LEN: u32 = 4;

    for n in 0..OPS.len().pow(LEN) {
        let (events_tx, _events_rx) = event_channel();
        let provider = Arc::new(SimulatedProvider::new(events_tx));
        let (timer_tx, _timers) = timer_channel();
        let mut coordinator = Coordinator::new(provider.clone(), timer_tx);
        let (sink, _replies) = reply_channel();

        let mut code = n;
        let mut trace = Vec::new();
        for _ in 0..LEN {
            let op = OPS[code % OPS.len()];
            code /= OPS.len();
            trace.push(op);
            match op {
                Op::WatchA => {
                    let target = ReplyTarget::new("a", sink.clone());
                    coordinator.start_watch(Some(WatchId::from("a")), target);
                }
                Op::WatchB => {
                    let target = ReplyTarget::new("b", sink.clone());
                    coordinator.start_watch(Some(WatchId::from("b")), target);
                }
                Op::ClearA => {
                    let _ = coordinator.stop_watch(&WatchId::from("a"));
                }
                Op::ClearB => {
                    let _ = coordinator.stop_watch(&WatchId::from("b"));
                }
                Op::OneShot => {
                    let target = ReplyTarget::new("c", sink.clone());
                    coordinator.current_position(options(0, 0), target);
                }
                Op::Update => {
                    let batch = vec![fix(0.0, 0.0, Duration::ZERO)];
                    coordinator.handle_event(ProviderEvent::LocationUpdate(batch));
                }
                Op::Failure => coordinator.handle_event(ProviderEvent::Failure("x".into())),
            }

            let snapshot = coordinator.snapshot();
            let wanted = !snapshot.watch_ids.is_empty() || snapshot.current_position_pending;
            assert_eq!(provider.is_updating(), wanted, "after {trace:?}: {snapshot:?}");
            assert_eq!(snapshot.stream_running, wanted, "after {trace:?}");
        }
    }
}
