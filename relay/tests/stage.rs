//! Integration tests for the stage task loop.

mod support;

use std::sync::Arc;
use std::time::Duration;

use relay::applier::{ApplierCall, MemoryApplier};
use relay::concurrency::shutdown::create_shutdown_channel;
use relay::filter::{Filter, SeqnoRangeFilter};
use relay::stage::{Schedule, StageNotification, StageTask};
use relay::types::opts;
use relay_config::shared::{FailurePolicy, SkipRange, StageConfig};
use tokio::sync::mpsc;
use tokio::time::timeout;

use support::{
    FlakyApplier, PendingExtractor, ScriptedExtractor, Step, fragment, init_test_tracing,
    service_transaction, transaction, with_metadata,
};

fn stage_config(block_commit_rows: u64) -> Arc<StageConfig> {
    Arc::new(StageConfig {
        block_commit_rows,
        ..Default::default()
    })
}

struct Harness {
    schedule: Arc<Schedule>,
    notifications: mpsc::UnboundedReceiver<StageNotification>,
    // Dropping the transmitter counts as shutdown, so the harness keeps it.
    _shutdown_tx: relay::concurrency::shutdown::ShutdownTx,
}

fn build_task<E, A>(
    config: Arc<StageConfig>,
    extractor: E,
    filters: Vec<Box<dyn Filter>>,
    applier: A,
) -> (StageTask<E, A>, Harness)
where
    E: relay::extractor::Extractor + Send + 'static,
    A: relay::applier::Applier + Send + 'static,
{
    let schedule = Arc::new(Schedule::new(config.skip_ranges.clone()));
    let (notifications_tx, notifications) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let task = StageTask::new(
        "stage-test-0",
        config,
        extractor,
        filters,
        applier,
        schedule.clone(),
        notifications_tx,
        shutdown_rx,
    );

    (
        task,
        Harness {
            schedule,
            notifications,
            _shutdown_tx: shutdown_tx,
        },
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn fragmented_transaction_commits_only_on_the_last_fragment() {
    init_test_tracing();

    let extractor = ScriptedExtractor::stopping_after(vec![
        fragment(5, 0, false),
        fragment(5, 1, false),
        fragment(5, 2, false),
        fragment(5, 3, true),
    ]);
    let applier = MemoryApplier::new();
    let (task, _harness) = build_task(stage_config(10), extractor, Vec::new(), applier.clone());

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    let commits: Vec<(u32, bool)> = applier
        .calls()
        .iter()
        .filter_map(|call| match call {
            ApplierCall::Apply {
                seqno: 5,
                fragno,
                commit,
                ..
            } => Some((*fragno, *commit)),
            _ => None,
        })
        .collect();

    assert_eq!(
        commits,
        vec![(0, false), (1, false), (2, false), (3, true)]
    );
    assert_eq!(applier.committed_header().unwrap().seqno, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn block_commit_batches_across_transactions() {
    init_test_tracing();

    let extractor =
        ScriptedExtractor::stopping_after((1..=5).map(transaction).collect::<Vec<_>>());
    let applier = MemoryApplier::new();
    let (task, _harness) = build_task(stage_config(3), extractor, Vec::new(), applier.clone());

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    let commits: Vec<(u64, bool)> = applier
        .calls()
        .iter()
        .filter_map(|call| match call {
            ApplierCall::Apply { seqno, commit, .. } => Some((*seqno, *commit)),
            _ => None,
        })
        .collect();

    // The block fills after three transactions; the stream drains after five.
    assert_eq!(
        commits,
        vec![(1, false), (2, false), (3, true), (4, false), (5, true)]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn filtered_events_are_delivered_as_one_range() {
    init_test_tracing();

    let extractor =
        ScriptedExtractor::stopping_after((1..=5).map(transaction).collect::<Vec<_>>());
    let applier = MemoryApplier::new();
    let filters: Vec<Box<dyn Filter>> = vec![Box::new(SeqnoRangeFilter::new(2..=3))];
    let (task, _harness) = build_task(stage_config(1), extractor, filters, applier.clone());

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    let calls = applier.calls();
    let applied: Vec<u64> = calls
        .iter()
        .filter_map(|call| match call {
            ApplierCall::Apply { seqno, .. } => Some(*seqno),
            _ => None,
        })
        .collect();
    assert_eq!(applied, vec![1, 4, 5]);

    // The suppressed range lands once, before the event that follows it.
    let range_position = calls
        .iter()
        .position(|call| {
            matches!(
                call,
                ApplierCall::ApplyFilteredRange {
                    first_seqno: 2,
                    last_seqno: 3,
                }
            )
        })
        .expect("filtered range was not applied");
    let apply_4_position = calls
        .iter()
        .position(
            |call| matches!(call, ApplierCall::Apply { seqno: 4, .. }),
        )
        .unwrap();
    assert!(range_position < apply_4_position);
}

#[tokio::test(flavor = "multi_thread")]
async fn apply_failure_with_stop_policy_notifies_and_terminates() {
    init_test_tracing();

    let extractor =
        ScriptedExtractor::stopping_after((1..=3).map(transaction).collect::<Vec<_>>());
    let applier = FlakyApplier::failing_on([2]);
    let (task, mut harness) =
        build_task(stage_config(1), extractor, Vec::new(), applier.clone());

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    // Seqno 3 is never applied.
    let applied: Vec<u64> = applier
        .calls()
        .iter()
        .filter_map(|call| match call {
            ApplierCall::Apply { seqno, .. } => Some(*seqno),
            _ => None,
        })
        .collect();
    assert_eq!(applied, vec![1]);

    let notification = harness.notifications.try_recv().unwrap();
    let StageNotification::Error {
        seqno, event_id, ..
    } = notification
    else {
        panic!("expected an error notification");
    };
    assert_eq!(seqno, Some(2));
    assert!(event_id.is_some());

    // The restart point stays at the last committed event.
    assert_eq!(applier.committed_header().unwrap().seqno, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn apply_failure_with_warn_policy_skips_the_event() {
    init_test_tracing();

    let config = Arc::new(StageConfig {
        block_commit_rows: 1,
        applier_failure_policy: FailurePolicy::Warn,
        ..Default::default()
    });
    let extractor =
        ScriptedExtractor::stopping_after((1..=3).map(transaction).collect::<Vec<_>>());
    let applier = FlakyApplier::failing_on([2]);
    let (task, _harness) = build_task(config, extractor, Vec::new(), applier.clone());

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    let applied: Vec<u64> = applier
        .calls()
        .iter()
        .filter_map(|call| match call {
            ApplierCall::Apply { seqno, .. } => Some(*seqno),
            _ => None,
        })
        .collect();
    assert_eq!(applied, vec![1, 3]);
    assert_eq!(applier.committed_header().unwrap().seqno, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn extractor_failure_with_warn_policy_continues() {
    init_test_tracing();

    let config = Arc::new(StageConfig {
        block_commit_rows: 1,
        extractor_failure_policy: FailurePolicy::Warn,
        ..Default::default()
    });
    let extractor = ScriptedExtractor::stopping_after_steps(vec![
        Step::data(transaction(1)),
        Step::Error,
        Step::EmptyPoll,
        Step::data(transaction(2)),
    ]);
    let applier = MemoryApplier::new();
    let (task, _harness) = build_task(config, extractor, Vec::new(), applier.clone());

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    let applied: Vec<u64> = applier
        .calls()
        .iter()
        .filter_map(|call| match call {
            ApplierCall::Apply { seqno, .. } => Some(*seqno),
            _ => None,
        })
        .collect();
    assert_eq!(applied, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn extractor_failure_with_stop_policy_notifies_and_terminates() {
    init_test_tracing();

    let extractor = ScriptedExtractor::new(vec![Step::data(transaction(1)), Step::Error]);
    let applier = MemoryApplier::new();
    let (task, mut harness) =
        build_task(stage_config(1), extractor, Vec::new(), applier.clone());

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        harness.notifications.try_recv().unwrap(),
        StageNotification::Error { seqno: None, .. }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn service_change_commits_the_open_block() {
    init_test_tracing();

    let extractor = ScriptedExtractor::stopping_after(vec![
        service_transaction(1, "alpha"),
        service_transaction(2, "alpha"),
        service_transaction(3, "beta"),
    ]);
    let applier = MemoryApplier::new();
    let (task, _harness) = build_task(stage_config(100), extractor, Vec::new(), applier.clone());

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    let calls = applier.calls();
    let commit_position = calls
        .iter()
        .position(|call| matches!(call, ApplierCall::Commit))
        .expect("no service-change commit");
    let apply_3_position = calls
        .iter()
        .position(|call| matches!(call, ApplierCall::Apply { seqno: 3, .. }))
        .unwrap();
    assert!(commit_position < apply_3_position);
}

#[tokio::test(flavor = "multi_thread")]
async fn unsafe_for_block_commit_forces_an_immediate_commit() {
    init_test_tracing();

    let unsafe_event = with_metadata(transaction(2), opts::UNSAFE_FOR_BLOCK_COMMIT, "true");
    let extractor =
        ScriptedExtractor::stopping_after(vec![transaction(1), unsafe_event, transaction(3)]);
    let applier = MemoryApplier::new();
    let (task, _harness) = build_task(stage_config(100), extractor, Vec::new(), applier.clone());

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    let flags: Vec<(u64, bool)> = applier
        .calls()
        .iter()
        .filter_map(|call| match call {
            ApplierCall::Apply { seqno, commit, .. } => Some((*seqno, *commit)),
            _ => None,
        })
        .collect();

    assert_eq!(flags, vec![(1, false), (2, true), (3, true)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn rollback_transactions_arm_the_rollback_flag() {
    init_test_tracing();

    let rollback_event = with_metadata(transaction(2), opts::ROLLBACK, "true");
    let extractor = ScriptedExtractor::stopping_after(vec![transaction(1), rollback_event]);
    let applier = MemoryApplier::new();
    let (task, _harness) = build_task(stage_config(100), extractor, Vec::new(), applier.clone());

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    let rollback_call = applier
        .calls()
        .into_iter()
        .find(|call| matches!(call, ApplierCall::Apply { seqno: 2, .. }))
        .unwrap();
    assert!(matches!(
        rollback_call,
        ApplierCall::Apply { rollback: true, .. }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn skip_ranges_update_position_without_applying() {
    init_test_tracing();

    let config = Arc::new(StageConfig {
        block_commit_rows: 1,
        skip_ranges: vec![SkipRange {
            start_seqno: 2,
            end_seqno: 2,
            commit_at_skip: false,
        }],
        ..Default::default()
    });
    let extractor =
        ScriptedExtractor::stopping_after((1..=3).map(transaction).collect::<Vec<_>>());
    let applier = MemoryApplier::new();
    let (task, _harness) = build_task(config, extractor, Vec::new(), applier.clone());

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    let calls = applier.calls();
    let applied: Vec<u64> = calls
        .iter()
        .filter_map(|call| match call {
            ApplierCall::Apply { seqno, .. } => Some(*seqno),
            _ => None,
        })
        .collect();
    assert_eq!(applied, vec![1, 3]);

    assert!(calls.iter().any(|call| matches!(
        call,
        ApplierCall::UpdatePosition { seqno: 2, .. }
    )));
}

#[tokio::test(flavor = "multi_thread")]
async fn auto_sync_dispatches_an_in_sequence_notification() {
    init_test_tracing();

    let config = Arc::new(StageConfig {
        block_commit_rows: 1,
        auto_sync: true,
        ..Default::default()
    });
    let extractor = ScriptedExtractor::stopping_after(vec![transaction(1)]);
    let applier = MemoryApplier::new();
    let (task, mut harness) = build_task(config, extractor, Vec::new(), applier);

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(
        harness.notifications.try_recv().unwrap(),
        StageNotification::InSequence { .. }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_interrupts_a_blocked_extract_and_rolls_back() {
    init_test_tracing();

    let applier = MemoryApplier::new();
    let schedule = Arc::new(Schedule::default());
    let (notifications_tx, _notifications) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let task = StageTask::new(
        "stage-test-cancel",
        stage_config(10),
        PendingExtractor,
        Vec::new(),
        applier.clone(),
        schedule.clone(),
        notifications_tx,
        shutdown_rx,
    );
    let handle = task.spawn();

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap()
        .unwrap();

    assert!(schedule.is_cancelled());
    assert_eq!(applier.calls(), vec![ApplierCall::Rollback]);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_watch_terminates_after_the_watched_transaction() {
    init_test_tracing();

    let extractor =
        ScriptedExtractor::stopping_after((1..=5).map(transaction).collect::<Vec<_>>());
    let applier = MemoryApplier::new();
    let (task, harness) = build_task(stage_config(1), extractor, Vec::new(), applier.clone());
    harness
        .schedule
        .add_stop_watch(relay::types::WatchPredicate::SeqnoAtLeast(3));

    timeout(Duration::from_secs(5), task.run())
        .await
        .unwrap()
        .unwrap();

    let applied: Vec<u64> = applier
        .calls()
        .iter()
        .filter_map(|call| match call {
            ApplierCall::Apply { seqno, .. } => Some(*seqno),
            _ => None,
        })
        .collect();

    // The watched transaction itself is not applied; position advances past
    // it instead.
    assert_eq!(applied, vec![1, 2]);
}
