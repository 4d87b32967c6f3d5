mod common;

use common::*;
use sea_orm::ConnectionTrait;
use timelock_backend::db::enums::{COMPOUND_GRACE_PERIOD_SECONDS, TimelockStandard, TransactionStatus};
use timelock_backend::db::models::TransactionPatch;
use timelock_backend::error::AppError;
use timelock_backend::lifecycle::SweepService;
use timelock_backend::lifecycle::sweep_service::{expiry_sweep, ready_sweep};
use timelock_backend::services::clock::Clock;

#[tokio::test]
async fn due_admin_based_transaction_becomes_ready_but_not_expired() {
    let ctx = setup().await;
    let tx = queued_transaction(&ctx, TimelockStandard::Compound, 100, T0 + 60).await;
    ctx.clock.set(tx.eta + 10);
    let now = ctx.clock.now();

    let ready = ready_sweep(&ctx.store, &ctx.events, now).await.unwrap();
    assert_eq!(ready.applied, 1);
    let expiry = expiry_sweep(&ctx.store, &ctx.events, now).await.unwrap();
    assert_eq!(expiry.examined, 0);

    let stored = ctx.store.find_by_id(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Ready);
}

#[tokio::test]
async fn admin_based_transaction_expires_after_grace_once() {
    let mut ctx = setup().await;
    let tx = queued_transaction(&ctx, TimelockStandard::Compound, 101, T0 + 60).await;
    drain_events(&mut ctx);

    ctx.clock.set(tx.eta + COMPOUND_GRACE_PERIOD_SECONDS + 1);
    let now = ctx.clock.now();

    let first = expiry_sweep(&ctx.store, &ctx.events, now).await.unwrap();
    assert_eq!(first.applied, 1);
    let stored = ctx.store.find_by_id(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Expired);

    let second = expiry_sweep(&ctx.store, &ctx.events, now).await.unwrap();
    assert_eq!(second, Default::default());

    let events = drain_events(&mut ctx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].from_status, Some(TransactionStatus::Queued));
    assert_eq!(events[0].to_status, TransactionStatus::Expired);
}

#[tokio::test]
async fn grace_boundary_is_exclusive() {
    let ctx = setup().await;
    let tx = queued_transaction(&ctx, TimelockStandard::Compound, 102, T0 + 60).await;

    ctx.clock.set(tx.eta + COMPOUND_GRACE_PERIOD_SECONDS);
    let report = expiry_sweep(&ctx.store, &ctx.events, ctx.clock.now()).await.unwrap();
    assert_eq!(report.applied, 0);

    ctx.clock.advance(1);
    let report = expiry_sweep(&ctx.store, &ctx.events, ctx.clock.now()).await.unwrap();
    assert_eq!(report.applied, 1);
}

#[tokio::test]
async fn ready_admin_based_transaction_expires_too() {
    let ctx = setup().await;
    let tx = queued_transaction(&ctx, TimelockStandard::Compound, 103, T0 + 60).await;
    ctx.clock.set(tx.eta);
    ready_sweep(&ctx.store, &ctx.events, ctx.clock.now()).await.unwrap();

    // Executing past the grace period is refused even before the sweep runs.
    ctx.clock.set(tx.eta + COMPOUND_GRACE_PERIOD_SECONDS + 1);
    let err = ctx.service.execute_transaction(ADMIN, tx.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));

    let report = expiry_sweep(&ctx.store, &ctx.events, ctx.clock.now()).await.unwrap();
    assert_eq!(report.applied, 1);
    let stored = ctx.store.find_by_id(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Expired);
}

#[tokio::test]
async fn role_based_transactions_never_expire() {
    let ctx = setup().await;
    let queued = queued_transaction(&ctx, TimelockStandard::OpenZeppelin, 104, T0 + 10_000).await;
    let ready = queued_transaction(&ctx, TimelockStandard::OpenZeppelin, 105, T0 + 60).await;
    ctx.clock.set(T0 + 60);
    ready_sweep(&ctx.store, &ctx.events, ctx.clock.now()).await.unwrap();

    for years in [1_i64, 10] {
        ctx.clock.set(T0 + years * 365 * 86_400);
        let report = expiry_sweep(&ctx.store, &ctx.events, ctx.clock.now()).await.unwrap();
        assert_eq!(report.examined, 0);
    }

    let stored = ctx.store.find_by_id(ready.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Ready);
    let stored = ctx.store.find_by_id(queued.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Queued);
}

#[tokio::test]
async fn ready_sweep_leaves_future_transactions_alone() {
    let ctx = setup().await;
    let due = queued_transaction(&ctx, TimelockStandard::OpenZeppelin, 106, T0 + 60).await;
    let future = queued_transaction(&ctx, TimelockStandard::OpenZeppelin, 107, T0 + 61).await;
    let submitting = ctx
        .service
        .create_transaction(
            PROPOSER,
            create_request(TimelockStandard::OpenZeppelin, &tx_hash(108), T0 + 10),
        )
        .await
        .unwrap();

    ctx.clock.set(T0 + 60);
    let report = ready_sweep(&ctx.store, &ctx.events, ctx.clock.now()).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.applied, 1);

    let status = |id| {
        let store = ctx.store.clone();
        async move { store.find_by_id(id).await.unwrap().unwrap().status }
    };
    assert_eq!(status(due.id).await, TransactionStatus::Ready);
    assert_eq!(status(future.id).await, TransactionStatus::Queued);
    assert_eq!(status(submitting.id).await, TransactionStatus::Submitting);
}

#[tokio::test]
async fn stale_sweep_write_loses_to_concurrent_cancel() {
    let ctx = setup().await;
    let tx = queued_transaction(&ctx, TimelockStandard::Compound, 109, T0 + 60).await;
    ctx.clock.set(T0 + 60);
    let now = ctx.clock.now();

    // The sweep has read its candidates...
    let candidates = ctx.store.find_ready_candidates(now).await.unwrap();
    assert_eq!(candidates.len(), 1);

    // ...a user cancels in between...
    ctx.service.cancel_transaction(ADMIN, tx.id).await.unwrap();

    // ...and the sweep's write, keyed on the status it observed, finds no row.
    let applied = ctx
        .store
        .transition(
            candidates[0].id,
            candidates[0].status,
            TransactionPatch::status(TransactionStatus::Ready),
            now,
        )
        .await
        .unwrap();
    assert!(!applied);

    let stored = ctx.store.find_by_id(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Canceled);

    // The store itself does not guard: an unconditional write still lands.
    ctx.store
        .update_status(tx.id, TransactionStatus::Ready, now)
        .await
        .unwrap();
    let stored = ctx.store.find_by_id(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Ready);
}

#[tokio::test]
async fn stale_user_action_loses_to_sweep() {
    let ctx = setup().await;
    let tx = queued_transaction(&ctx, TimelockStandard::Compound, 110, T0 + 60).await;
    ctx.clock.set(tx.eta + COMPOUND_GRACE_PERIOD_SECONDS + 1);

    expiry_sweep(&ctx.store, &ctx.events, ctx.clock.now()).await.unwrap();

    let err = ctx.service.cancel_transaction(ADMIN, tx.id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidStateTransition {
            from: TransactionStatus::Expired,
            ..
        }
    ));
}

#[tokio::test]
async fn sweep_service_uses_its_clock() {
    let ctx = setup().await;
    let tx = queued_transaction(&ctx, TimelockStandard::Compound, 111, T0 + 60).await;
    let sweeps = SweepService::new(ctx.store.clone(), ctx.events.clone(), ctx.clock.clone());

    assert_eq!(sweeps.run_ready_sweep().await.unwrap().applied, 0);
    ctx.clock.advance(60);
    assert_eq!(sweeps.run_ready_sweep().await.unwrap().applied, 1);

    ctx.clock.advance(COMPOUND_GRACE_PERIOD_SECONDS + 1);
    assert_eq!(sweeps.run_expiry_sweep().await.unwrap().applied, 1);
    let stored = ctx.store.find_by_id(tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Expired);
}

async fn reject_updates_of(ctx: &TestContext, tx_id: i32) {
    ctx.db
        .execute_unprepared(&format!(
            "CREATE TRIGGER reject_update BEFORE UPDATE ON timelock_transactions \
             WHEN OLD.id = {tx_id} BEGIN SELECT RAISE(ABORT, 'row locked'); END"
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn ready_sweep_write_failure_does_not_stop_the_others() {
    let ctx = setup().await;
    let first = queued_transaction(&ctx, TimelockStandard::Compound, 160, T0 + 60).await;
    let broken = queued_transaction(&ctx, TimelockStandard::Compound, 161, T0 + 60).await;
    let last = queued_transaction(&ctx, TimelockStandard::OpenZeppelin, 162, T0 + 60).await;
    reject_updates_of(&ctx, broken.id).await;

    ctx.clock.set(T0 + 60);
    let report = ready_sweep(&ctx.store, &ctx.events, ctx.clock.now()).await.unwrap();
    assert_eq!(report.examined, 3);
    assert_eq!(report.applied, 2);
    assert_eq!(report.failed, 1);

    for (id, status) in [
        (first.id, TransactionStatus::Ready),
        (broken.id, TransactionStatus::Queued),
        (last.id, TransactionStatus::Ready),
    ] {
        let stored = ctx.store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status, status);
    }
}

#[tokio::test]
async fn expiry_sweep_write_failure_does_not_stop_the_others() {
    let ctx = setup().await;
    let broken = queued_transaction(&ctx, TimelockStandard::Compound, 170, T0 + 60).await;
    let other = queued_transaction(&ctx, TimelockStandard::Compound, 171, T0 + 60).await;
    reject_updates_of(&ctx, broken.id).await;

    ctx.clock.set(T0 + 60 + COMPOUND_GRACE_PERIOD_SECONDS + 1);
    let report = expiry_sweep(&ctx.store, &ctx.events, ctx.clock.now()).await.unwrap();
    assert_eq!(report.examined, 2);
    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 1);

    let stored = ctx.store.find_by_id(broken.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Queued);
    let stored = ctx.store.find_by_id(other.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Expired);
}
