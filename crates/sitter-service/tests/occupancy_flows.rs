//! Occupancy state machine flows against in-memory mocks.
//!
//! Covers:
//! - Claim / query / release exclusivity
//! - Update settings outliving claims (and being wiped by release/clear)
//! - Rollback when the snapshot cannot be saved
//! - Racing claims on the same group

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::Duration as ChronoDuration;
use common::types::{ChannelId, GroupId};
use sitter_service::errors::SitterError;
use sitter_service::occupancy::{Activity, Occupancy, PingMode, UpdatesOutcome};
use sitter_service::render::VACANT_QUIPS;
use sitter_test_utils::*;
use std::sync::Arc;

// ============================================================================
// Claim / query / release
// ============================================================================

#[tokio::test]
async fn test_claim_query_conflict_release_scenario() {
    let harness = TestHarness::new();
    let alice = caller(1, ALICE, 10);
    let bob = caller(1, BOB, 10);

    let receipt = harness
        .service
        .claim(&alice, Activity::Farming, None, Some(30))
        .await
        .unwrap();
    assert_eq!(receipt.claim.holder, ALICE);
    assert!(!receipt.broadcasting);

    let status = harness.service.query(&alice);
    match status.occupancy {
        Occupancy::Occupied {
            claim,
            planned_end_passed,
            ..
        } => {
            assert_eq!(claim.holder, ALICE);
            assert_eq!(claim.activity, Activity::Farming);
            assert_eq!(claim.until(), Some(claim.since + ChronoDuration::minutes(30)));
            assert!(!planned_end_passed);
        }
        Occupancy::Empty => panic!("Expected an occupied group"),
    }

    let conflict = harness
        .service
        .claim(&bob, Activity::Raiding, None, None)
        .await;
    assert!(matches!(conflict, Err(SitterError::Conflict { holder }) if holder == ALICE));

    harness.service.release(&alice).await.unwrap();

    let status = harness.service.query(&alice);
    assert_eq!(status.occupancy, Occupancy::Empty);
    assert_eq!(status.message, "No one is ON.");
}

#[tokio::test]
async fn test_same_holder_reclaim_is_conflict() {
    let harness = TestHarness::new();
    let alice = caller(1, ALICE, 10);

    harness
        .service
        .claim(&alice, Activity::Building, None, None)
        .await
        .unwrap();
    let again = harness
        .service
        .claim(&alice, Activity::Building, None, None)
        .await;

    let err = again.unwrap_err();
    assert!(matches!(err, SitterError::Conflict { holder } if holder == ALICE));
    assert_eq!(
        err.client_message(),
        "🔴 Already ON by <@1001>. Use `/status` or ask a lead to `/clear_on`."
    );
}

#[tokio::test]
async fn test_claim_announcement_message() {
    let harness = TestHarness::new();

    let receipt = harness
        .service
        .claim(
            &caller(1, ALICE, 10),
            Activity::Farming,
            Some("wheat".to_string()),
            Some(45),
        )
        .await
        .unwrap();

    assert_eq!(
        receipt.message,
        "🟢 <@1001> is **ON** acc — **farming** — wheat | for 45m (→ 09:45 UTC−1)\nServer time: **09:00** UTC−1 start"
    );
}

#[tokio::test]
async fn test_release_by_non_holder_is_rejected() {
    let harness = TestHarness::new();

    let vacant = harness.service.release(&caller(1, ALICE, 10)).await;
    assert!(matches!(vacant, Err(SitterError::NotHolder)));

    harness
        .service
        .claim(&caller(1, ALICE, 10), Activity::Market, None, None)
        .await
        .unwrap();
    let other = harness.service.release(&caller(1, BOB, 10)).await;
    assert!(matches!(other, Err(SitterError::NotHolder)));

    // Still held by the original holder
    assert!(harness
        .store
        .get(GroupId(1))
        .and_then(|state| state.claim)
        .is_some_and(|claim| claim.holder == ALICE));
}

#[tokio::test]
async fn test_release_summary_reports_duration() {
    let harness = TestHarness::new();
    let alice = caller(1, ALICE, 10);

    harness
        .service
        .claim(&alice, Activity::Defending, None, None)
        .await
        .unwrap();
    harness.clock.advance_mins(90);

    let receipt = harness.service.release(&alice).await.unwrap();
    assert_eq!(
        receipt.message,
        "⚪ <@1001> is **OFF**.\nServer time: **09:00** → **10:30** UTC−1 — **1h30m**"
    );
}

#[tokio::test]
async fn test_query_flags_passed_planned_end() {
    let harness = TestHarness::new();
    let alice = caller(1, ALICE, 10);

    harness
        .service
        .claim(&alice, Activity::Scouting, None, Some(30))
        .await
        .unwrap();
    harness.clock.advance_mins(31);

    let status = harness.service.query(&alice);
    assert!(matches!(
        status.occupancy,
        Occupancy::Occupied {
            planned_end_passed: true,
            elapsed_seconds: 1860,
            ..
        }
    ));
    assert!(status.message.contains("(planned end passed)"));
    // Informational only: the claim is still there
    assert!(harness.store.get(GroupId(1)).unwrap().claim.is_some());
}

#[tokio::test]
async fn test_groups_are_independent() {
    let harness = TestHarness::new();

    harness
        .service
        .claim(&caller(1, ALICE, 10), Activity::Farming, None, None)
        .await
        .unwrap();
    harness
        .service
        .claim(&caller(2, BOB, 20), Activity::Farming, None, None)
        .await
        .unwrap();

    harness.service.release(&caller(1, ALICE, 10)).await.unwrap();
    assert!(harness.store.get(GroupId(1)).is_none());
    assert!(harness.store.get(GroupId(2)).is_some());
}

// ============================================================================
// Update settings
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_vacant_configuration_carries_into_next_claim() {
    let harness = TestHarness::new();
    let lead = caller(2, BOB, 20);

    let outcome = harness
        .service
        .configure_updates(&lead, true, Some(15), Some(PingMode::Here))
        .await
        .unwrap();

    let UpdatesOutcome::NoHolderYet { updates, message } = outcome else {
        panic!("Expected NoHolderYet, got {outcome:?}");
    };
    assert!(updates.enabled);
    assert_eq!(updates.interval_minutes, 15);
    assert!(message.starts_with("✅ Auto-updates **armed** (every **15m**, ping HERE) → <#20>\n"));
    assert!(VACANT_QUIPS.iter().any(|quip| message.ends_with(quip)));
    assert!(harness.store.get(GroupId(2)).unwrap().claim.is_none());
    assert!(harness.scheduler.active_groups().is_empty());

    let receipt = harness
        .service
        .claim(&lead, Activity::Raiding, None, None)
        .await
        .unwrap();
    assert!(receipt.broadcasting);

    let state = harness.store.get(GroupId(2)).unwrap();
    assert!(state.updates.enabled);
    assert_eq!(state.updates.interval_minutes, 15);
    assert_eq!(state.updates.ping, PingMode::Here);
    assert_eq!(state.updates.target, Some(ChannelId(20)));
}

#[tokio::test]
async fn test_claim_moves_target_to_caller_channel() {
    let harness = TestHarness::new();

    harness
        .service
        .configure_updates(&caller(1, BOB, 10), false, Some(30), None)
        .await
        .unwrap();
    harness
        .service
        .claim(&caller(1, ALICE, 77), Activity::Other, None, None)
        .await
        .unwrap();

    let updates = harness.store.get(GroupId(1)).unwrap().updates;
    assert_eq!(updates.target, Some(ChannelId(77)));
    assert_eq!(updates.interval_minutes, 30);
}

#[tokio::test]
async fn test_configure_is_idempotent() {
    let harness = TestHarness::new();
    let lead = caller(3, ALICE, 30);

    let first = harness
        .service
        .configure_updates(&lead, false, Some(20), Some(PingMode::None))
        .await
        .unwrap();
    let after_first = harness.store.get(GroupId(3));

    let second = harness
        .service
        .configure_updates(&lead, false, Some(20), Some(PingMode::None))
        .await
        .unwrap();

    assert_eq!(first.updates(), second.updates());
    assert_eq!(harness.store.get(GroupId(3)), after_first);
}

#[tokio::test]
async fn test_interval_is_clamped_and_zero_keeps_previous() {
    let harness = TestHarness::new();
    let lead = caller(1, ALICE, 10);

    let outcome = harness
        .service
        .configure_updates(&lead, false, Some(2), None)
        .await
        .unwrap();
    assert_eq!(outcome.updates().interval_minutes, 5);

    let outcome = harness
        .service
        .configure_updates(&lead, false, Some(0), None)
        .await
        .unwrap();
    assert_eq!(outcome.updates().interval_minutes, 5);

    let outcome = harness
        .service
        .configure_updates(&lead, false, None, None)
        .await
        .unwrap();
    assert_eq!(outcome.updates().interval_minutes, 5);
}

#[tokio::test]
async fn test_fresh_group_uses_default_interval() {
    let harness = TestHarness::new();

    harness
        .service
        .claim(&caller(1, ALICE, 10), Activity::Farming, None, None)
        .await
        .unwrap();

    let updates = harness.store.get(GroupId(1)).unwrap().updates;
    assert!(!updates.enabled);
    assert_eq!(updates.interval_minutes, 60);
    assert_eq!(updates.ping, PingMode::None);
}

#[tokio::test(start_paused = true)]
async fn test_applied_updates_message_while_held() {
    let harness = TestHarness::new();
    let alice = caller(1, ALICE, 10);

    harness
        .service
        .claim(&alice, Activity::Farming, None, None)
        .await
        .unwrap();

    let on = harness
        .service
        .configure_updates(&alice, true, Some(15), Some(PingMode::Here))
        .await
        .unwrap();
    assert!(matches!(on, UpdatesOutcome::Applied { .. }));
    assert_eq!(
        on.message(),
        "✅ Auto-updates **ON** every **15m** in <#10> (ping **HERE**)."
    );
    assert!(harness.scheduler.is_running(GroupId(1)));

    let off = harness
        .service
        .configure_updates(&alice, false, None, None)
        .await
        .unwrap();
    assert_eq!(off.message(), "✅ Auto-updates **OFF**.");
    assert!(!harness.scheduler.is_running(GroupId(1)));
}

#[tokio::test(start_paused = true)]
async fn test_release_wipes_configuration_and_stops_broadcasts() {
    let harness = TestHarness::new();
    let alice = caller(1, ALICE, 10);

    harness
        .service
        .configure_updates(&alice, true, Some(15), Some(PingMode::Here))
        .await
        .unwrap();
    harness
        .service
        .claim(&alice, Activity::Farming, None, None)
        .await
        .unwrap();
    assert!(harness.scheduler.is_running(GroupId(1)));

    harness.service.release(&alice).await.unwrap();

    assert!(harness.store.get(GroupId(1)).is_none());
    assert!(!harness.snapshots.committed().contains_key(&GroupId(1)));
    assert!(harness.scheduler.active_groups().is_empty());

    // The next claim starts from defaults
    harness
        .service
        .claim(&alice, Activity::Farming, None, None)
        .await
        .unwrap();
    let updates = harness.store.get(GroupId(1)).unwrap().updates;
    assert!(!updates.enabled);
    assert_eq!(updates.interval_minutes, 60);
}

// ============================================================================
// Admin clear
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_admin_clear_removes_claim_and_config() {
    let harness = TestHarness::new();
    let alice = caller(1, ALICE, 10);

    harness
        .service
        .configure_updates(&alice, true, Some(15), None)
        .await
        .unwrap();
    harness
        .service
        .claim(&alice, Activity::Farming, None, None)
        .await
        .unwrap();

    let cleared = harness.service.admin_clear(GroupId(1)).await.unwrap();
    assert!(cleared.previous.is_some_and(|state| state.claim.is_some()));
    assert_eq!(cleared.message, "✅ Cleared current ON sitter.");
    assert!(harness.store.get(GroupId(1)).is_none());
    assert!(harness.scheduler.active_groups().is_empty());

    // Anyone can claim afterwards
    harness
        .service
        .claim(&caller(1, BOB, 10), Activity::Farming, None, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_admin_clear_on_vacant_group() {
    let harness = TestHarness::new();

    let cleared = harness.service.admin_clear(GroupId(9)).await.unwrap();
    assert!(cleared.previous.is_none());
    assert_eq!(harness.snapshots.save_count(), 0);
}

// ============================================================================
// Persistence failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_save_rolls_back_claim() {
    let harness = TestHarness::new();
    let alice = caller(1, ALICE, 10);

    harness
        .service
        .configure_updates(&alice, true, Some(15), None)
        .await
        .unwrap();
    harness.snapshots.set_fail_saves(true);

    let result = harness
        .service
        .claim(&alice, Activity::Farming, None, None)
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, SitterError::StoreUnavailable(_)));
    assert_eq!(err.error_code(), 3);

    // No holder in memory, no broadcast task, committed config unchanged
    assert!(harness.store.get(GroupId(1)).unwrap().claim.is_none());
    assert!(harness.scheduler.active_groups().is_empty());
    assert_eq!(harness.service.query(&alice).occupancy, Occupancy::Empty);

    harness.snapshots.set_fail_saves(false);
    harness
        .service
        .claim(&alice, Activity::Farming, None, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failed_save_rolls_back_release() {
    let harness = TestHarness::new();
    let alice = caller(1, ALICE, 10);

    harness
        .service
        .claim(&alice, Activity::Farming, None, None)
        .await
        .unwrap();
    harness.snapshots.set_fail_saves(true);

    let result = harness.service.release(&alice).await;
    assert!(matches!(result, Err(SitterError::StoreUnavailable(_))));
    assert!(harness.store.get(GroupId(1)).unwrap().claim.is_some());
}

#[tokio::test]
async fn test_every_mutation_is_written_through() {
    let harness = TestHarness::new();
    let alice = caller(1, ALICE, 10);

    harness
        .service
        .configure_updates(&alice, false, Some(15), None)
        .await
        .unwrap();
    harness
        .service
        .claim(&alice, Activity::Farming, None, None)
        .await
        .unwrap();

    assert_eq!(harness.snapshots.save_count(), 2);
    assert_eq!(harness.snapshots.committed(), harness.store.snapshot());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_claims_admit_exactly_one_holder() {
    let harness = Arc::new(TestHarness::new());

    let mut handles = Vec::new();
    for user in 1..=16 {
        let harness = Arc::clone(&harness);
        handles.push(tokio::spawn(async move {
            harness
                .service
                .claim(
                    &caller(1, common::types::UserId(user), 10),
                    Activity::Farming,
                    None,
                    None,
                )
                .await
        }));
    }

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => winners.push(receipt.claim.holder),
            Err(SitterError::Conflict { .. }) => conflicts += 1,
            Err(other) => panic!("Unexpected error: {other}"),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 15);
    let holder = harness.store.get(GroupId(1)).unwrap().claim.unwrap().holder;
    assert_eq!(winners.first(), Some(&holder));
}
