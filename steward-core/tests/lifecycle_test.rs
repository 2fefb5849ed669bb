//! Orchestrator behaviour against in-memory collaborators.
//!
//! Run with: cargo test --test lifecycle_test

mod support;

use std::path::PathBuf;

use steward_core::commands::status::RowCount;
use steward_core::error::StewardError;
use steward_core::seed::expected_rows;
use steward_core::store::Entity;
use steward_core::{BackupOptions, ConfirmationSource, ResetState, Scenario, StatusReport};

use support::{files_in, harness, harness_with_chain, linear_chain, FakePrompter, DATABASE};

fn ids(revs: impl IntoIterator<Item = String>) -> Vec<String> {
    revs.into_iter().collect()
}

// ── Migration coordinator ──

#[tokio::test]
async fn test_upgrade_twice_is_idempotent() {
    let h = harness();

    let first = h.steward.upgrade().await.unwrap();
    assert_eq!(first.from, None);
    assert_eq!(first.applied_count(), 2);
    assert_eq!(first.to.as_ref().unwrap().raw, "2");

    let second = h.steward.upgrade().await.unwrap();
    assert_eq!(second.applied_count(), 0);
    assert_eq!(second.from, second.to);
    assert_eq!(h.steward.current().await.unwrap().unwrap().raw, "2");

    let world = h.world.lock().unwrap();
    assert!(!world.locked);
    assert_eq!(world.lock_count, 2);
}

#[tokio::test]
async fn test_current_is_none_when_uninitialized() {
    let h = harness();
    assert_eq!(h.steward.current().await.unwrap(), None);
}

#[tokio::test]
async fn test_history_is_root_to_head_and_restartable() {
    let h = harness_with_chain(linear_chain(4));
    let chain = h.steward.history().await.unwrap();

    let first = ids(chain.ids().map(|i| i.raw.clone()));
    let second = ids(chain.iter().map(|r| r.id.raw.clone()));
    assert_eq!(first, vec!["1", "2", "3", "4"]);
    assert_eq!(first, second);

    let mut previous = None;
    for rev in &chain {
        assert_eq!(rev.parent, previous);
        previous = Some(rev.id.clone());
    }
}

#[tokio::test]
async fn test_broken_chain_is_rejected_before_applying() {
    let mut chain = linear_chain(3);
    chain[2].parent = None;
    let h = harness_with_chain(chain);

    let err = h.steward.upgrade().await.unwrap_err();
    assert!(matches!(err, StewardError::BrokenChain(_)));
    assert!(h.world.lock().unwrap().applied.is_empty());
}

#[tokio::test]
async fn test_failed_upgrade_reports_last_applied_and_keeps_progress() {
    let h = harness_with_chain(linear_chain(4));
    h.world.lock().unwrap().fail_revision = Some("3".to_string());

    let err = h.steward.upgrade().await.unwrap_err();
    match err {
        StewardError::MigrationFailed {
            revision,
            last_applied,
            reason,
        } => {
            assert_eq!(revision, "3");
            assert_eq!(last_applied.as_deref(), Some("2"));
            assert!(reason.contains("syntax error"));
        }
        other => panic!("expected MigrationFailed, got {other:?}"),
    }

    assert_eq!(h.steward.current().await.unwrap().unwrap().raw, "2");
    assert!(!h.world.lock().unwrap().locked, "lock released after failure");
}

#[tokio::test]
async fn test_failure_on_first_delta_reports_no_last_applied() {
    let h = harness();
    h.world.lock().unwrap().fail_revision = Some("1".to_string());

    let err = h.steward.upgrade().await.unwrap_err();
    assert!(matches!(
        err,
        StewardError::MigrationFailed { last_applied: None, .. }
    ));
}

#[tokio::test]
async fn test_current_outside_chain_is_broken() {
    let h = harness();
    h.world
        .lock()
        .unwrap()
        .applied
        .push(steward_core::RevisionId::parse("9").unwrap());

    let err = h.steward.upgrade().await.unwrap_err();
    assert!(matches!(err, StewardError::BrokenChain(ref m) if m.contains('9')));
}

#[tokio::test]
async fn test_new_revision_parents_at_head() {
    let h = harness();
    let created = h.steward.new_revision("Add audit log").await.unwrap();
    assert_eq!(created.revision.raw, "3");
    assert_eq!(created.parent.unwrap().raw, "2");

    let chain = h.steward.history().await.unwrap();
    assert_eq!(chain.head().unwrap().id.raw, "3");
}

#[tokio::test]
async fn test_new_revision_on_empty_chain_is_root() {
    let h = harness_with_chain(Vec::new());
    let created = h.steward.new_revision("initial").await.unwrap();
    assert_eq!(created.revision.raw, "1");
    assert!(created.parent.is_none());
}

#[tokio::test]
async fn test_new_revision_rejects_blank_message_without_side_effects() {
    let h = harness();
    for message in ["", "   \n"] {
        let err = h.steward.new_revision(message).await.unwrap_err();
        assert!(matches!(err, StewardError::ValidationError(_)));
    }
    assert_eq!(h.world.lock().unwrap().chain.len(), 2);
}

#[tokio::test]
async fn test_init_db_creates_schemas_then_upgrades() {
    let h = harness();
    let report = h.steward.init_db().await.unwrap();
    assert_eq!(report.created_schemas, vec!["organization", "security"]);
    assert_eq!(report.upgrade.applied_count(), 2);

    let again = h.steward.init_db().await.unwrap();
    assert!(again.created_schemas.is_empty());
    assert_eq!(again.upgrade.applied_count(), 0);
}

// ── Seed orchestrator ──

#[tokio::test]
async fn test_seed_basic_produces_expected_rows() {
    let h = harness();
    let summary = h.steward.seed(Scenario::Basic, false).await.unwrap();

    assert_eq!(summary.skipped(), 0);
    assert_eq!(h.world.lock().unwrap().counts(), expected_rows(Scenario::Basic, false));
}

#[tokio::test]
async fn test_reseed_skips_existing_rows() {
    let h = harness();
    let first = h.steward.seed(Scenario::Basic, false).await.unwrap();
    let second = h.steward.seed(Scenario::Basic, false).await.unwrap();

    assert_eq!(second.created(), 0);
    assert_eq!(second.skipped(), first.created());
    assert_eq!(h.world.lock().unwrap().counts(), expected_rows(Scenario::Basic, false));
}

#[tokio::test]
async fn test_complete_after_basic_adds_only_missing_users() {
    let h = harness();
    h.steward.seed(Scenario::Basic, false).await.unwrap();
    let summary = h.steward.seed(Scenario::Complete, true).await.unwrap();

    let users = summary
        .steps
        .iter()
        .find(|s| s.entity == Entity::Users)
        .unwrap();
    assert_eq!(users.created, 2);
    assert_eq!(users.skipped, 3);
    assert_eq!(h.world.lock().unwrap().counts(), expected_rows(Scenario::Complete, true));
}

#[tokio::test]
async fn test_seed_failure_reports_step_and_progress() {
    let h = harness();
    h.world.lock().unwrap().fail_seed_entity = Some(Entity::Positions);

    let err = h.steward.seed(Scenario::Basic, false).await.unwrap_err();
    match err {
        StewardError::SeedFailed {
            step,
            completed_steps,
            ..
        } => {
            assert_eq!(step, "positions");
            assert_eq!(completed_steps, 2);
        }
        other => panic!("expected SeedFailed, got {other:?}"),
    }

    // Earlier steps are not rolled back
    let counts = h.world.lock().unwrap().counts();
    assert_eq!(counts[&Entity::OrgUnits], 8);
    assert_eq!(counts[&Entity::Users], 0);
}

// ── Status reporter ──

#[tokio::test]
async fn test_status_unreachable_store_is_disconnected() {
    let h = harness();
    h.world.lock().unwrap().reachable = false;

    let report = h.steward.status(true).await;
    assert!(!report.connected);
    assert!(report.error.is_some());
    assert!(report.current_revision.is_none());
    assert!(report.head_revision.is_none());
    assert!(report.pending_count.is_none());
    assert!(report.row_counts.is_empty());
    assert!(report.latest_backup.is_none());
}

#[tokio::test]
async fn test_status_reports_pending() {
    let h = harness_with_chain(linear_chain(3));
    h.world
        .lock()
        .unwrap()
        .applied
        .push(steward_core::RevisionId::parse("1").unwrap());

    let report = h.steward.status(false).await;
    assert!(report.connected);
    assert_eq!(report.current_revision.unwrap().raw, "1");
    assert_eq!(report.head_revision.unwrap().raw, "3");
    assert_eq!(report.pending_count, Some(2));
    assert!(report.row_counts.is_empty(), "counts only in detailed mode");
}

#[tokio::test]
async fn test_status_unreadable_history_leaves_pending_unknown() {
    let h = harness_with_chain(linear_chain(3));
    h.steward.upgrade().await.unwrap();
    h.world.lock().unwrap().history_unreadable = true;

    let report = h.steward.status(false).await;
    assert!(report.connected);
    assert!(report.current_revision.is_none());
    assert_eq!(report.head_revision.as_ref().unwrap().raw, "3");
    assert_eq!(report.pending_count, None);
    assert!(report.pending.is_empty());
    assert!(!report.is_up_to_date());
    assert!(report.issues.iter().any(|i| i.contains("current revision unavailable")));
}

#[tokio::test]
async fn test_status_detailed_degrades_failed_counts() {
    let h = harness();
    h.steward.seed(Scenario::Basic, false).await.unwrap();
    h.world.lock().unwrap().broken_count = Some(Entity::Users);

    let report = h.steward.status(true).await;
    assert!(report.connected);
    assert_eq!(report.row_counts[&Entity::Users], RowCount::Unavailable);
    assert_eq!(report.row_counts[&Entity::Permissions], RowCount::Count(11));
    assert_eq!(report.row_counts.len(), 4);
}

#[tokio::test]
async fn test_status_detailed_shows_latest_backup() {
    let h = harness();
    let artifact = h
        .steward
        .backup(&BackupOptions {
            include_data: true,
            compress: true,
            output: None,
        })
        .await
        .unwrap();

    let report = h.steward.status(true).await;
    assert_eq!(report.latest_backup.unwrap().path, artifact.path);
}

#[test]
fn test_disconnected_report_serializes_without_detail_fields() {
    let json = serde_json::to_value(StatusReport::disconnected("no DATABASE_URL")).unwrap();
    assert_eq!(json["connected"], false);
    assert_eq!(json["error"], "no DATABASE_URL");
    assert!(json.get("row_counts").is_none());
}

// ── Dump/restore manager ──

#[tokio::test]
async fn test_compressed_backup_then_restore_preserves_counts() {
    let h = harness();
    h.steward.seed(Scenario::Complete, true).await.unwrap();
    let before = h.world.lock().unwrap().counts();

    let artifact = h
        .steward
        .backup(&BackupOptions {
            include_data: true,
            compress: true,
            output: None,
        })
        .await
        .unwrap();
    assert!(artifact.compressed);
    assert!(artifact.path.to_string_lossy().ends_with("_full.sql.gz"));
    assert_eq!(&std::fs::read(&artifact.path).unwrap()[..2], &[0x1f, 0x8b]);

    h.world.lock().unwrap().rows.clear();
    h.steward.restore(&artifact.path).await.unwrap();

    assert_eq!(h.world.lock().unwrap().counts(), before);
}

#[tokio::test]
async fn test_back_to_back_backups_get_distinct_names() {
    let h = harness();
    let opts = BackupOptions {
        include_data: true,
        compress: false,
        output: None,
    };

    let first = h.steward.backup(&opts).await.unwrap();
    let second = h.steward.backup(&opts).await.unwrap();
    assert_ne!(first.path, second.path);
    assert_eq!(files_in(h.backups.path()).len(), 2);

    let report = h.steward.status(true).await;
    assert_eq!(report.latest_backup.unwrap().path, second.path);
}

#[tokio::test]
async fn test_schema_only_backup_is_named_schema() {
    let h = harness();
    let artifact = h
        .steward
        .backup(&BackupOptions {
            include_data: false,
            compress: false,
            output: None,
        })
        .await
        .unwrap();
    let name = artifact.path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("steward_backup_"));
    assert!(name.ends_with("_schema.sql"));
    assert!(!artifact.include_data);
}

#[tokio::test]
async fn test_failed_dump_leaves_no_partial_file() {
    let h = harness();
    h.world.lock().unwrap().dump_failure =
        Some((1, "pg_dump: error: connection to server failed".to_string()));

    let err = h
        .steward
        .backup(&BackupOptions {
            include_data: true,
            compress: true,
            output: None,
        })
        .await
        .unwrap_err();

    match err {
        StewardError::BackupToolFailed { exit_code, stderr } => {
            assert_eq!(exit_code, Some(1));
            assert_eq!(stderr, "pg_dump: error: connection to server failed");
        }
        other => panic!("expected BackupToolFailed, got {other:?}"),
    }
    assert!(files_in(h.backups.path()).is_empty());
}

#[tokio::test]
async fn test_backup_to_explicit_output() {
    let h = harness();
    let out = h.backups.path().join("nested").join("manual.sql");
    let artifact = h
        .steward
        .backup(&BackupOptions {
            include_data: true,
            compress: false,
            output: Some(out.clone()),
        })
        .await
        .unwrap();
    assert_eq!(artifact.path, out);
    assert!(out.is_file());

    // Never overwrites
    let err = h
        .steward
        .backup(&BackupOptions {
            include_data: true,
            compress: false,
            output: Some(out),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StewardError::BackupError(_)));
}

#[tokio::test]
async fn test_backup_output_extension_must_match_compression() {
    let h = harness();
    let err = h
        .steward
        .backup(&BackupOptions {
            include_data: true,
            compress: true,
            output: Some(h.backups.path().join("manual.sql")),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StewardError::ValidationError(_)));
    assert_eq!(h.world.lock().unwrap().dumps, 0);
}

#[tokio::test]
async fn test_restore_missing_file() {
    let h = harness();
    let err = h
        .steward
        .restore(&PathBuf::from("/nonexistent/backup.sql"))
        .await
        .unwrap_err();
    assert!(matches!(err, StewardError::RestoreError { ref reason, .. } if reason.contains("not found")));
}

#[tokio::test]
async fn test_restore_rejects_compression_mismatch() {
    let h = harness();

    let fake_gz = h.backups.path().join("plain.sql.gz");
    std::fs::write(&fake_gz, "SELECT 1;").unwrap();
    let err = h.steward.restore(&fake_gz).await.unwrap_err();
    assert!(matches!(err, StewardError::RestoreError { .. }));

    let artifact = h
        .steward
        .backup(&BackupOptions {
            include_data: true,
            compress: true,
            output: None,
        })
        .await
        .unwrap();
    let renamed = h.backups.path().join("renamed.sql");
    std::fs::copy(&artifact.path, &renamed).unwrap();
    let err = h.steward.restore(&renamed).await.unwrap_err();
    assert!(matches!(err, StewardError::RestoreError { .. }));

    assert_eq!(h.world.lock().unwrap().restores, 0, "utility never invoked");
}

#[tokio::test]
async fn test_restore_surfaces_utility_stderr_verbatim() {
    let h = harness();
    let artifact = h
        .steward
        .backup(&BackupOptions {
            include_data: true,
            compress: false,
            output: None,
        })
        .await
        .unwrap();

    let stderr = "psql:/tmp/x.sql:12: ERROR:  relation \"org_units\" already exists";
    h.world.lock().unwrap().restore_failure = Some((3, stderr.to_string()));

    let err = h.steward.restore(&artifact.path).await.unwrap_err();
    match err {
        StewardError::RestoreToolFailed { exit_code, stderr: got } => {
            assert_eq!(exit_code, Some(3));
            assert_eq!(got, stderr);
        }
        other => panic!("expected RestoreToolFailed, got {other:?}"),
    }
}

// ── Reset guard ──

async fn seeded_at_head() -> support::Harness {
    let h = harness();
    h.steward.init_db().await.unwrap();
    h.steward.seed(Scenario::Basic, false).await.unwrap();
    h
}

#[tokio::test]
async fn test_reset_denied_leaves_store_unchanged() {
    let h = seeded_at_head().await;
    let before = h.world.lock().unwrap().counts();

    let report = h
        .steward
        .reset(ConfirmationSource::Interactive(FakePrompter::answering("yes")), true)
        .await
        .unwrap();

    assert!(report.aborted());
    assert_eq!(
        report.trail,
        vec![ResetState::Idle, ResetState::AwaitingConfirmation, ResetState::Aborted]
    );
    assert!(report.dropped.is_empty());
    assert!(report.reinit.is_none());

    let world = h.world.lock().unwrap();
    assert_eq!(world.wipe_calls, 0);
    assert_eq!(world.counts(), before);
    assert_eq!(world.applied.last().unwrap().raw, "2");
}

#[tokio::test]
async fn test_reset_with_no_response_aborts() {
    let h = seeded_at_head().await;
    let report = h
        .steward
        .reset(ConfirmationSource::Interactive(Box::new(FakePrompter(None))), false)
        .await
        .unwrap();
    assert_eq!(report.final_state, ResetState::Aborted);
    assert_eq!(h.world.lock().unwrap().wipe_calls, 0);
}

#[tokio::test]
async fn test_reset_without_any_confirmation_source_aborts() {
    let h = seeded_at_head().await;
    let report = h.steward.reset(ConfirmationSource::Denied, true).await.unwrap();
    assert_eq!(report.final_state, ResetState::Aborted);
    assert!(report.abort_reason.unwrap().contains("--force"));
    assert_eq!(h.world.lock().unwrap().wipe_calls, 0);
}

#[tokio::test]
async fn test_reset_confirmed_by_database_name() {
    let h = seeded_at_head().await;
    let report = h
        .steward
        .reset(ConfirmationSource::Interactive(FakePrompter::answering(DATABASE)), false)
        .await
        .unwrap();

    assert_eq!(
        report.trail,
        vec![
            ResetState::Idle,
            ResetState::AwaitingConfirmation,
            ResetState::Confirmed,
            ResetState::Wiping,
            ResetState::Done
        ]
    );
    let world = h.world.lock().unwrap();
    assert_eq!(world.wipe_calls, 1);
    assert!(world.applied.is_empty());
    assert!(world.counts().values().all(|n| *n == 0));
}

#[tokio::test]
async fn test_forced_reset_with_reinit_on_empty_store() {
    let h = harness();
    let report = h
        .steward
        .reset(ConfirmationSource::Forced, true)
        .await
        .unwrap();

    assert_eq!(
        report.trail,
        vec![
            ResetState::Idle,
            ResetState::Confirmed,
            ResetState::Wiping,
            ResetState::Reinitializing,
            ResetState::Done
        ]
    );
    let reinit = report.reinit.unwrap();
    assert_eq!(reinit.seed.scenario, Scenario::Basic);
    assert!(!reinit.seed.extended_org);

    assert_eq!(h.steward.current().await.unwrap().unwrap().raw, "2");
    assert_eq!(h.world.lock().unwrap().counts(), expected_rows(Scenario::Basic, false));
}

#[tokio::test]
async fn test_wipe_failure_is_fatal() {
    let h = seeded_at_head().await;
    h.world.lock().unwrap().wipe_fails = true;

    let err = h
        .steward
        .reset(ConfirmationSource::Forced, true)
        .await
        .unwrap_err();
    assert!(matches!(err, StewardError::WipeFailed(_)));
    assert_eq!(h.world.lock().unwrap().wipe_calls, 1);
}

#[tokio::test]
async fn test_reinit_failure_after_wipe_propagates() {
    let h = seeded_at_head().await;
    h.world.lock().unwrap().fail_seed_entity = Some(Entity::Users);

    let err = h
        .steward
        .reset(ConfirmationSource::Forced, true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StewardError::SeedFailed { ref step, completed_steps: 3, .. } if step == "users"
    ));

    let world = h.world.lock().unwrap();
    assert_eq!(world.wipe_calls, 1);
    // Reinit migrated before seeding failed
    assert_eq!(world.applied.last().unwrap().raw, "2");
    assert_eq!(world.counts()[&Entity::Users], 0);
}
