//! Status reporter. Never fails; every problem degrades a field instead.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::backup::{latest_artifact, BackupArtifact};
use crate::config::BackupSettings;
use crate::engine::MigrationEngine;
use crate::migration::RevisionId;
use crate::store::{Entity, SchemaStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RowCount {
    Count(i64),
    /// Serialized as `null`.
    Unavailable,
}

impl std::fmt::Display for RowCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowCount::Count(n) => write!(f, "{}", n),
            RowCount::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// A point-in-time snapshot. Built fresh on every call.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub current_revision: Option<RevisionId>,
    pub head_revision: Option<RevisionId>,
    pub pending_count: Option<usize>,
    pub pending: Vec<RevisionId>,
    /// Detailed mode only.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub row_counts: BTreeMap<Entity, RowCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_backup: Option<BackupArtifact>,
    pub issues: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl StatusReport {
    fn empty(connected: bool) -> Self {
        Self {
            connected,
            error: None,
            current_revision: None,
            head_revision: None,
            pending_count: None,
            pending: Vec::new(),
            row_counts: BTreeMap::new(),
            latest_backup: None,
            issues: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// The report for a store that could not be reached (or configured).
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::empty(false)
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.connected && self.pending_count == Some(0)
    }
}

pub async fn report(
    store: &dyn SchemaStore,
    engine: &dyn MigrationEngine,
    backups: &BackupSettings,
    detailed: bool,
) -> StatusReport {
    if let Err(e) = store.probe().await {
        tracing::debug!(error = %e, "Schema store unreachable");
        return StatusReport::disconnected(e.to_string());
    }

    let mut report = StatusReport::empty(true);

    // Pending is only known when the current revision is
    let current_known = match engine.current().await {
        Ok(current) => {
            report.current_revision = current;
            true
        }
        Err(e) => {
            report.issues.push(format!("current revision unavailable: {}", e));
            false
        }
    };

    match engine.chain().await {
        Ok(chain) => {
            report.head_revision = chain.head().map(|h| h.id.clone());
            if current_known {
                match chain.pending_after(report.current_revision.as_ref()) {
                    Ok(pending) => {
                        report.pending = pending.iter().map(|r| r.id.clone()).collect();
                        report.pending_count = Some(pending.len());
                    }
                    Err(e) => report.issues.push(e.to_string()),
                }
            }
        }
        Err(e) => report.issues.push(format!("migration chain unavailable: {}", e)),
    }

    if detailed {
        for entity in Entity::ALL {
            let count = match store.count_rows(entity).await {
                Ok(n) => RowCount::Count(n),
                Err(e) => {
                    tracing::debug!(entity = %entity, error = %e, "Row count unavailable");
                    RowCount::Unavailable
                }
            };
            report.row_counts.insert(entity, count);
        }

        match latest_artifact(&backups.directory, &backups.prefix) {
            Ok(latest) => report.latest_backup = latest,
            Err(e) => report.issues.push(format!("backup directory unreadable: {}", e)),
        }

        match engine.modified_since_applied().await {
            Ok(scripts) => report
                .issues
                .extend(scripts.into_iter().map(|s| format!("{} changed after it was applied", s))),
            Err(e) => tracing::debug!(error = %e, "Checksum comparison skipped"),
        }
    }

    report
}
