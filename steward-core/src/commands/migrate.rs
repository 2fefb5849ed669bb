//! Migration coordinator: upgrade, current, history, new revision.

use std::path::PathBuf;

use serde::Serialize;

use crate::engine::MigrationEngine;
use crate::error::{Result, StewardError};
use crate::migration::{MigrationRevision, RevisionChain, RevisionId};

/// Report returned after an upgrade.
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub from: Option<RevisionId>,
    pub to: Option<RevisionId>,
    pub applied: Vec<AppliedDelta>,
    pub total_time_ms: i32,
}

impl UpgradeReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppliedDelta {
    pub revision: RevisionId,
    pub description: String,
    pub script: String,
    pub execution_time_ms: i32,
}

/// A freshly created revision node.
#[derive(Debug, Clone, Serialize)]
pub struct NewRevision {
    pub revision: RevisionId,
    pub parent: Option<RevisionId>,
    pub path: PathBuf,
}

/// Apply every pending revision from current to head, in chain order.
///
/// Holds the engine lock for the whole run and always releases it. A failed
/// delta stops the run; earlier deltas stay applied.
pub async fn upgrade(engine: &dyn MigrationEngine) -> Result<UpgradeReport> {
    let chain = engine.chain().await?;

    engine.lock().await?;

    let result = run_upgrade(engine, &chain).await;

    if let Err(e) = engine.unlock().await {
        tracing::warn!(error = %e, "Failed to release migration lock");
    }

    match &result {
        Ok(report) => {
            tracing::info!(
                applied = report.applied_count(),
                total_time_ms = report.total_time_ms,
                to = ?report.to.as_ref().map(|r| r.raw.as_str()),
                "Upgrade completed"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Upgrade failed");
        }
    }

    result
}

async fn run_upgrade(engine: &dyn MigrationEngine, chain: &RevisionChain) -> Result<UpgradeReport> {
    let from = engine.current().await?;
    let pending: Vec<MigrationRevision> = chain.pending_after(from.as_ref())?.to_vec();

    if pending.is_empty() {
        tracing::info!(current = ?from.as_ref().map(|r| r.raw.as_str()), "Schema is up to date");
    }

    let mut report = UpgradeReport {
        from: from.clone(),
        to: from,
        applied: Vec::with_capacity(pending.len()),
        total_time_ms: 0,
    };

    for revision in &pending {
        match engine.apply(revision).await {
            Ok(ms) => {
                report.total_time_ms += ms;
                report.to = Some(revision.id.clone());
                report.applied.push(AppliedDelta {
                    revision: revision.id.clone(),
                    description: revision.description.clone(),
                    script: revision.script.clone(),
                    execution_time_ms: ms,
                });
            }
            Err(e) => {
                let reason = match e {
                    StewardError::MigrationFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                return Err(StewardError::MigrationFailed {
                    revision: revision.id.raw.clone(),
                    last_applied: report.to.as_ref().map(|r| r.raw.clone()),
                    reason,
                });
            }
        }
    }

    Ok(report)
}

/// The revision recorded in the store, or `None` if uninitialized.
pub async fn current(engine: &dyn MigrationEngine) -> Result<Option<RevisionId>> {
    engine.current().await
}

/// The chain root to head.
pub async fn history(engine: &dyn MigrationEngine) -> Result<RevisionChain> {
    engine.chain().await
}

/// Create an empty delta parented at head.
pub async fn new_revision(engine: &dyn MigrationEngine, message: &str) -> Result<NewRevision> {
    if message.trim().is_empty() {
        return Err(StewardError::ValidationError(
            "Revision message must not be empty".to_string(),
        ));
    }

    let chain = engine.chain().await?;
    let parent = chain.head().map(|h| h.id.clone());
    let revision = parent
        .as_ref()
        .map(RevisionId::successor)
        .unwrap_or_else(RevisionId::initial);

    let path = engine
        .create_revision(&revision, parent.as_ref(), message)
        .await?;

    tracing::info!(revision = %revision, path = %path.display(), "Created revision");

    Ok(NewRevision {
        revision,
        parent,
        path,
    })
}
