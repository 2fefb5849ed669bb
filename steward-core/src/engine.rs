//! The migration engine seam and its SQL-file implementation.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::checksum::matches_recorded;
use crate::config::MigrationSettings;
use crate::db::{self, LazyClient};
use crate::error::{Result, StewardError};
use crate::history::{self, HistoryEntry};
use crate::migration::{
    build_chain, scan_deltas, write_delta_file, MigrationRevision, ResolvedDelta, RevisionChain,
    RevisionId,
};

/// Computes and applies ordered schema deltas.
///
/// The coordinator only ever sees revision metadata; delta contents stay
/// behind this trait.
#[async_trait]
pub trait MigrationEngine: Send + Sync {
    /// The full revision chain, root to head.
    async fn chain(&self) -> Result<RevisionChain>;

    /// The revision recorded in the store, or `None` if uninitialized.
    async fn current(&self) -> Result<Option<RevisionId>>;

    /// Apply one revision. Returns execution time in milliseconds.
    async fn apply(&self, revision: &MigrationRevision) -> Result<i32>;

    /// Create an empty delta parented at `parent`.
    async fn create_revision(
        &self,
        id: &RevisionId,
        parent: Option<&RevisionId>,
        message: &str,
    ) -> Result<PathBuf>;

    async fn lock(&self) -> Result<()> {
        Ok(())
    }

    async fn unlock(&self) -> Result<()> {
        Ok(())
    }

    /// Applied revisions whose delta file changed since it was applied.
    async fn modified_since_applied(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Engine backed by `V{rev}__{desc}.sql` files and a tracking table.
pub struct SqlMigrationEngine {
    client: Arc<LazyClient>,
    settings: MigrationSettings,
}

impl SqlMigrationEngine {
    pub fn new(client: Arc<LazyClient>, settings: MigrationSettings) -> Self {
        Self { client, settings }
    }

    fn scan(&self) -> Result<Vec<ResolvedDelta>> {
        scan_deltas(&self.settings.locations)
    }

    async fn installed_by(&self, client: &tokio_postgres::Client) -> String {
        match self.settings.installed_by {
            Some(ref who) => who.clone(),
            None => db::get_current_user(client)
                .await
                .unwrap_or_else(|_| "unknown".to_string()),
        }
    }
}

#[async_trait]
impl MigrationEngine for SqlMigrationEngine {
    async fn chain(&self) -> Result<RevisionChain> {
        build_chain(&self.scan()?)
    }

    async fn current(&self) -> Result<Option<RevisionId>> {
        let client = self.client.get().await?;
        let (schema, table) = (&self.settings.schema, &self.settings.table);

        if !history::history_table_exists(client, schema, table).await? {
            return Ok(None);
        }

        history::current_revision(client, schema, table)
            .await?
            .map(|raw| RevisionId::parse(&raw))
            .transpose()
    }

    async fn apply(&self, revision: &MigrationRevision) -> Result<i32> {
        let deltas = self.scan()?;
        let delta = deltas.iter().find(|d| d.id == revision.id).ok_or_else(|| {
            StewardError::BrokenChain(format!(
                "Delta file for revision {} disappeared",
                revision.id
            ))
        })?;

        let client = self.client.get().await?;
        let (schema, table) = (&self.settings.schema, &self.settings.table);
        history::create_history_table(client, schema, table).await?;
        let installed_by = self.installed_by(client).await;
        let parent = revision.parent.as_ref().map(|p| p.raw.clone());

        tracing::info!(revision = %revision.id, script = %delta.script, "Applying delta");

        match db::execute_in_transaction(client, &delta.sql).await {
            Ok(exec_time) => {
                history::insert_history_entry(
                    client,
                    schema,
                    table,
                    &HistoryEntry {
                        revision: &revision.id.raw,
                        parent: parent.as_deref(),
                        description: &delta.description,
                        script: &delta.script,
                        checksum: Some(delta.checksum),
                        installed_by: &installed_by,
                        execution_time: exec_time,
                        success: true,
                    },
                )
                .await?;
                tracing::info!(revision = %revision.id, time_ms = exec_time, "Delta applied");
                Ok(exec_time)
            }
            Err(e) => {
                let reason = match &e {
                    StewardError::DatabaseError(db_err) => crate::error::format_db_error(db_err),
                    other => other.to_string(),
                };
                if let Err(record_err) = history::insert_history_entry(
                    client,
                    schema,
                    table,
                    &HistoryEntry {
                        revision: &revision.id.raw,
                        parent: parent.as_deref(),
                        description: &delta.description,
                        script: &delta.script,
                        checksum: Some(delta.checksum),
                        installed_by: &installed_by,
                        execution_time: 0,
                        success: false,
                    },
                )
                .await
                {
                    tracing::warn!(script = %delta.script, error = %record_err, "Failed to record delta failure in tracking table");
                }
                Err(StewardError::MigrationFailed {
                    revision: revision.id.raw.clone(),
                    last_applied: None,
                    reason,
                })
            }
        }
    }

    async fn create_revision(
        &self,
        id: &RevisionId,
        parent: Option<&RevisionId>,
        message: &str,
    ) -> Result<PathBuf> {
        let dir = self.settings.locations.first().ok_or_else(|| {
            StewardError::ConfigError("No migration location configured".to_string())
        })?;
        write_delta_file(dir, id, parent, message)
    }

    async fn lock(&self) -> Result<()> {
        let client = self.client.get().await?;
        db::acquire_advisory_lock(client, &self.settings.table).await
    }

    async fn unlock(&self) -> Result<()> {
        let client = self.client.get().await?;
        db::release_advisory_lock(client, &self.settings.table).await
    }

    async fn modified_since_applied(&self) -> Result<Vec<String>> {
        let client = self.client.get().await?;
        let (schema, table) = (&self.settings.schema, &self.settings.table);
        if !history::history_table_exists(client, schema, table).await? {
            return Ok(Vec::new());
        }

        let applied = history::get_applied_revisions(client, schema, table).await?;
        let deltas = self.scan()?;

        Ok(applied
            .iter()
            .filter(|row| row.success)
            .filter_map(|row| {
                let delta = deltas.iter().find(|d| d.id.raw == row.revision)?;
                (!matches_recorded(&delta.sql, row.checksum)).then(|| delta.script.clone())
            })
            .collect())
    }
}
