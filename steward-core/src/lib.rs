pub mod checksum;
pub mod commands;
pub mod config;
pub mod connection;
pub mod db;
pub mod dump;
pub mod engine;
pub mod error;
pub mod history;
pub mod migration;
pub mod seed;
pub mod store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::StewardConfig;
use connection::ConnectionDescriptor;
use db::LazyClient;
use dump::{DumpTool, PgTools};
use engine::{MigrationEngine, SqlMigrationEngine};
use error::Result;
use store::{PgSchemaStore, SchemaStore};

pub use commands::backup::{BackupArtifact, BackupOptions, RestoreReport};
pub use commands::init::InitReport;
pub use commands::migrate::{NewRevision, UpgradeReport};
pub use commands::reset::{ConfirmationSource, Prompter, ResetReport, ResetState};
pub use commands::seed::SeedSummary;
pub use commands::status::{RowCount, StatusReport};
pub use config::CliOverrides;
pub use migration::{MigrationRevision, RevisionChain, RevisionId};
pub use seed::Scenario;

/// Main entry point for the steward library.
///
/// One instance serves one command invocation. Construction resolves the
/// connection descriptor but does not connect; the first operation that
/// needs the store opens the connection.
pub struct Steward {
    pub config: StewardConfig,
    descriptor: ConnectionDescriptor,
    store: Arc<dyn SchemaStore>,
    engine: Arc<dyn MigrationEngine>,
    tools: Arc<dyn DumpTool>,
}

impl Steward {
    /// Create an instance backed by PostgreSQL and the client utilities.
    pub fn new(config: StewardConfig) -> Result<Self> {
        let descriptor = connection::resolve(&config)?;
        let client = Arc::new(LazyClient::new(descriptor.clone(), config.database.clone()));
        let store = Arc::new(PgSchemaStore::new(client.clone(), config.migrations.clone()));
        let engine = Arc::new(SqlMigrationEngine::new(client, config.migrations.clone()));
        let tools = Arc::new(PgTools::new(
            config.backup.pg_dump.clone(),
            config.backup.psql.clone(),
        ));
        Ok(Self::with_backends(config, descriptor, store, engine, tools))
    }

    /// Create an instance with caller-supplied collaborators.
    pub fn with_backends(
        config: StewardConfig,
        descriptor: ConnectionDescriptor,
        store: Arc<dyn SchemaStore>,
        engine: Arc<dyn MigrationEngine>,
        tools: Arc<dyn DumpTool>,
    ) -> Self {
        Self {
            config,
            descriptor,
            store,
            engine,
            tools,
        }
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Create the managed schemas and upgrade to head.
    pub async fn init_db(&self) -> Result<InitReport> {
        commands::init::execute(self.store.as_ref(), self.engine.as_ref()).await
    }

    /// Apply all pending revisions.
    pub async fn upgrade(&self) -> Result<UpgradeReport> {
        commands::migrate::upgrade(self.engine.as_ref()).await
    }

    pub async fn current(&self) -> Result<Option<RevisionId>> {
        commands::migrate::current(self.engine.as_ref()).await
    }

    pub async fn history(&self) -> Result<RevisionChain> {
        commands::migrate::history(self.engine.as_ref()).await
    }

    /// Create an empty revision parented at head.
    pub async fn new_revision(&self, message: &str) -> Result<NewRevision> {
        commands::migrate::new_revision(self.engine.as_ref(), message).await
    }

    pub async fn seed(&self, scenario: Scenario, extended_org: bool) -> Result<SeedSummary> {
        commands::seed::execute(self.store.as_ref(), scenario, extended_org).await
    }

    /// Infallible snapshot of connectivity, migration position, and (detailed) row counts.
    pub async fn status(&self, detailed: bool) -> StatusReport {
        commands::status::report(
            self.store.as_ref(),
            self.engine.as_ref(),
            &self.config.backup,
            detailed,
        )
        .await
    }

    pub async fn backup(&self, opts: &BackupOptions) -> Result<BackupArtifact> {
        commands::backup::backup(self.tools.as_ref(), &self.descriptor, &self.config.backup, opts)
            .await
    }

    pub async fn restore(&self, path: &Path) -> Result<RestoreReport> {
        commands::backup::restore(self.tools.as_ref(), &self.descriptor, path).await
    }

    /// Wipe and optionally reinitialize the store, gated by `source`.
    pub async fn reset(&self, source: ConfirmationSource, reinit: bool) -> Result<ResetReport> {
        let opts = commands::reset::ResetOptions {
            reinit,
            confirm_timeout: Duration::from_secs(self.config.reset.confirm_timeout_secs),
        };
        commands::reset::execute(
            self.store.as_ref(),
            self.engine.as_ref(),
            &self.descriptor.database,
            source,
            &opts,
        )
        .await
    }
}
