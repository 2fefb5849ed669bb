//! Schema initialization: managed schemas, then upgrade to head.

use serde::Serialize;

use super::migrate::{self, UpgradeReport};
use crate::engine::MigrationEngine;
use crate::error::Result;
use crate::store::SchemaStore;

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub created_schemas: Vec<String>,
    pub upgrade: UpgradeReport,
}

pub async fn execute(store: &dyn SchemaStore, engine: &dyn MigrationEngine) -> Result<InitReport> {
    let created_schemas = store.ensure_schemas().await?;
    let upgrade = migrate::upgrade(engine).await?;
    Ok(InitReport {
        created_schemas,
        upgrade,
    })
}
