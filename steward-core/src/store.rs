//! The schema store seam: connectivity, row counts, seeding, and the wipe.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_postgres::Client;

use crate::config::MigrationSettings;
use crate::db::{self, quote_ident, LazyClient};
use crate::error::{format_db_error, Result, StewardError};
use crate::seed::data::{OrgUnitSeed, PermissionSeed, PositionSeed, UserSeed};

/// Entities reported by the detailed status and touched by seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    OrgUnits,
    Positions,
    Permissions,
    Users,
}

impl Entity {
    pub const ALL: [Entity; 4] = [
        Entity::OrgUnits,
        Entity::Positions,
        Entity::Permissions,
        Entity::Users,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Entity::OrgUnits => "org_units",
            Entity::Positions => "positions",
            Entity::Permissions => "permissions",
            Entity::Users => "users",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Entity::OrgUnits => "organization.org_units",
            Entity::Positions => "organization.positions",
            Entity::Permissions => "security.permissions",
            Entity::Users => "security.users",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A seed user with its password already hashed.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub seed: UserSeed,
    pub password_hash: String,
}

/// One seed step's records, all of one entity.
#[derive(Debug, Clone)]
pub enum SeedBatch {
    Permissions(Vec<PermissionSeed>),
    OrgUnits(Vec<OrgUnitSeed>),
    Positions(Vec<PositionSeed>),
    Users(Vec<UserRecord>),
}

impl SeedBatch {
    pub fn entity(&self) -> Entity {
        match self {
            SeedBatch::Permissions(_) => Entity::Permissions,
            SeedBatch::OrgUnits(_) => Entity::OrgUnits,
            SeedBatch::Positions(_) => Entity::Positions,
            SeedBatch::Users(_) => Entity::Users,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SeedBatch::Permissions(v) => v.len(),
            SeedBatch::OrgUnits(v) => v.len(),
            SeedBatch::Positions(v) => v.len(),
            SeedBatch::Users(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rows inserted versus rows already present (matched by natural key).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedCount {
    pub created: usize,
    pub skipped: usize,
}

#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Check connectivity.
    async fn probe(&self) -> Result<()>;

    /// Create missing managed schemas. Returns the names created.
    async fn ensure_schemas(&self) -> Result<Vec<String>>;

    async fn count_rows(&self, entity: Entity) -> Result<i64>;

    /// Drop and recreate every structural object, including the tracking table.
    /// Returns a description of each dropped object.
    async fn wipe(&self) -> Result<Vec<String>>;

    /// Insert one batch in a single transaction, skipping existing natural keys.
    async fn seed(&self, batch: &SeedBatch) -> Result<SeedCount>;
}

/// PostgreSQL-backed store sharing the invocation's lazy connection.
pub struct PgSchemaStore {
    client: Arc<LazyClient>,
    settings: MigrationSettings,
}

impl PgSchemaStore {
    pub fn new(client: Arc<LazyClient>, settings: MigrationSettings) -> Self {
        Self { client, settings }
    }
}

async fn schema_exists(client: &Client, schema: &str) -> Result<bool> {
    let row = client
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = $1)",
            &[&schema],
        )
        .await?;
    Ok(row.get::<_, bool>(0))
}

/// Drop every user object in `schema`, leaving the schema itself in place.
async fn drop_schema_objects(client: &Client, schema: &str, dropped: &mut Vec<String>) -> Result<()> {
    let schema_q = quote_ident(schema);

    let rows = client
        .query(
            "SELECT matviewname FROM pg_matviews WHERE schemaname = $1",
            &[&schema],
        )
        .await?;
    for row in rows {
        let name: String = row.get(0);
        client
            .batch_execute(&format!(
                "DROP MATERIALIZED VIEW IF EXISTS {}.{} CASCADE",
                schema_q,
                quote_ident(&name)
            ))
            .await?;
        dropped.push(format!("Materialized view: {}.{}", schema, name));
    }

    let rows = client
        .query(
            "SELECT table_name FROM information_schema.views WHERE table_schema = $1",
            &[&schema],
        )
        .await?;
    for row in rows {
        let name: String = row.get(0);
        client
            .batch_execute(&format!(
                "DROP VIEW IF EXISTS {}.{} CASCADE",
                schema_q,
                quote_ident(&name)
            ))
            .await?;
        dropped.push(format!("View: {}.{}", schema, name));
    }

    let rows = client
        .query(
            "SELECT tablename FROM pg_tables WHERE schemaname = $1",
            &[&schema],
        )
        .await?;
    for row in rows {
        let name: String = row.get(0);
        client
            .batch_execute(&format!(
                "DROP TABLE IF EXISTS {}.{} CASCADE",
                schema_q,
                quote_ident(&name)
            ))
            .await?;
        dropped.push(format!("Table: {}.{}", schema, name));
    }

    let rows = client
        .query(
            "SELECT sequence_name FROM information_schema.sequences WHERE sequence_schema = $1",
            &[&schema],
        )
        .await?;
    for row in rows {
        let name: String = row.get(0);
        client
            .batch_execute(&format!(
                "DROP SEQUENCE IF EXISTS {}.{} CASCADE",
                schema_q,
                quote_ident(&name)
            ))
            .await?;
        dropped.push(format!("Sequence: {}.{}", schema, name));
    }

    // Extension-owned functions and types are left to their extension
    let rows = client
        .query(
            "SELECT p.proname, pg_get_function_identity_arguments(p.oid) \
             FROM pg_proc p \
             JOIN pg_namespace n ON p.pronamespace = n.oid \
             WHERE n.nspname = $1 \
             AND NOT EXISTS (SELECT 1 FROM pg_depend d WHERE d.objid = p.oid AND d.deptype = 'e')",
            &[&schema],
        )
        .await?;
    for row in rows {
        let name: String = row.get(0);
        let args: String = row.get(1);
        client
            .batch_execute(&format!(
                "DROP FUNCTION IF EXISTS {}.{}({}) CASCADE",
                schema_q,
                quote_ident(&name),
                args
            ))
            .await?;
        dropped.push(format!("Function: {}.{}", schema, name));
    }

    let rows = client
        .query(
            "SELECT t.typname \
             FROM pg_type t \
             JOIN pg_namespace n ON t.typnamespace = n.oid \
             WHERE n.nspname = $1 \
             AND t.typtype IN ('e', 'c') \
             AND t.typname NOT LIKE '\\_%' \
             AND NOT EXISTS (SELECT 1 FROM pg_depend d WHERE d.objid = t.oid AND d.deptype = 'e') \
             AND NOT EXISTS (SELECT 1 FROM pg_class c WHERE c.oid = t.typrelid AND c.relkind <> 'c')",
            &[&schema],
        )
        .await?;
    for row in rows {
        let name: String = row.get(0);
        client
            .batch_execute(&format!(
                "DROP TYPE IF EXISTS {}.{} CASCADE",
                schema_q,
                quote_ident(&name)
            ))
            .await?;
        dropped.push(format!("Type: {}.{}", schema, name));
    }

    Ok(())
}

async fn run_wipe(client: &Client, settings: &MigrationSettings) -> Result<Vec<String>> {
    let mut dropped = Vec::new();

    for schema in &settings.managed_schemas {
        let existed = schema_exists(client, schema).await?;
        let schema_q = quote_ident(schema);
        client
            .batch_execute(&format!(
                "DROP SCHEMA IF EXISTS {schema_q} CASCADE; CREATE SCHEMA {schema_q};"
            ))
            .await?;
        if existed {
            dropped.push(format!("Schema: {}", schema));
        }
    }

    if !settings.managed_schemas.contains(&settings.schema) {
        drop_schema_objects(client, &settings.schema, &mut dropped).await?;
    }

    Ok(dropped)
}

async fn insert_counted(
    client: &Client,
    sql: &str,
    params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    count: &mut SeedCount,
) -> Result<()> {
    if client.execute(sql, params).await? == 1 {
        count.created += 1;
    } else {
        count.skipped += 1;
    }
    Ok(())
}

const INSERT_PERMISSION: &str = "INSERT INTO security.permissions (code, name, description, module, kind) \
     VALUES ($1, $2, $3, $4, $5) \
     ON CONFLICT (code) DO NOTHING";

const INSERT_ORG_UNIT: &str = "INSERT INTO organization.org_units (code, name, kind, description, level, parent_id) \
     VALUES ($1, $2, $3, $4, $5, (SELECT id FROM organization.org_units WHERE code = $6)) \
     ON CONFLICT (code) DO NOTHING";

const INSERT_POSITION: &str = "INSERT INTO organization.positions (code, name, description, org_unit_id, superior_id, rank_level) \
     VALUES ($1, $2, $3, \
        (SELECT id FROM organization.org_units WHERE code = $4), \
        (SELECT id FROM organization.positions WHERE code = $5), \
        $6) \
     ON CONFLICT (code) DO NOTHING";

const INSERT_USER: &str = "INSERT INTO security.users \
     (username, email, password_hash, first_names, last_names, national_id, phone, user_type, status, position_id) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, (SELECT id FROM organization.positions WHERE code = $10)) \
     ON CONFLICT (username) DO NOTHING";

async fn run_seed(client: &Client, batch: &SeedBatch) -> Result<SeedCount> {
    let mut count = SeedCount::default();

    match batch {
        SeedBatch::Permissions(perms) => {
            for p in perms {
                insert_counted(
                    client,
                    INSERT_PERMISSION,
                    &[&p.code, &p.name, &p.description, &p.module, &p.kind],
                    &mut count,
                )
                .await?;
            }
        }
        SeedBatch::OrgUnits(units) => {
            for u in units {
                insert_counted(
                    client,
                    INSERT_ORG_UNIT,
                    &[&u.code, &u.name, &u.kind, &u.description, &u.level, &u.parent],
                    &mut count,
                )
                .await?;
            }
        }
        SeedBatch::Positions(positions) => {
            for p in positions {
                insert_counted(
                    client,
                    INSERT_POSITION,
                    &[&p.code, &p.name, &p.description, &p.org_unit, &p.superior, &p.rank_level],
                    &mut count,
                )
                .await?;
            }
        }
        SeedBatch::Users(users) => {
            for u in users {
                let s = &u.seed;
                insert_counted(
                    client,
                    INSERT_USER,
                    &[
                        &s.username,
                        &s.email,
                        &u.password_hash,
                        &s.first_names,
                        &s.last_names,
                        &s.national_id,
                        &s.phone,
                        &s.user_type,
                        &s.status,
                        &s.position,
                    ],
                    &mut count,
                )
                .await?;
            }
        }
    }

    Ok(count)
}

#[async_trait]
impl SchemaStore for PgSchemaStore {
    async fn probe(&self) -> Result<()> {
        let client = self.client.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    async fn ensure_schemas(&self) -> Result<Vec<String>> {
        let client = self.client.get().await?;
        let mut created = Vec::new();
        for schema in &self.settings.managed_schemas {
            if !schema_exists(client, schema).await? {
                client
                    .batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))
                    .await?;
                tracing::info!(schema = %schema, "Created schema");
                created.push(schema.clone());
            }
        }
        Ok(created)
    }

    async fn count_rows(&self, entity: Entity) -> Result<i64> {
        let client = self.client.get().await?;
        let row = client
            .query_one(&format!("SELECT COUNT(*) FROM {}", entity.table()), &[])
            .await?;
        Ok(row.get::<_, i64>(0))
    }

    async fn wipe(&self) -> Result<Vec<String>> {
        let client = self.client.get().await.map_err(|e| StewardError::WipeFailed(e.to_string()))?;

        tracing::warn!(
            schemas = ?self.settings.managed_schemas,
            tracking_schema = %self.settings.schema,
            "Starting wipe, this will DROP every object in the managed schemas"
        );

        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| StewardError::WipeFailed(format_db_error(&e)))?;

        match run_wipe(client, &self.settings).await {
            Ok(dropped) => {
                client
                    .batch_execute("COMMIT")
                    .await
                    .map_err(|e| StewardError::WipeFailed(format_db_error(&e)))?;
                tracing::warn!(objects_dropped = dropped.len(), "Wipe completed");
                Ok(dropped)
            }
            Err(e) => {
                db::rollback(client).await;
                let reason = match e {
                    StewardError::DatabaseError(ref db_err) => format_db_error(db_err),
                    other => other.to_string(),
                };
                Err(StewardError::WipeFailed(reason))
            }
        }
    }

    async fn seed(&self, batch: &SeedBatch) -> Result<SeedCount> {
        let client = self.client.get().await?;
        client.batch_execute("BEGIN").await?;

        match run_seed(client, batch).await {
            Ok(count) => {
                client.batch_execute("COMMIT").await?;
                Ok(count)
            }
            Err(e) => {
                db::rollback(client).await;
                Err(e)
            }
        }
    }
}
