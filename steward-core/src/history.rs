//! The revision tracking table owned by the migration engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_postgres::Client;

use crate::db::quote_ident;
use crate::error::Result;

/// A row from the revision tracking table.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedRevision {
    pub installed_rank: i32,
    pub revision: String,
    pub parent: Option<String>,
    pub description: String,
    pub script: String,
    pub checksum: Option<i32>,
    pub installed_by: String,
    pub installed_on: DateTime<Utc>,
    pub execution_time: i32,
    pub success: bool,
}

/// Values for a new tracking row.
#[derive(Debug, Clone)]
pub struct HistoryEntry<'a> {
    pub revision: &'a str,
    pub parent: Option<&'a str>,
    pub description: &'a str,
    pub script: &'a str,
    pub checksum: Option<i32>,
    pub installed_by: &'a str,
    pub execution_time: i32,
    pub success: bool,
}

fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Create the tracking table if it does not exist.
pub async fn create_history_table(client: &Client, schema: &str, table: &str) -> Result<()> {
    let fq = qualified(schema, table);
    let success_idx = format!("{}_s_idx", table);
    let rev_idx = format!("{}_r_idx", table);
    let sql = format!(
        r#"
CREATE SCHEMA IF NOT EXISTS {schema_q};

CREATE TABLE IF NOT EXISTS {fq} (
    installed_rank INTEGER PRIMARY KEY,
    revision       VARCHAR(50) NOT NULL,
    parent         VARCHAR(50),
    description    VARCHAR(200) NOT NULL,
    script         VARCHAR(1000) NOT NULL,
    checksum       INTEGER,
    installed_by   VARCHAR(100) NOT NULL,
    installed_on   TIMESTAMPTZ NOT NULL DEFAULT now(),
    execution_time INTEGER NOT NULL,
    success        BOOLEAN NOT NULL
);

CREATE INDEX IF NOT EXISTS {success_idx} ON {fq} (success);
CREATE INDEX IF NOT EXISTS {rev_idx} ON {fq} (revision);
"#,
        schema_q = quote_ident(schema),
        fq = fq,
        success_idx = quote_ident(&success_idx),
        rev_idx = quote_ident(&rev_idx),
    );

    client.batch_execute(&sql).await?;
    Ok(())
}

/// Check if the tracking table exists.
pub async fn history_table_exists(client: &Client, schema: &str, table: &str) -> Result<bool> {
    let row = client
        .query_one(
            "SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )",
            &[&schema, &table],
        )
        .await?;

    Ok(row.get::<_, bool>(0))
}

/// All tracking rows in installation order.
pub async fn get_applied_revisions(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<AppliedRevision>> {
    let sql = format!(
        "SELECT installed_rank, revision, parent, description, script, checksum, \
         installed_by, installed_on, execution_time, success \
         FROM {} ORDER BY installed_rank",
        qualified(schema, table)
    );

    let rows = client.query(&sql, &[]).await?;

    let mut applied = Vec::with_capacity(rows.len());
    for row in rows {
        applied.push(AppliedRevision {
            installed_rank: row.get(0),
            revision: row.get(1),
            parent: row.get(2),
            description: row.get(3),
            script: row.get(4),
            checksum: row.get(5),
            installed_by: row.get(6),
            installed_on: row.get(7),
            execution_time: row.get(8),
            success: row.get(9),
        });
    }

    Ok(applied)
}

/// The most recently applied successful revision, if any.
pub async fn current_revision(client: &Client, schema: &str, table: &str) -> Result<Option<String>> {
    let sql = format!(
        "SELECT revision FROM {} WHERE success ORDER BY installed_rank DESC LIMIT 1",
        qualified(schema, table)
    );
    let row = client.query_opt(&sql, &[]).await?;
    Ok(row.map(|r| r.get::<_, String>(0)))
}

/// Insert a tracking row with atomic rank assignment.
///
/// The rank is computed inside the INSERT so a concurrent reader never
/// observes a gap between reading the max rank and inserting.
pub async fn insert_history_entry(
    client: &Client,
    schema: &str,
    table: &str,
    entry: &HistoryEntry<'_>,
) -> Result<()> {
    let fq = qualified(schema, table);
    let sql = format!(
        "INSERT INTO {fq} \
         (installed_rank, revision, parent, description, script, checksum, installed_by, execution_time, success) \
         VALUES (\
            (SELECT COALESCE(MAX(installed_rank), 0) + 1 FROM {fq}), \
            $1, $2, $3, $4, $5, $6, $7, $8\
         )",
        fq = fq,
    );

    client
        .execute(
            &sql,
            &[
                &entry.revision,
                &entry.parent,
                &entry.description,
                &entry.script,
                &entry.checksum,
                &entry.installed_by,
                &entry.execution_time,
                &entry.success,
            ],
        )
        .await?;

    Ok(())
}
