//! Database connection, TLS support, advisory locking, and transaction execution.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio_postgres::Client;

use crate::config::{DatabaseConfig, SslMode};
use crate::connection::ConnectionDescriptor;
use crate::error::{Result, StewardError};

/// Quote a SQL identifier to prevent SQL injection.
///
/// Doubles any embedded double-quotes and wraps in double-quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Validate that a SQL identifier contains only safe characters.
///
/// Returns an error for names with characters outside `[a-zA-Z0-9_]`.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StewardError::ConfigError(
            "Identifier cannot be empty".to_string(),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StewardError::ConfigError(format!(
            "Identifier '{}' contains invalid characters. Only [a-zA-Z0-9_] are allowed.",
            name
        )));
    }
    Ok(())
}

/// Build a rustls ClientConfig using the Mozilla CA bundle.
fn make_rustls_config() -> Result<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| StewardError::ConfigError(format!("TLS setup failed: {}", e)))?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(config)
}

async fn connect_plain(pg: &tokio_postgres::Config) -> std::result::Result<Client, tokio_postgres::Error> {
    let (client, connection) = pg.connect(tokio_postgres::NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "Database connection error");
        }
    });
    Ok(client)
}

async fn connect_tls(pg: &tokio_postgres::Config) -> Result<Client> {
    let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_rustls_config()?);
    let (client, connection) = pg.connect(tls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "Database connection error");
        }
    });
    Ok(client)
}

/// Open one connection to the schema store. Never retries.
pub async fn connect(descriptor: &ConnectionDescriptor, settings: &DatabaseConfig) -> Result<Client> {
    let mut pg = descriptor.to_pg_config();
    if descriptor.connect_timeout.is_none() && settings.connect_timeout_secs > 0 {
        pg.connect_timeout(Duration::from_secs(settings.connect_timeout_secs as u64));
    }

    tracing::debug!(target_db = %descriptor, ssl_mode = ?descriptor.ssl_mode, "Connecting to schema store");

    let client = match descriptor.ssl_mode {
        SslMode::Disable => connect_plain(&pg).await?,
        SslMode::Require => connect_tls(&pg).await?,
        SslMode::Prefer => match connect_tls(&pg).await {
            Ok(client) => client,
            Err(e) => {
                tracing::debug!(error = %e, "TLS connection failed, falling back to plaintext");
                connect_plain(&pg).await?
            }
        },
    };

    if !descriptor.search_path.is_empty() {
        let path: Vec<String> = descriptor.search_path.iter().map(|s| quote_ident(s)).collect();
        client
            .batch_execute(&format!("SET search_path TO {}", path.join(", ")))
            .await?;
    }

    if settings.statement_timeout_secs > 0 {
        let timeout_sql = format!("SET statement_timeout = '{}s'", settings.statement_timeout_secs);
        client.batch_execute(&timeout_sql).await?;
    }

    Ok(client)
}

/// A connection opened on first use and shared by the collaborators of one invocation.
///
/// Construction never touches the network, so callers that must not fail
/// (the status report) can decide how to treat a connection failure.
pub struct LazyClient {
    descriptor: ConnectionDescriptor,
    settings: DatabaseConfig,
    cell: OnceCell<Client>,
}

impl LazyClient {
    pub fn new(descriptor: ConnectionDescriptor, settings: DatabaseConfig) -> Self {
        Self {
            descriptor,
            settings,
            cell: OnceCell::new(),
        }
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Get the client, connecting if this is the first call.
    pub async fn get(&self) -> Result<&Client> {
        self.cell
            .get_or_try_init(|| connect(&self.descriptor, &self.settings))
            .await
    }
}

/// Acquire a PostgreSQL advisory lock based on the tracking table name.
///
/// This prevents concurrent upgrades from interfering with each other.
pub async fn acquire_advisory_lock(client: &Client, table_name: &str) -> Result<()> {
    let lock_id = advisory_lock_id(table_name);
    tracing::info!(lock_id = lock_id, table = %table_name, "Acquiring advisory lock");

    client
        .execute("SELECT pg_advisory_lock($1)", &[&lock_id])
        .await
        .map_err(|e| StewardError::LockError(crate::error::format_db_error(&e)))?;

    Ok(())
}

/// Release the PostgreSQL advisory lock.
pub async fn release_advisory_lock(client: &Client, table_name: &str) -> Result<()> {
    let lock_id = advisory_lock_id(table_name);
    tracing::debug!(lock_id = lock_id, table = %table_name, "Releasing advisory lock");

    client
        .execute("SELECT pg_advisory_unlock($1)", &[&lock_id])
        .await
        .map_err(|e| StewardError::LockError(crate::error::format_db_error(&e)))?;

    Ok(())
}

/// Stable lock ID from the table name. CRC32 is stable across compiler versions.
fn advisory_lock_id(table_name: &str) -> i64 {
    crc32fast::hash(table_name.as_bytes()) as i64
}

/// Get the current database user.
pub async fn get_current_user(client: &Client) -> Result<String> {
    let row = client.query_one("SELECT current_user::text", &[]).await?;
    Ok(row.get::<_, String>(0))
}

/// Execute a SQL string within a transaction using SQL-level BEGIN/COMMIT.
/// Returns the execution time in milliseconds.
pub async fn execute_in_transaction(client: &Client, sql: &str) -> Result<i32> {
    let start = std::time::Instant::now();

    client.batch_execute("BEGIN").await?;

    match client.batch_execute(sql).await {
        Ok(()) => {
            client.batch_execute("COMMIT").await?;
        }
        Err(e) => {
            rollback(client).await;
            return Err(StewardError::DatabaseError(e));
        }
    }

    Ok(start.elapsed().as_millis() as i32)
}

/// Best-effort ROLLBACK after a failed statement.
pub async fn rollback(client: &Client) {
    if let Err(rollback_err) = client.batch_execute("ROLLBACK").await {
        tracing::warn!(error = %rollback_err, "Failed to rollback transaction");
    }
}
