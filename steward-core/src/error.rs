use thiserror::Error;

/// Extract the full error message from a tokio_postgres::Error,
/// including the underlying DbError details that Display hides.
pub fn format_db_error(e: &tokio_postgres::Error) -> String {
    if let Some(db_err) = e.as_db_error() {
        let mut msg = db_err.message().to_string();
        if let Some(detail) = db_err.detail() {
            msg.push_str(&format!("\n  Detail: {}", detail));
        }
        if let Some(hint) = db_err.hint() {
            msg.push_str(&format!("\n  Hint: {}", hint));
        }
        return msg;
    }
    // Connection-level failures carry their cause in the source chain
    let mut msg = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        msg.push_str(&format!(": {}", s));
        source = s.source();
    }
    msg
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "terminated by signal".to_string(),
    }
}

fn describe_last_applied(last: &Option<String>) -> String {
    match last {
        Some(rev) => format!("last applied revision: {}", rev),
        None => "no revision was applied".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum StewardError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("Unknown seed scenario '{0}'. Known scenarios: basic, complete")]
    UnknownScenario(String),

    #[error("Database error: {}", format_db_error(.0))]
    DatabaseError(#[from] tokio_postgres::Error),

    #[error("Migration {revision} failed ({}): {reason}", describe_last_applied(.last_applied))]
    MigrationFailed {
        revision: String,
        last_applied: Option<String>,
        reason: String,
    },

    #[error("Migration chain is broken: {0}")]
    BrokenChain(String),

    #[error("Failed to acquire advisory lock: {0}")]
    LockError(String),

    #[error("Backup failed: {0}")]
    BackupError(String),

    #[error("Dump utility failed ({}):\n{stderr}", describe_exit(.exit_code))]
    BackupToolFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Cannot restore '{path}': {reason}")]
    RestoreError { path: String, reason: String },

    #[error("Restore utility failed ({}):\n{stderr}", describe_exit(.exit_code))]
    RestoreToolFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Seed step '{step}' failed after {completed_steps} completed step(s): {reason}")]
    SeedFailed {
        step: String,
        completed_steps: usize,
        reason: String,
    },

    #[error("Wipe failed, schema store state is undefined: {0}")]
    WipeFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StewardError>;
