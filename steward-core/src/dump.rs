//! The dump/restore utility seam and its `pg_dump`/`psql` implementation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::connection::ConnectionDescriptor;
use crate::error::{Result, StewardError};

/// Exit status and captured stderr of one utility run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Serializes the store to a plain SQL file and replays such files.
///
/// Implementations report utility failures through [`ToolOutput`]; only a
/// failure to start the utility is an `Err`.
#[async_trait]
pub trait DumpTool: Send + Sync {
    async fn dump(
        &self,
        target: &ConnectionDescriptor,
        include_data: bool,
        output: &Path,
    ) -> Result<ToolOutput>;

    async fn restore(&self, target: &ConnectionDescriptor, input: &Path) -> Result<ToolOutput>;
}

/// Runs the PostgreSQL client utilities with credentials in the environment.
pub struct PgTools {
    pg_dump: PathBuf,
    psql: PathBuf,
}

impl PgTools {
    pub fn new(pg_dump: PathBuf, psql: PathBuf) -> Self {
        Self { pg_dump, psql }
    }
}

/// `pg_dump` arguments, excluding connection parameters.
pub fn dump_args(include_data: bool, output: &Path) -> Vec<String> {
    let mut args = vec![
        "--clean".to_string(),
        "--if-exists".to_string(),
        "--no-owner".to_string(),
    ];
    if !include_data {
        args.push("--schema-only".to_string());
    }
    args.push(format!("--file={}", output.display()));
    args
}

/// `psql` arguments, excluding connection parameters.
pub fn restore_args(input: &Path) -> Vec<String> {
    vec![
        "--no-psqlrc".to_string(),
        "--quiet".to_string(),
        "-v".to_string(),
        "ON_ERROR_STOP=1".to_string(),
        format!("--file={}", input.display()),
    ]
}

async fn run(program: &Path, args: &[String], target: &ConnectionDescriptor) -> std::io::Result<ToolOutput> {
    tracing::debug!(program = %program.display(), args = ?args, target = %target, "Running utility");

    let output = Command::new(program)
        .args(args)
        .envs(target.libpq_env())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await?;

    Ok(ToolOutput {
        exit_code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
    })
}

#[async_trait]
impl DumpTool for PgTools {
    async fn dump(
        &self,
        target: &ConnectionDescriptor,
        include_data: bool,
        output: &Path,
    ) -> Result<ToolOutput> {
        run(&self.pg_dump, &dump_args(include_data, output), target)
            .await
            .map_err(|e| {
                StewardError::BackupError(format!(
                    "Failed to start '{}': {}",
                    self.pg_dump.display(),
                    e
                ))
            })
    }

    async fn restore(&self, target: &ConnectionDescriptor, input: &Path) -> Result<ToolOutput> {
        run(&self.psql, &restore_args(input), target)
            .await
            .map_err(|e| StewardError::RestoreError {
                path: input.display().to_string(),
                reason: format!("Failed to start '{}': {}", self.psql.display(), e),
            })
    }
}
