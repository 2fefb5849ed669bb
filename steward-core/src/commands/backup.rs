//! Dump/restore manager: artifact naming, compression, backup, and restore.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::BackupSettings;
use crate::connection::ConnectionDescriptor;
use crate::dump::DumpTool;
use crate::error::{Result, StewardError};

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";
/// Names written before millisecond precision.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const MAX_NAME_ATTEMPTS: usize = 1000;

/// A backup file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub compressed: bool,
    pub include_data: bool,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub include_data: bool,
    pub compress: bool,
    /// Write here instead of a generated name in the backup directory.
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub path: PathBuf,
    pub compressed: bool,
    /// Anything the utility printed to stderr on success.
    pub warnings: String,
}

/// `{prefix}_{YYYYMMDDTHHMMSSmmmZ}_{full|schema}.sql[.gz]`
///
/// The fixed-width UTC timestamp makes lexical order chronological.
pub fn artifact_file_name(
    prefix: &str,
    created_at: DateTime<Utc>,
    include_data: bool,
    compressed: bool,
) -> String {
    format!(
        "{}_{}_{}.sql{}",
        prefix,
        created_at.format(TIMESTAMP_FORMAT),
        if include_data { "full" } else { "schema" },
        if compressed { ".gz" } else { "" }
    )
}

/// Inverse of [`artifact_file_name`]: `(created_at, include_data, compressed)`.
pub fn parse_artifact_name(prefix: &str, name: &str) -> Option<(DateTime<Utc>, bool, bool)> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('_')?;
    let (rest, compressed) = match rest.strip_suffix(".gz") {
        Some(r) => (r, true),
        None => (rest, false),
    };
    let rest = rest.strip_suffix(".sql")?;
    let (stamp, kind) = rest.split_once('_')?;
    let include_data = match kind {
        "full" => true,
        "schema" => false,
        _ => return None,
    };
    let created_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(stamp, LEGACY_TIMESTAMP_FORMAT))
        .ok()?
        .and_utc();
    Some((created_at, include_data, compressed))
}

/// Artifacts in `dir` matching the naming scheme, oldest first.
pub fn list_artifacts(dir: &Path, prefix: &str) -> Result<Vec<BackupArtifact>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut artifacts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((created_at, include_data, compressed)) = parse_artifact_name(prefix, name) else {
            continue;
        };
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        artifacts.push(BackupArtifact {
            path,
            created_at,
            compressed,
            include_data,
            size_bytes: meta.len(),
        });
    }

    artifacts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.path.cmp(&b.path)));
    Ok(artifacts)
}

pub fn latest_artifact(dir: &Path, prefix: &str) -> Result<Option<BackupArtifact>> {
    Ok(list_artifacts(dir, prefix)?.pop())
}

fn has_gz_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

fn gzip_into(src: &Path, dst: &File) -> io::Result<()> {
    let mut input = BufReader::new(File::open(src)?);
    let mut encoder = GzEncoder::new(BufWriter::new(dst), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()
}

fn gunzip_into(src: &Path, dst: &File) -> io::Result<()> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(src)?));
    let mut output = BufWriter::new(dst);
    io::copy(&mut decoder, &mut output)?;
    output.flush()
}

/// Dump the store to a new artifact.
///
/// Output goes to a temporary file next to the destination and is renamed
/// into place only after the dump (and compression) succeed. Existing files
/// are never overwritten.
pub async fn backup(
    tools: &dyn DumpTool,
    target: &ConnectionDescriptor,
    settings: &BackupSettings,
    opts: &BackupOptions,
) -> Result<BackupArtifact> {
    let mut created_at = Utc::now();

    let path = match opts.output {
        Some(ref output) => {
            if has_gz_extension(output) != opts.compress {
                return Err(StewardError::ValidationError(format!(
                    "Output '{}' {} a .gz extension but compression is {}",
                    output.display(),
                    if has_gz_extension(output) { "has" } else { "lacks" },
                    if opts.compress { "on" } else { "off" }
                )));
            }
            output.clone()
        }
        None => {
            // Step past names taken within the same millisecond
            let mut path = settings.directory.join(artifact_file_name(
                &settings.prefix,
                created_at,
                opts.include_data,
                opts.compress,
            ));
            for _ in 0..MAX_NAME_ATTEMPTS {
                if !path.exists() {
                    break;
                }
                created_at += chrono::Duration::milliseconds(1);
                path = settings.directory.join(artifact_file_name(
                    &settings.prefix,
                    created_at,
                    opts.include_data,
                    opts.compress,
                ));
            }
            path
        }
    };

    if path.exists() {
        return Err(StewardError::BackupError(format!(
            "'{}' already exists",
            path.display()
        )));
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| {
        StewardError::BackupError(format!("Cannot create '{}': {}", dir.display(), e))
    })?;

    let raw = NamedTempFile::new_in(&dir).map_err(|e| {
        StewardError::BackupError(format!("Cannot create temporary file in '{}': {}", dir.display(), e))
    })?;

    tracing::info!(
        target_db = %target,
        include_data = opts.include_data,
        compress = opts.compress,
        "Starting backup"
    );

    let out = tools.dump(target, opts.include_data, raw.path()).await?;
    if !out.success() {
        return Err(StewardError::BackupToolFailed {
            exit_code: out.exit_code,
            stderr: out.stderr,
        });
    }

    let finished = if opts.compress {
        let gz = NamedTempFile::new_in(&dir).map_err(|e| {
            StewardError::BackupError(format!("Cannot create temporary file in '{}': {}", dir.display(), e))
        })?;
        tokio::task::spawn_blocking(move || gzip_into(raw.path(), gz.as_file()).map(|()| gz))
            .await
            .map_err(|e| StewardError::BackupError(format!("Compression task failed: {}", e)))?
            .map_err(|e| StewardError::BackupError(format!("Compression failed: {}", e)))?
    } else {
        raw
    };

    finished.persist_noclobber(&path).map_err(|e| {
        StewardError::BackupError(format!("Cannot move backup to '{}': {}", path.display(), e.error))
    })?;

    let size_bytes = std::fs::metadata(&path)?.len();
    tracing::info!(path = %path.display(), size_bytes, "Backup written");

    Ok(BackupArtifact {
        path,
        created_at,
        compressed: opts.compress,
        include_data: opts.include_data,
        size_bytes,
    })
}

/// Replay an artifact into the store.
///
/// Checks that the file exists and that its gzip magic agrees with its
/// extension before the utility runs. Not transactional.
pub async fn restore(
    tools: &dyn DumpTool,
    target: &ConnectionDescriptor,
    path: &Path,
) -> Result<RestoreReport> {
    let restore_err = |reason: String| StewardError::RestoreError {
        path: path.display().to_string(),
        reason,
    };

    if !path.is_file() {
        return Err(restore_err("file not found".to_string()));
    }

    let mut magic = [0u8; 2];
    let read = File::open(path)
        .and_then(|mut f| {
            let mut n = 0;
            while n < magic.len() {
                match f.read(&mut magic[n..])? {
                    0 => break,
                    k => n += k,
                }
            }
            Ok(n)
        })
        .map_err(|e| restore_err(format!("unreadable: {}", e)))?;

    let is_gzip = read == GZIP_MAGIC.len() && magic == GZIP_MAGIC;
    let compressed = has_gz_extension(path);
    if is_gzip != compressed {
        return Err(restore_err(format!(
            "extension says {} but content is {}",
            if compressed { "gzip" } else { "plain SQL" },
            if is_gzip { "gzip" } else { "not gzip" }
        )));
    }

    tracing::info!(path = %path.display(), target_db = %target, compressed, "Starting restore");

    let out = if compressed {
        let plain = NamedTempFile::new().map_err(|e| restore_err(format!("temporary file: {}", e)))?;
        let src = path.to_path_buf();
        let plain = tokio::task::spawn_blocking(move || gunzip_into(&src, plain.as_file()).map(|()| plain))
            .await
            .map_err(|e| restore_err(format!("decompression task failed: {}", e)))?
            .map_err(|e| restore_err(format!("decompression failed: {}", e)))?;
        tools.restore(target, plain.path()).await?
    } else {
        tools.restore(target, path).await?
    };

    if !out.success() {
        return Err(StewardError::RestoreToolFailed {
            exit_code: out.exit_code,
            stderr: out.stderr,
        });
    }

    tracing::info!(path = %path.display(), "Restore completed");

    Ok(RestoreReport {
        path: path.to_path_buf(),
        compressed,
        warnings: out.stderr,
    })
}
