//! Revision identifiers, the revision chain, and delta file parsing.
//!
//! Deltas are files named `V{revision}__{description}.sql`. Sorting them by
//! revision yields the chain; each revision's parent is its predecessor.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::checksum::calculate_checksum;
use crate::error::{Result, StewardError};

static REVISION_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^V([\d._]+)__(.+)$").expect("valid revision file pattern"));
static PARENT_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^--\s*steward:parent\s+(\S+)\s*$").expect("valid parent header pattern")
});
static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug pattern"));

/// Header value marking the root revision.
pub const ROOT_PARENT: &str = "none";

/// A revision identifier with dotted numeric segments (e.g. "1.2.3").
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RevisionId {
    pub segments: Vec<u64>,
    pub raw: String,
}

impl RevisionId {
    /// Parse a revision string like `"1.2.3"` or `"1_2"` into segments.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(StewardError::BrokenChain(
                "Revision identifier is empty".to_string(),
            ));
        }

        let segments: std::result::Result<Vec<u64>, _> =
            raw.split(['.', '_']).map(|s| s.parse::<u64>()).collect();

        let segments = segments.map_err(|e| {
            StewardError::BrokenChain(format!("Invalid revision segment in '{}': {}", raw, e))
        })?;

        Ok(RevisionId {
            segments,
            raw: raw.to_string(),
        })
    }

    /// The next major revision: `3.2` is followed by `4`.
    pub fn successor(&self) -> RevisionId {
        let next = self.segments.first().copied().unwrap_or(0) + 1;
        RevisionId {
            segments: vec![next],
            raw: next.to_string(),
        }
    }

    /// The first revision of an empty chain.
    pub fn initial() -> RevisionId {
        RevisionId {
            segments: vec![1],
            raw: "1".to_string(),
        }
    }
}

impl Ord for RevisionId {
    fn cmp(&self, other: &Self) -> Ordering {
        let max_len = self.segments.len().max(other.segments.len());
        for i in 0..max_len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for RevisionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Serialize for RevisionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// One node of the migration chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRevision {
    pub id: RevisionId,
    pub parent: Option<RevisionId>,
    pub description: String,
    pub script: String,
}

/// An ordered root-to-head chain of revisions.
///
/// Iteration is lazy and can be restarted any number of times.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RevisionChain {
    revisions: Vec<MigrationRevision>,
}

impl RevisionChain {
    /// Build a chain, checking that it is strictly ordered, has exactly one
    /// root, and that every parent is the preceding element.
    pub fn new(revisions: Vec<MigrationRevision>) -> Result<Self> {
        let mut previous: Option<&MigrationRevision> = None;
        for rev in &revisions {
            match (previous, &rev.parent) {
                (None, None) => {}
                (None, Some(parent)) => {
                    return Err(StewardError::BrokenChain(format!(
                        "Root revision {} declares parent {}",
                        rev.id, parent
                    )))
                }
                (Some(prev), None) => {
                    return Err(StewardError::BrokenChain(format!(
                        "Revision {} has no parent but follows {}; only the root may be parentless",
                        rev.id, prev.id
                    )))
                }
                (Some(prev), Some(parent)) => {
                    if rev.id <= prev.id {
                        return Err(StewardError::BrokenChain(format!(
                            "Revision {} is not ordered after {} (duplicate or out of order)",
                            rev.id, prev.id
                        )));
                    }
                    if parent != &prev.id {
                        return Err(StewardError::BrokenChain(format!(
                            "Revision {} declares parent {} but follows {}",
                            rev.id, parent, prev.id
                        )));
                    }
                }
            }
            previous = Some(rev);
        }
        Ok(Self { revisions })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MigrationRevision> {
        self.revisions.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &RevisionId> + '_ {
        self.revisions.iter().map(|r| &r.id)
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn head(&self) -> Option<&MigrationRevision> {
        self.revisions.last()
    }

    pub fn position(&self, id: &RevisionId) -> Option<usize> {
        self.revisions.iter().position(|r| &r.id == id)
    }

    /// Revisions after `current` (all of them when `current` is `None`).
    ///
    /// Fails when `current` is not a node of this chain.
    pub fn pending_after(&self, current: Option<&RevisionId>) -> Result<&[MigrationRevision]> {
        match current {
            None => Ok(&self.revisions),
            Some(id) => match self.position(id) {
                Some(idx) => Ok(&self.revisions[idx + 1..]),
                None => Err(StewardError::BrokenChain(format!(
                    "Current revision {} is not part of the migration chain",
                    id
                ))),
            },
        }
    }
}

impl<'a> IntoIterator for &'a RevisionChain {
    type Item = &'a MigrationRevision;
    type IntoIter = std::slice::Iter<'a, MigrationRevision>;

    fn into_iter(self) -> Self::IntoIter {
        self.revisions.iter()
    }
}

/// A delta file discovered on disk.
#[derive(Debug, Clone)]
pub struct ResolvedDelta {
    pub id: RevisionId,
    pub declared_parent: Option<String>,
    pub description: String,
    pub script: String,
    pub path: PathBuf,
    pub checksum: i32,
    pub sql: String,
}

/// Parse a delta filename into its revision and description.
pub fn parse_delta_filename(filename: &str) -> Result<(RevisionId, String)> {
    let stem = filename.strip_suffix(".sql").ok_or_else(|| {
        StewardError::BrokenChain(format!(
            "Delta file '{}' does not have .sql extension",
            filename
        ))
    })?;

    let caps = REVISION_FILE_RE.captures(stem).ok_or_else(|| {
        StewardError::BrokenChain(format!(
            "Delta file '{}' does not match V{{revision}}__{{description}}.sql",
            filename
        ))
    })?;

    let id = RevisionId::parse(&caps[1])?;
    let description = caps[2].replace('_', " ");
    Ok((id, description))
}

/// Read the `-- steward:parent` header if present.
pub fn declared_parent(sql: &str) -> Option<String> {
    PARENT_HEADER_RE
        .captures(sql)
        .map(|caps| caps[1].to_string())
}

/// Scan locations for delta files, sorted by revision.
pub fn scan_deltas(locations: &[PathBuf]) -> Result<Vec<ResolvedDelta>> {
    let mut deltas = Vec::new();

    for location in locations {
        if !location.exists() {
            tracing::warn!("Migration location does not exist: {}", location.display());
            continue;
        }

        let entries = std::fs::read_dir(location).map_err(|e| {
            StewardError::IoError(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to read migration directory '{}': {}",
                    location.display(),
                    e
                ),
            ))
        })?;

        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            if !filename.ends_with(".sql") || !filename.starts_with('V') {
                continue;
            }

            let (id, description) = parse_delta_filename(&filename)?;
            let sql = std::fs::read_to_string(&path)?;

            deltas.push(ResolvedDelta {
                id,
                declared_parent: declared_parent(&sql),
                description,
                script: filename,
                path,
                checksum: calculate_checksum(&sql),
                sql,
            });
        }
    }

    deltas.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(deltas)
}

/// Link sorted deltas into a validated chain.
pub fn build_chain(deltas: &[ResolvedDelta]) -> Result<RevisionChain> {
    let mut revisions: Vec<MigrationRevision> = Vec::with_capacity(deltas.len());

    for delta in deltas {
        let parent = revisions.last().map(|r| r.id.clone());

        if let Some(ref declared) = delta.declared_parent {
            let matches = match &parent {
                None => declared == ROOT_PARENT,
                Some(p) => RevisionId::parse(declared).map(|d| &d == p).unwrap_or(false),
            };
            if !matches {
                return Err(StewardError::BrokenChain(format!(
                    "{} declares parent '{}' but its predecessor is {}",
                    delta.script,
                    declared,
                    parent.as_ref().map(|p| p.raw.as_str()).unwrap_or(ROOT_PARENT)
                )));
            }
        }

        revisions.push(MigrationRevision {
            id: delta.id.clone(),
            parent,
            description: delta.description.clone(),
            script: delta.script.clone(),
        });
    }

    RevisionChain::new(revisions)
}

/// Turn a revision message into a filename-safe description.
pub fn slugify(message: &str) -> String {
    let lower = message.trim().to_lowercase();
    let slug = SLUG_RE.replace_all(&lower, "_");
    let slug = slug.trim_matches('_');
    let mut slug: String = slug.chars().take(60).collect();
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        "revision".to_string()
    } else {
        slug
    }
}

/// Write an empty delta file for a new revision. Refuses to overwrite.
pub fn write_delta_file(
    dir: &Path,
    id: &RevisionId,
    parent: Option<&RevisionId>,
    message: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let filename = format!("V{}__{}.sql", id, slugify(message));
    let path = dir.join(&filename);
    if path.exists() {
        return Err(StewardError::ValidationError(format!(
            "Delta file '{}' already exists",
            path.display()
        )));
    }

    let content = format!(
        "-- steward:parent {}\n-- {}\n-- Created {}\n\n",
        parent.map(|p| p.raw.as_str()).unwrap_or(ROOT_PARENT),
        message.trim().replace('\n', " "),
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
    );
    std::fs::write(&path, content)?;
    Ok(path)
}
