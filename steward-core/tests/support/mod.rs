//! In-memory collaborators for driving `Steward` without PostgreSQL.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use steward_core::config::StewardConfig;
use steward_core::connection::ConnectionDescriptor;
use steward_core::dump::{DumpTool, ToolOutput};
use steward_core::engine::MigrationEngine;
use steward_core::error::{Result, StewardError};
use steward_core::store::{Entity, SchemaStore, SeedBatch, SeedCount};
use steward_core::{MigrationRevision, Prompter, RevisionChain, RevisionId, Steward};

pub const DATABASE: &str = "orgdb";

/// Everything the fakes share: the "database" plus failure switches.
#[derive(Debug, Default)]
pub struct World {
    pub reachable: bool,
    pub schemas: BTreeSet<String>,
    pub chain: Vec<MigrationRevision>,
    pub applied: Vec<RevisionId>,
    pub rows: BTreeMap<Entity, BTreeSet<String>>,
    pub locked: bool,
    pub lock_count: usize,

    pub fail_revision: Option<String>,
    pub fail_seed_entity: Option<Entity>,
    pub broken_count: Option<Entity>,
    pub history_unreadable: bool,
    pub wipe_fails: bool,
    pub wipe_calls: usize,
    pub dump_failure: Option<(i32, String)>,
    pub restore_failure: Option<(i32, String)>,
    pub dumps: usize,
    pub restores: usize,
}

impl World {
    pub fn counts(&self) -> BTreeMap<Entity, usize> {
        Entity::ALL
            .iter()
            .map(|e| (*e, self.rows.get(e).map_or(0, |r| r.len())))
            .collect()
    }
}

pub type Shared = Arc<Mutex<World>>;

fn unreachable() -> StewardError {
    StewardError::IoError(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "connection refused",
    ))
}

pub fn revision(id: &str, parent: Option<&str>) -> MigrationRevision {
    MigrationRevision {
        id: RevisionId::parse(id).unwrap(),
        parent: parent.map(|p| RevisionId::parse(p).unwrap()),
        description: format!("revision {}", id),
        script: format!("V{}__revision_{}.sql", id, id),
    }
}

/// A linked chain `1..=n`.
pub fn linear_chain(n: u32) -> Vec<MigrationRevision> {
    (1..=n)
        .map(|i| {
            let parent = (i > 1).then(|| (i - 1).to_string());
            revision(&i.to_string(), parent.as_deref())
        })
        .collect()
}

pub struct FakeStore(pub Shared);

#[async_trait]
impl SchemaStore for FakeStore {
    async fn probe(&self) -> Result<()> {
        if self.0.lock().unwrap().reachable {
            Ok(())
        } else {
            Err(unreachable())
        }
    }

    async fn ensure_schemas(&self) -> Result<Vec<String>> {
        let mut world = self.0.lock().unwrap();
        let mut created = Vec::new();
        for schema in ["organization", "security"] {
            if world.schemas.insert(schema.to_string()) {
                created.push(schema.to_string());
            }
        }
        Ok(created)
    }

    async fn count_rows(&self, entity: Entity) -> Result<i64> {
        let world = self.0.lock().unwrap();
        if !world.reachable {
            return Err(unreachable());
        }
        if world.broken_count == Some(entity) {
            return Err(StewardError::ValidationError(format!(
                "relation {} does not exist",
                entity.table()
            )));
        }
        Ok(world.rows.get(&entity).map_or(0, |r| r.len()) as i64)
    }

    async fn wipe(&self) -> Result<Vec<String>> {
        let mut world = self.0.lock().unwrap();
        world.wipe_calls += 1;
        if world.wipe_fails {
            return Err(StewardError::WipeFailed("cannot drop schema security".to_string()));
        }
        let dropped = world.schemas.iter().map(|s| format!("Schema: {}", s)).collect();
        world.rows.clear();
        world.applied.clear();
        Ok(dropped)
    }

    async fn seed(&self, batch: &SeedBatch) -> Result<SeedCount> {
        let mut world = self.0.lock().unwrap();
        if world.fail_seed_entity == Some(batch.entity()) {
            return Err(StewardError::ValidationError(format!(
                "insert into {} rejected",
                batch.entity().table()
            )));
        }

        let keys: Vec<String> = match batch {
            SeedBatch::Permissions(v) => v.iter().map(|p| p.code.to_string()).collect(),
            SeedBatch::OrgUnits(v) => v.iter().map(|u| u.code.to_string()).collect(),
            SeedBatch::Positions(v) => v.iter().map(|p| p.code.to_string()).collect(),
            SeedBatch::Users(v) => v.iter().map(|u| u.seed.username.to_string()).collect(),
        };

        let rows = world.rows.entry(batch.entity()).or_default();
        let mut count = SeedCount::default();
        for key in keys {
            if rows.insert(key) {
                count.created += 1;
            } else {
                count.skipped += 1;
            }
        }
        Ok(count)
    }
}

pub struct FakeEngine(pub Shared);

#[async_trait]
impl MigrationEngine for FakeEngine {
    async fn chain(&self) -> Result<RevisionChain> {
        RevisionChain::new(self.0.lock().unwrap().chain.clone())
    }

    async fn current(&self) -> Result<Option<RevisionId>> {
        let world = self.0.lock().unwrap();
        if !world.reachable {
            return Err(unreachable());
        }
        if world.history_unreadable {
            return Err(StewardError::ValidationError(
                "permission denied for table steward_schema_history".to_string(),
            ));
        }
        Ok(world.applied.last().cloned())
    }

    async fn apply(&self, revision: &MigrationRevision) -> Result<i32> {
        let mut world = self.0.lock().unwrap();
        assert!(world.locked, "deltas must be applied under the lock");
        if world.fail_revision.as_deref() == Some(revision.id.raw.as_str()) {
            return Err(StewardError::MigrationFailed {
                revision: revision.id.raw.clone(),
                last_applied: None,
                reason: "syntax error at or near \"CREAT\"".to_string(),
            });
        }
        world.applied.push(revision.id.clone());
        Ok(3)
    }

    async fn create_revision(
        &self,
        id: &RevisionId,
        parent: Option<&RevisionId>,
        message: &str,
    ) -> Result<PathBuf> {
        let mut world = self.0.lock().unwrap();
        world.chain.push(MigrationRevision {
            id: id.clone(),
            parent: parent.cloned(),
            description: message.to_string(),
            script: format!("V{}__new.sql", id),
        });
        Ok(PathBuf::from(format!("db/migrations/V{}__new.sql", id)))
    }

    async fn lock(&self) -> Result<()> {
        let mut world = self.0.lock().unwrap();
        assert!(!world.locked, "lock is not reentrant");
        world.locked = true;
        world.lock_count += 1;
        Ok(())
    }

    async fn unlock(&self) -> Result<()> {
        self.0.lock().unwrap().locked = false;
        Ok(())
    }
}

/// Dumps `rows` as JSON; restores by replacing `rows` with the file's content.
pub struct FakeDump(pub Shared);

#[async_trait]
impl DumpTool for FakeDump {
    async fn dump(
        &self,
        _target: &ConnectionDescriptor,
        include_data: bool,
        output: &Path,
    ) -> Result<ToolOutput> {
        let mut world = self.0.lock().unwrap();
        world.dumps += 1;

        if let Some((code, ref stderr)) = world.dump_failure {
            std::fs::write(output, "-- partial dump").unwrap();
            return Ok(ToolOutput {
                exit_code: Some(code),
                stderr: stderr.clone(),
            });
        }

        let snapshot: BTreeMap<String, Vec<String>> = if include_data {
            world
                .rows
                .iter()
                .map(|(e, keys)| (e.label().to_string(), keys.iter().cloned().collect()))
                .collect()
        } else {
            BTreeMap::new()
        };
        std::fs::write(output, serde_json::to_vec(&snapshot).unwrap()).unwrap();
        Ok(ToolOutput {
            exit_code: Some(0),
            stderr: String::new(),
        })
    }

    async fn restore(&self, _target: &ConnectionDescriptor, input: &Path) -> Result<ToolOutput> {
        let mut world = self.0.lock().unwrap();
        world.restores += 1;

        if let Some((code, ref stderr)) = world.restore_failure {
            return Ok(ToolOutput {
                exit_code: Some(code),
                stderr: stderr.clone(),
            });
        }

        let snapshot: BTreeMap<String, Vec<String>> =
            serde_json::from_slice(&std::fs::read(input).unwrap()).unwrap();
        world.rows.clear();
        for entity in Entity::ALL {
            if let Some(keys) = snapshot.get(entity.label()) {
                world.rows.insert(entity, keys.iter().cloned().collect());
            }
        }
        Ok(ToolOutput {
            exit_code: Some(0),
            stderr: String::new(),
        })
    }
}

/// Answers every prompt with a fixed reply.
pub struct FakePrompter(pub Option<String>);

impl FakePrompter {
    pub fn answering(answer: &str) -> Box<Self> {
        Box::new(Self(Some(answer.to_string())))
    }
}

#[async_trait]
impl Prompter for FakePrompter {
    async fn ask(&self, prompt: &str) -> Result<Option<String>> {
        assert!(prompt.contains(DATABASE), "prompt must name the database");
        Ok(self.0.clone())
    }
}

pub struct Harness {
    pub steward: Steward,
    pub world: Shared,
    pub backups: tempfile::TempDir,
}

/// A reachable, empty store with a two-revision chain.
pub fn harness() -> Harness {
    harness_with_chain(linear_chain(2))
}

pub fn harness_with_chain(chain: Vec<MigrationRevision>) -> Harness {
    let backups = tempfile::tempdir().unwrap();

    let world: Shared = Arc::new(Mutex::new(World {
        reachable: true,
        chain,
        ..Default::default()
    }));

    let mut config = StewardConfig::default();
    config.database.url = Some(format!("postgres://app@localhost/{}", DATABASE));
    config.backup.directory = backups.path().to_path_buf();

    let descriptor =
        ConnectionDescriptor::parse(config.database.url.as_deref().unwrap(), &config.search_path())
            .unwrap();

    let steward = Steward::with_backends(
        config,
        descriptor,
        Arc::new(FakeStore(world.clone())),
        Arc::new(FakeEngine(world.clone())),
        Arc::new(FakeDump(world.clone())),
    );

    Harness {
        steward,
        world,
        backups,
    }
}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
