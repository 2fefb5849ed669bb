//! Seed scenarios and the fixed order of their steps.

pub mod data;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use serde::Serialize;

use crate::error::{Result, StewardError};
use crate::store::{Entity, SeedBatch, UserRecord};
use data::UserSeed;

/// A named bundle of seed steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// Reference data plus the basic test users. Used by `reset-db --reinit`.
    #[default]
    Basic,
    /// Reference data plus every test user.
    Complete,
}

impl FromStr for Scenario {
    type Err = StewardError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" | "basico" | "básico" => Ok(Scenario::Basic),
            "complete" | "completo" => Ok(Scenario::Complete),
            _ => Err(StewardError::UnknownScenario(s.to_string())),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scenario::Basic => f.write_str("basic"),
            Scenario::Complete => f.write_str("complete"),
        }
    }
}

impl Scenario {
    /// Users seeded by this scenario, administrator first.
    pub fn users(&self) -> Vec<UserSeed> {
        let mut users = vec![data::ADMIN_USER];
        users.extend(data::TEST_USERS.iter().copied().filter(|u| match self {
            Scenario::Basic => data::BASIC_TEST_USERS.contains(&u.username),
            Scenario::Complete => true,
        }));
        users
    }
}

/// One step of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedStep {
    Permissions,
    OrgUnits,
    ExtendedOrgUnits,
    Positions,
    ExtendedPositions,
    Users,
}

impl fmt::Display for SeedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SeedStep::Permissions => "permissions",
            SeedStep::OrgUnits => "org_units",
            SeedStep::ExtendedOrgUnits => "extended_org_units",
            SeedStep::Positions => "positions",
            SeedStep::ExtendedPositions => "extended_positions",
            SeedStep::Users => "users",
        };
        f.write_str(name)
    }
}

impl SeedStep {
    pub fn entity(&self) -> Entity {
        match self {
            SeedStep::Permissions => Entity::Permissions,
            SeedStep::OrgUnits | SeedStep::ExtendedOrgUnits => Entity::OrgUnits,
            SeedStep::Positions | SeedStep::ExtendedPositions => Entity::Positions,
            SeedStep::Users => Entity::Users,
        }
    }

    /// Build this step's records. Hashes user passwords.
    pub fn batch(&self, scenario: Scenario) -> Result<SeedBatch> {
        Ok(match self {
            SeedStep::Permissions => SeedBatch::Permissions(data::PERMISSIONS.to_vec()),
            SeedStep::OrgUnits => SeedBatch::OrgUnits(data::BASE_ORG_UNITS.to_vec()),
            SeedStep::ExtendedOrgUnits => SeedBatch::OrgUnits(data::EXTENDED_ORG_UNITS.to_vec()),
            SeedStep::Positions => SeedBatch::Positions(data::BASE_POSITIONS.to_vec()),
            SeedStep::ExtendedPositions => SeedBatch::Positions(data::EXTENDED_POSITIONS.to_vec()),
            SeedStep::Users => SeedBatch::Users(
                scenario
                    .users()
                    .into_iter()
                    .map(|seed| {
                        Ok(UserRecord {
                            password_hash: hash_password(seed.password)?,
                            seed,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}

/// Steps in execution order: units before positions before users, with the
/// extended organization inserted ahead of the positions that reference it.
pub fn plan(extended_org: bool) -> Vec<SeedStep> {
    let mut steps = vec![SeedStep::Permissions, SeedStep::OrgUnits];
    if extended_org {
        steps.push(SeedStep::ExtendedOrgUnits);
    }
    steps.push(SeedStep::Positions);
    if extended_org {
        steps.push(SeedStep::ExtendedPositions);
    }
    steps.push(SeedStep::Users);
    steps
}

/// Row counts a scenario produces on an empty store.
pub fn expected_rows(scenario: Scenario, extended_org: bool) -> BTreeMap<Entity, usize> {
    let mut rows = BTreeMap::new();
    rows.insert(Entity::Permissions, data::PERMISSIONS.len());
    rows.insert(
        Entity::OrgUnits,
        data::BASE_ORG_UNITS.len() + if extended_org { data::EXTENDED_ORG_UNITS.len() } else { 0 },
    );
    rows.insert(
        Entity::Positions,
        data::BASE_POSITIONS.len() + if extended_org { data::EXTENDED_POSITIONS.len() } else { 0 },
    );
    rows.insert(Entity::Users, scenario.users().len());
    rows
}

/// Argon2id PHC string with a random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StewardError::ValidationError(format!("password hashing failed: {}", e)))
}
