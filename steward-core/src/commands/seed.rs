//! Seed orchestrator: runs a scenario's steps in their fixed order.

use serde::Serialize;

use crate::error::{Result, StewardError};
use crate::seed::{plan, Scenario, SeedStep};
use crate::store::{Entity, SchemaStore};

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: SeedStep,
    pub entity: Entity,
    pub created: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedSummary {
    pub scenario: Scenario,
    pub extended_org: bool,
    pub steps: Vec<StepReport>,
}

impl SeedSummary {
    pub fn created(&self) -> usize {
        self.steps.iter().map(|s| s.created).sum()
    }

    pub fn skipped(&self) -> usize {
        self.steps.iter().map(|s| s.skipped).sum()
    }
}

/// Run every step of `scenario`. Earlier steps are kept if a later one fails.
pub async fn execute(
    store: &dyn SchemaStore,
    scenario: Scenario,
    extended_org: bool,
) -> Result<SeedSummary> {
    let mut summary = SeedSummary {
        scenario,
        extended_org,
        steps: Vec::new(),
    };

    for step in plan(extended_org) {
        let fail = |reason: String, completed: usize| StewardError::SeedFailed {
            step: step.to_string(),
            completed_steps: completed,
            reason,
        };

        let batch = step
            .batch(scenario)
            .map_err(|e| fail(e.to_string(), summary.steps.len()))?;

        let count = store
            .seed(&batch)
            .await
            .map_err(|e| fail(e.to_string(), summary.steps.len()))?;

        tracing::info!(
            step = %step,
            created = count.created,
            skipped = count.skipped,
            "Seed step completed"
        );

        summary.steps.push(StepReport {
            step,
            entity: step.entity(),
            created: count.created,
            skipped: count.skipped,
        });
    }

    tracing::info!(
        scenario = %scenario,
        extended_org,
        created = summary.created(),
        skipped = summary.skipped(),
        "Seeding completed"
    );

    Ok(summary)
}
