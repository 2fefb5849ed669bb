//! Reset guard: the only path that performs destructive drops.
//!
//! ```text
//! Idle -> AwaitingConfirmation -> Confirmed -> Wiping -> Reinitializing -> Done
//!   \                         \                      \-> Done
//!    \-> Confirmed (forced)    \-> Aborted
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::init::{self, InitReport};
use super::seed::{self, SeedSummary};
use crate::engine::MigrationEngine;
use crate::error::{Result, StewardError};
use crate::seed::Scenario;
use crate::store::SchemaStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetState {
    Idle,
    AwaitingConfirmation,
    Confirmed,
    Wiping,
    Reinitializing,
    Done,
    Aborted,
}

impl ResetState {
    pub fn can_transition_to(self, next: ResetState) -> bool {
        use ResetState::*;
        matches!(
            (self, next),
            (Idle, AwaitingConfirmation)
                | (Idle, Confirmed)
                | (AwaitingConfirmation, Confirmed)
                | (AwaitingConfirmation, Aborted)
                | (Confirmed, Wiping)
                | (Wiping, Reinitializing)
                | (Wiping, Done)
                | (Reinitializing, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ResetState::Done | ResetState::Aborted)
    }
}

impl fmt::Display for ResetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResetState::Idle => "idle",
            ResetState::AwaitingConfirmation => "awaiting_confirmation",
            ResetState::Confirmed => "confirmed",
            ResetState::Wiping => "wiping",
            ResetState::Reinitializing => "reinitializing",
            ResetState::Done => "done",
            ResetState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Asks the operator a question and returns the answer, or `None` if the
/// input closed without one.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<Option<String>>;
}

/// Where operator intent comes from. Exactly one per reset.
pub enum ConfirmationSource {
    /// The force flag.
    Forced,
    Interactive(Box<dyn Prompter>),
    /// No way to ask (e.g. stdin is not a terminal) and no force flag.
    Denied,
}

impl fmt::Debug for ConfirmationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmationSource::Forced => f.write_str("Forced"),
            ConfirmationSource::Interactive(_) => f.write_str("Interactive"),
            ConfirmationSource::Denied => f.write_str("Denied"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResetOptions {
    pub reinit: bool,
    pub confirm_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReinitReport {
    pub init: InitReport,
    pub seed: SeedSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetReport {
    pub final_state: ResetState,
    pub trail: Vec<ResetState>,
    pub dropped: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reinit: Option<ReinitReport>,
}

impl ResetReport {
    pub fn aborted(&self) -> bool {
        self.final_state == ResetState::Aborted
    }
}

struct Machine {
    state: ResetState,
    trail: Vec<ResetState>,
}

impl Machine {
    fn new() -> Self {
        Self {
            state: ResetState::Idle,
            trail: vec![ResetState::Idle],
        }
    }

    fn advance(&mut self, next: ResetState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(StewardError::ValidationError(format!(
                "illegal reset transition {} -> {}",
                self.state, next
            )));
        }
        tracing::debug!(from = %self.state, to = %next, "Reset state change");
        self.state = next;
        self.trail.push(next);
        Ok(())
    }

    fn finish(self, dropped: Vec<String>, abort_reason: Option<String>, reinit: Option<ReinitReport>) -> ResetReport {
        ResetReport {
            final_state: self.state,
            trail: self.trail,
            dropped,
            abort_reason,
            reinit,
        }
    }
}

/// The prompt shown to the operator. The answer must be the database name.
pub fn confirmation_prompt(database: &str) -> String {
    format!(
        "This will DROP ALL DATA in database '{}'. Type the database name to confirm: ",
        database
    )
}

/// `None` when the answer confirms, else the reason to abort.
fn check_answer(database: &str, answer: Option<String>) -> Option<String> {
    match answer {
        Some(a) if a.trim() == database => None,
        Some(a) if a.trim().is_empty() => Some("no confirmation given".to_string()),
        Some(_) => Some("confirmation did not match the database name".to_string()),
        None => Some("no response".to_string()),
    }
}

async fn await_confirmation(
    prompter: &dyn Prompter,
    database: &str,
    timeout: Duration,
) -> Option<String> {
    let prompt = confirmation_prompt(database);
    match tokio::time::timeout(timeout, prompter.ask(&prompt)).await {
        Ok(Ok(answer)) => check_answer(database, answer),
        Ok(Err(e)) => Some(format!("could not read confirmation: {}", e)),
        Err(_) => Some(format!("no response within {}s", timeout.as_secs())),
    }
}

/// Run the reset. A denial returns an `Aborted` report; only a wipe or
/// reinitialization failure is an error.
pub async fn execute(
    store: &dyn SchemaStore,
    engine: &dyn MigrationEngine,
    database: &str,
    source: ConfirmationSource,
    opts: &ResetOptions,
) -> Result<ResetReport> {
    let mut machine = Machine::new();

    match source {
        ConfirmationSource::Forced => {
            tracing::info!("Reset confirmed by force flag");
            machine.advance(ResetState::Confirmed)?;
        }
        ConfirmationSource::Interactive(prompter) => {
            machine.advance(ResetState::AwaitingConfirmation)?;
            if let Some(reason) = await_confirmation(prompter.as_ref(), database, opts.confirm_timeout).await {
                tracing::info!(reason = %reason, "Reset aborted");
                machine.advance(ResetState::Aborted)?;
                return Ok(machine.finish(Vec::new(), Some(reason), None));
            }
            machine.advance(ResetState::Confirmed)?;
        }
        ConfirmationSource::Denied => {
            machine.advance(ResetState::AwaitingConfirmation)?;
            let reason = "confirmation required: rerun with --force or from an interactive terminal";
            tracing::info!(reason, "Reset aborted");
            machine.advance(ResetState::Aborted)?;
            return Ok(machine.finish(Vec::new(), Some(reason.to_string()), None));
        }
    }

    machine.advance(ResetState::Wiping)?;
    tracing::warn!(
        database = %database,
        "Reset assumes exclusive access; stop application traffic before wiping"
    );
    let dropped = store.wipe().await?;

    if !opts.reinit {
        machine.advance(ResetState::Done)?;
        return Ok(machine.finish(dropped, None, None));
    }

    machine.advance(ResetState::Reinitializing)?;
    let init = init::execute(store, engine).await?;
    let seed = seed::execute(store, Scenario::default(), false).await?;
    machine.advance(ResetState::Done)?;

    Ok(machine.finish(dropped, None, Some(ReinitReport { init, seed })))
}
