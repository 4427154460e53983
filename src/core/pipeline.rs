use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use bevy_utils::tracing::{debug, error};
use serde::Serialize;
use thiserror::Error;

use crate::core::context::CycleContext;
use crate::core::replay::phase_digest;
use crate::world::ledger::{LedgerError, LedgerStore};
use crate::world::schema::{SchemaError, ERROR_LEDGER, ERROR_SCHEMA};

const STACK_EXCERPT_LIMIT: usize = 500;

/// Anything a single phase can fail with. Always recoverable at the pipeline level.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("world resource {0} was not loaded")]
    MissingResource(&'static str),
    #[error("panicked: {0}")]
    Panicked(String),
}

/// Failures that stop a cycle, or stop a replay before it starts.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("ledger store could not be acquired: {0}")]
    Acquire(#[source] LedgerError),
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("no seed record for cycle {0}")]
    NoSeedRecord(u32),
    #[error("seed record for cycle {cycle} is unreadable: {reason}")]
    CorruptSeedRecord { cycle: u32, reason: String },
    #[error("phase {phase} failed: {message}")]
    PhaseFailed { phase: String, message: String },
}

pub type PhaseFn = fn(&mut CycleContext<'_>) -> Result<(), PhaseError>;

#[derive(Clone, Copy)]
pub struct Phase {
    pub name: &'static str,
    pub run: PhaseFn,
}

impl Phase {
    pub const fn new(name: &'static str, run: PhaseFn) -> Self {
        Self { name, run }
    }
}

impl std::fmt::Debug for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseResult {
    pub phase: String,
    pub ok: bool,
    pub error: Option<String>,
    pub intents: usize,
    pub digest: String,
}

/// Run every phase in order. A failing or panicking phase is logged, audited,
/// written to the error ledger, and the next phase still runs.
pub fn run_phases(ctx: &mut CycleContext<'_>, phases: &[Phase]) {
    for phase in phases {
        let start = ctx.ledger.intents().len();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| (phase.run)(&mut *ctx))) {
            Ok(result) => result,
            Err(payload) => Err(PhaseError::Panicked(panic_message(payload.as_ref()))),
        };

        let error = match result {
            Ok(()) => {
                debug!(cycle = ctx.cycle, phase = phase.name, "phase complete");
                None
            }
            Err(err) => {
                let message = err.to_string();
                record_phase_error(ctx, phase.name, &err);
                Some(message)
            }
        };

        let intents = &ctx.ledger.intents()[start..];
        let digest = phase_digest(intents, error.as_deref());
        ctx.summary.phase_results.push(PhaseResult {
            phase: phase.name.to_string(),
            ok: error.is_none(),
            error,
            intents: intents.len(),
            digest,
        });
    }
}

fn record_phase_error(ctx: &mut CycleContext<'_>, phase: &str, err: &PhaseError) {
    let message = err.to_string();
    error!(cycle = ctx.cycle, phase, error = %message, "phase failed");
    ctx.summary.audit(phase, message.clone());

    let mut excerpt = error_chain(err);
    if excerpt.len() > STACK_EXCERPT_LIMIT {
        let cut = (0..=STACK_EXCERPT_LIMIT)
            .rev()
            .find(|idx| excerpt.is_char_boundary(*idx))
            .unwrap_or(0);
        excerpt.truncate(cut);
    }

    let header = match ctx.ledger.get_all_rows(ERROR_LEDGER) {
        Ok(snapshot) if snapshot.exists => snapshot.header,
        _ => ERROR_SCHEMA.header(),
    };
    let stamp = ctx.stamp();
    let row = header
        .iter()
        .map(|col| match col.trim() {
            "Timestamp" => stamp.clone(),
            "Cycle" => ctx.cycle.to_string(),
            "Phase" => phase.to_string(),
            "Message" => message.clone(),
            "StackExcerpt" => excerpt.clone(),
            _ => String::new(),
        })
        .collect();
    ctx.ledger.queue_append_row(ERROR_LEDGER, row);
}

fn error_chain(err: &PhaseError) -> String {
    let mut parts = vec![format!("{:?}", err)];
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(" <- ")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
