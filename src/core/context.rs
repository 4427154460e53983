use std::collections::BTreeMap;

use bevy_ecs::prelude::*;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::core::ecs::create_world;
use crate::core::pipeline::PhaseResult;
use crate::core::rng::CycleRng;
use crate::simulation::initiative::VoteOutcome;
use crate::world::ledger::IntentLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum RunMode {
    Normal,
    DryRun,
    Replay { cycle: u32 },
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Normal => "normal",
            RunMode::DryRun => "dry-run",
            RunMode::Replay { .. } => "replay",
        }
    }

    /// Whether queued writes reach the store.
    pub fn persists(self) -> bool {
        matches!(self, RunMode::Normal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditIssue {
    pub phase: String,
    pub message: String,
}

/// Per-cycle accumulator. Owned by the context for exactly one cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub counters: BTreeMap<String, i64>,
    pub outputs: BTreeMap<String, serde_json::Value>,
    pub audit_issues: Vec<AuditIssue>,
    pub phase_results: Vec<PhaseResult>,
    pub vote_outcomes: Vec<VoteOutcome>,
}

impl Summary {
    pub fn bump(&mut self, counter: &str, by: i64) {
        *self.counters.entry(counter.to_string()).or_insert(0) += by;
    }

    pub fn counter(&self, counter: &str) -> i64 {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    pub fn record_output(&mut self, phase: &str, value: serde_json::Value) {
        self.outputs.insert(phase.to_string(), value);
    }

    pub fn audit(&mut self, phase: &str, message: impl Into<String>) {
        self.audit_issues.push(AuditIssue {
            phase: phase.to_string(),
            message: message.into(),
        });
    }
}

/// Everything a phase may touch during one cycle.
pub struct CycleContext<'a> {
    pub cycle: u32,
    pub timestamp: DateTime<Utc>,
    pub mode: RunMode,
    pub rng: CycleRng,
    pub summary: Summary,
    pub world: World,
    pub ledger: IntentLedger<'a>,
}

impl<'a> CycleContext<'a> {
    pub fn new(
        cycle: u32,
        timestamp: DateTime<Utc>,
        mode: RunMode,
        rng: CycleRng,
        ledger: IntentLedger<'a>,
    ) -> Self {
        Self {
            cycle,
            timestamp,
            mode,
            rng,
            summary: Summary::default(),
            world: create_world(),
            ledger,
        }
    }

    /// Timestamp text for every cell written this cycle.
    pub fn stamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}
