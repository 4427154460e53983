use bevy_utils::tracing::{debug, error, info, warn};
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::core::context::{CycleContext, RunMode, Summary};
use crate::core::ecs::{canonical_phases, manual_phases, world_loaded};
use crate::core::pipeline::{run_phases, CycleError, Phase, PhaseResult};
use crate::core::replay::{
    find_cycle_record, input_digest, CycleRecord, ReplayReport, ReplayVerdict,
};
use crate::core::rng::{cycle_seed, entropy_seed, CycleRng};
use crate::simulation::ripple::{EffectBag, RippleRegistry};
use crate::systems::civic::{ManualRequest, ManualResolution};
use crate::world::ledger::{
    BatchedLedger, FlushReport, IntentLedger, IntentSummary, LedgerError, LedgerStore, Table,
};
use crate::world::repository::TableBackend;
use crate::world::schema::{
    StoreSchema, CYCLE_SEEDS, CYCLE_SEED_SCHEMA, ERROR_SCHEMA, RIPPLES, RIPPLE_SCHEMA,
};

/// Stores the kernel owns outright and creates when absent.
const KERNEL_STORES: [StoreSchema; 3] = [RIPPLE_SCHEMA, ERROR_SCHEMA, CYCLE_SEED_SCHEMA];

/// What one cycle did, returned to the operator surface.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u32,
    pub mode: RunMode,
    pub seed: u32,
    pub timestamp: DateTime<Utc>,
    pub fingerprint: String,
    pub input_digest: String,
    pub phases: Vec<PhaseResult>,
    pub intents: IntentSummary,
    pub flush: FlushReport,
    pub errors: usize,
    pub world_loaded: bool,
    pub summary: Summary,
}

/// Wrapper around the ledger and the phase list.
pub struct CycleEngine<B: TableBackend> {
    ledger: BatchedLedger<B>,
    phases: Vec<Phase>,
    base_seed: Option<u32>,
}

impl<B: TableBackend> CycleEngine<B> {
    /// Create an engine over `backend`, creating the kernel-owned stores if needed.
    pub fn new(mut backend: B, base_seed: Option<u32>) -> Result<Self, LedgerError> {
        provision_kernel_stores(&mut backend)?;
        Ok(Self {
            ledger: BatchedLedger::new(backend),
            phases: canonical_phases(),
            base_seed,
        })
    }

    /// Swap the phase list. The canonical list is the default.
    pub fn with_phases(mut self, phases: Vec<Phase>) -> Self {
        self.phases = phases;
        self
    }

    pub fn base_seed(&self) -> Option<u32> {
        self.base_seed
    }

    pub fn backend(&self) -> &B {
        self.ledger.backend()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.ledger.backend_mut()
    }

    pub fn into_backend(self) -> B {
        self.ledger.into_backend()
    }

    /// Normal cycle: writes are flushed and the cycle record is appended.
    pub fn run_cycle(&mut self, cycle: u32) -> Result<CycleReport, CycleError> {
        let seed = self.seed_for(cycle);
        self.execute(cycle, RunMode::Normal, seed, now())
    }

    /// Same phases, nothing persisted. The report's intent summary is the result.
    pub fn dry_run(&mut self, cycle: u32) -> Result<CycleReport, CycleError> {
        let seed = self.seed_for(cycle);
        self.execute(cycle, RunMode::DryRun, seed, now())
    }

    /// Re-run `cycle` with its recorded seed and timestamp against the current
    /// ledger contents and compare digests. The input digest tells a ledger that
    /// moved on since the cycle ran apart from a real divergence.
    pub fn replay(&mut self, cycle: u32) -> Result<ReplayReport, CycleError> {
        self.ledger.acquire().map_err(CycleError::Acquire)?;
        let recorded = find_cycle_record(&mut self.ledger, cycle)?;
        let report = self.execute(
            cycle,
            RunMode::Replay { cycle },
            recorded.seed,
            recorded.timestamp,
        )?;
        let replayed = CycleRecord::from_results(
            cycle,
            report.seed,
            report.timestamp,
            report.input_digest,
            &report.phases,
        );
        let outcome = ReplayReport::compare(&recorded, &replayed);
        match outcome.verdict {
            ReplayVerdict::Matched => {
                info!(cycle, fingerprint = %outcome.replayed_fingerprint, "replay matched")
            }
            ReplayVerdict::InputsChanged => warn!(
                cycle,
                diffs = outcome.diffs.len(),
                "replay inconclusive, ledger changed since the cycle ran"
            ),
            ReplayVerdict::Diverged => {
                error!(cycle, diffs = outcome.diffs.len(), "replay diverged from identical inputs")
            }
        }
        Ok(outcome)
    }

    /// Operator override: resolve one initiative now through the scheduled path.
    pub fn resolve_initiative_now(
        &mut self,
        initiative_id: &str,
        cycle: u32,
    ) -> Result<ManualResolution, CycleError> {
        let seed = self.seed_for(cycle);
        let phases = manual_phases();
        let mut ctx = CycleContext::new(
            cycle,
            now(),
            RunMode::Normal,
            CycleRng::from_seed(seed),
            IntentLedger::forwarding(&mut self.ledger),
        );
        ctx.world.insert_resource(ManualRequest {
            target: initiative_id.to_string(),
            result: None,
        });
        info!(cycle, initiative = initiative_id, seed, "manual override start");

        let body = match ctx.ledger.acquire() {
            Ok(()) => {
                run_phases(&mut ctx, &phases);
                Ok(())
            }
            Err(err) => Err(CycleError::Acquire(err)),
        };
        let flush = ctx.ledger.flush();
        info!(
            cycle,
            errors = ctx.summary.audit_issues.len() + flush.errors.len(),
            writes = flush.writes,
            appends = flush.appends,
            "manual override complete"
        );
        body?;

        let result = ctx
            .world
            .get_resource_mut::<ManualRequest>()
            .and_then(|mut request| request.result.take());
        match result {
            Some(result) => Ok(result),
            None => {
                let failed = ctx
                    .summary
                    .phase_results
                    .iter()
                    .find(|result| !result.ok);
                Err(CycleError::PhaseFailed {
                    phase: failed
                        .map(|result| result.phase.clone())
                        .unwrap_or_else(|| "manual_resolution".to_string()),
                    message: failed
                        .and_then(|result| result.error.clone())
                        .unwrap_or_else(|| "no resolution produced".to_string()),
                })
            }
        }
    }

    /// Combined decay-weighted effect of the active ripples touching `neighborhood`.
    pub fn ripple_effects(
        &mut self,
        neighborhood: Option<&str>,
        cycle: u32,
    ) -> Result<EffectBag, CycleError> {
        self.ledger.acquire().map_err(CycleError::Acquire)?;
        let snapshot = self.ledger.get_all_rows(RIPPLES)?;
        let registry = RippleRegistry::from_snapshot(&snapshot)?;
        Ok(registry.effects_for(neighborhood, cycle))
    }

    fn seed_for(&self, cycle: u32) -> u32 {
        match self.base_seed {
            Some(base) => cycle_seed(base, cycle),
            None => {
                let seed = entropy_seed();
                debug!(cycle, seed, "no base seed configured, using entropy");
                seed
            }
        }
    }

    fn execute(
        &mut self,
        cycle: u32,
        mode: RunMode,
        seed: u32,
        timestamp: DateTime<Utc>,
    ) -> Result<CycleReport, CycleError> {
        let ledger = if mode.persists() {
            IntentLedger::forwarding(&mut self.ledger)
        } else {
            IntentLedger::recording_only(&mut self.ledger)
        };
        let mut ctx = CycleContext::new(cycle, timestamp, mode, CycleRng::from_seed(seed), ledger);
        info!(cycle, mode = mode.as_str(), seed, "cycle start");

        let body = match ctx.ledger.acquire() {
            Ok(()) => {
                run_phases(&mut ctx, &self.phases);
                Ok(())
            }
            Err(err) => {
                error!(cycle, error = %err, "ledger unavailable, cycle aborted");
                Err(CycleError::Acquire(err))
            }
        };

        let phases = std::mem::take(&mut ctx.summary.phase_results);
        let inputs = input_digest(ctx.ledger.reads());
        let record = CycleRecord::from_results(cycle, seed, timestamp, inputs, &phases);
        if body.is_ok() && mode.persists() {
            let header = match ctx.ledger.get_all_rows(CYCLE_SEEDS) {
                Ok(snapshot) if snapshot.exists => snapshot.header,
                _ => CYCLE_SEED_SCHEMA.header(),
            };
            ctx.ledger.queue_append_row(CYCLE_SEEDS, record.to_row(&header));
        }

        // Runs whether or not the body aborted.
        let flush = ctx.ledger.flush();
        let intents = IntentSummary::from_intents(ctx.ledger.intents());
        let errors = ctx.summary.audit_issues.len() + flush.errors.len();
        if flush.errors.is_empty() {
            info!(
                cycle,
                mode = mode.as_str(),
                errors,
                writes = flush.writes,
                appends = flush.appends,
                intents = intents.total,
                "cycle complete"
            );
        } else {
            error!(
                cycle,
                errors,
                failed_writes = flush.errors.len(),
                "cycle complete, some writes were lost"
            );
        }
        body?;

        Ok(CycleReport {
            cycle,
            mode,
            seed,
            timestamp,
            fingerprint: record.fingerprint,
            input_digest: record.input_digest,
            phases,
            intents,
            flush,
            errors,
            world_loaded: world_loaded(&ctx.world),
            summary: ctx.summary,
        })
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

fn provision_kernel_stores<B: TableBackend>(backend: &mut B) -> Result<(), LedgerError> {
    for schema in KERNEL_STORES {
        if backend.fetch(schema.store)?.is_none() {
            backend.replace_table(
                schema.store,
                Table {
                    header: schema.header(),
                    rows: Vec::new(),
                },
            )?;
            info!(store = schema.store, "created kernel store");
        }
    }
    Ok(())
}
