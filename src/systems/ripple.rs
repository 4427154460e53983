use bevy_utils::tracing::{debug, info, warn};
use serde_json::json;

use crate::core::context::CycleContext;
use crate::core::pipeline::PhaseError;
use crate::simulation::city::CityState;
use crate::simulation::ripple::{RippleRegistry, RippleStatus, APPLY_RATE};
use crate::systems::take_resource;
use crate::world::ledger::LedgerStore;
use crate::world::schema::{format_scalar, RIPPLES};

const PHASE: &str = "apply_ripples";

/// Phase: ripple tracker into the `RippleRegistry` resource.
pub fn load_ripples(ctx: &mut CycleContext<'_>) -> Result<(), PhaseError> {
    let snapshot = ctx.ledger.get_all_rows(RIPPLES)?;
    let registry = RippleRegistry::from_snapshot(&snapshot).map_err(|err| {
        warn!(cycle = ctx.cycle, store = RIPPLES, error = %err, "ripples not loaded");
        err
    })?;
    for skipped in &registry.skipped {
        warn!(cycle = ctx.cycle, error = %skipped, "ripple row skipped");
        ctx.summary.audit("load_ripples", skipped.to_string());
    }

    let active = registry.active(ctx.cycle).count();
    debug!(cycle = ctx.cycle, total = registry.ripples.len(), active, "ripples loaded");
    ctx.summary.record_output(
        "load_ripples",
        json!({ "total": registry.ripples.len(), "active": active }),
    );
    ctx.world.insert_resource(registry);
    Ok(())
}

/// Phase: one decay step for every live ripple, then expiry.
/// Ripples created this cycle wait until the next one.
pub fn apply_ripples(ctx: &mut CycleContext<'_>) -> Result<(), PhaseError> {
    let mut registry = take_resource::<RippleRegistry>(&mut ctx.world, "RippleRegistry")?;
    let mut city = match take_resource::<CityState>(&mut ctx.world, "CityState") {
        Ok(city) => city,
        Err(err) => {
            ctx.world.insert_resource(registry);
            return Err(err);
        }
    };

    let cycle = ctx.cycle;
    let status_col = registry.columns.as_ref().and_then(|map| map.col("Status"));
    let decay_col = registry.columns.as_ref().and_then(|map| map.col("LastDecay"));
    let mut applied = 0;
    let mut expired = 0;
    let mut unknown_neighborhoods = 0;

    for ripple in registry.ripples.iter_mut() {
        if ripple.status == RippleStatus::Expired || ripple.start_cycle >= cycle {
            continue;
        }

        if cycle >= ripple.end_cycle {
            ripple.status = RippleStatus::Expired;
            if let (Some(row), Some(col)) = (ripple.row, status_col) {
                let expired = RippleStatus::Expired.as_str().to_string();
                ctx.ledger.queue_cell_write(RIPPLES, row, col, expired);
            }
            debug!(cycle, ripple = %ripple.id, "ripple expired");
            expired += 1;
            continue;
        }

        let decay = ripple.decay_at(cycle);
        for (metric, coefficient) in ripple.effects.iter() {
            let delta = coefficient * decay * APPLY_RATE;
            if ripple.is_city_wide() {
                city.add(*metric, delta, None);
                continue;
            }
            for neighborhood in &ripple.neighborhoods {
                if !city.add(*metric, delta, Some(neighborhood)) {
                    unknown_neighborhoods += 1;
                }
            }
        }
        ripple.last_decay = decay;
        if let (Some(row), Some(col)) = (ripple.row, decay_col) {
            ctx.ledger
                .queue_cell_write(RIPPLES, row, col, format_scalar(decay));
        }
        applied += 1;
    }

    if unknown_neighborhoods > 0 {
        warn!(
            cycle,
            count = unknown_neighborhoods,
            "ripple effects aimed at unknown neighborhoods"
        );
    }
    info!(cycle, applied, expired, "ripples applied");
    ctx.summary.bump("ripples_applied", applied);
    ctx.summary.bump("ripples_expired", expired);
    ctx.summary.record_output(
        PHASE,
        json!({ "applied": applied, "expired": expired }),
    );

    ctx.world.insert_resource(registry);
    ctx.world.insert_resource(city);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::RunMode;
    use crate::core::rng::CycleRng;
    use crate::simulation::city::Metric;
    use crate::simulation::ripple::Ripple;
    use crate::world::ledger::{BatchedLedger, IntentLedger, Table};
    use crate::world::memory::MemoryTables;
    use crate::world::schema::{CITY_STATE, RIPPLE_SCHEMA};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn stadium(start: u32) -> Ripple {
        let mut effects = BTreeMap::new();
        effects.insert(Metric::Sentiment, 0.4);
        effects.insert(Metric::Traffic, 0.2);
        Ripple {
            row: None,
            id: "RPL-100-INIT-7".into(),
            initiative: "Riverside Stadium Bond".into(),
            category: crate::rules::keywords::Category::Sports,
            direction: crate::simulation::ripple::Direction::Positive,
            strength: 1.0,
            effects,
            neighborhoods: Vec::new(),
            start_cycle: start,
            duration: 20,
            end_cycle: start + 20,
            status: RippleStatus::Active,
            last_decay: 1.0,
        }
    }

    fn tables(ripple: &Ripple) -> MemoryTables {
        let header = RIPPLE_SCHEMA.header();
        let mut tables = MemoryTables::default();
        tables.insert(
            RIPPLES,
            Table {
                rows: vec![ripple.to_row(&header)],
                header,
            },
        );
        tables.insert(
            CITY_STATE,
            Table {
                header: vec!["Metric".into(), "Value".into()],
                rows: vec![vec!["sentiment".into(), "0.0000".into()]],
            },
        );
        tables
    }

    fn run_at(cycle: u32, ripple: &Ripple) -> (f64, Vec<String>) {
        let mut inner = BatchedLedger::new(tables(ripple));
        let mut ctx = CycleContext::new(
            cycle,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            RunMode::DryRun,
            CycleRng::from_seed(cycle),
            IntentLedger::recording_only(&mut inner),
        );
        crate::systems::city::load_city(&mut ctx).unwrap();
        load_ripples(&mut ctx).unwrap();
        apply_ripples(&mut ctx).unwrap();
        let sentiment = ctx.world.resource::<CityState>().sentiment();
        let lines = ctx
            .ledger
            .intents()
            .iter()
            .map(|intent| intent.canonical_line())
            .collect();
        (sentiment, lines)
    }

    #[test]
    fn mid_life_ripple_applies_at_decayed_strength() {
        let (sentiment, lines) = run_at(110, &stadium(100));
        assert!((sentiment - 0.4 * 0.6 * APPLY_RATE).abs() < 1e-9);
        assert_eq!(lines, vec!["Ripple_Tracker|cell|r0c11|0.6000".to_string()]);
    }

    #[test]
    fn ripple_expires_at_end_cycle_and_contributes_nothing() {
        let (sentiment, lines) = run_at(120, &stadium(100));
        assert_eq!(sentiment, 0.0);
        assert_eq!(lines, vec!["Ripple_Tracker|cell|r0c10|expired".to_string()]);
    }

    #[test]
    fn new_and_expired_ripples_are_left_alone() {
        let (sentiment, lines) = run_at(100, &stadium(100));
        assert_eq!(sentiment, 0.0);
        assert!(lines.is_empty());

        let mut done = stadium(50);
        done.status = RippleStatus::Expired;
        let (sentiment, lines) = run_at(60, &done);
        assert_eq!(sentiment, 0.0);
        assert!(lines.is_empty());
    }
}
