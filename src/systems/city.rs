use bevy_utils::tracing::{debug, info, warn};
use serde_json::json;

use crate::core::context::CycleContext;
use crate::core::pipeline::PhaseError;
use crate::simulation::city::{CityState, Metric};
use crate::systems::take_resource;
use crate::world::ledger::LedgerStore;
use crate::world::schema::{format_scalar, CITY_SCHEMA, CITY_STATE, DEMOGRAPHICS, NEIGHBORHOODS};

/// Phase: city scalars, neighborhood scalars and demographics into `CityState`.
pub fn load_city(ctx: &mut CycleContext<'_>) -> Result<(), PhaseError> {
    let city = ctx.ledger.get_all_rows(CITY_STATE)?;
    let neighborhoods = ctx.ledger.get_all_rows(NEIGHBORHOODS)?;
    let demographics = ctx.ledger.get_all_rows(DEMOGRAPHICS)?;

    let state = CityState::from_snapshots(&city, &neighborhoods, &demographics).map_err(|err| {
        warn!(cycle = ctx.cycle, error = %err, "city state not loaded");
        err
    })?;

    info!(
        cycle = ctx.cycle,
        sentiment = state.sentiment(),
        neighborhoods = state.neighborhoods.len(),
        "city state loaded"
    );
    ctx.summary.record_output(
        "load_city",
        json!({
            "sentiment": state.sentiment(),
            "neighborhoods": state.neighborhoods.len(),
            "demographics": state.demographics.len(),
        }),
    );
    ctx.world.insert_resource(state);
    Ok(())
}

/// Phase: queue a cell write for every scalar whose stored text would change.
pub fn persist_city(ctx: &mut CycleContext<'_>) -> Result<(), PhaseError> {
    let state = take_resource::<CityState>(&mut ctx.world, "CityState")?;
    let result = queue_city_writes(ctx, &state);
    ctx.world.insert_resource(state);
    let (city_writes, neighborhood_writes) = result?;

    ctx.summary.bump("city_writes", city_writes as i64);
    ctx.summary.bump("neighborhood_writes", neighborhood_writes as i64);
    ctx.summary.record_output(
        "persist_city",
        json!({
            "city_writes": city_writes,
            "neighborhood_writes": neighborhood_writes,
        }),
    );
    Ok(())
}

fn queue_city_writes(
    ctx: &mut CycleContext<'_>,
    state: &CityState,
) -> Result<(usize, usize), PhaseError> {
    let snapshot = ctx.ledger.get_all_rows(CITY_STATE)?;
    let map = CITY_SCHEMA.bind(&snapshot)?;
    let value_col = map.require("Value")?;

    let mut city_writes = 0;
    for metric in Metric::ALL {
        let value = format_scalar(state.scalars.get(metric));
        match state.metric_rows.get(&metric) {
            Some(row) => {
                if value != format_scalar(state.loaded.get(metric)) {
                    ctx.ledger.queue_cell_write(CITY_STATE, *row, value_col, value);
                    city_writes += 1;
                }
            }
            None if state.scalars.get(metric) != 0.0 => {
                let row = snapshot
                    .header
                    .iter()
                    .map(|col| match col.trim() {
                        "Metric" => metric.key().to_string(),
                        "Value" => value.clone(),
                        _ => String::new(),
                    })
                    .collect();
                ctx.ledger.queue_append_row(CITY_STATE, row);
                city_writes += 1;
            }
            None => {}
        }
    }

    let mut neighborhood_writes = 0;
    for hood in state.neighborhoods.values() {
        for metric in Metric::ALL {
            let value = format_scalar(hood.scalars.get(metric));
            if value == format_scalar(hood.loaded.get(metric)) {
                continue;
            }
            match state.neighborhood_columns.get(&metric) {
                Some(col) => {
                    ctx.ledger.queue_cell_write(NEIGHBORHOODS, hood.row, *col, value);
                    neighborhood_writes += 1;
                }
                None => debug!(
                    neighborhood = %hood.name,
                    metric = metric.key(),
                    "no column for neighborhood scalar, change kept in memory only"
                ),
            }
        }
    }
    Ok((city_writes, neighborhood_writes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::RunMode;
    use crate::core::rng::CycleRng;
    use crate::world::ledger::{BatchedLedger, IntentKind, IntentLedger, Table};
    use crate::world::memory::MemoryTables;
    use chrono::{TimeZone, Utc};

    fn table(header: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            header: header.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn tables() -> MemoryTables {
        let mut tables = MemoryTables::default();
        tables.insert(
            CITY_STATE,
            table(&["Metric", "Value"], &[&["sentiment", "0.1000"], &["retail", "1.0000"]]),
        );
        tables.insert(
            NEIGHBORHOODS,
            table(&["Neighborhood", "Sentiment"], &[&["Temescal", "0.0000"]]),
        );
        tables
    }

    #[test]
    fn only_changed_scalars_are_written() {
        let mut inner = BatchedLedger::new(tables());
        let mut ctx = CycleContext::new(
            3,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            RunMode::DryRun,
            CycleRng::from_seed(3),
            IntentLedger::recording_only(&mut inner),
        );
        load_city(&mut ctx).unwrap();
        {
            let mut city = ctx.world.resource_mut::<CityState>();
            city.add(Metric::Sentiment, 0.05, None);
            city.add(Metric::Traffic, 0.2, None);
            city.add(Metric::Sentiment, -0.1, Some("temescal"));
            city.add(Metric::Retail, 0.00001, None);
        }
        persist_city(&mut ctx).unwrap();

        let lines: Vec<String> = ctx
            .ledger
            .intents()
            .iter()
            .map(|intent| intent.canonical_line())
            .collect();
        assert_eq!(
            lines,
            vec![
                "City_State|cell|r0c1|0.1500".to_string(),
                "City_State|append|end|traffic\u{1f}0.2000".to_string(),
                "Neighborhood_Map|cell|r0c1|-0.1000".to_string(),
            ]
        );
        assert_eq!(ctx.ledger.intents()[1].kind, IntentKind::Append);
        assert_eq!(ctx.summary.counter("city_writes"), 2);
        assert!(ctx.world.get_resource::<CityState>().is_some());
    }

    #[test]
    fn persist_without_a_loaded_city_fails() {
        let mut inner = BatchedLedger::new(tables());
        let mut ctx = CycleContext::new(
            3,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            RunMode::DryRun,
            CycleRng::from_seed(3),
            IntentLedger::recording_only(&mut inner),
        );
        assert!(matches!(
            persist_city(&mut ctx),
            Err(PhaseError::MissingResource("CityState"))
        ));
        assert!(ctx.ledger.intents().is_empty());
    }
}
