use bevy_utils::tracing::{info, warn};
use serde_json::json;

use crate::core::context::CycleContext;
use crate::core::pipeline::PhaseError;
use crate::simulation::council::Council;
use crate::world::ledger::LedgerStore;
use crate::world::schema::OFFICES;

/// Phase: office ledger into the `Council` resource.
pub fn load_council(ctx: &mut CycleContext<'_>) -> Result<(), PhaseError> {
    let snapshot = ctx.ledger.get_all_rows(OFFICES)?;
    let council = Council::from_snapshot(&snapshot).map_err(|err| {
        warn!(cycle = ctx.cycle, store = OFFICES, error = %err, "council not loaded");
        err
    })?;

    info!(
        cycle = ctx.cycle,
        seats = council.seats.len(),
        available = council.available_count(),
        vacant = council.vacant_count(),
        "council loaded"
    );
    ctx.summary.record_output(
        "load_council",
        json!({
            "seats": council.seats.len(),
            "available": council.available_count(),
            "vacant": council.vacant_count(),
            "executive": council.executive.as_ref().map(|seat| seat.holder.clone()),
        }),
    );
    ctx.world.insert_resource(council);
    Ok(())
}
