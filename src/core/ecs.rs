use bevy_ecs::prelude::*;

use crate::core::pipeline::Phase;
use crate::simulation::city::CityState;
use crate::simulation::council::Council;
use crate::simulation::ripple::RippleRegistry;
use crate::systems::city::{load_city, persist_city};
use crate::systems::civic::{civic_initiatives, manual_resolution};
use crate::systems::council::load_council;
use crate::systems::ripple::{apply_ripples, load_ripples};

/// Build the per-cycle ECS world. World-state resources (`CityState`,
/// `Council`, `RippleRegistry`) are inserted by the load phases, so a phase
/// whose loader failed finds nothing rather than an empty default.
pub fn create_world() -> World {
    World::new()
}

/// True once every load phase has put its resource in place.
pub fn world_loaded(world: &World) -> bool {
    world.contains_resource::<CityState>()
        && world.contains_resource::<Council>()
        && world.contains_resource::<RippleRegistry>()
}

/// Canonical phase ordering for a cycle. Later phases read what earlier ones loaded.
pub fn canonical_phases() -> Vec<Phase> {
    vec![
        Phase::new("load_city", load_city),
        Phase::new("load_council", load_council),
        Phase::new("load_ripples", load_ripples),
        Phase::new("civic_initiatives", civic_initiatives),
        Phase::new("apply_ripples", apply_ripples),
        Phase::new("persist_city", persist_city),
    ]
}

/// Phases for an operator-triggered resolution outside the schedule.
pub fn manual_phases() -> Vec<Phase> {
    vec![
        Phase::new("load_city", load_city),
        Phase::new("load_council", load_council),
        Phase::new("load_ripples", load_ripples),
        Phase::new("manual_resolution", manual_resolution),
        Phase::new("persist_city", persist_city),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loaders_run_before_the_engines_that_read_them() {
        let names: Vec<&str> = canonical_phases().iter().map(|phase| phase.name).collect();
        assert_eq!(
            names,
            vec![
                "load_city",
                "load_council",
                "load_ripples",
                "civic_initiatives",
                "apply_ripples",
                "persist_city",
            ]
        );
        let manual: Vec<&str> = manual_phases().iter().map(|phase| phase.name).collect();
        assert_eq!(manual[3], "manual_resolution");
        assert_eq!(manual.last(), Some(&"persist_city"));
    }

    #[test]
    fn fresh_world_is_not_loaded() {
        let mut world = create_world();
        assert!(!world_loaded(&world));
        world.insert_resource(CityState::default());
        world.insert_resource(Council::default());
        assert!(!world_loaded(&world));
        world.insert_resource(RippleRegistry::default());
        assert!(world_loaded(&world));
    }
}
