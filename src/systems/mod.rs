pub mod city;
pub mod civic;
pub mod council;
pub mod ripple;

use bevy_ecs::prelude::*;

use crate::core::pipeline::PhaseError;

/// Move a loaded resource out of the world for the length of a phase.
/// Loaders insert these; if the loader failed this cycle the phase refuses to run on defaults.
pub(crate) fn take_resource<R: Resource>(
    world: &mut World,
    name: &'static str,
) -> Result<R, PhaseError> {
    world
        .remove_resource::<R>()
        .ok_or(PhaseError::MissingResource(name))
}
