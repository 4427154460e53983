pub mod core;
pub mod data;
pub mod rules;
pub mod simulation;
pub mod systems;
pub mod world;

pub use crate::core::context::{CycleContext, RunMode, Summary};
pub use crate::core::pipeline::{CycleError, Phase, PhaseError};
pub use crate::core::replay::{ReplayReport, ReplayVerdict};
pub use crate::core::world::{CycleEngine, CycleReport};
pub use crate::systems::civic::ManualResolution;
