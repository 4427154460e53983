pub mod context;
pub mod ecs;
pub mod pipeline;
pub mod replay;
pub mod rng;
pub mod world;
