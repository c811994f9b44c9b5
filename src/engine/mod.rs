pub mod crack;
pub mod dissolution;
pub mod hydration;
pub mod orchestrator;
pub mod state;

pub use state::Simulation;
