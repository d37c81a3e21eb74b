//! The triage engine core: per-run pipeline execution, resilience,
//! decisioning, fault injection, and event fanout.

pub mod bus;
pub mod decision;
pub mod engine;
mod orchestrator;
pub mod resilience;
pub mod simulation;
pub mod steps;

pub use bus::TriageBus;
pub use engine::{TriageEngine, TriageError};
pub use resilience::{BreakerTable, CircuitState, ToolError};
pub use simulation::SimulationPlan;
pub use steps::StepOutput;
