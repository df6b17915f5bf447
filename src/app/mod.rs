mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::PipelineOrchestrator;
pub use types::{ComponentState, Phase, ShutdownReason};
