//! noesis cognitive orchestration
//!
//! This crate contains the orchestration layer of the noesis platform:
//! - Capability-routed task dispatch with caching, deadlines and backpressure
//! - Multi-modal task decomposition, concurrent fan-out and fusion
//! - Built-in reference capability modules
//! - Self-evolution engine with pluggable strategies and adaptive tuning
//! - Service facade with initialize/shutdown lifecycle

pub mod evolution;
pub mod modules;
pub mod orchestrator;
pub mod service;

// Re-export key types
pub use evolution::{
    create_strategy, AdaptiveController, EvolutionEngine, EvolutionStatus, EvolutionStrategy,
    GeneticStrategy, GradientFreeStrategy, NeuroEvolutionStrategy,
};
pub use modules::register_default_modules;
pub use orchestrator::{Decomposer, Dispatcher, Fuser, MultiModalProcessor};
pub use service::NoesisService;
