//! Self-evolution subsystem
//!
//! A background engine maintains a population of candidate
//! configurations, scores them against observed performance samples, and
//! breeds the next generation through a pluggable strategy:
//! - Strategy contract and factory
//! - Genetic, neuro-evolution and gradient-free implementations
//! - The background evolution engine and its rolling sample window
//! - An adaptive controller that retunes the evolution config

pub mod adaptive;
pub mod engine;
pub mod genetic;
pub mod gradient_free;
pub mod neuro;

pub use adaptive::AdaptiveController;
pub use engine::{EvolutionEngine, EvolutionStatus};
pub use genetic::GeneticStrategy;
pub use gradient_free::GradientFreeStrategy;
pub use neuro::NeuroEvolutionStrategy;

use rand::Rng;

use noesis_core::{Individual, PerformanceSample, Population};
use noesis_types::{EvolutionConfig, Result, StrategyKind};

/// Contract implemented by every evolution strategy
///
/// Strategies are pure computation over populations; the engine owns all
/// background scheduling and shared state.
pub trait EvolutionStrategy: Send + Sync {
    /// The strategy tag this implementation serves
    fn kind(&self) -> StrategyKind;

    /// Called once before first use, and again whenever the engine's
    /// configuration (including optimization targets) changes
    fn initialize(&mut self, config: &EvolutionConfig) -> Result<()>;

    /// Produce the next generation from the latest performance sample
    fn evolve(&self, population: &Population, sample: &PerformanceSample) -> Result<Population>;

    /// Mutate one individual; `rate` is the per-genome-cell probability
    fn mutate(&self, individual: &Individual, rate: f64) -> Result<Individual>;

    /// Recombine two parents into two children
    fn crossover(&self, a: &Individual, b: &Individual) -> Result<(Individual, Individual)>;

    /// Select `k` individuals, with replacement permitted
    fn select(&self, population: &Population, k: usize) -> Result<Vec<Individual>>;

    /// Score one individual against a performance sample
    fn evaluate(&self, individual: &Individual, sample: &PerformanceSample) -> f64;
}

/// Build the strategy registered for `kind`
///
/// The hybrid, reinforcement and swarm variants are embeddings of the
/// genetic strategy until dedicated implementations land.
pub fn create_strategy(kind: StrategyKind) -> Box<dyn EvolutionStrategy> {
    match kind {
        StrategyKind::Genetic => Box::new(GeneticStrategy::new()),
        StrategyKind::NeuroEvolution => Box::new(NeuroEvolutionStrategy::new()),
        StrategyKind::GradientFree => Box::new(GradientFreeStrategy::new()),
        StrategyKind::Hybrid | StrategyKind::Reinforcement | StrategyKind::SwarmIntelligence => {
            Box::new(GeneticStrategy::with_kind(kind))
        }
    }
}

/// Zero-mean gaussian perturbation via Box-Muller
pub(crate) fn gaussian<R: Rng>(rng: &mut R, sigma: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    sigma * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn factory_maps_every_kind() {
        for kind in [
            StrategyKind::Genetic,
            StrategyKind::NeuroEvolution,
            StrategyKind::GradientFree,
            StrategyKind::Hybrid,
            StrategyKind::Reinforcement,
            StrategyKind::SwarmIntelligence,
        ] {
            let strategy = create_strategy(kind);
            assert_eq!(strategy.kind(), kind);
        }
    }

    #[test]
    fn gaussian_is_roughly_centered() {
        let mut rng = thread_rng();
        let mean: f64 =
            (0..2000).map(|_| gaussian(&mut rng, 0.1)).sum::<f64>() / 2000.0;
        assert!(mean.abs() < 0.02);
    }
}
