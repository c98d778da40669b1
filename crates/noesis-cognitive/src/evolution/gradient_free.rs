//! Gradient-free evolution strategies
//!
//! (µ+λ)-style truncation: the top half of the population survives each
//! generation and mutated copies refill the rest. Mutation is additive
//! gaussian noise on real-valued cells only; there is no recombination.

use std::cmp::Ordering;

use rand::{thread_rng, Rng};

use noesis_core::{
    performance_score, GeneValue, Individual, PerformanceSample, Population,
};
use noesis_types::{EvolutionConfig, NoesisError, Result, StrategyKind};

use super::{gaussian, EvolutionStrategy};

pub struct GradientFreeStrategy {
    config: EvolutionConfig,
}

impl GradientFreeStrategy {
    pub fn new() -> Self {
        Self {
            config: EvolutionConfig::default(),
        }
    }

    fn survivors(size: usize) -> usize {
        (size / 2).max(1)
    }
}

impl Default for GradientFreeStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl EvolutionStrategy for GradientFreeStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GradientFree
    }

    fn initialize(&mut self, config: &EvolutionConfig) -> Result<()> {
        config.validate()?;
        self.config = config.clone();
        Ok(())
    }

    fn evolve(&self, population: &Population, sample: &PerformanceSample) -> Result<Population> {
        if population.individuals.is_empty() {
            return Err(NoesisError::InvalidInput(
                "cannot evolve an empty population".to_string(),
            ));
        }
        let mut rng = thread_rng();
        let size = self.config.population_size.max(1);
        let next_generation = population.generation + 1;

        let mut ranked = population.individuals.clone();
        for individual in &mut ranked {
            individual.fitness = self.evaluate(individual, sample);
            individual.age += 1;
        }
        ranked.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(Ordering::Equal)
        });

        let mu = Self::survivors(size).min(ranked.len());
        let mut next: Vec<Individual> = ranked.iter().take(mu).cloned().collect();

        while next.len() < size {
            let parent = &ranked[rng.gen_range(0..mu)];
            let mut child = self.mutate(parent, self.config.mutation_rate)?;
            child.generation = next_generation;
            child.fitness = self.evaluate(&child, sample);
            next.push(child);
        }

        Ok(Population::new(next, next_generation))
    }

    /// Additive gaussian noise on real-valued cells; other cell kinds
    /// pass through unchanged
    fn mutate(&self, individual: &Individual, rate: f64) -> Result<Individual> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(NoesisError::InvalidInput(format!(
                "mutation rate must lie in [0, 1], got {}",
                rate
            )));
        }
        let mut rng = thread_rng();
        let mut mutated = individual.clone();
        let keys: Vec<String> = mutated.genome.keys().cloned().collect();
        for key in keys {
            if let Some(GeneValue::Real(v)) = mutated.genome.get(&key).cloned() {
                if rng.gen::<f64>() < rate {
                    let perturbed = (v + gaussian(&mut rng, 0.1)).max(0.0);
                    mutated
                        .mutations
                        .push(format!("{}: {:.4} -> {:.4}", key, v, perturbed));
                    mutated.genome.insert(key, GeneValue::Real(perturbed));
                }
            }
        }
        Ok(mutated)
    }

    /// This strategy does not recombine; children are copies of their
    /// parents and variation comes from mutation alone
    fn crossover(&self, a: &Individual, b: &Individual) -> Result<(Individual, Individual)> {
        Ok((
            Individual::offspring(a.genome.clone(), a, b),
            Individual::offspring(b.genome.clone(), a, b),
        ))
    }

    /// Top-k truncation selection
    fn select(&self, population: &Population, k: usize) -> Result<Vec<Individual>> {
        if population.individuals.is_empty() {
            return Err(NoesisError::InvalidInput(
                "cannot select from an empty population".to_string(),
            ));
        }
        let mut ranked = population.individuals.clone();
        ranked.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(Ordering::Equal)
        });
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Purely sample-driven; the genome contributes no intrinsic term
    fn evaluate(&self, _individual: &Individual, sample: &PerformanceSample) -> f64 {
        if self.config.optimization_targets.is_empty() {
            0.6 * sample.accuracy + 0.4 * sample.efficiency
        } else {
            performance_score(sample, &self.config.optimization_targets)
        }
    }
}
