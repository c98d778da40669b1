//! Neuro-evolution strategy
//!
//! Treats the genome's architecture cells as first-class: numeric cells
//! are perturbed in place, structural mutations insert or remove a
//! middle layer with small probability, and crossover splices parallel
//! layer vectors at a single random point. Fitness discounts structural
//! complexity.

use std::cmp::Ordering;

use rand::rngs::ThreadRng;
use rand::{thread_rng, Rng};

use noesis_core::{
    performance_score, GeneValue, Genome, Individual, PerformanceSample, Population,
};
use noesis_types::{EvolutionConfig, NoesisError, Result, StrategyKind};

use super::{gaussian, EvolutionStrategy};

const STRUCTURAL_MUTATION_RATE: f64 = 0.05;
const TOURNAMENT_SIZE: usize = 3;

pub struct NeuroEvolutionStrategy {
    config: EvolutionConfig,
}

impl NeuroEvolutionStrategy {
    pub fn new() -> Self {
        Self {
            config: EvolutionConfig::default(),
        }
    }

    /// Complexity penalty input: layer count and estimated parameters
    fn complexity(genome: &Genome) -> f64 {
        let architecture = match genome.get("architecture") {
            Some(GeneValue::IntList(architecture)) => architecture,
            _ => return 0.0,
        };
        let layers = architecture.len() as f64;
        let total_params: i64 = architecture
            .windows(2)
            .map(|pair| pair[0] * pair[1])
            .sum();
        0.1 * layers + 1e-4 * total_params as f64
    }

    fn tournament<'a>(rng: &mut ThreadRng, ranked: &'a [Individual]) -> &'a Individual {
        let mut best: Option<&Individual> = None;
        for _ in 0..TOURNAMENT_SIZE {
            let candidate = &ranked[rng.gen_range(0..ranked.len())];
            if best.map_or(true, |b| candidate.fitness > b.fitness) {
                best = Some(candidate);
            }
        }
        best.expect("tournament over a non-empty population")
    }

    /// Insert or remove one middle layer, keeping input and output fixed
    fn mutate_structure(rng: &mut ThreadRng, architecture: &mut Vec<i64>, log: &mut Vec<String>) {
        if rng.gen::<bool>() && architecture.len() > 2 {
            let index = rng.gen_range(1..architecture.len() - 1);
            let removed = architecture.remove(index);
            log.push(format!("architecture: removed layer of {} units", removed));
        } else {
            let index = if architecture.len() > 1 {
                rng.gen_range(1..architecture.len())
            } else {
                architecture.len()
            };
            let units = rng.gen_range(32..=287);
            architecture.insert(index, units);
            log.push(format!("architecture: inserted layer of {} units", units));
        }
    }
}

impl Default for NeuroEvolutionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl EvolutionStrategy for NeuroEvolutionStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::NeuroEvolution
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

        let elite_count = ((size as f64) * self.config.elitism_rate).floor() as usize;
        let mut next: Vec<Individual> =
            ranked.iter().take(elite_count.min(ranked.len())).cloned().collect();

        while next.len() < size {
            let p1 = Self::tournament(&mut rng, &ranked);
            let p2 = Self::tournament(&mut rng, &ranked);
            let (c1, c2) = if rng.gen::<f64>() < self.config.crossover_rate {
                self.crossover(p1, p2)?
            } else {
                (
                    Individual::offspring(p1.genome.clone(), p1, p2),
                    Individual::offspring(p2.genome.clone(), p1, p2),
                )
            };
            for child in [c1, c2] {
                if next.len() >= size {
                    break;
                }
                let mut child = self.mutate(&child, self.config.mutation_rate)?;
                child.fitness = self.evaluate(&child, sample);
                next.push(child);
            }
        }

        Ok(Population::new(next, next_generation))
    }

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
            match mutated.genome.get(&key).cloned() {
                Some(GeneValue::Real(v)) if rng.gen::<f64>() < rate => {
                    let perturbed = (v + gaussian(&mut rng, 0.1)).max(0.0);
                    mutated
                        .mutations
                        .push(format!("{}: {:.4} -> {:.4}", key, v, perturbed));
                    mutated.genome.insert(key, GeneValue::Real(perturbed));
                }
                Some(GeneValue::IntList(mut layers)) if key == "architecture" => {
                    if rng.gen::<f64>() < STRUCTURAL_MUTATION_RATE {
                        Self::mutate_structure(&mut rng, &mut layers, &mut mutated.mutations);
                        mutated.genome.insert(key, GeneValue::IntList(layers));
                    } else if rng.gen::<f64>() < rate && layers.len() > 2 {
                        // Perturb one middle layer's width
                        let index = rng.gen_range(1..layers.len() - 1);
                        let old = layers[index];
                        let delta = gaussian(&mut rng, 16.0).round() as i64;
                        layers[index] = (old + delta).max(1);
                        mutated
                            .mutations
                            .push(format!("architecture[{}]: {} -> {}", index, old, layers[index]));
                        mutated.genome.insert(key, GeneValue::IntList(layers));
                    }
                }
                _ => {}
            }
        }
        Ok(mutated)
    }

    /// Single-point crossover over the parallel layer vectors; scalar
    /// cells pass through from the respective parent
    fn crossover(&self, a: &Individual, b: &Individual) -> Result<(Individual, Individual)> {
        let mut rng = thread_rng();
        let mut genome_one = a.genome.clone();
        let mut genome_two = b.genome.clone();

        if let (Some(GeneValue::IntList(left)), Some(GeneValue::IntList(right))) =
            (a.genome.get("architecture"), b.genome.get("architecture"))
        {
            let common = left.len().min(right.len());
            if common > 0 {
                let cut = rng.gen_range(0..=common);
                let spliced_one: Vec<i64> = left[..cut]
                    .iter()
                    .chain(right[cut..].iter())
                    .copied()
                    .collect();
                let spliced_two: Vec<i64> = right[..cut]
                    .iter()
                    .chain(left[cut..].iter())
                    .copied()
                    .collect();
                genome_one.insert("architecture".to_string(), GeneValue::IntList(spliced_one));
                genome_two.insert("architecture".to_string(), GeneValue::IntList(spliced_two));
            }
        }

        Ok((
            Individual::offspring(genome_one, a, b),
            Individual::offspring(genome_two, a, b),
        ))
    }

    fn select(&self, population: &Population, k: usize) -> Result<Vec<Individual>> {
        if population.individuals.is_empty() {
            return Err(NoesisError::InvalidInput(
                "cannot select from an empty population".to_string(),
            ));
        }
        let mut rng = thread_rng();
        Ok((0..k)
            .map(|_| Self::tournament(&mut rng, &population.individuals).clone())
            .collect())
    }

    fn evaluate(&self, individual: &Individual, sample: &PerformanceSample) -> f64 {
        let base = performance_score(sample, &self.config.optimization_targets);
        base - 0.1 * Self::complexity(&individual.genome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noesis_core::random_genome;

    fn individual_with_architecture(architecture: Vec<i64>) -> Individual {
        let mut genome = Genome::new();
        genome.insert("architecture".to_string(), GeneValue::IntList(architecture));
        genome.insert("learning_rate".to_string(), GeneValue::Real(0.01));
        Individual::seed(genome)
    }

    #[test]
    fn deeper_networks_score_lower_on_equal_samples() {
        let strategy = NeuroEvolutionStrategy::new();
        let sample = PerformanceSample::new(0.9, 0.9, 0.9, 0.9);

        let shallow = individual_with_architecture(vec![128, 10]);
        let deep = individual_with_architecture(vec![128, 256, 256, 256, 10]);
        assert!(strategy.evaluate(&shallow, &sample) > strategy.evaluate(&deep, &sample));
    }

    #[test]
    fn crossover_splices_at_one_point() {
        let strategy = NeuroEvolutionStrategy::new();
        let a = individual_with_architecture(vec![128, 64, 10]);
        let b = individual_with_architecture(vec![128, 200, 10]);

        let (c1, c2) = strategy.crossover(&a, &b).unwrap();
        for child in [&c1, &c2] {
            let layers = child.genome["architecture"].as_int_list().unwrap();
            assert_eq!(layers.len(), 3);
            for (index, units) in layers.iter().enumerate() {
                let left = a.genome["architecture"].as_int_list().unwrap()[index];
                let right = b.genome["architecture"].as_int_list().unwrap()[index];
                assert!(*units == left || *units == right);
            }
        }
    }

    #[test]
    fn structural_mutation_keeps_terminals() {
        let mut rng = thread_rng();
        for _ in 0..100 {
            let mut layers = vec![128, 64, 32, 10];
            let mut log = Vec::new();
            NeuroEvolutionStrategy::mutate_structure(&mut rng, &mut layers, &mut log);
            assert_eq!(*layers.first().unwrap(), 128);
            assert_eq!(*layers.last().unwrap(), 10);
            assert!(!log.is_empty());
        }
    }

    #[test]
    fn evolve_fills_the_configured_size() {
        let mut strategy = NeuroEvolutionStrategy::new();
        let mut config = EvolutionConfig::default();
        config.population_size = 8;
        strategy.initialize(&config).unwrap();

        let mut rng = thread_rng();
        let individuals = (0..4)
            .map(|_| Individual::seed(random_genome(&mut rng)))
            .collect();
        let population = Population::new(individuals, 2);
        let sample = PerformanceSample::new(0.8, 0.7, 0.6, 0.5);

        let next = strategy.evolve(&population, &sample).unwrap();
        assert_eq!(next.generation, 3);
        assert_eq!(next.size(), 8);
        assert!(next.best_fitness >= next.average_fitness);
    }
}
