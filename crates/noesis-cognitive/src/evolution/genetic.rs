//! Genetic evolution strategy
//!
//! Tournament selection of size three, elitism by fitness, uniform
//! per-cell crossover, and typed per-cell mutation. Fitness combines the
//! observed performance score with an intrinsic genome-quality term.

use std::cmp::Ordering;

use rand::rngs::ThreadRng;
use rand::{thread_rng, Rng};

use noesis_core::{
    performance_score, GeneValue, Genome, Individual, PerformanceSample, Population, ACTIVATIONS,
    OPTIMIZERS,
};
use noesis_types::{EvolutionConfig, NoesisError, Result, StrategyKind};

use super::{gaussian, EvolutionStrategy};

const TOURNAMENT_SIZE: usize = 3;

pub struct GeneticStrategy {
    kind: StrategyKind,
    config: EvolutionConfig,
}

impl GeneticStrategy {
    pub fn new() -> Self {
        Self::with_kind(StrategyKind::Genetic)
    }

    /// A genetic core serving another strategy tag (hybrid, swarm, ...)
    pub fn with_kind(kind: StrategyKind) -> Self {
        Self {
            kind,
            config: EvolutionConfig::default(),
        }
    }

    /// 0.2 per cell falling inside its reasonable interval
    fn genome_quality(genome: &Genome) -> f64 {
        let mut quality = 0.0;
        if let Some(GeneValue::Real(lr)) = genome.get("learning_rate") {
            if *lr > 0.001 && *lr < 0.1 {
                quality += 0.2;
            }
        }
        if let Some(GeneValue::Integer(batch)) = genome.get("batch_size") {
            if (16..=128).contains(batch) {
                quality += 0.2;
            }
        }
        if let Some(GeneValue::Integer(layers)) = genome.get("hidden_layers") {
            if (2..=5).contains(layers) {
                quality += 0.2;
            }
        }
        if let Some(GeneValue::Real(dropout)) = genome.get("dropout_rate") {
            if (0.1..=0.5).contains(dropout) {
                quality += 0.2;
            }
        }
        if let Some(GeneValue::IntList(architecture)) = genome.get("architecture") {
            if (3..=6).contains(&architecture.len()) {
                quality += 0.2;
            }
        }
        quality
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

    /// Typed mutation of one cell; returns the mutated value and a log line
    fn mutate_cell(rng: &mut ThreadRng, key: &str, value: &GeneValue) -> Option<(GeneValue, String)> {
        match value {
            GeneValue::Real(v) => {
                let mutated = (v + gaussian(rng, 0.1)).max(0.0);
                Some((
                    GeneValue::Real(mutated),
                    format!("{}: {:.4} -> {:.4}", key, v, mutated),
                ))
            }
            GeneValue::Integer(v) => {
                let mutated = (v + rng.gen_range(-10..=10)).max(1);
                Some((
                    GeneValue::Integer(mutated),
                    format!("{}: {} -> {}", key, v, mutated),
                ))
            }
            GeneValue::Choice(v) => {
                let options: &[&str] = match key {
                    "activation" => &ACTIVATIONS,
                    "optimizer" => &OPTIMIZERS,
                    _ => return None,
                };
                let mutated = options[rng.gen_range(0..options.len())].to_string();
                let log = format!("{}: {} -> {}", key, v, mutated);
                Some((GeneValue::Choice(mutated), log))
            }
            GeneValue::IntList(v) => {
                if v.is_empty() {
                    return None;
                }
                let index = rng.gen_range(0..v.len());
                let mut mutated = v.clone();
                mutated[index] = rng.gen_range(16..=256);
                let log = format!("{}[{}]: {} -> {}", key, index, v[index], mutated[index]);
                Some((GeneValue::IntList(mutated), log))
            }
        }
    }

    fn rank_by_fitness(individuals: &mut [Individual]) {
        individuals.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(Ordering::Equal)
        });
    }
}

impl Default for GeneticStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl EvolutionStrategy for GeneticStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
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

        // Rank the current generation against the latest sample
        let mut ranked = population.individuals.clone();
        for individual in &mut ranked {
            individual.fitness = self.evaluate(individual, sample);
            individual.age += 1;
        }
        Self::rank_by_fitness(&mut ranked);

        let elite_count = ((size as f64) * self.config.elitism_rate).floor() as usize;
        let mut next: Vec<Individual> = ranked.iter().take(elite_count.min(ranked.len())).cloned().collect();

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
            if rng.gen::<f64>() >= rate {
                continue;
            }
            let current = mutated.genome[&key].clone();
            if let Some((value, log)) = Self::mutate_cell(&mut rng, &key, &current) {
                mutated.genome.insert(key, value);
                mutated.mutations.push(log);
            }
        }
        Ok(mutated)
    }

    fn crossover(&self, a: &Individual, b: &Individual) -> Result<(Individual, Individual)> {
        let mut rng = thread_rng();
        let mut genome_one = Genome::new();
        let mut genome_two = Genome::new();

        let mut keys: Vec<&String> = a.genome.keys().chain(b.genome.keys()).collect();
        keys.sort();
        keys.dedup();
        for key in keys {
            match (a.genome.get(key), b.genome.get(key)) {
                (Some(left), Some(right)) => {
                    if rng.gen::<bool>() {
                        genome_one.insert(key.clone(), left.clone());
                        genome_two.insert(key.clone(), right.clone());
                    } else {
                        genome_one.insert(key.clone(), right.clone());
                        genome_two.insert(key.clone(), left.clone());
                    }
                }
                (Some(only), None) | (None, Some(only)) => {
                    genome_one.insert(key.clone(), only.clone());
                    genome_two.insert(key.clone(), only.clone());
                }
                (None, None) => {}
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
        let performance = performance_score(sample, &self.config.optimization_targets);
        0.7 * performance + 0.3 * Self::genome_quality(&individual.genome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noesis_core::random_genome;

    fn seeded_population(size: usize) -> Population {
        let mut rng = thread_rng();
        let individuals = (0..size)
            .map(|_| Individual::seed(random_genome(&mut rng)))
            .collect();
        Population::new(individuals, 0)
    }

    fn strategy() -> GeneticStrategy {
        let mut strategy = GeneticStrategy::new();
        strategy.initialize(&EvolutionConfig::default()).unwrap();
        strategy
    }

    #[test]
    fn evolve_advances_the_generation_at_configured_size() {
        let strategy = strategy();
        let population = seeded_population(12);
        let sample = PerformanceSample::new(0.9, 0.8, 0.7, 0.6);

        let next = strategy.evolve(&population, &sample).unwrap();
        assert_eq!(next.generation, 1);
        assert_eq!(next.size(), EvolutionConfig::default().population_size);
        assert!(next.best_fitness >= next.average_fitness);
    }

    #[test]
    fn elites_carry_forward() {
        let mut strategy = GeneticStrategy::new();
        let mut config = EvolutionConfig::default();
        config.population_size = 10;
        config.elitism_rate = 0.2;
        strategy.initialize(&config).unwrap();

        let population = seeded_population(10);
        let sample = PerformanceSample::new(0.9, 0.9, 0.9, 0.9);
        let scored: Vec<f64> = population
            .individuals
            .iter()
            .map(|i| strategy.evaluate(i, &sample))
            .collect();
        let mut top = scored.clone();
        top.sort_by(|a, b| b.partial_cmp(a).unwrap());

        let next = strategy.evolve(&population, &sample).unwrap();
        // The two best scores of the old generation survive verbatim
        for expected in top.iter().take(2) {
            assert!(next
                .individuals
                .iter()
                .any(|i| (i.fitness - expected).abs() < 1e-9));
        }
    }

    #[test]
    fn mutation_respects_typed_bounds() {
        let strategy = strategy();
        let mut rng = thread_rng();
        let individual = Individual::seed(random_genome(&mut rng));

        let mutated = strategy.mutate(&individual, 1.0).unwrap();
        assert!(!mutated.mutations.is_empty());
        assert!(mutated.genome["learning_rate"].as_real().unwrap() >= 0.0);
        assert!(mutated.genome["batch_size"].as_integer().unwrap() >= 1);
        assert!(ACTIVATIONS.contains(&mutated.genome["activation"].as_choice().unwrap()));
        assert!(OPTIMIZERS.contains(&mutated.genome["optimizer"].as_choice().unwrap()));
    }

    #[test]
    fn zero_rate_mutation_is_identity() {
        let strategy = strategy();
        let mut rng = thread_rng();
        let individual = Individual::seed(random_genome(&mut rng));
        let mutated = strategy.mutate(&individual, 0.0).unwrap();
        assert_eq!(mutated.genome, individual.genome);
        assert!(mutated.mutations.is_empty());
    }

    #[test]
    fn crossover_produces_two_children_of_the_next_generation() {
        let strategy = strategy();
        let mut rng = thread_rng();
        let a = Individual::seed(random_genome(&mut rng));
        let b = Individual::seed(random_genome(&mut rng));

        let (c1, c2) = strategy.crossover(&a, &b).unwrap();
        for child in [&c1, &c2] {
            assert_eq!(child.generation, 1);
            assert_eq!(child.parent_ids, vec![a.id.clone(), b.id.clone()]);
            assert_eq!(child.genome.len(), a.genome.len());
            for (key, value) in &child.genome {
                assert!(a.genome[key] == *value || b.genome[key] == *value);
            }
        }
    }

    #[test]
    fn fitness_blends_performance_and_genome_quality() {
        let strategy = strategy();
        let sample = PerformanceSample::new(1.0, 1.0, 1.0, 1.0);

        let mut good = Genome::new();
        good.insert("learning_rate".to_string(), GeneValue::Real(0.01));
        good.insert("batch_size".to_string(), GeneValue::Integer(64));
        good.insert("hidden_layers".to_string(), GeneValue::Integer(3));
        good.insert("dropout_rate".to_string(), GeneValue::Real(0.3));
        good.insert(
            "architecture".to_string(),
            GeneValue::IntList(vec![128, 64, 10]),
        );
        let ideal = Individual::seed(good);
        assert!((strategy.evaluate(&ideal, &sample) - 1.0).abs() < 1e-9);

        let empty = Individual::seed(Genome::new());
        assert!((strategy.evaluate(&empty, &sample) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn selection_returns_k_members() {
        let strategy = strategy();
        let population = seeded_population(6);
        let selected = strategy.select(&population, 9).unwrap();
        assert_eq!(selected.len(), 9);
    }
}
