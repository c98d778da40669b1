//! Evolutionary data model
//!
//! Individuals carry heterogeneous genomes: reals, integers, enum
//! choices and integer lists. Mutation, crossover and distance all
//! dispatch on the cell type.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use noesis_types::{current_timestamp, new_id};

/// One typed genome cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum GeneValue {
    Real(f64),
    Integer(i64),
    Choice(String),
    IntList(Vec<i64>),
}

impl GeneValue {
    pub fn as_real(&self) -> Option<f64> {
        match self {
            GeneValue::Real(v) => Some(*v),
            GeneValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            GeneValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<&str> {
        match self {
            GeneValue::Choice(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            GeneValue::IntList(v) => Some(v),
            _ => None,
        }
    }
}

/// Hyperparameter map keyed by cell name
pub type Genome = HashMap<String, GeneValue>;

/// Option sets for the choice-typed cells
pub const ACTIVATIONS: [&str; 3] = ["relu", "tanh", "sigmoid"];
pub const OPTIMIZERS: [&str; 3] = ["adam", "sgd", "rmsprop"];

/// One candidate configuration within a population
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    pub id: String,
    pub genome: Genome,
    pub fitness: f64,
    pub age: u32,
    pub generation: u64,
    /// Empty for seeds, exactly two prior identities otherwise
    pub parent_ids: Vec<String>,
    /// Human-readable log of applied mutations
    pub mutations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Individual {
    /// A generation-zero individual with no parents and zero fitness
    pub fn seed(genome: Genome) -> Self {
        Self {
            id: new_id(),
            genome,
            fitness: 0.0,
            age: 0,
            generation: 0,
            parent_ids: Vec::new(),
            mutations: Vec::new(),
            created_at: current_timestamp(),
        }
    }

    /// A child of two parents; its generation never precedes theirs
    pub fn offspring(genome: Genome, a: &Individual, b: &Individual) -> Self {
        Self {
            id: new_id(),
            genome,
            fitness: 0.0,
            age: 0,
            generation: a.generation.max(b.generation) + 1,
            parent_ids: vec![a.id.clone(), b.id.clone()],
            mutations: Vec::new(),
            created_at: current_timestamp(),
        }
    }
}

/// A generation of competing individuals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    pub id: String,
    pub individuals: Vec<Individual>,
    pub generation: u64,
    pub best_fitness: f64,
    pub average_fitness: f64,
    pub diversity: f64,
    pub created_at: DateTime<Utc>,
}

impl Population {
    pub fn new(individuals: Vec<Individual>, generation: u64) -> Self {
        let mut population = Self {
            id: new_id(),
            individuals,
            generation,
            best_fitness: 0.0,
            average_fitness: 0.0,
            diversity: 0.0,
            created_at: current_timestamp(),
        };
        population.recompute_stats();
        population
    }

    pub fn size(&self) -> usize {
        self.individuals.len()
    }

    /// Highest-fitness member, if any
    pub fn best(&self) -> Option<&Individual> {
        self.individuals
            .iter()
            .max_by(|a, b| a.fitness.partial_cmp(&b.fitness).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Refresh best/average fitness and diversity from the members
    pub fn recompute_stats(&mut self) {
        if self.individuals.is_empty() {
            self.best_fitness = 0.0;
            self.average_fitness = 0.0;
            self.diversity = 0.0;
            return;
        }
        let total: f64 = self.individuals.iter().map(|i| i.fitness).sum();
        self.average_fitness = total / self.individuals.len() as f64;
        self.best_fitness = self
            .individuals
            .iter()
            .map(|i| i.fitness)
            .fold(f64::NEG_INFINITY, f64::max);
        self.diversity = population_diversity(&self.individuals);
    }
}

/// Distance between two genomes
///
/// Per-cell distances (numeric `|a - b|`, choices 0/1, integer lists
/// averaged element-wise over the common prefix, mixed kinds 1) are
/// averaged over the cells present in both genomes; disjoint genomes
/// are at distance zero because nothing is comparable.
pub fn genome_distance(a: &Genome, b: &Genome) -> f64 {
    let mut total = 0.0;
    let mut compared = 0usize;
    for (key, left) in a {
        let right = match b.get(key) {
            Some(right) => right,
            None => continue,
        };
        total += cell_distance(left, right);
        compared += 1;
    }
    if compared == 0 {
        0.0
    } else {
        total / compared as f64
    }
}

fn cell_distance(left: &GeneValue, right: &GeneValue) -> f64 {
    match (left, right) {
        (GeneValue::Choice(a), GeneValue::Choice(b)) => {
            if a == b {
                0.0
            } else {
                1.0
            }
        }
        (GeneValue::IntList(a), GeneValue::IntList(b)) => {
            let common = a.len().min(b.len());
            if common == 0 {
                return if a.len() == b.len() { 0.0 } else { 1.0 };
            }
            let sum: f64 = a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).abs() as f64)
                .sum();
            sum / common as f64
        }
        (left, right) => match (left.as_real(), right.as_real()) {
            (Some(a), Some(b)) => (a - b).abs(),
            _ => 1.0,
        },
    }
}

/// Mean pairwise genome distance over all unordered pairs
///
/// Zero for populations smaller than two.
pub fn population_diversity(individuals: &[Individual]) -> f64 {
    if individuals.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..individuals.len() {
        for j in (i + 1)..individuals.len() {
            total += genome_distance(&individuals[i].genome, &individuals[j].genome);
            pairs += 1;
        }
    }
    total / pairs as f64
}

/// Draw a fresh genome from the per-cell seeding distributions
pub fn random_genome<R: Rng>(rng: &mut R) -> Genome {
    let mut genome = Genome::new();
    genome.insert(
        "learning_rate".to_string(),
        GeneValue::Real(rng.gen_range(0.0..0.1)),
    );
    genome.insert(
        "batch_size".to_string(),
        GeneValue::Integer(rng.gen_range(16..=80)),
    );
    genome.insert(
        "hidden_layers".to_string(),
        GeneValue::Integer(rng.gen_range(1..=5)),
    );
    genome.insert(
        "dropout_rate".to_string(),
        GeneValue::Real(rng.gen_range(0.0..0.5)),
    );
    genome.insert(
        "activation".to_string(),
        GeneValue::Choice(ACTIVATIONS[rng.gen_range(0..ACTIVATIONS.len())].to_string()),
    );
    genome.insert(
        "optimizer".to_string(),
        GeneValue::Choice(OPTIMIZERS[rng.gen_range(0..OPTIMIZERS.len())].to_string()),
    );

    // Input layer of 128, up to four middle layers, output layer of 10
    let middle = rng.gen_range(0..=4);
    let mut architecture = Vec::with_capacity(middle + 2);
    architecture.push(128);
    for _ in 0..middle {
        architecture.push(rng.gen_range(32..=287));
    }
    architecture.push(10);
    genome.insert("architecture".to_string(), GeneValue::IntList(architecture));

    genome
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    fn genome_of(pairs: &[(&str, GeneValue)]) -> Genome {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn distance_of_identical_genomes_is_zero() {
        let g = genome_of(&[
            ("learning_rate", GeneValue::Real(0.01)),
            ("activation", GeneValue::Choice("relu".to_string())),
        ]);
        assert_eq!(genome_distance(&g, &g), 0.0);
    }

    #[test]
    fn distance_mixes_cell_kinds() {
        let a = genome_of(&[
            ("learning_rate", GeneValue::Real(0.02)),
            ("activation", GeneValue::Choice("relu".to_string())),
            ("only_here", GeneValue::Integer(3)),
        ]);
        let b = genome_of(&[
            ("learning_rate", GeneValue::Real(0.05)),
            ("activation", GeneValue::Choice("tanh".to_string())),
        ]);
        // (|0.02 - 0.05| + 1.0) / 2 cells compared in common
        let expected = (0.03 + 1.0) / 2.0;
        assert!((genome_distance(&a, &b) - expected).abs() < 1e-9);
        assert_eq!(genome_distance(&a, &b), genome_distance(&b, &a));
    }

    #[test]
    fn diversity_is_zero_below_two_members() {
        assert_eq!(population_diversity(&[]), 0.0);
        let single = Individual::seed(random_genome(&mut thread_rng()));
        assert_eq!(population_diversity(&[single]), 0.0);
    }

    #[test]
    fn population_stats_keep_best_at_least_average() {
        let mut rng = thread_rng();
        let mut individuals: Vec<Individual> = (0..8)
            .map(|_| Individual::seed(random_genome(&mut rng)))
            .collect();
        for (idx, individual) in individuals.iter_mut().enumerate() {
            individual.fitness = idx as f64 * 0.1;
        }
        let population = Population::new(individuals, 3);

        assert_eq!(population.size(), 8);
        assert!(population.best_fitness >= population.average_fitness);
        assert!(population.diversity >= 0.0);
        assert_eq!(population.best().unwrap().fitness, 0.7);
    }

    #[test]
    fn offspring_generation_never_precedes_parents() {
        let mut rng = thread_rng();
        let mut a = Individual::seed(random_genome(&mut rng));
        let mut b = Individual::seed(random_genome(&mut rng));
        a.generation = 4;
        b.generation = 2;

        let child = Individual::offspring(random_genome(&mut rng), &a, &b);
        assert_eq!(child.generation, 5);
        assert_eq!(child.parent_ids, vec![a.id.clone(), b.id.clone()]);
        assert!(child.generation >= a.generation && child.generation >= b.generation);
    }

    #[test]
    fn random_genome_respects_seeding_ranges() {
        let mut rng = thread_rng();
        for _ in 0..50 {
            let genome = random_genome(&mut rng);
            let lr = genome["learning_rate"].as_real().unwrap();
            assert!((0.0..0.1).contains(&lr));
            let batch = genome["batch_size"].as_integer().unwrap();
            assert!((16..=80).contains(&batch));
            let layers = genome["hidden_layers"].as_integer().unwrap();
            assert!((1..=5).contains(&layers));
            let arch = genome["architecture"].as_int_list().unwrap();
            assert!(arch.len() >= 2 && arch.len() <= 6);
            assert_eq!(arch[0], 128);
            assert_eq!(*arch.last().unwrap(), 10);
            assert!(ACTIVATIONS.contains(&genome["activation"].as_choice().unwrap()));
        }
    }
}
