//! Configuration types and structures for the noesis platform

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NoesisError, Result};

/// Main configuration structure for the noesis service
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NoesisConfig {
    pub dispatcher: DispatcherConfig,
    pub evolution: EvolutionConfig,
    pub multimodal: MultiModalConfig,
}

impl NoesisConfig {
    pub fn validate(&self) -> Result<()> {
        self.dispatcher.validate()?;
        self.evolution.validate()?;
        self.multimodal.validate()
    }
}

/// Dispatcher configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of simultaneous module invocations
    pub max_concurrency: usize,

    /// Default per-invocation timeout in milliseconds
    pub default_timeout_ms: u64,

    /// Bounded capacity of the result cache
    pub cache_size: usize,

    /// Submissions allowed to wait for an execution slot before
    /// overflow is rejected with backpressure
    pub queue_depth: usize,
}

impl DispatcherConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(NoesisError::ConfigError(
                "max_concurrency must be positive".to_string(),
            ));
        }
        if self.default_timeout_ms == 0 {
            return Err(NoesisError::ConfigError(
                "default_timeout_ms must be positive".to_string(),
            ));
        }
        if self.cache_size == 0 {
            return Err(NoesisError::ConfigError(
                "cache_size must be positive".to_string(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(NoesisError::ConfigError(
                "queue_depth must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            default_timeout_ms: 30_000,
            cache_size: 1000,
            queue_depth: 1000,
        }
    }
}

/// Identifier for a pluggable evolution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Genetic,
    NeuroEvolution,
    GradientFree,
    Hybrid,
    Reinforcement,
    SwarmIntelligence,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Genetic => "genetic",
            StrategyKind::NeuroEvolution => "neuro_evolution",
            StrategyKind::GradientFree => "gradient_free",
            StrategyKind::Hybrid => "hybrid",
            StrategyKind::Reinforcement => "reinforcement",
            StrategyKind::SwarmIntelligence => "swarm_intelligence",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named metric goal consulted by fitness scoring
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OptimizationTarget {
    /// Metric name, resolved against performance-sample fields
    pub name: String,

    /// Relative weight; weights need not sum to one
    pub weight: f64,

    /// Goal value for the metric
    pub target_value: f64,

    /// Acceptable deviation around the goal
    pub tolerance: f64,

    /// Direction: maximize the metric, or keep it below the goal
    pub maximize: bool,

    pub priority: i32,
}

impl OptimizationTarget {
    pub fn new(name: impl Into<String>, weight: f64, target_value: f64, maximize: bool) -> Self {
        Self {
            name: name.into(),
            weight,
            target_value,
            tolerance: 0.0,
            maximize,
            priority: 0,
        }
    }

    /// Achievement of an observed value against this target, in [0, 1]
    ///
    /// Maximizing targets score `value / target_value` capped at one;
    /// minimizing targets score one at or below the goal and degrade
    /// linearly to zero at twice the goal.
    pub fn achievement(&self, value: f64) -> f64 {
        let achievement = if self.maximize {
            if self.target_value <= 0.0 {
                1.0
            } else {
                value / self.target_value
            }
        } else if value <= self.target_value {
            1.0
        } else if self.target_value > 0.0 {
            1.0 - (value - self.target_value) / self.target_value
        } else {
            0.0
        };
        achievement.clamp(0.0, 1.0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(NoesisError::ConfigError(
                "optimization target name must not be empty".to_string(),
            ));
        }
        if self.weight < 0.0 {
            return Err(NoesisError::ConfigError(format!(
                "optimization target '{}' has negative weight",
                self.name
            )));
        }
        if self.tolerance < 0.0 {
            return Err(NoesisError::ConfigError(format!(
                "optimization target '{}' has negative tolerance",
                self.name
            )));
        }
        Ok(())
    }
}

/// Evolution engine configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EvolutionConfig {
    pub strategy: StrategyKind,

    pub population_size: usize,

    /// The engine stops itself once this many generations have run
    pub max_generations: u64,

    /// Per-genome-cell mutation probability
    pub mutation_rate: f64,

    /// Probability that a selected parent pair recombines
    pub crossover_rate: f64,

    /// Fraction of top-fitness individuals carried forward unchanged
    pub elitism_rate: f64,

    /// Stop once best fitness reaches this value; unset means never
    pub fitness_threshold: Option<f64>,

    /// Diversity below this value reports the population as converged
    pub convergence_threshold: f64,

    /// Interval between evolution ticks in milliseconds
    pub tick_interval_ms: u64,

    /// Bounded size of the rolling performance-sample window
    pub sample_window_size: usize,

    /// Named metric targets consulted by fitness scoring
    #[serde(default)]
    pub optimization_targets: Vec<OptimizationTarget>,
}

impl EvolutionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(NoesisError::ConfigError(
                "population_size must be at least 1".to_string(),
            ));
        }
        if self.max_generations == 0 {
            return Err(NoesisError::ConfigError(
                "max_generations must be at least 1".to_string(),
            ));
        }
        for (name, rate) in [
            ("mutation_rate", self.mutation_rate),
            ("crossover_rate", self.crossover_rate),
            ("elitism_rate", self.elitism_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(NoesisError::ConfigError(format!(
                    "{} must lie in [0, 1], got {}",
                    name, rate
                )));
            }
        }
        if self.convergence_threshold < 0.0 {
            return Err(NoesisError::ConfigError(
                "convergence_threshold must be non-negative".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(NoesisError::ConfigError(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.sample_window_size == 0 {
            return Err(NoesisError::ConfigError(
                "sample_window_size must be positive".to_string(),
            ));
        }
        for target in &self.optimization_targets {
            target.validate()?;
        }
        Ok(())
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Genetic,
            population_size: 50,
            max_generations: 1000,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            elitism_rate: 0.1,
            fitness_threshold: None,
            convergence_threshold: 0.01,
            tick_interval_ms: 300_000,
            sample_window_size: 1000,
            optimization_targets: Vec::new(),
        }
    }
}

/// Multi-modal fusion configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MultiModalConfig {
    /// Per-modality fusion weights keyed by sub-task type; an empty map
    /// weights all modalities equally
    #[serde(default)]
    pub modality_weights: HashMap<String, f64>,
}

impl MultiModalConfig {
    pub fn validate(&self) -> Result<()> {
        for (modality, weight) in &self.modality_weights {
            if *weight < 0.0 {
                return Err(NoesisError::ConfigError(format!(
                    "modality weight for '{}' must be non-negative",
                    modality
                )));
            }
        }
        Ok(())
    }
}
