//! Adaptive evolution-config tuning
//!
//! On operator request, inspects the most recent performance samples and
//! proposes a retuned evolution configuration. The proposal is returned,
//! not applied; applying it is a separate operator step.

use log::debug;

use noesis_core::PerformanceSample;
use noesis_types::{EvolutionConfig, NoesisError, Result};

/// Minimum number of recent samples required before tuning
const REQUIRED_SAMPLES: usize = 10;

pub struct AdaptiveController {
    required_samples: usize,
}

impl AdaptiveController {
    pub fn new() -> Self {
        Self {
            required_samples: REQUIRED_SAMPLES,
        }
    }

    /// Propose a new configuration from the last ten samples
    ///
    /// Low mean accuracy widens the search (more mutation, a larger
    /// population); high mean accuracy narrows it; low mean efficiency
    /// leans harder on elitism.
    pub fn optimize(
        &self,
        config: &EvolutionConfig,
        samples: &[PerformanceSample],
    ) -> Result<EvolutionConfig> {
        if samples.len() < self.required_samples {
            return Err(NoesisError::InsufficientSamples {
                required: self.required_samples,
                available: samples.len(),
            });
        }
        let recent = &samples[samples.len() - self.required_samples..];
        let mean_accuracy: f64 =
            recent.iter().map(|s| s.accuracy).sum::<f64>() / recent.len() as f64;
        let mean_efficiency: f64 =
            recent.iter().map(|s| s.efficiency).sum::<f64>() / recent.len() as f64;

        let mut tuned = config.clone();
        if mean_accuracy < 0.7 {
            tuned.mutation_rate = (config.mutation_rate * 1.2).min(1.0);
            tuned.population_size = ((config.population_size as f64) * 1.1).round() as usize;
        } else if mean_accuracy > 0.9 {
            tuned.mutation_rate = config.mutation_rate * 0.8;
            tuned.population_size =
                (((config.population_size as f64) * 0.9).round() as usize).max(1);
        }
        if mean_efficiency < 0.6 {
            tuned.elitism_rate = (config.elitism_rate * 1.1).min(1.0);
        }
        debug!(
            "adaptive tuning from accuracy {:.3}, efficiency {:.3}: mutation {:.3} -> {:.3}, population {} -> {}",
            mean_accuracy,
            mean_efficiency,
            config.mutation_rate,
            tuned.mutation_rate,
            config.population_size,
            tuned.population_size
        );
        Ok(tuned)
    }
}

impl Default for AdaptiveController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(accuracy: f64, efficiency: f64, count: usize) -> Vec<PerformanceSample> {
        (0..count)
            .map(|_| PerformanceSample::new(accuracy, efficiency, 0.5, 0.5))
            .collect()
    }

    #[test]
    fn refuses_fewer_than_ten_samples() {
        let controller = AdaptiveController::new();
        let outcome = controller.optimize(&EvolutionConfig::default(), &samples(0.5, 0.5, 9));
        assert!(matches!(
            outcome,
            Err(NoesisError::InsufficientSamples {
                required: 10,
                available: 9
            })
        ));
    }

    #[test]
    fn low_accuracy_widens_the_search() {
        let controller = AdaptiveController::new();
        let config = EvolutionConfig::default();
        let tuned = controller.optimize(&config, &samples(0.5, 0.8, 10)).unwrap();

        assert!((tuned.mutation_rate - config.mutation_rate * 1.2).abs() < 1e-9);
        assert_eq!(tuned.population_size, 55);
        assert_eq!(tuned.elitism_rate, config.elitism_rate);
    }

    #[test]
    fn high_accuracy_narrows_the_search() {
        let controller = AdaptiveController::new();
        let config = EvolutionConfig::default();
        let tuned = controller.optimize(&config, &samples(0.95, 0.8, 10)).unwrap();

        assert!((tuned.mutation_rate - config.mutation_rate * 0.8).abs() < 1e-9);
        assert_eq!(tuned.population_size, 45);
    }

    #[test]
    fn low_efficiency_boosts_elitism() {
        let controller = AdaptiveController::new();
        let config = EvolutionConfig::default();
        let tuned = controller.optimize(&config, &samples(0.8, 0.4, 10)).unwrap();

        assert!((tuned.elitism_rate - config.elitism_rate * 1.1).abs() < 1e-9);
        assert_eq!(tuned.mutation_rate, config.mutation_rate);
        assert_eq!(tuned.population_size, config.population_size);
    }

    #[test]
    fn only_the_last_ten_samples_count() {
        let controller = AdaptiveController::new();
        let config = EvolutionConfig::default();
        let mut history = samples(0.2, 0.8, 5);
        history.extend(samples(0.95, 0.8, 10));

        let tuned = controller.optimize(&config, &history).unwrap();
        // The old low-accuracy samples fall outside the window
        assert!(tuned.mutation_rate < config.mutation_rate);
    }

    #[test]
    fn proposal_does_not_mutate_the_input() {
        let controller = AdaptiveController::new();
        let config = EvolutionConfig::default();
        let before = config.clone();
        controller.optimize(&config, &samples(0.5, 0.5, 10)).unwrap();
        assert_eq!(config.population_size, before.population_size);
        assert_eq!(config.mutation_rate, before.mutation_rate);
    }
}
