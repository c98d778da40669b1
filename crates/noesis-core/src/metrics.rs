//! Performance samples and target-aware scoring
//!
//! External observers feed `PerformanceSample`s into the evolution
//! engine's rolling window. `performance_score` turns one sample into a
//! scalar, either against the configured optimization targets or, when
//! none are set, with the flat 40/30/20/10 weighting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use noesis_types::{current_timestamp, OptimizationTarget};

/// One observation of system performance
///
/// All scalar fields lie in [0, 1] (clamped at construction) except
/// latency and throughput, which are non-negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub accuracy: f64,
    pub efficiency: f64,
    pub robustness: f64,
    pub adaptability: f64,
    pub resource_usage: f64,
    pub error_rate: f64,
    pub latency_ms: u64,
    pub throughput: f64,
    #[serde(default)]
    pub custom: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl PerformanceSample {
    pub fn new(accuracy: f64, efficiency: f64, robustness: f64, adaptability: f64) -> Self {
        Self {
            accuracy: accuracy.clamp(0.0, 1.0),
            efficiency: efficiency.clamp(0.0, 1.0),
            robustness: robustness.clamp(0.0, 1.0),
            adaptability: adaptability.clamp(0.0, 1.0),
            resource_usage: 0.0,
            error_rate: 0.0,
            latency_ms: 0,
            throughput: 0.0,
            custom: HashMap::new(),
            timestamp: current_timestamp(),
        }
    }

    pub fn with_resource_usage(mut self, resource_usage: f64) -> Self {
        self.resource_usage = resource_usage.clamp(0.0, 1.0);
        self
    }

    pub fn with_error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_throughput(mut self, throughput: f64) -> Self {
        self.throughput = throughput.max(0.0);
        self
    }

    pub fn with_custom(mut self, name: impl Into<String>, value: f64) -> Self {
        self.custom.insert(name.into(), value);
        self
    }

    /// Resolve a metric by name, falling back to the custom map
    pub fn metric(&self, name: &str) -> Option<f64> {
        match name {
            "accuracy" => Some(self.accuracy),
            "efficiency" => Some(self.efficiency),
            "robustness" => Some(self.robustness),
            "adaptability" => Some(self.adaptability),
            "resource_usage" => Some(self.resource_usage),
            "error_rate" => Some(self.error_rate),
            "latency" | "latency_ms" => Some(self.latency_ms as f64),
            "throughput" => Some(self.throughput),
            other => self.custom.get(other).copied(),
        }
    }
}

/// Flat weighted sum used when no optimization targets are configured
pub fn base_score(sample: &PerformanceSample) -> f64 {
    0.4 * sample.accuracy
        + 0.3 * sample.efficiency
        + 0.2 * sample.robustness
        + 0.1 * sample.adaptability
}

/// Score a sample against the configured targets
///
/// Weighted mean of per-target achievements, normalized by total weight.
/// Targets naming metrics the sample does not carry contribute zero
/// achievement but still count toward the weight. Falls back to
/// `base_score` when no target carries weight.
pub fn performance_score(sample: &PerformanceSample, targets: &[OptimizationTarget]) -> f64 {
    let total_weight: f64 = targets.iter().map(|t| t.weight).sum();
    if targets.is_empty() || total_weight <= 0.0 {
        return base_score(sample);
    }
    let mut score = 0.0;
    for target in targets {
        if let Some(value) = sample.metric(&target.name) {
            score += target.achievement(value) * target.weight;
        }
    }
    score / total_weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_clamps_scalars() {
        let sample = PerformanceSample::new(1.4, -0.2, 0.5, 0.5)
            .with_error_rate(2.0)
            .with_throughput(-3.0);
        assert_eq!(sample.accuracy, 1.0);
        assert_eq!(sample.efficiency, 0.0);
        assert_eq!(sample.error_rate, 1.0);
        assert_eq!(sample.throughput, 0.0);
    }

    #[test]
    fn base_score_uses_flat_weighting() {
        let sample = PerformanceSample::new(1.0, 1.0, 1.0, 1.0);
        assert!((base_score(&sample) - 1.0).abs() < 1e-9);

        let sample = PerformanceSample::new(0.5, 0.0, 0.0, 0.0);
        assert!((base_score(&sample) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn score_without_targets_falls_back() {
        let sample = PerformanceSample::new(0.8, 0.6, 0.4, 0.2);
        assert_eq!(performance_score(&sample, &[]), base_score(&sample));
    }

    #[test]
    fn score_normalizes_by_total_weight() {
        let sample = PerformanceSample::new(0.9, 0.3, 0.0, 0.0);
        let targets = vec![
            OptimizationTarget::new("accuracy", 3.0, 0.9, true),
            OptimizationTarget::new("efficiency", 1.0, 0.6, true),
        ];
        // accuracy achievement 1.0, efficiency achievement 0.5
        let expected = (1.0 * 3.0 + 0.5 * 1.0) / 4.0;
        assert!((performance_score(&sample, &targets) - expected).abs() < 1e-9);
    }

    #[test]
    fn custom_metrics_resolve_by_name() {
        let sample = PerformanceSample::new(0.5, 0.5, 0.5, 0.5).with_custom("recall", 0.75);
        assert_eq!(sample.metric("recall"), Some(0.75));
        assert_eq!(sample.metric("unknown"), None);
    }
}
