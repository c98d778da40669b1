//! Background evolution engine
//!
//! Hosts the population, the rolling performance-sample window and the
//! best-seen individual, and runs evolution steps on a fixed cadence in
//! a single background task. Strategy errors are logged and the tick
//! skipped; the loop itself never aborts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use noesis_core::{random_genome, Individual, PerformanceSample, Population};
use noesis_types::{EvolutionConfig, NoesisError, OptimizationTarget, Result};

use super::adaptive::AdaptiveController;
use super::{create_strategy, EvolutionStrategy};

/// Point-in-time view of the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionStatus {
    pub running: bool,
    pub current_generation: u64,
    pub population_size: usize,
    pub best_fitness: f64,
    pub average_fitness: f64,
    pub diversity: f64,
    /// Diversity has fallen below the configured convergence threshold
    pub converged: bool,
}

struct EngineState {
    config: EvolutionConfig,
    population: Option<Population>,
    best: Option<Individual>,
    samples: VecDeque<PerformanceSample>,
    generation: u64,
}

type SharedState = Arc<Mutex<EngineState>>;
type SharedStrategy = Arc<Mutex<Box<dyn EvolutionStrategy>>>;

pub struct EvolutionEngine {
    state: SharedState,
    strategy: SharedStrategy,
    running: Arc<AtomicBool>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    loop_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl EvolutionEngine {
    pub fn new(config: EvolutionConfig) -> Result<Self> {
        config.validate()?;
        let mut strategy = create_strategy(config.strategy);
        strategy.initialize(&config)?;
        Ok(Self {
            state: Arc::new(Mutex::new(EngineState {
                config,
                population: None,
                best: None,
                samples: VecDeque::new(),
                generation: 0,
            })),
            strategy: Arc::new(Mutex::new(strategy)),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Mutex::new(None),
            loop_handle: tokio::sync::Mutex::new(None),
        })
    }

    /// Start the background evolution loop
    ///
    /// Seeds a random population when none exists yet. Fails when the
    /// engine is already running.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(NoesisError::EvolutionAlreadyRunning);
        }

        let tick = {
            let mut state = lock_state(&self.state)?;
            if state.population.is_none() {
                let size = state.config.population_size.max(1);
                let mut rng = thread_rng();
                let individuals = (0..size)
                    .map(|_| Individual::seed(random_genome(&mut rng)))
                    .collect();
                state.population = Some(Population::new(individuals, 0));
                info!("seeded evolution population of {} individuals", size);
            }
            state.config.tick_interval()
        };

        let (tx, mut rx) = watch::channel(false);
        *lock(&self.shutdown, "evolution shutdown")? = Some(tx);

        let state = self.state.clone();
        let strategy = self.strategy.clone();
        let running = self.running.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(err) = Self::step_inner(&state, &strategy) {
                            warn!("evolution tick skipped: {}", err);
                        }
                        if Self::termination_reached(&state) {
                            running.store(false, Ordering::SeqCst);
                            break;
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            debug!("evolution loop received stop signal");
                            break;
                        }
                    }
                }
            }
        });
        *self.loop_handle.lock().await = Some(handle);
        info!("evolution engine started");
        Ok(())
    }

    /// Stop the background loop and await its clean exit
    pub async fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(NoesisError::EvolutionNotRunning);
        }
        if let Some(tx) = lock(&self.shutdown, "evolution shutdown")?.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.loop_handle.lock().await.take() {
            let _ = handle.await;
        }
        self.running.store(false, Ordering::SeqCst);
        info!("evolution engine stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Append one performance sample, evicting the oldest beyond the
    /// configured window size
    pub fn update_metrics(&self, sample: PerformanceSample) -> Result<()> {
        let mut state = lock_state(&self.state)?;
        state.samples.push_back(sample);
        while state.samples.len() > state.config.sample_window_size {
            state.samples.pop_front();
        }
        Ok(())
    }

    /// Atomically replace the optimization targets; subsequent fitness
    /// scoring uses the new targets
    pub fn set_optimization_targets(&self, targets: Vec<OptimizationTarget>) -> Result<()> {
        let config = {
            let mut state = lock_state(&self.state)?;
            state.config.optimization_targets = targets;
            state.config.clone()
        };
        lock(&self.strategy, "evolution strategy")?.initialize(&config)
    }

    /// Defensive copy of the best individual seen across all generations
    pub fn best_individual(&self) -> Result<Option<Individual>> {
        Ok(lock_state(&self.state)?.best.clone())
    }

    pub fn status(&self) -> Result<EvolutionStatus> {
        let state = lock_state(&self.state)?;
        let (population_size, best_fitness, average_fitness, diversity) = match &state.population {
            Some(population) => (
                population.size(),
                population.best_fitness,
                population.average_fitness,
                population.diversity,
            ),
            None => (0, 0.0, 0.0, 0.0),
        };
        let converged =
            population_size >= 2 && diversity < state.config.convergence_threshold;
        Ok(EvolutionStatus {
            running: self.running.load(Ordering::SeqCst),
            current_generation: state.generation,
            population_size,
            best_fitness,
            average_fitness,
            diversity,
            converged,
        })
    }

    /// Run one evolution step immediately
    ///
    /// The same path the background loop takes on each tick; callers can
    /// drive the engine deterministically without waiting on the cadence.
    /// Seeds a population when none exists. Returns whether a generation
    /// was produced (false when no samples have arrived yet).
    pub fn step(&self) -> Result<bool> {
        {
            let mut state = lock_state(&self.state)?;
            if state.population.is_none() {
                let size = state.config.population_size.max(1);
                let mut rng = thread_rng();
                let individuals = (0..size)
                    .map(|_| Individual::seed(random_genome(&mut rng)))
                    .collect();
                state.population = Some(Population::new(individuals, 0));
            }
        }
        Self::step_inner(&self.state, &self.strategy)
    }

    /// Current configuration snapshot
    pub fn config(&self) -> Result<EvolutionConfig> {
        Ok(lock_state(&self.state)?.config.clone())
    }

    /// Propose a retuned configuration from recent samples
    ///
    /// Applying the proposal is a separate operator step; see
    /// `apply_config`.
    pub fn optimize_config(&self) -> Result<EvolutionConfig> {
        let (config, samples) = {
            let state = lock_state(&self.state)?;
            (
                state.config.clone(),
                state.samples.iter().cloned().collect::<Vec<_>>(),
            )
        };
        AdaptiveController::new().optimize(&config, &samples)
    }

    /// Replace the engine configuration and re-initialize the strategy
    ///
    /// Takes effect from the next evolution step; the population is not
    /// resized retroactively. The tick cadence of an already-running
    /// loop changes on restart.
    pub fn apply_config(&self, config: EvolutionConfig) -> Result<()> {
        config.validate()?;
        let swap_strategy = {
            let mut state = lock_state(&self.state)?;
            let swap = state.config.strategy != config.strategy;
            state.config = config.clone();
            while state.samples.len() > state.config.sample_window_size {
                state.samples.pop_front();
            }
            swap
        };
        let mut strategy = lock(&self.strategy, "evolution strategy")?;
        if swap_strategy {
            *strategy = create_strategy(config.strategy);
        }
        strategy.initialize(&config)
    }

    fn step_inner(state: &SharedState, strategy: &SharedStrategy) -> Result<bool> {
        // Snapshot inputs so the strategy runs without holding the state
        // lock; the swap at the end is the only exclusive section.
        let (population, sample) = {
            let state = lock_state(state)?;
            match (&state.population, state.samples.back()) {
                (Some(population), Some(sample)) => (population.clone(), sample.clone()),
                (None, _) => {
                    debug!("no population to evolve; skipping tick");
                    return Ok(false);
                }
                (_, None) => {
                    debug!("no performance samples yet; skipping tick");
                    return Ok(false);
                }
            }
        };

        let next = {
            let strategy = lock(strategy, "evolution strategy")?;
            strategy.evolve(&population, &sample)?
        };

        let mut state = lock_state(state)?;
        state.generation = state.generation.saturating_add(1);
        if let Some(best) = next.best() {
            let improved = state
                .best
                .as_ref()
                .map_or(true, |current| best.fitness > current.fitness);
            if improved {
                state.best = Some(best.clone());
            }
        }
        debug!(
            "generation {}: best {:.4}, average {:.4}, diversity {:.4}",
            state.generation, next.best_fitness, next.average_fitness, next.diversity
        );
        state.population = Some(next);
        Ok(true)
    }

    /// Optional termination predicates: fitness threshold reached or the
    /// generation budget exhausted
    fn termination_reached(state: &SharedState) -> bool {
        let state = match state.lock() {
            Ok(state) => state,
            Err(_) => return false,
        };
        if state.generation >= state.config.max_generations {
            info!(
                "evolution loop stopping: reached {} generations",
                state.generation
            );
            return true;
        }
        if let (Some(threshold), Some(best)) = (state.config.fitness_threshold, &state.best) {
            if best.fitness >= threshold {
                info!(
                    "evolution loop stopping: best fitness {:.4} reached threshold {:.4}",
                    best.fitness, threshold
                );
                return true;
            }
        }
        false
    }
}

fn lock_state(state: &SharedState) -> Result<std::sync::MutexGuard<'_, EngineState>> {
    state
        .lock()
        .map_err(|_| NoesisError::LockError("evolution state lock poisoned".to_string()))
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<std::sync::MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| NoesisError::LockError(format!("{} lock poisoned", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine_with(config: EvolutionConfig) -> EvolutionEngine {
        EvolutionEngine::new(config).unwrap()
    }

    fn sample() -> PerformanceSample {
        PerformanceSample::new(0.9, 0.8, 0.7, 0.6)
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let engine = engine_with(EvolutionConfig::default());
        engine.start().await.unwrap();
        assert!(matches!(
            engine.start().await,
            Err(NoesisError::EvolutionAlreadyRunning)
        ));
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_an_error() {
        let engine = engine_with(EvolutionConfig::default());
        assert!(matches!(
            engine.stop().await,
            Err(NoesisError::EvolutionNotRunning)
        ));
    }

    #[test]
    fn empty_engine_status_is_all_zeroes() {
        let engine = engine_with(EvolutionConfig::default());
        let status = engine.status().unwrap();
        assert!(!status.running);
        assert_eq!(status.current_generation, 0);
        assert_eq!(status.population_size, 0);
        assert_eq!(status.diversity, 0.0);
        assert!(engine.best_individual().unwrap().is_none());
    }

    #[test]
    fn sample_window_evicts_oldest() {
        let mut config = EvolutionConfig::default();
        config.sample_window_size = 3;
        let engine = engine_with(config);

        for accuracy in [0.1, 0.2, 0.3, 0.4] {
            engine
                .update_metrics(PerformanceSample::new(accuracy, 0.5, 0.5, 0.5))
                .unwrap();
        }
        let state = engine.state.lock().unwrap();
        assert_eq!(state.samples.len(), 3);
        assert!((state.samples.front().unwrap().accuracy - 0.2).abs() < 1e-9);
    }

    #[test]
    fn step_without_samples_skips() {
        let engine = engine_with(EvolutionConfig::default());
        assert!(!engine.step().unwrap());
        assert_eq!(engine.status().unwrap().current_generation, 0);
    }

    #[test]
    fn steps_advance_generations_monotonically() {
        let mut config = EvolutionConfig::default();
        config.population_size = 20;
        config.elitism_rate = 0.1;
        let engine = engine_with(config);
        for _ in 0..10 {
            engine.update_metrics(sample()).unwrap();
        }

        let mut best_at_one = 0.0;
        for tick in 1..=5 {
            assert!(engine.step().unwrap());
            let status = engine.status().unwrap();
            assert_eq!(status.current_generation, tick);
            assert!(status.best_fitness >= status.average_fitness);
            if tick == 1 {
                best_at_one = status.best_fitness;
            }
        }
        let best = engine.best_individual().unwrap().unwrap();
        assert!(best.fitness >= best_at_one);
        assert_eq!(engine.status().unwrap().population_size, 20);
    }

    #[tokio::test]
    async fn background_loop_evolves_on_cadence() {
        let mut config = EvolutionConfig::default();
        config.population_size = 6;
        config.tick_interval_ms = 20;
        let engine = engine_with(config);
        engine.update_metrics(sample()).unwrap();

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let status = engine.status().unwrap();
        assert!(status.running);
        assert!(status.current_generation >= 1);
        engine.stop().await.unwrap();
        assert!(!engine.status().unwrap().running);
    }

    #[tokio::test]
    async fn loop_stops_at_max_generations() {
        let mut config = EvolutionConfig::default();
        config.population_size = 4;
        config.tick_interval_ms = 10;
        config.max_generations = 3;
        let engine = engine_with(config);
        engine.update_metrics(sample()).unwrap();

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let status = engine.status().unwrap();
        assert!(!status.running);
        assert_eq!(status.current_generation, 3);
    }

    #[test]
    fn new_targets_change_scoring() {
        let engine = engine_with(EvolutionConfig::default());
        engine
            .set_optimization_targets(vec![OptimizationTarget::new("accuracy", 1.0, 0.5, true)])
            .unwrap();
        assert_eq!(engine.config().unwrap().optimization_targets.len(), 1);
    }

    #[test]
    fn apply_config_swaps_the_strategy() {
        let engine = engine_with(EvolutionConfig::default());
        let mut config = engine.config().unwrap();
        config.strategy = noesis_types::StrategyKind::GradientFree;
        engine.apply_config(config).unwrap();

        let strategy = engine.strategy.lock().unwrap();
        assert_eq!(strategy.kind(), noesis_types::StrategyKind::GradientFree);
    }
}
