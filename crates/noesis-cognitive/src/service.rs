//! Service facade and lifecycle
//!
//! Wires the registry, cache, stats, dispatcher, multi-modal pipeline
//! and evolution engine into one entry point with initialize/shutdown
//! semantics.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use noesis_core::{
    Capability, CapabilityModule, ModuleRegistry, ResultCache, StatsCollector, StatsSnapshot, Task,
    TaskResponse,
};
use noesis_types::{NoesisConfig, Result};

use crate::evolution::EvolutionEngine;
use crate::modules::register_default_modules;
use crate::orchestrator::{Decomposer, Dispatcher, MultiModalProcessor};

pub struct NoesisService {
    registry: Arc<ModuleRegistry>,
    cache: Arc<ResultCache>,
    stats: Arc<StatsCollector>,
    dispatcher: Arc<Dispatcher>,
    multimodal: MultiModalProcessor,
    evolution: Arc<EvolutionEngine>,
}

impl NoesisService {
    /// Build and initialize a service from configuration
    pub fn new(config: NoesisConfig) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(ModuleRegistry::new());
        let cache = Arc::new(ResultCache::new(config.dispatcher.cache_size));
        let stats = Arc::new(StatsCollector::new());
        let dispatcher = Arc::new(Dispatcher::new(
            config.dispatcher.clone(),
            registry.clone(),
            cache.clone(),
            stats.clone(),
        ));
        let multimodal = MultiModalProcessor::new(
            dispatcher.clone(),
            Arc::new(Decomposer::new()),
            config.multimodal.clone(),
        );
        let evolution = Arc::new(EvolutionEngine::new(config.evolution)?);

        let service = Self {
            registry,
            cache,
            stats,
            dispatcher,
            multimodal,
            evolution,
        };
        service.initialize()?;
        Ok(service)
    }

    /// Reset the cache and stats and re-register the built-in modules
    ///
    /// Two consecutive calls yield equivalent observable state: an empty
    /// cache, zeroed stats and one default module per capability tag.
    pub fn initialize(&self) -> Result<()> {
        self.cache.clear()?;
        self.stats.reset()?;
        self.registry.clear()?;
        register_default_modules(&self.registry)?;
        self.dispatcher.resume_accepting();
        info!(
            "noesis service initialized with {} capability modules",
            self.registry.len()?
        );
        Ok(())
    }

    /// Submit one task through the dispatch path
    pub async fn submit(&self, task: &Task) -> Result<TaskResponse> {
        self.dispatcher.process(task).await
    }

    /// Submit a composite task through decomposition and fusion
    pub async fn submit_multimodal(&self, task: &Task) -> Result<TaskResponse> {
        self.multimodal.process(task).await
    }

    /// Register a capability module; visible to subsequent dispatches
    pub fn register_module(&self, module: Arc<dyn CapabilityModule>) -> Result<()> {
        self.registry.register(module)
    }

    /// Register a decomposition for an additional composite task type
    pub fn register_decomposer(
        &self,
        composite_type: impl Into<String>,
        decompose: impl Fn(&Task) -> Vec<Task> + Send + Sync + 'static,
    ) -> Result<()> {
        self.multimodal.decomposer().register(composite_type, decompose)
    }

    /// Snapshot of the registered capability tags
    pub fn capabilities(&self) -> Result<Vec<Capability>> {
        self.registry.capabilities()
    }

    /// Snapshot of the invocation statistics
    pub fn stats(&self) -> Result<StatsSnapshot> {
        self.stats.snapshot()
    }

    /// The self-evolution engine
    pub fn evolution(&self) -> &Arc<EvolutionEngine> {
        &self.evolution
    }

    /// Drain and shut down
    ///
    /// Rejects further submissions, waits up to `grace` for in-flight
    /// invocations, stops the evolution loop if running, and clears the
    /// registry and cache.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        self.dispatcher.stop_accepting();
        if !self.dispatcher.drain(grace).await {
            warn!("shutdown grace period elapsed with invocations still in flight");
        }
        if self.evolution.is_running() {
            self.evolution.stop().await?;
        }
        self.registry.clear()?;
        self.cache.clear()?;
        info!("noesis service shut down");
        Ok(())
    }
}
