//! Capability-routed task dispatch
//!
//! One `process` call walks the full path: cache lookup, single-flight
//! admission, routing, module invocation under the effective deadline,
//! cache write and stats update. Concurrency is bounded by an execution
//! semaphore; a second admission semaphore bounds how many submissions
//! may wait, overflow failing fast with backpressure.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, warn};
use tokio::sync::{Notify, Semaphore};
use tokio::time::timeout;

use noesis_core::{
    CapabilityRouter, FlightSlot, ModuleRegistry, ResultCache, SingleFlight, StatsCollector, Task,
    TaskResponse,
};
use noesis_types::{DispatcherConfig, NoesisError, Result};

pub struct Dispatcher {
    router: CapabilityRouter,
    cache: Arc<ResultCache>,
    flights: SingleFlight,
    stats: Arc<StatsCollector>,
    /// Bounds execution plus the waiting queue; try-acquired
    admission: Arc<Semaphore>,
    /// Bounds simultaneous module invocations; awaited
    slots: Arc<Semaphore>,
    config: DispatcherConfig,
    accepting: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        registry: Arc<ModuleRegistry>,
        cache: Arc<ResultCache>,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            router: CapabilityRouter::new(registry),
            cache,
            flights: SingleFlight::new(),
            stats,
            admission: Arc::new(Semaphore::new(config.max_concurrency + config.queue_depth)),
            slots: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            accepting: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Process one task through cache, router and module
    ///
    /// Concurrent calls for the same task identity coalesce: exactly one
    /// module invocation occurs and every caller observes its outcome.
    /// Failures are propagated unchanged and never cached.
    pub async fn process(&self, task: &Task) -> Result<TaskResponse> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(NoesisError::ShuttingDown);
        }
        task.validate()?;

        if let Some(cached) = self.cache.get(&task.id)? {
            self.stats.record_cache_hit()?;
            debug!("cache hit for task {}", task.id);
            return Ok(cached);
        }

        match self.flights.begin(&task.id)? {
            FlightSlot::Waiter(rx) => {
                debug!("joining in-flight computation for task {}", task.id);
                SingleFlight::wait(rx).await
            }
            FlightSlot::Leader(guard) => {
                // Re-check after winning the flight: a previous leader may
                // have completed between the cache miss and this point.
                if let Some(cached) = self.cache.get(&task.id)? {
                    self.stats.record_cache_hit()?;
                    guard.publish(Ok(cached.clone()));
                    return Ok(cached);
                }
                let outcome = self.invoke(task).await;
                guard.publish(outcome.clone());
                outcome
            }
        }
    }

    /// Invoke the routed module under concurrency and deadline limits
    async fn invoke(&self, task: &Task) -> Result<TaskResponse> {
        let started = Instant::now();

        let _admission = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| {
                warn!("submission queue full, rejecting task {}", task.id);
                NoesisError::Backpressure(format!(
                    "submission queue is full, task {} rejected",
                    task.id
                ))
            })?;
        let _slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| NoesisError::Cancelled("dispatcher slots closed".to_string()))?;

        let budget = self.effective_budget(task)?;
        let module = self.router.route(task)?;
        let capability = module.capability();

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = timeout(budget, module.process(task)).await;
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                debug!("module {} failed task {}: {}", capability, task.id, err);
                return Err(err);
            }
            Err(_) => {
                debug!(
                    "task {} exceeded its {}ms budget on module {}",
                    task.id,
                    budget.as_millis(),
                    capability
                );
                return Err(NoesisError::Timeout(format!(
                    "task {} exceeded its {}ms budget",
                    task.id,
                    budget.as_millis()
                )));
            }
        };

        response.task_id = task.id.clone();
        response.process_time_ms = elapsed_ms;
        if !response.capabilities_used.contains(&capability) {
            response.capabilities_used.push(capability);
        }

        self.cache.insert(response.clone())?;
        self.stats.record(capability, elapsed_ms)?;
        Ok(response)
    }

    /// Effective deadline: the earlier of the task deadline and the
    /// configured default timeout. A deadline already in the past fails
    /// without consulting the router.
    fn effective_budget(&self, task: &Task) -> Result<Duration> {
        let budget = self.config.default_timeout();
        match task.deadline {
            None => Ok(budget),
            Some(deadline) => match deadline.signed_duration_since(Utc::now()).to_std() {
                Ok(remaining) => Ok(budget.min(remaining)),
                Err(_) => Err(NoesisError::Timeout(format!(
                    "task {} deadline elapsed before dispatch",
                    task.id
                ))),
            },
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn stats(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Reject all subsequent submissions
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    pub fn resume_accepting(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }

    /// Wait until no invocation is in flight, bounded by `grace`
    ///
    /// Returns whether the dispatcher fully drained.
    pub async fn drain(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return true;
            }
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return false,
            };
            let _ = timeout(remaining, self.drained.notified()).await;
        }
    }
}
