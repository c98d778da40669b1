//! Invocation statistics
//!
//! Processed counts and latency totals, overall and per capability. The
//! count/total pair is updated under one mutex so averages never mix
//! counts from one update with totals from another. Cache hits are
//! counted in their own field and never touch the latency pair.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use noesis_types::{NoesisError, Result};

use crate::capability::Capability;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityStats {
    pub count: u64,
    pub total_time_ms: u64,
}

/// Point-in-time view of the collected statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub total_time_ms: u64,
    /// total / processed; zero when nothing has been processed
    pub average_time_ms: f64,
    pub cache_hits: u64,
    pub per_capability: HashMap<Capability, CapabilityStats>,
}

#[derive(Default)]
struct StatsInner {
    processed: u64,
    total_time_ms: u64,
    cache_hits: u64,
    per_capability: HashMap<Capability, CapabilityStats>,
}

pub struct StatsCollector {
    inner: Mutex<StatsInner>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner::default()),
        }
    }

    /// Record one completed invocation
    pub fn record(&self, capability: Capability, elapsed_ms: u64) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| NoesisError::LockError("stats lock poisoned".to_string()))?;
        inner.processed += 1;
        inner.total_time_ms += elapsed_ms;
        let entry = inner.per_capability.entry(capability).or_default();
        entry.count += 1;
        entry.total_time_ms += elapsed_ms;
        Ok(())
    }

    pub fn record_cache_hit(&self) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| NoesisError::LockError("stats lock poisoned".to_string()))?;
        inner.cache_hits += 1;
        Ok(())
    }

    pub fn snapshot(&self) -> Result<StatsSnapshot> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| NoesisError::LockError("stats lock poisoned".to_string()))?;
        let average_time_ms = if inner.processed == 0 {
            0.0
        } else {
            inner.total_time_ms as f64 / inner.processed as f64
        };
        Ok(StatsSnapshot {
            processed: inner.processed,
            total_time_ms: inner.total_time_ms,
            average_time_ms,
            cache_hits: inner.cache_hits,
            per_capability: inner.per_capability.clone(),
        })
    }

    pub fn reset(&self) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| NoesisError::LockError("stats lock poisoned".to_string()))?;
        *inner = StatsInner::default();
        Ok(())
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
