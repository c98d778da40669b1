//! Result cache with single-flight coalescing
//!
//! Responses are keyed by task identity and bounded to a fixed capacity.
//! Eviction is oldest-inserted (FIFO): inserting beyond capacity removes
//! exactly the entry that has been resident longest. `SingleFlight`
//! coalesces concurrent computations for the same key so at most one
//! module invocation runs per fingerprint.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;

use noesis_types::{NoesisError, Result, TaskId};

use crate::task::TaskResponse;

/// Bounded response cache keyed by task identity
pub struct ResultCache {
    inner: RwLock<CacheInner>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct CacheInner {
    entries: HashMap<TaskId, TaskResponse>,
    order: VecDeque<TaskId>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<TaskResponse>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| NoesisError::LockError("result cache read lock poisoned".to_string()))?;
        let found = inner.entries.get(id).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    /// Insert a response, evicting the oldest entry beyond capacity
    pub fn insert(&self, response: TaskResponse) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| NoesisError::LockError("result cache write lock poisoned".to_string()))?;
        let id = response.task_id.clone();
        if inner.entries.insert(id.clone(), response).is_none() {
            inner.order.push_back(id);
            if inner.order.len() > self.capacity {
                if let Some(victim) = inner.order.pop_front() {
                    inner.entries.remove(&victim);
                }
            }
        }
        Ok(())
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        let inner = self
            .inner
            .read()
            .map_err(|_| NoesisError::LockError("result cache read lock poisoned".to_string()))?;
        Ok(inner.entries.contains_key(id))
    }

    pub fn len(&self) -> Result<usize> {
        let inner = self
            .inner
            .read()
            .map_err(|_| NoesisError::LockError("result cache read lock poisoned".to_string()))?;
        Ok(inner.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn clear(&self) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| NoesisError::LockError("result cache write lock poisoned".to_string()))?;
        inner.entries.clear();
        inner.order.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        Ok(())
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

type FlightOutcome = Option<Result<TaskResponse>>;
type FlightMap = Arc<Mutex<HashMap<TaskId, watch::Receiver<FlightOutcome>>>>;

/// Per-key coalescing of concurrent computations
///
/// The first caller for a key becomes the leader and computes the value;
/// callers arriving while the flight is open wait for the leader's
/// outcome. A waiter dropping out never cancels the leader; a leader
/// dropping without publishing surfaces as `Cancelled` to its waiters.
pub struct SingleFlight {
    flights: FlightMap,
}

/// Position of a caller within a flight
pub enum FlightSlot {
    /// Caller computes and must publish through the guard
    Leader(FlightGuard),
    /// Caller waits for the leader's published outcome
    Waiter(watch::Receiver<FlightOutcome>),
}

/// Held by the flight leader; releases the key on drop
pub struct FlightGuard {
    key: TaskId,
    tx: watch::Sender<FlightOutcome>,
    flights: FlightMap,
}

impl FlightGuard {
    /// Broadcast the outcome to every waiter on this flight
    pub fn publish(&self, outcome: Result<TaskResponse>) {
        let _ = self.tx.send(Some(outcome));
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Ok(mut flights) = self.flights.lock() {
            flights.remove(&self.key);
        }
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the flight for `key`, as leader if none is open
    pub fn begin(&self, key: &str) -> Result<FlightSlot> {
        let mut flights = self
            .flights
            .lock()
            .map_err(|_| NoesisError::LockError("single-flight map lock poisoned".to_string()))?;
        if let Some(rx) = flights.get(key) {
            return Ok(FlightSlot::Waiter(rx.clone()));
        }
        let (tx, rx) = watch::channel(None);
        flights.insert(key.to_string(), rx);
        Ok(FlightSlot::Leader(FlightGuard {
            key: key.to_string(),
            tx,
            flights: self.flights.clone(),
        }))
    }

    /// Await the leader's outcome on a waiter handle
    pub async fn wait(mut rx: watch::Receiver<FlightOutcome>) -> Result<TaskResponse> {
        loop {
            let published = rx.borrow().clone();
            if let Some(outcome) = published {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return Err(NoesisError::Cancelled(
                    "in-flight computation was abandoned".to_string(),
                ));
            }
        }
    }

    /// Number of currently open flights
    pub fn open_flights(&self) -> Result<usize> {
        let flights = self
            .flights
            .lock()
            .map_err(|_| NoesisError::LockError("single-flight map lock poisoned".to_string()))?;
        Ok(flights.len())
    }
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn response(id: &str) -> TaskResponse {
        TaskResponse::new(id, serde_json::json!({"ok": true})).with_confidence(0.5)
    }

    #[test]
    fn insert_beyond_capacity_evicts_oldest() {
        let cache = ResultCache::new(3);
        for id in ["a", "b", "c", "d"] {
            cache.insert(response(id)).unwrap();
        }

        assert_eq!(cache.len().unwrap(), 3);
        assert!(!cache.contains("a").unwrap());
        assert!(cache.contains("b").unwrap());
        assert!(cache.contains("d").unwrap());
    }

    #[test]
    fn reinsert_refreshes_without_growing() {
        let cache = ResultCache::new(2);
        cache.insert(response("a")).unwrap();
        cache.insert(response("b")).unwrap();
        cache.insert(response("a")).unwrap();

        assert_eq!(cache.len().unwrap(), 2);
        // "a" keeps its original insertion rank, so "b" is not evicted
        cache.insert(response("c")).unwrap();
        assert!(!cache.contains("a").unwrap());
        assert!(cache.contains("b").unwrap());
    }

    #[test]
    fn hit_and_miss_counters() {
        let cache = ResultCache::new(4);
        cache.insert(response("x")).unwrap();
        assert!(cache.get("x").unwrap().is_some());
        assert!(cache.get("y").unwrap().is_none());
        assert_eq!(cache.hit_count(), 1);
        assert_eq!(cache.miss_count(), 1);
    }

    #[tokio::test]
    async fn waiters_observe_the_leader_outcome() {
        let flights = Arc::new(SingleFlight::new());

        let guard = match flights.begin("t-1").unwrap() {
            FlightSlot::Leader(guard) => guard,
            FlightSlot::Waiter(_) => panic!("first caller must lead"),
        };

        let mut waiters = Vec::new();
        for _ in 0..4 {
            match flights.begin("t-1").unwrap() {
                FlightSlot::Leader(_) => panic!("flight is already open"),
                FlightSlot::Waiter(rx) => waiters.push(tokio::spawn(SingleFlight::wait(rx))),
            }
        }

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            guard.publish(Ok(response("t-1")));
        });

        for waiter in waiters {
            let outcome = waiter.await.unwrap().unwrap();
            assert_eq!(outcome.task_id, "t-1");
            assert_eq!(outcome.confidence, 0.5);
        }
        assert_eq!(flights.open_flights().unwrap(), 0);
    }

    #[tokio::test]
    async fn abandoned_leader_surfaces_as_cancelled() {
        let flights = SingleFlight::new();
        let guard = match flights.begin("t-2").unwrap() {
            FlightSlot::Leader(guard) => guard,
            FlightSlot::Waiter(_) => panic!("first caller must lead"),
        };
        let rx = match flights.begin("t-2").unwrap() {
            FlightSlot::Waiter(rx) => rx,
            FlightSlot::Leader(_) => panic!("flight is already open"),
        };

        drop(guard);
        assert!(matches!(
            SingleFlight::wait(rx).await,
            Err(NoesisError::Cancelled(_))
        ));
    }

    #[tokio::test]
    async fn waiters_observe_shared_failure() {
        let flights = SingleFlight::new();
        let guard = match flights.begin("t-3").unwrap() {
            FlightSlot::Leader(guard) => guard,
            FlightSlot::Waiter(_) => panic!("first caller must lead"),
        };
        let rx = match flights.begin("t-3").unwrap() {
            FlightSlot::Waiter(rx) => rx,
            FlightSlot::Leader(_) => panic!("flight is already open"),
        };

        guard.publish(Err(NoesisError::Timeout("budget elapsed".to_string())));
        assert!(matches!(
            SingleFlight::wait(rx).await,
            Err(NoesisError::Timeout(_))
        ));
    }
}
