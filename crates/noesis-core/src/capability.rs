//! Capability contract and module registry
//!
//! Capability modules are opaque processors plugged into the dispatcher.
//! The registry keeps them in registration order so routing tie-breaks
//! are deterministic.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use noesis_types::{NoesisError, Result};

use crate::task::{Task, TaskResponse};

/// Coarse-grained label for the kind of cognitive work a module performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Reasoning,
    Planning,
    Learning,
    Creativity,
    #[serde(rename = "multimodal")]
    MultiModal,
    Metacognition,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::Reasoning,
        Capability::Planning,
        Capability::Learning,
        Capability::Creativity,
        Capability::MultiModal,
        Capability::Metacognition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Reasoning => "reasoning",
            Capability::Planning => "planning",
            Capability::Learning => "learning",
            Capability::Creativity => "creativity",
            Capability::MultiModal => "multimodal",
            Capability::Metacognition => "metacognition",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = NoesisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reasoning" => Ok(Capability::Reasoning),
            "planning" => Ok(Capability::Planning),
            "learning" => Ok(Capability::Learning),
            "creativity" => Ok(Capability::Creativity),
            "multimodal" => Ok(Capability::MultiModal),
            "metacognition" => Ok(Capability::Metacognition),
            other => Err(NoesisError::InvalidInput(format!(
                "unknown capability tag '{}'",
                other
            ))),
        }
    }
}

/// Contract implemented by every pluggable capability module
///
/// `applicable` and `confidence` must be pure and return the same value
/// for equal input. `process` runs under the dispatcher's effective
/// deadline; the future is dropped when the deadline elapses, so modules
/// must not detach work that outlives their own future.
#[async_trait]
pub trait CapabilityModule: Send + Sync {
    /// The capability tag this module serves
    fn capability(&self) -> Capability;

    /// Whether this module is willing to handle the task
    fn applicable(&self, task: &Task) -> bool;

    /// Confidence in handling the task, in [0, 1]; higher is better
    fn confidence(&self, task: &Task) -> f64;

    /// Process the task and produce a response
    async fn process(&self, task: &Task) -> Result<TaskResponse>;
}

/// Insertion-ordered capability module registry
///
/// Routing reads under the shared lock; registration takes the write
/// lock. One entry per capability tag: re-registering a tag replaces the
/// module in place, keeping its original registration rank.
pub struct ModuleRegistry {
    modules: RwLock<Vec<Arc<dyn CapabilityModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, module: Arc<dyn CapabilityModule>) -> Result<()> {
        let mut modules = self
            .modules
            .write()
            .map_err(|_| NoesisError::LockError("module registry write lock poisoned".to_string()))?;
        let capability = module.capability();
        if let Some(slot) = modules.iter_mut().find(|m| m.capability() == capability) {
            *slot = module;
        } else {
            modules.push(module);
        }
        Ok(())
    }

    /// Snapshot of the registered modules in registration order
    pub fn snapshot(&self) -> Result<Vec<Arc<dyn CapabilityModule>>> {
        let modules = self
            .modules
            .read()
            .map_err(|_| NoesisError::LockError("module registry read lock poisoned".to_string()))?;
        Ok(modules.clone())
    }

    /// Registered capability tags in registration order
    pub fn capabilities(&self) -> Result<Vec<Capability>> {
        let modules = self
            .modules
            .read()
            .map_err(|_| NoesisError::LockError("module registry read lock poisoned".to_string()))?;
        Ok(modules.iter().map(|m| m.capability()).collect())
    }

    pub fn len(&self) -> Result<usize> {
        let modules = self
            .modules
            .read()
            .map_err(|_| NoesisError::LockError("module registry read lock poisoned".to_string()))?;
        Ok(modules.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn clear(&self) -> Result<()> {
        let mut modules = self
            .modules
            .write()
            .map_err(|_| NoesisError::LockError("module registry write lock poisoned".to_string()))?;
        modules.clear();
        Ok(())
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
