//! Capability routing
//!
//! Given a task, the router filters registered modules by applicability
//! and returns the confidence maximizer. Ties keep the module that was
//! registered first.

use std::sync::Arc;

use noesis_types::{NoesisError, Result};

use crate::capability::{CapabilityModule, ModuleRegistry};
use crate::task::Task;

pub struct CapabilityRouter {
    registry: Arc<ModuleRegistry>,
}

impl CapabilityRouter {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    /// Select the best applicable module for the task
    pub fn route(&self, task: &Task) -> Result<Arc<dyn CapabilityModule>> {
        let modules = self.registry.snapshot()?;

        let mut winner: Option<(f64, Arc<dyn CapabilityModule>)> = None;
        for module in modules {
            if !module.applicable(task) {
                continue;
            }
            let confidence = module.confidence(task).clamp(0.0, 1.0);
            // Strictly greater keeps earlier registrations on ties
            match &winner {
                Some((best, _)) if confidence <= *best => {}
                _ => winner = Some((confidence, module)),
            }
        }

        winner
            .map(|(_, module)| module)
            .ok_or_else(|| NoesisError::NoModule {
                task_type: task.task_type.clone(),
            })
    }
}
