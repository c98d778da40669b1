//! Multi-modal decomposition and fusion
//!
//! Composite tasks split into typed sub-tasks, fan out through the
//! shared dispatcher concurrently, and fuse back into one response with
//! aggregated confidence and reasoning.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use log::debug;

use noesis_core::{Task, TaskResponse};
use noesis_types::{MultiModalConfig, NoesisError, Result};

use super::dispatcher::Dispatcher;

/// Decomposition function registered for one composite task type
pub type DecomposeFn = Arc<dyn Fn(&Task) -> Vec<Task> + Send + Sync>;

/// Registry of composite task types and their decomposition functions
///
/// Additional composite kinds register here without touching the
/// dispatcher. An unrecognized composite type decomposes to an empty
/// list, which the processor reports as `NoDecomposition`.
pub struct Decomposer {
    decomposers: RwLock<HashMap<String, DecomposeFn>>,
}

impl Decomposer {
    /// A decomposer with the built-in composite kinds registered
    pub fn new() -> Self {
        let mut decomposers: HashMap<String, DecomposeFn> = HashMap::new();
        decomposers.insert(
            "text_image_analysis".to_string(),
            Arc::new(|task: &Task| {
                vec![task.derive("text_analysis"), task.derive("image_analysis")]
            }),
        );
        Self {
            decomposers: RwLock::new(decomposers),
        }
    }

    pub fn register(
        &self,
        composite_type: impl Into<String>,
        decompose: impl Fn(&Task) -> Vec<Task> + Send + Sync + 'static,
    ) -> Result<()> {
        let mut decomposers = self
            .decomposers
            .write()
            .map_err(|_| NoesisError::LockError("decomposer write lock poisoned".to_string()))?;
        decomposers.insert(composite_type.into(), Arc::new(decompose));
        Ok(())
    }

    /// Split a composite task into sub-tasks, in emission order
    pub fn decompose(&self, task: &Task) -> Result<Vec<Task>> {
        let decomposers = self
            .decomposers
            .read()
            .map_err(|_| NoesisError::LockError("decomposer read lock poisoned".to_string()))?;
        Ok(decomposers
            .get(&task.task_type)
            .map(|decompose| decompose(task))
            .unwrap_or_default())
    }
}

impl Default for Decomposer {
    fn default() -> Self {
        Self::new()
    }
}

/// Merges sub-responses into one response
pub struct Fuser {
    weights: HashMap<String, f64>,
}

impl Fuser {
    pub fn new(config: MultiModalConfig) -> Self {
        Self {
            weights: config.modality_weights,
        }
    }

    /// Weighted-average fusion
    ///
    /// Each sub-response's weight is looked up by its sub-task type and
    /// normalized over the batch; modalities without a configured weight
    /// count as one, so an empty weight map degenerates to the plain
    /// arithmetic mean. Reasoning concatenates in sub-task emission
    /// order; metadata is a shallow copy of the originating task's
    /// context.
    pub fn fuse(
        &self,
        task: &Task,
        sub_tasks: &[Task],
        sub_responses: Vec<TaskResponse>,
    ) -> Result<TaskResponse> {
        if sub_responses.is_empty() {
            return Err(NoesisError::InvalidInput(format!(
                "cannot fuse zero sub-responses for task {}",
                task.id
            )));
        }

        let mut weighted_confidence = 0.0;
        let mut total_weight = 0.0;
        let mut reasoning = Vec::new();
        let mut capabilities_used = Vec::new();
        for (index, sub_response) in sub_responses.iter().enumerate() {
            let weight = sub_tasks
                .get(index)
                .and_then(|sub| self.weights.get(&sub.task_type))
                .copied()
                .unwrap_or(1.0);
            weighted_confidence += sub_response.confidence * weight;
            total_weight += weight;
            reasoning.extend(sub_response.reasoning.iter().cloned());
            for capability in &sub_response.capabilities_used {
                if !capabilities_used.contains(capability) {
                    capabilities_used.push(*capability);
                }
            }
        }
        let confidence = if total_weight > 0.0 {
            weighted_confidence / total_weight
        } else {
            0.0
        };

        let result = serde_json::json!({
            "sub_results": serde_json::to_value(&sub_responses)?,
            "fusion_type": "weighted_average",
        });

        let mut fused = TaskResponse::new(&task.id, result)
            .with_confidence(confidence)
            .with_reasoning(reasoning);
        fused.capabilities_used = capabilities_used;
        fused.metadata = task.context.clone();
        Ok(fused)
    }
}

/// Orchestrates decompose → concurrent dispatch → fuse
pub struct MultiModalProcessor {
    dispatcher: Arc<Dispatcher>,
    decomposer: Arc<Decomposer>,
    fuser: Fuser,
}

impl MultiModalProcessor {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        decomposer: Arc<Decomposer>,
        config: MultiModalConfig,
    ) -> Self {
        Self {
            dispatcher,
            decomposer,
            fuser: Fuser::new(config),
        }
    }

    /// Process a composite task end to end
    ///
    /// Sub-tasks dispatch concurrently and join in emission order. The
    /// first failure is returned as-is; sibling sub-tasks are not
    /// cancelled and run to completion in the background, leaving their
    /// responses in the result cache.
    pub async fn process(&self, task: &Task) -> Result<TaskResponse> {
        task.validate()?;

        let sub_tasks = self.decomposer.decompose(task)?;
        if sub_tasks.is_empty() {
            return Err(NoesisError::NoDecomposition {
                task_type: task.task_type.clone(),
            });
        }
        debug!(
            "decomposed task {} into {} sub-tasks",
            task.id,
            sub_tasks.len()
        );

        let started = Instant::now();
        let handles: Vec<_> = sub_tasks
            .iter()
            .map(|sub_task| {
                let dispatcher = self.dispatcher.clone();
                let sub_task = sub_task.clone();
                tokio::spawn(async move { dispatcher.process(&sub_task).await })
            })
            .collect();

        let sub_responses =
            futures::future::try_join_all(handles.into_iter().map(|handle| async move {
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(join_error) => Err(NoesisError::Other(format!(
                        "sub-task execution panicked: {}",
                        join_error
                    ))),
                }
            }))
            .await?;

        let mut fused = self.fuser.fuse(task, &sub_tasks, sub_responses)?;
        fused.process_time_ms = started.elapsed().as_millis() as u64;
        Ok(fused)
    }

    pub fn decomposer(&self) -> &Arc<Decomposer> {
        &self.decomposer
    }
}
