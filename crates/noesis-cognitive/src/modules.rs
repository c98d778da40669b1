//! Built-in capability modules
//!
//! Reference processors, one per capability tag, registered by the
//! service lifecycle. They route on task type tags, score confidence
//! deterministically, and produce structured placeholder results; real
//! inference backends replace them by registering under the same tag.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use noesis_core::{Capability, CapabilityModule, ModuleRegistry, Task, TaskResponse};
use noesis_types::Result;

/// Register one built-in module per capability tag
pub fn register_default_modules(registry: &ModuleRegistry) -> Result<()> {
    registry.register(Arc::new(ReasoningModule))?;
    registry.register(Arc::new(PlanningModule))?;
    registry.register(Arc::new(LearningModule))?;
    registry.register(Arc::new(CreativityModule))?;
    registry.register(Arc::new(MultiModalModule))?;
    registry.register(Arc::new(MetacognitionModule))?;
    Ok(())
}

fn type_confidence(task: &Task, exact: &str, base: f64) -> f64 {
    if task.task_type == exact {
        (base + 0.2).min(1.0)
    } else {
        base
    }
}

/// Deductive and analytical processing
pub struct ReasoningModule;

#[async_trait]
impl CapabilityModule for ReasoningModule {
    fn capability(&self) -> Capability {
        Capability::Reasoning
    }

    fn applicable(&self, task: &Task) -> bool {
        matches!(
            task.task_type.as_str(),
            "reasoning" | "text_analysis" | "inference" | "logic"
        )
    }

    fn confidence(&self, task: &Task) -> f64 {
        type_confidence(task, "reasoning", 0.7)
    }

    async fn process(&self, task: &Task) -> Result<TaskResponse> {
        let premises = task.requirements.len();
        let result = json!({
            "analysis": format!("structured reasoning over '{}'", task.description),
            "premises_considered": premises,
            "conclusion_kind": "deductive",
        });
        Ok(TaskResponse::new(&task.id, result)
            .with_capability(Capability::Reasoning)
            .with_confidence(0.85)
            .with_reasoning(vec![
                format!("parsed '{}' input into {} premises", task.task_type, premises),
                "applied deductive closure over the premise set".to_string(),
            ]))
    }
}

/// Goal decomposition and scheduling
pub struct PlanningModule;

#[async_trait]
impl CapabilityModule for PlanningModule {
    fn capability(&self) -> Capability {
        Capability::Planning
    }

    fn applicable(&self, task: &Task) -> bool {
        matches!(
            task.task_type.as_str(),
            "planning" | "scheduling" | "goal_decomposition"
        )
    }

    fn confidence(&self, task: &Task) -> f64 {
        type_confidence(task, "planning", 0.65)
    }

    async fn process(&self, task: &Task) -> Result<TaskResponse> {
        let steps: Vec<String> = task
            .requirements
            .iter()
            .enumerate()
            .map(|(i, requirement)| format!("step {}: satisfy '{}'", i + 1, requirement))
            .collect();
        let result = json!({
            "plan": steps,
            "horizon": task.requirements.len().max(1),
            "priority": task.priority,
        });
        Ok(TaskResponse::new(&task.id, result)
            .with_capability(Capability::Planning)
            .with_confidence(0.8)
            .with_reasoning(vec![format!(
                "decomposed goal '{}' into {} ordered steps",
                task.description,
                task.requirements.len().max(1)
            )]))
    }
}

/// Pattern extraction and adaptation
pub struct LearningModule;

#[async_trait]
impl CapabilityModule for LearningModule {
    fn capability(&self) -> Capability {
        Capability::Learning
    }

    fn applicable(&self, task: &Task) -> bool {
        matches!(
            task.task_type.as_str(),
            "learning" | "training" | "adaptation"
        )
    }

    fn confidence(&self, task: &Task) -> f64 {
        type_confidence(task, "learning", 0.6)
    }

    async fn process(&self, task: &Task) -> Result<TaskResponse> {
        let result = json!({
            "patterns_extracted": task.requirements.len(),
            "model_updated": true,
        });
        Ok(TaskResponse::new(&task.id, result)
            .with_capability(Capability::Learning)
            .with_confidence(0.75)
            .with_reasoning(vec![
                format!("ingested '{}' observations", task.description),
                "consolidated recurring patterns into the working model".to_string(),
            ]))
    }
}

/// Divergent generation
pub struct CreativityModule;

#[async_trait]
impl CapabilityModule for CreativityModule {
    fn capability(&self) -> Capability {
        Capability::Creativity
    }

    fn applicable(&self, task: &Task) -> bool {
        matches!(
            task.task_type.as_str(),
            "creativity" | "generation" | "brainstorming"
        )
    }

    fn confidence(&self, task: &Task) -> f64 {
        type_confidence(task, "creativity", 0.6)
    }

    async fn process(&self, task: &Task) -> Result<TaskResponse> {
        let result = json!({
            "variations": [
                format!("a literal take on '{}'", task.description),
                format!("an inverted take on '{}'", task.description),
                format!("a combinatorial take on '{}'", task.description),
            ],
        });
        Ok(TaskResponse::new(&task.id, result)
            .with_capability(Capability::Creativity)
            .with_confidence(0.7)
            .with_reasoning(vec![
                "generated candidate variations by inversion and recombination".to_string(),
            ]))
    }
}

/// Cross-modality analysis
pub struct MultiModalModule;

#[async_trait]
impl CapabilityModule for MultiModalModule {
    fn capability(&self) -> Capability {
        Capability::MultiModal
    }

    fn applicable(&self, task: &Task) -> bool {
        matches!(
            task.task_type.as_str(),
            "multimodal" | "image_analysis" | "audio_analysis" | "fusion"
        )
    }

    fn confidence(&self, task: &Task) -> f64 {
        type_confidence(task, "multimodal", 0.7)
    }

    async fn process(&self, task: &Task) -> Result<TaskResponse> {
        let result = json!({
            "modality": task.task_type,
            "features": format!("salient features of '{}'", task.description),
        });
        Ok(TaskResponse::new(&task.id, result)
            .with_capability(Capability::MultiModal)
            .with_confidence(0.8)
            .with_reasoning(vec![format!(
                "extracted {} features from the input payload",
                task.task_type
            )]))
    }
}

/// Self-assessment over prior processing
pub struct MetacognitionModule;

#[async_trait]
impl CapabilityModule for MetacognitionModule {
    fn capability(&self) -> Capability {
        Capability::Metacognition
    }

    fn applicable(&self, task: &Task) -> bool {
        matches!(
            task.task_type.as_str(),
            "metacognition" | "self_assessment" | "reflection"
        )
    }

    fn confidence(&self, task: &Task) -> f64 {
        type_confidence(task, "metacognition", 0.6)
    }

    async fn process(&self, task: &Task) -> Result<TaskResponse> {
        let result = json!({
            "assessment": format!("reviewed processing of '{}'", task.description),
            "blind_spots": task.requirements,
        });
        Ok(TaskResponse::new(&task.id, result)
            .with_capability(Capability::Metacognition)
            .with_confidence(0.7)
            .with_reasoning(vec![
                "replayed the processing trace against stated requirements".to_string(),
            ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_capability_once() {
        let registry = ModuleRegistry::new();
        register_default_modules(&registry).unwrap();

        let tags = registry.capabilities().unwrap();
        assert_eq!(tags.len(), Capability::ALL.len());
        for capability in Capability::ALL {
            assert!(tags.contains(&capability));
        }
    }

    #[test]
    fn registering_defaults_twice_keeps_one_entry_per_tag() {
        let registry = ModuleRegistry::new();
        register_default_modules(&registry).unwrap();
        register_default_modules(&registry).unwrap();
        assert_eq!(registry.len().unwrap(), Capability::ALL.len());
    }

    #[test]
    fn exact_type_match_boosts_confidence() {
        let module = ReasoningModule;
        let exact = Task::new("reasoning", "x");
        let related = Task::new("text_analysis", "x");
        assert!(module.confidence(&exact) > module.confidence(&related));
        assert!(module.applicable(&exact) && module.applicable(&related));
        assert!(!module.applicable(&Task::new("planning", "x")));
    }

    #[tokio::test]
    async fn reasoning_module_produces_a_trace() {
        let module = ReasoningModule;
        let task = Task::new("reasoning", "is it raining")
            .with_requirement("clouds are grey")
            .with_requirement("the street is wet");

        let response = module.process(&task).await.unwrap();
        assert_eq!(response.task_id, task.id);
        assert_eq!(response.result["premises_considered"], 2);
        assert!(!response.reasoning.is_empty());
        assert!(response.confidence > 0.0 && response.confidence <= 1.0);
    }

    #[tokio::test]
    async fn multimodal_module_handles_image_subtasks() {
        let module = MultiModalModule;
        let task = Task::new("image_analysis", "describe the scene");
        assert!(module.applicable(&task));
        let response = module.process(&task).await.unwrap();
        assert_eq!(response.result["modality"], "image_analysis");
    }
}
