//! Task and response records
//!
//! The shared data model traversing the dispatch path. Payloads are
//! untyped `serde_json::Value`s; modules declare their own input and
//! output conventions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use noesis_types::{current_timestamp, new_id, NoesisError, Result, TaskId};

use crate::capability::Capability;

/// A unit of cognitive work submitted to the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Opaque identity, unique per cache lifetime
    pub id: TaskId,

    /// Type tag driving applicability and decomposition
    pub task_type: String,

    /// Free-form description of the work
    pub description: String,

    /// Untyped input payload
    #[serde(default)]
    pub input: serde_json::Value,

    /// Ordered list of requirements
    #[serde(default)]
    pub requirements: Vec<String>,

    /// Arbitrary key/value context propagated to sub-tasks
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,

    /// Higher is more urgent
    #[serde(default)]
    pub priority: i32,

    /// Absolute deadline; must lie strictly after creation
    pub deadline: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            task_type: task_type.into(),
            description: description.into(),
            input: serde_json::Value::Null,
            requirements: Vec::new(),
            context: HashMap::new(),
            priority: 0,
            deadline: None,
            created_at: current_timestamp(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirements.push(requirement.into());
        self
    }

    pub fn with_context_value(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Derive a sub-task of a different type, inheriting description,
    /// context and priority under a freshly minted identity and timestamp
    pub fn derive(&self, task_type: impl Into<String>) -> Task {
        Task {
            id: new_id(),
            task_type: task_type.into(),
            description: self.description.clone(),
            input: self.input.clone(),
            requirements: self.requirements.clone(),
            context: self.context.clone(),
            priority: self.priority,
            deadline: self.deadline,
            created_at: current_timestamp(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(NoesisError::InvalidInput(
                "task id must not be empty".to_string(),
            ));
        }
        if self.task_type.is_empty() {
            return Err(NoesisError::InvalidInput(format!(
                "task {} has an empty type tag",
                self.id
            )));
        }
        if let Some(deadline) = self.deadline {
            if deadline <= self.created_at {
                return Err(NoesisError::InvalidInput(format!(
                    "task {} deadline does not lie after creation",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Result of processing a task through one or more capability modules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    /// Identity of the originating task
    pub task_id: TaskId,

    /// Untyped result payload
    pub result: serde_json::Value,

    /// Capability tags actually consulted, in consultation order
    #[serde(default)]
    pub capabilities_used: Vec<Capability>,

    /// Confidence in the result, clamped to [0, 1]
    pub confidence: f64,

    /// Ordered reasoning trace
    #[serde(default)]
    pub reasoning: Vec<String>,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Wall-clock processing time in milliseconds
    #[serde(default)]
    pub process_time_ms: u64,

    pub created_at: DateTime<Utc>,
}

impl TaskResponse {
    pub fn new(task_id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            task_id: task_id.into(),
            result,
            capabilities_used: Vec::new(),
            confidence: 0.0,
            reasoning: Vec::new(),
            metadata: HashMap::new(),
            process_time_ms: 0,
            created_at: current_timestamp(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.set_confidence(confidence);
        self
    }

    pub fn with_reasoning(mut self, reasoning: Vec<String>) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        if !self.capabilities_used.contains(&capability) {
            self.capabilities_used.push(capability);
        }
        self
    }

    pub fn with_metadata_value(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = confidence.clamp(0.0, 1.0);
    }

    pub fn push_reasoning(&mut self, step: impl Into<String>) {
        self.reasoning.push(step.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_task_mints_identity_and_timestamp() {
        let a = Task::new("reasoning", "prove it");
        let b = Task::new("reasoning", "prove it");
        assert!(!a.id.is_empty());
        assert_ne!(a.id, b.id);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_type() {
        let task = Task::new("", "whatever");
        assert!(matches!(
            task.validate(),
            Err(NoesisError::InvalidInput(_))
        ));
    }

    #[test]
    fn validate_rejects_deadline_before_creation() {
        let task = Task::new("planning", "late")
            .with_deadline(current_timestamp() - Duration::seconds(5));
        assert!(task.validate().is_err());
    }

    #[test]
    fn derived_subtask_inherits_context_with_fresh_identity() {
        let parent = Task::new("text_image_analysis", "describe the scene")
            .with_priority(7)
            .with_context_value("session", serde_json::json!("s-1"));
        let child = parent.derive("text_analysis");

        assert_ne!(child.id, parent.id);
        assert_eq!(child.task_type, "text_analysis");
        assert_eq!(child.description, parent.description);
        assert_eq!(child.priority, 7);
        assert_eq!(child.context, parent.context);
        assert!(child.created_at >= parent.created_at);
    }

    #[test]
    fn confidence_is_clamped() {
        let mut response = TaskResponse::new("t", serde_json::Value::Null).with_confidence(1.7);
        assert_eq!(response.confidence, 1.0);
        response.set_confidence(-0.3);
        assert_eq!(response.confidence, 0.0);
    }

    #[test]
    fn response_serde_round_trip_preserves_fields() {
        let response = TaskResponse::new("t-9", serde_json::json!({"answer": 42}))
            .with_capability(Capability::Reasoning)
            .with_confidence(0.8)
            .with_reasoning(vec!["step one".to_string(), "step two".to_string()])
            .with_metadata_value("origin", serde_json::json!("unit"));

        let encoded = serde_json::to_string(&response).unwrap();
        let decoded: TaskResponse = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.task_id, response.task_id);
        assert_eq!(decoded.result, response.result);
        assert_eq!(decoded.capabilities_used, response.capabilities_used);
        assert_eq!(decoded.confidence, response.confidence);
        assert_eq!(decoded.reasoning, response.reasoning);
        assert_eq!(decoded.metadata, response.metadata);
        assert_eq!(decoded.process_time_ms, response.process_time_ms);
    }
}
