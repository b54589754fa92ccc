//! Action contract and registry (§4.3). Grounded on the teacher's
//! `NodeExecutor`/`NodeExecutorRegistry` (trait object keyed by type string,
//! `Arc<dyn Trait>` map, `register`/`get`), generalized to the spec's
//! three-capability `Action` (prepare/execute/resume) keyed by
//! `(integration_name, action_name)` rather than one node-type string.

use async_trait::async_trait;
use dashmap::DashMap;
use prana_workflow::{ParamMap, Value};
use std::sync::Arc;

/// What an `Action::execute`/`resume` call reported, before the node
/// executor classifies it against `node.output_ports` and retry policy.
#[derive(Debug, Clone)]
pub enum NodeResult {
    /// Completed on the given port.
    Ok { data: Value, port: String },
    /// Completed on the node's default ("success") port.
    OkDefault { data: Value },
    /// Suspended awaiting external input (sub-workflow, wait, webhook, ...).
    Suspend { suspension_type: String, data: Value },
    /// Failed, routed on the given output port if one is connected (e.g. "error").
    Error { data: Value, port: Option<String> },
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("action error: {0}")]
pub struct ActionError(pub String);

/// Data an action's `prepare` call hands back for reuse across the
/// Execution's lifetime (resume IDs, reserved URLs, ...).
pub type PrepData = Value;

/// An external implementation an Action Registry entry delegates to.
/// Default `prepare`/`resume` match the spec's "optional" capabilities.
#[async_trait]
pub trait Action: Send + Sync {
    async fn prepare(&self, _params: &ParamMap) -> Result<PrepData, ActionError> {
        Ok(Value::Null)
    }

    async fn execute(&self, rendered_params: &Value) -> Result<NodeResult, ActionError>;

    async fn resume(&self, _suspension_data: &Value, _resume_input: &Value) -> Result<NodeResult, ActionError> {
        Err(ActionError("action does not support resume".to_string()))
    }

    /// Self-check used by `ActionRegistry::health_check`. Default passes.
    async fn health_check(&self) -> Result<(), ActionError> {
        Ok(())
    }
}

/// Declared port shape for a registered action, read by the compiler when
/// validating connections.
#[derive(Clone)]
pub struct ActionDescriptor {
    pub integration_name: String,
    pub action_name: String,
    pub input_ports: Vec<String>,
    pub output_ports: Vec<String>,
    pub action: Arc<dyn Action>,
}

/// Process-wide, read-mostly map of `(integration_name, action_name) ->`
/// descriptor. Thread-safe via `DashMap`, matching the teacher's choice of
/// a lock-free concurrent map for registries touched from async code.
#[derive(Default)]
pub struct ActionRegistry {
    actions: DashMap<(String, String), Arc<ActionDescriptor>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        integration_name: impl Into<String>,
        action_name: impl Into<String>,
        input_ports: Vec<String>,
        output_ports: Vec<String>,
        action: Arc<dyn Action>,
    ) {
        let integration_name = integration_name.into();
        let action_name = action_name.into();
        let descriptor = Arc::new(ActionDescriptor {
            integration_name: integration_name.clone(),
            action_name: action_name.clone(),
            input_ports,
            output_ports,
            action,
        });
        self.actions.insert((integration_name, action_name), descriptor);
    }

    pub fn get(&self, integration_name: &str, action_name: &str) -> Option<Arc<ActionDescriptor>> {
        self.actions
            .get(&(integration_name.to_string(), action_name.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn unregister(&self, integration_name: &str, action_name: &str) {
        self.actions.remove(&(integration_name.to_string(), action_name.to_string()));
    }

    pub fn list(&self) -> Vec<(String, String)> {
        self.actions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Run every registered action's self-check, returning the
    /// `(integration, action)` pairs that failed along with their error.
    pub async fn health_check(&self) -> Vec<((String, String), ActionError)> {
        let descriptors: Vec<Arc<ActionDescriptor>> =
            self.actions.iter().map(|entry| entry.value().clone()).collect();
        let mut failures = Vec::new();
        for descriptor in descriptors {
            if let Err(e) = descriptor.action.health_check().await {
                failures.push((
                    (descriptor.integration_name.clone(), descriptor.action_name.clone()),
                    e,
                ));
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOk;

    #[async_trait]
    impl Action for AlwaysOk {
        async fn execute(&self, rendered_params: &Value) -> Result<NodeResult, ActionError> {
            Ok(NodeResult::OkDefault {
                data: rendered_params.clone(),
            })
        }
    }

    struct AlwaysUnhealthy;

    #[async_trait]
    impl Action for AlwaysUnhealthy {
        async fn execute(&self, _: &Value) -> Result<NodeResult, ActionError> {
            Ok(NodeResult::OkDefault { data: Value::Null })
        }

        async fn health_check(&self) -> Result<(), ActionError> {
            Err(ActionError("dependency unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let registry = ActionRegistry::new();
        registry.register("http", "request", vec!["main".to_string()], vec!["success".to_string()], Arc::new(AlwaysOk));
        let descriptor = registry.get("http", "request").unwrap();
        assert_eq!(descriptor.output_ports, vec!["success".to_string()]);
    }

    #[tokio::test]
    async fn unknown_action_is_none() {
        let registry = ActionRegistry::new();
        assert!(registry.get("nope", "nope").is_none());
    }

    #[tokio::test]
    async fn health_check_reports_failing_actions_only() {
        let registry = ActionRegistry::new();
        registry.register("ok", "ok", vec![], vec!["success".to_string()], Arc::new(AlwaysOk));
        registry.register("bad", "bad", vec![], vec!["success".to_string()], Arc::new(AlwaysUnhealthy));
        let failures = registry.health_check().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, ("bad".to_string(), "bad".to_string()));
    }
}
