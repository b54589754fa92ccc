//! Execution persistence contract (§6 "Persisted state shape"). The core
//! only defines the seam; a real host backs it with a database (the
//! teacher's `n8n-db` crate is the out-of-tree analogue — not part of
//! this crate's scope). `InMemoryExecutionStore` gives tests and small
//! hosts a working implementation, keyed the same way the registry is:
//! a process-wide `DashMap`.

use async_trait::async_trait;
use dashmap::DashMap;
use prana_workflow::{ExecutionGraph, PersistedExecution};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("execution '{0}' not found")]
    ExecutionNotFound(String),
    #[error("execution graph for workflow '{0}' not found")]
    GraphNotFound(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Persists the non-runtime portion of an `Execution` plus the compiled
/// `ExecutionGraph` cache a host re-attaches on load (§6). Runtime state
/// is never stored here; `LiveExecution::rebuild` reconstructs it.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn save_execution(&self, execution: &PersistedExecution) -> Result<(), StoreError>;
    async fn load_execution(&self, id: &str) -> Result<PersistedExecution, StoreError>;
    async fn save_graph(&self, graph: &ExecutionGraph) -> Result<(), StoreError>;
    async fn load_graph(&self, workflow_id: &str) -> Result<ExecutionGraph, StoreError>;
}

#[derive(Default)]
pub struct InMemoryExecutionStore {
    executions: DashMap<String, PersistedExecution>,
    graphs: DashMap<String, ExecutionGraph>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save_execution(&self, execution: &PersistedExecution) -> Result<(), StoreError> {
        self.executions.insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn load_execution(&self, id: &str) -> Result<PersistedExecution, StoreError> {
        self.executions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::ExecutionNotFound(id.to_string()))
    }

    async fn save_graph(&self, graph: &ExecutionGraph) -> Result<(), StoreError> {
        self.graphs.insert(graph.workflow_id.clone(), graph.clone());
        Ok(())
    }

    async fn load_graph(&self, workflow_id: &str) -> Result<ExecutionGraph, StoreError> {
        self.graphs
            .get(workflow_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::GraphNotFound(workflow_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prana_workflow::{ExecutionStatus, NodeType};
    use std::collections::{HashMap, HashSet};

    fn graph(workflow_id: &str) -> ExecutionGraph {
        ExecutionGraph {
            workflow_id: workflow_id.to_string(),
            workflow_version: 1,
            trigger_node_key: "t".to_string(),
            nodes: HashMap::new(),
            connection_map: HashMap::new(),
            reverse_connection_map: HashMap::new(),
            dependency_graph: HashMap::<String, HashSet<String>>::new(),
            loop_info: Vec::new(),
            node_order: Vec::new(),
        }
    }

    #[tokio::test]
    async fn round_trips_execution_and_graph() {
        let store = InMemoryExecutionStore::new();
        let execution = PersistedExecution::new("exec-1", "wf-1");
        store.save_execution(&execution).await.unwrap();
        let loaded = store.load_execution("exec-1").await.unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Running);

        store.save_graph(&graph("wf-1")).await.unwrap();
        let loaded_graph = store.load_graph("wf-1").await.unwrap();
        assert_eq!(loaded_graph.trigger_node_key, "t");
        assert_eq!(NodeType::Trigger.as_str(), "trigger");
    }

    #[tokio::test]
    async fn missing_execution_errors() {
        let store = InMemoryExecutionStore::new();
        assert!(matches!(
            store.load_execution("nope").await,
            Err(StoreError::ExecutionNotFound(_))
        ));
    }
}
