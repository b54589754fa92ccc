//! Workflow: the static, user-authored definition of a graph of nodes.

use crate::connection::{add_connection, Connection, WorkflowConnections};
use crate::data::Value;
use crate::error::WorkflowError;
use crate::node::{Node, NodeType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub version: u32,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub nodes: HashMap<String, Node>,
    #[serde(default)]
    pub connections: WorkflowConnections,
}

impl Workflow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 1,
            variables: HashMap::new(),
            metadata: HashMap::new(),
            nodes: HashMap::new(),
            connections: WorkflowConnections::new(),
        }
    }

    /// Add a node, erroring if a node with the same key already exists.
    pub fn add_node(&mut self, node: Node) -> Result<(), WorkflowError> {
        if self.nodes.contains_key(&node.key) {
            return Err(WorkflowError::InvalidConnection {
                reason: format!("duplicate node key '{}'", node.key),
            });
        }
        self.nodes.insert(node.key.clone(), node);
        Ok(())
    }

    pub fn get_node(&self, key: &str) -> Option<&Node> {
        self.nodes.get(key)
    }

    /// Connect `from_port` of node `from` to `to_port` of node `to`.
    /// Pure bookkeeping; port/node existence is validated by the compiler.
    pub fn connect(
        &mut self,
        from: impl Into<String>,
        from_port: impl Into<String>,
        to: impl Into<String>,
        to_port: impl Into<String>,
    ) {
        add_connection(
            &mut self.connections,
            Connection::new(from, from_port, to, to_port),
        );
    }

    /// All nodes of type `trigger`, in key order for determinism.
    pub fn trigger_nodes(&self) -> Vec<&Node> {
        let mut triggers: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.node_type == NodeType::Trigger)
            .collect();
        triggers.sort_by(|a, b| a.key.cmp(&b.key));
        triggers
    }

    pub fn node_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.nodes.keys().map(|k| k.as_str()).collect();
        keys.sort();
        keys
    }
}

/// Fluent builder mirroring the teacher's `WorkflowBuilder`, ending in
/// `.build()` (validates structural invariants) or `.build_unchecked()`
/// (skips validation, for tests that want to construct an intentionally
/// invalid workflow and feed it straight to the compiler).
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            workflow: Workflow::new(id),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.workflow.version = version;
        self
    }

    pub fn node(mut self, node: Node) -> Self {
        self.workflow.nodes.insert(node.key.clone(), node);
        self
    }

    pub fn connect(
        mut self,
        from: impl Into<String>,
        from_port: impl Into<String>,
        to: impl Into<String>,
        to_port: impl Into<String>,
    ) -> Self {
        self.workflow.connect(from, from_port, to, to_port);
        self
    }

    pub fn variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.workflow.variables.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let workflow = self.workflow;
        for by_port in workflow.connections.values() {
            for conns in by_port.values() {
                for c in conns {
                    if !workflow.nodes.contains_key(&c.from) {
                        return Err(WorkflowError::InvalidConnection {
                            reason: format!("unknown source node '{}'", c.from),
                        });
                    }
                    if !workflow.nodes.contains_key(&c.to) {
                        return Err(WorkflowError::InvalidConnection {
                            reason: format!("unknown target node '{}'", c.to),
                        });
                    }
                }
            }
        }
        Ok(workflow)
    }

    pub fn build_unchecked(self) -> Workflow {
        self.workflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn builder_rejects_connection_to_unknown_node() {
        let result = WorkflowBuilder::new("wf")
            .node(Node::new("t", "Trigger", NodeType::Trigger, "core", "manual"))
            .connect("t", "success", "missing", "main")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn trigger_nodes_returns_only_triggers() {
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("t", "Trigger", NodeType::Trigger, "core", "manual"))
            .node(Node::new("a", "Action", NodeType::Action, "core", "noop"))
            .build()
            .unwrap();
        let triggers = wf.trigger_nodes();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].key, "t");
    }
}
