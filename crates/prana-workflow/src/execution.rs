//! Compiled execution graphs and the two-type execution split described in
//! the design notes: `PersistedExecution` carries no runtime state and is
//! fully serializable; `LiveExecution` wraps it with an attached
//! `ExecutionGraph` and runtime state rebuilt from `node_executions`.

use crate::connection::Connection;
use crate::data::Value;
use crate::error::ExecutionError;
use crate::node::Node;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One cycle the compiler classified as a safe simple loop (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopInfo {
    pub loop_id: String,
    pub nodes: Vec<String>,
    pub termination_node_key: String,
}

/// Immutable compiled form of a `Workflow`, built by the `WorkflowCompiler`
/// from a trigger-reachable subgraph. Cacheable across runs; never
/// persisted as part of an `Execution` (§5, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionGraph {
    pub workflow_id: String,
    pub workflow_version: u32,
    pub trigger_node_key: String,
    pub nodes: HashMap<String, Node>,
    /// `(from_key, from_port) -> ordered list of Connection`, O(1) forward lookup.
    pub connection_map: HashMap<(String, String), Vec<Connection>>,
    /// `to_key -> ordered list of Connection`, O(1) incoming lookup.
    pub reverse_connection_map: HashMap<String, Vec<Connection>>,
    /// `node_key -> set of predecessor node_keys`.
    pub dependency_graph: HashMap<String, HashSet<String>>,
    pub loop_info: Vec<LoopInfo>,
    /// Stable compile-time ordering of node keys, used to tie-break ready-node
    /// selection (§4.6 step 6).
    pub node_order: Vec<String>,
}

impl ExecutionGraph {
    pub fn get_node(&self, key: &str) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn loop_containing(&self, node_key: &str) -> Option<&LoopInfo> {
        self.loop_info.iter().find(|l| l.nodes.iter().any(|n| n == node_key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Suspended,
}

/// One invocation of one node (§3). Two `NodeExecution`s for the same
/// `node_key` differ in `run_index`; `execution_index` increases globally
/// across the owning `Execution`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub node_key: String,
    pub status: NodeExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_data: Option<ExecutionError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension_data: Option<Value>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_index: u64,
    pub run_index: u32,
}

impl NodeExecution {
    fn new(node_key: impl Into<String>, execution_index: u64, run_index: u32) -> Self {
        Self {
            node_key: node_key.into(),
            status: NodeExecutionStatus::Running,
            output_data: None,
            output_port: None,
            error_data: None,
            suspension_type: None,
            suspension_data: None,
            started_at: Utc::now(),
            completed_at: None,
            execution_index,
            run_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Suspended,
}

/// `{node_key, type, data, suspended_at}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suspension {
    pub node_key: String,
    #[serde(rename = "type")]
    pub suspension_type: String,
    pub data: Value,
    pub suspended_at: DateTime<Utc>,
}

/// Only the non-runtime portion of an `Execution` is persisted (§6): `id`,
/// `workflow_id`, `status`, timestamps, `current_execution_index`,
/// `node_executions`, `suspension`, `variables`, `vars`,
/// `preparation_data`, `metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub mode: String,
    pub current_execution_index: u64,
    pub node_executions: HashMap<String, Vec<NodeExecution>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension: Option<Suspension>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub vars: HashMap<String, Value>,
    #[serde(default)]
    pub preparation_data: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl PersistedExecution {
    pub fn new(id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            mode: "manual".to_string(),
            current_execution_index: 0,
            node_executions: HashMap::new(),
            suspension: None,
            variables: HashMap::new(),
            vars: HashMap::new(),
            preparation_data: HashMap::new(),
            metadata: HashMap::new(),
        }
    }
}

/// Most recent successful output of a node, kept in runtime state for
/// `$nodes.<key>.*` expression access.
#[derive(Debug, Clone)]
pub struct NodeOutput {
    pub output_data: Value,
    pub output_port: String,
}

/// Runtime state of an active loop, rebuilt from compile-time `loop_info`
/// plus the termination node's `run_index` history — never persisted
/// directly.
#[derive(Debug, Clone)]
pub struct LoopState {
    pub loop_id: String,
    pub nodes: Vec<String>,
    pub current_iteration: u32,
    pub termination_node_key: String,
    pub created_at: DateTime<Utc>,
    pub max_iterations: u32,
    pub loop_timeout_ms: u64,
    pub terminated: bool,
}

impl LoopState {
    /// `loop_state_manager.should_continue?` from §4.6 step 3: iteration
    /// under the cap, not terminated, not timed out.
    pub fn should_continue(&self, now: DateTime<Utc>) -> bool {
        if self.terminated {
            return false;
        }
        if self.current_iteration >= self.max_iterations {
            return false;
        }
        let elapsed_ms = (now - self.created_at).num_milliseconds().max(0) as u64;
        elapsed_ms <= self.loop_timeout_ms
    }
}

/// Ephemeral runtime state, rebuildable from `node_executions` + supplied
/// `env` (§3, §5, §9). Never persisted.
#[derive(Debug, Clone, Default)]
pub struct RuntimeState {
    pub nodes: HashMap<String, NodeOutput>,
    pub env: HashMap<String, Value>,
    pub active_paths: HashSet<(String, String)>,
    pub executed_nodes: Vec<String>,
    pub loop_state: HashMap<String, LoopState>,
}

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_LOOP_TIMEOUT_MS: u64 = 60_000;

/// Persisted execution plus attached `ExecutionGraph` and derived runtime,
/// per the design notes' `PersistedExecution`/`LiveExecution` split.
#[derive(Debug, Clone)]
pub struct LiveExecution {
    pub persisted: PersistedExecution,
    pub graph: ExecutionGraph,
    pub runtime: RuntimeState,
}

impl LiveExecution {
    /// Start a brand-new execution against a freshly compiled graph.
    pub fn start(
        id: impl Into<String>,
        graph: ExecutionGraph,
        input: Value,
        env: HashMap<String, Value>,
        vars: HashMap<String, Value>,
        metadata: HashMap<String, Value>,
    ) -> Self {
        let workflow_id = graph.workflow_id.clone();
        let mut persisted = PersistedExecution::new(id, workflow_id);
        persisted.vars = vars;
        persisted.metadata = metadata;
        persisted
            .preparation_data
            .insert("trigger_input".to_string(), input);
        let runtime = RuntimeState {
            env,
            ..RuntimeState::default()
        };
        Self {
            persisted,
            graph,
            runtime,
        }
    }

    /// `rebuild(persisted, graph, env)` from the design notes: the runtime
    /// portion MUST NOT be persisted and is reconstructed here purely from
    /// `node_executions` + host-supplied `env`.
    pub fn rebuild(
        persisted: PersistedExecution,
        graph: ExecutionGraph,
        env: HashMap<String, Value>,
    ) -> Self {
        let mut runtime = RuntimeState {
            env,
            ..RuntimeState::default()
        };

        let mut all: Vec<&NodeExecution> = persisted.node_executions.values().flatten().collect();
        all.sort_by_key(|ne| ne.execution_index);

        for ne in &all {
            if ne.status == NodeExecutionStatus::Completed {
                if let (Some(data), Some(port)) = (&ne.output_data, &ne.output_port) {
                    runtime.nodes.insert(
                        ne.node_key.clone(),
                        NodeOutput {
                            output_data: data.clone(),
                            output_port: port.clone(),
                        },
                    );
                    runtime
                        .active_paths
                        .insert((ne.node_key.clone(), port.clone()));
                }
                runtime.executed_nodes.push(ne.node_key.clone());
            }
        }

        for loop_info in &graph.loop_info {
            let term_executions: Vec<&&NodeExecution> = all
                .iter()
                .filter(|ne| {
                    ne.node_key == loop_info.termination_node_key
                        && ne.status == NodeExecutionStatus::Completed
                })
                .collect();
            if term_executions.is_empty() {
                continue;
            }
            let current_iteration = term_executions.len() as u32;
            let terminated = term_executions
                .last()
                .and_then(|ne| ne.output_port.as_deref())
                == Some("false");
            let created_at = all
                .iter()
                .filter(|ne| loop_info.nodes.contains(&ne.node_key))
                .map(|ne| ne.started_at)
                .min()
                .unwrap_or_else(Utc::now);
            runtime.loop_state.insert(
                loop_info.loop_id.clone(),
                LoopState {
                    loop_id: loop_info.loop_id.clone(),
                    nodes: loop_info.nodes.clone(),
                    current_iteration,
                    termination_node_key: loop_info.termination_node_key.clone(),
                    created_at,
                    max_iterations: DEFAULT_MAX_ITERATIONS,
                    loop_timeout_ms: DEFAULT_LOOP_TIMEOUT_MS,
                    terminated,
                },
            );
        }

        Self {
            persisted,
            graph,
            runtime,
        }
    }

    pub fn next_execution_index(&mut self) -> u64 {
        let index = self.persisted.current_execution_index;
        self.persisted.current_execution_index += 1;
        index
    }

    pub fn next_run_index(&self, node_key: &str) -> u32 {
        self.persisted
            .node_executions
            .get(node_key)
            .and_then(|executions| executions.iter().map(|ne| ne.run_index).max())
            .map(|max| max + 1)
            .unwrap_or(0)
    }

    /// Record a completed invocation; update runtime `nodes`, `active_paths`
    /// and `executed_nodes` (§4.6 step 4).
    pub fn complete_node(
        &mut self,
        node_key: &str,
        execution_index: u64,
        run_index: u32,
        output_port: impl Into<String>,
        output_data: Value,
    ) -> &NodeExecution {
        let output_port = output_port.into();
        let mut ne = NodeExecution::new(node_key, execution_index, run_index);
        ne.status = NodeExecutionStatus::Completed;
        ne.output_port = Some(output_port.clone());
        ne.output_data = Some(output_data.clone());
        ne.completed_at = Some(Utc::now());

        self.runtime.nodes.insert(
            node_key.to_string(),
            NodeOutput {
                output_data,
                output_port: output_port.clone(),
            },
        );
        self.runtime
            .active_paths
            .insert((node_key.to_string(), output_port));
        self.runtime.executed_nodes.push(node_key.to_string());

        let list = self
            .persisted
            .node_executions
            .entry(node_key.to_string())
            .or_default();
        list.push(ne);
        list.last().unwrap()
    }

    /// Record a failed invocation.
    pub fn fail_node(
        &mut self,
        node_key: &str,
        execution_index: u64,
        run_index: u32,
        error: ExecutionError,
    ) -> &NodeExecution {
        let mut ne = NodeExecution::new(node_key, execution_index, run_index);
        ne.status = NodeExecutionStatus::Failed;
        ne.error_data = Some(error);
        ne.completed_at = Some(Utc::now());

        let list = self
            .persisted
            .node_executions
            .entry(node_key.to_string())
            .or_default();
        list.push(ne);
        list.last().unwrap()
    }

    /// Record a suspended invocation and mark the whole execution suspended.
    pub fn suspend_node(
        &mut self,
        node_key: &str,
        execution_index: u64,
        run_index: u32,
        suspension_type: impl Into<String>,
        suspension_data: Value,
    ) -> &NodeExecution {
        let suspension_type = suspension_type.into();
        let mut ne = NodeExecution::new(node_key, execution_index, run_index);
        ne.status = NodeExecutionStatus::Suspended;
        ne.suspension_type = Some(suspension_type.clone());
        ne.suspension_data = Some(suspension_data.clone());

        self.persisted.status = ExecutionStatus::Suspended;
        self.persisted.suspension = Some(Suspension {
            node_key: node_key.to_string(),
            suspension_type,
            data: suspension_data,
            suspended_at: Utc::now(),
        });

        let list = self
            .persisted
            .node_executions
            .entry(node_key.to_string())
            .or_default();
        list.push(ne);
        list.last().unwrap()
    }

    /// Clear a suspension to resume driving this execution. Returns `None`
    /// (an `execution.resume_on_non_suspended` condition for the caller to
    /// report) if the execution isn't currently suspended.
    pub fn begin_resume(&mut self) -> Option<Suspension> {
        if self.persisted.status != ExecutionStatus::Suspended {
            return None;
        }
        self.persisted.status = ExecutionStatus::Running;
        self.persisted.suspension.take()
    }

    pub fn latest_status(&self, node_key: &str) -> Option<NodeExecutionStatus> {
        self.persisted
            .node_executions
            .get(node_key)
            .and_then(|executions| executions.last())
            .map(|ne| ne.status)
    }

    pub fn latest_completed(&self, node_key: &str) -> Option<&NodeExecution> {
        self.persisted.node_executions.get(node_key).and_then(|executions| {
            executions
                .iter()
                .rev()
                .find(|ne| ne.status == NodeExecutionStatus::Completed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn empty_graph() -> ExecutionGraph {
        ExecutionGraph {
            workflow_id: "wf".to_string(),
            workflow_version: 1,
            trigger_node_key: "t".to_string(),
            nodes: HashMap::new(),
            connection_map: HashMap::new(),
            reverse_connection_map: HashMap::new(),
            dependency_graph: HashMap::new(),
            loop_info: Vec::new(),
            node_order: Vec::new(),
        }
    }

    #[test]
    fn execution_index_and_run_index_are_monotonic() {
        let mut live = LiveExecution::start(
            "exec-1",
            empty_graph(),
            Value::Null,
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        );
        let idx0 = live.next_execution_index();
        let run0 = live.next_run_index("a");
        live.complete_node("a", idx0, run0, "success", Value::Null);

        let idx1 = live.next_execution_index();
        let run1 = live.next_run_index("a");
        live.complete_node("a", idx1, run1, "success", Value::Null);

        assert_eq!(idx0, 0);
        assert_eq!(idx1, 1);
        assert_eq!(run0, 0);
        assert_eq!(run1, 1);
    }

    #[test]
    fn fail_node_sets_no_output_port() {
        let mut live = LiveExecution::start(
            "exec-1",
            empty_graph(),
            Value::Null,
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        );
        let err = ExecutionError::new(ErrorKind::ActionError, "boom", "a", "exec-1");
        let idx = live.next_execution_index();
        live.fail_node("a", idx, 0, err);
        let ne = live.latest_status("a").unwrap();
        assert_eq!(ne, NodeExecutionStatus::Failed);
    }

    #[test]
    fn rebuild_reconstructs_active_paths_from_node_executions() {
        let mut live = LiveExecution::start(
            "exec-1",
            empty_graph(),
            Value::Null,
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        );
        let idx = live.next_execution_index();
        live.complete_node("a", idx, 0, "success", Value::Null);

        let graph = live.graph.clone();
        let rebuilt = LiveExecution::rebuild(live.persisted.clone(), graph, HashMap::new());
        assert!(rebuilt
            .runtime
            .active_paths
            .contains(&("a".to_string(), "success".to_string())));
        assert_eq!(rebuilt.runtime.executed_nodes, vec!["a".to_string()]);
    }

    #[test]
    fn begin_resume_fails_when_not_suspended() {
        let mut live = LiveExecution::start(
            "exec-1",
            empty_graph(),
            Value::Null,
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        );
        assert!(live.begin_resume().is_none());
    }
}
