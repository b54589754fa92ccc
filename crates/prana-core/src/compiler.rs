//! Workflow compiler (§4.5). Turns a `Workflow` + optional trigger
//! selection into an `ExecutionGraph`. Grounded on the teacher's
//! `WorkflowValidator`/graph-building pass in `n8n-workflow`, generalized
//! to this spec's reachability pruning, index building, and cycle
//! classification.

use crate::registry::ActionRegistry;
use prana_workflow::connection::graph::{detect_cycles, reachable_from};
use prana_workflow::{
    Connection, ExecutionGraph, LoopInfo, Node, NodeType, Workflow, WorkflowConnections,
    WorkflowError,
};
use std::collections::{HashMap, HashSet};

const MAX_SAFE_CYCLE_LEN: usize = 5;

/// Compile `workflow` into an `ExecutionGraph`, validating actions against
/// `registry` and optionally pinning the trigger to `trigger_node_key`.
pub fn compile(
    workflow: &Workflow,
    trigger_node_key: Option<&str>,
    registry: &ActionRegistry,
) -> Result<ExecutionGraph, WorkflowError> {
    let trigger = select_trigger(workflow, trigger_node_key)?;

    let reachable = reachable_from(&trigger.key, &workflow.connections);
    let nodes: HashMap<String, Node> = workflow
        .nodes
        .iter()
        .filter(|(key, _)| reachable.contains(*key))
        .map(|(key, node)| (key.clone(), node.clone()))
        .collect();

    for node in nodes.values() {
        if registry.get(&node.integration_name, &node.action_name).is_none() {
            return Err(WorkflowError::UnknownAction {
                integration: node.integration_name.clone(),
                action: node.action_name.clone(),
            });
        }
    }

    let pruned_connections = prune_connections(&workflow.connections, &reachable);
    validate_connections(&nodes, &pruned_connections)?;

    let connection_map = build_connection_map(&pruned_connections);
    let reverse_connection_map = build_reverse_connection_map(&pruned_connections);
    let dependency_graph = build_dependency_graph(&reverse_connection_map);

    let loop_info = classify_cycles(&trigger.key, &pruned_connections, &nodes)?;

    let mut node_order: Vec<String> = nodes.keys().cloned().collect();
    node_order.sort();

    Ok(ExecutionGraph {
        workflow_id: workflow.id.clone(),
        workflow_version: workflow.version,
        trigger_node_key: trigger.key.clone(),
        nodes,
        connection_map,
        reverse_connection_map,
        dependency_graph,
        loop_info,
        node_order,
    })
}

fn select_trigger<'a>(
    workflow: &'a Workflow,
    trigger_node_key: Option<&str>,
) -> Result<&'a Node, WorkflowError> {
    if let Some(key) = trigger_node_key {
        let node = workflow
            .get_node(key)
            .ok_or_else(|| WorkflowError::InvalidConnection {
                reason: format!("trigger node '{key}' does not exist"),
            })?;
        if !node.is_trigger() {
            return Err(WorkflowError::TriggerNotTriggerType {
                key: key.to_string(),
            });
        }
        return Ok(node);
    }

    let triggers = workflow.trigger_nodes();
    match triggers.len() {
        0 => Err(WorkflowError::NoTriggerNodes),
        1 => Ok(triggers[0]),
        _ => Err(WorkflowError::MultipleTriggersFound {
            keys: triggers.iter().map(|n| n.key.clone()).collect(),
        }),
    }
}

fn prune_connections(
    connections: &WorkflowConnections,
    reachable: &HashSet<String>,
) -> WorkflowConnections {
    let mut pruned = WorkflowConnections::new();
    for (from, by_port) in connections {
        if !reachable.contains(from) {
            continue;
        }
        for (port, conns) in by_port {
            let kept: Vec<Connection> = conns
                .iter()
                .filter(|c| reachable.contains(&c.to))
                .cloned()
                .collect();
            if !kept.is_empty() {
                pruned.entry(from.clone()).or_default().insert(port.clone(), kept);
            }
        }
    }
    pruned
}

fn validate_connections(
    nodes: &HashMap<String, Node>,
    connections: &WorkflowConnections,
) -> Result<(), WorkflowError> {
    for (from, by_port) in connections {
        let from_node = nodes.get(from).ok_or_else(|| WorkflowError::InvalidConnection {
            reason: format!("unknown source node '{from}'"),
        })?;
        for (port, conns) in by_port {
            if !from_node.output_ports.contains(port) {
                return Err(WorkflowError::InvalidConnection {
                    reason: format!("node '{from}' has no output port '{port}'"),
                });
            }
            for c in conns {
                let to_node = nodes.get(&c.to).ok_or_else(|| WorkflowError::InvalidConnection {
                    reason: format!("unknown target node '{}'", c.to),
                })?;
                if !to_node.input_ports.contains(&c.to_port) {
                    return Err(WorkflowError::InvalidConnection {
                        reason: format!("node '{}' has no input port '{}'", c.to, c.to_port),
                    });
                }
            }
        }
    }
    Ok(())
}

fn build_connection_map(connections: &WorkflowConnections) -> HashMap<(String, String), Vec<Connection>> {
    let mut map = HashMap::new();
    for (from, by_port) in connections {
        for (port, conns) in by_port {
            map.insert((from.clone(), port.clone()), conns.clone());
        }
    }
    map
}

fn build_reverse_connection_map(connections: &WorkflowConnections) -> HashMap<String, Vec<Connection>> {
    let mut map: HashMap<String, Vec<Connection>> = HashMap::new();
    let mut from_keys: Vec<&String> = connections.keys().collect();
    from_keys.sort();
    for from in from_keys {
        let by_port = &connections[from];
        let mut ports: Vec<&String> = by_port.keys().collect();
        ports.sort();
        for port in ports {
            for c in &by_port[port] {
                map.entry(c.to.clone()).or_default().push(c.clone());
            }
        }
    }
    map
}

fn build_dependency_graph(
    reverse_connection_map: &HashMap<String, Vec<Connection>>,
) -> HashMap<String, HashSet<String>> {
    reverse_connection_map
        .iter()
        .map(|(to, conns)| (to.clone(), conns.iter().map(|c| c.from.clone()).collect()))
        .collect()
}

fn classify_cycles(
    trigger_key: &str,
    connections: &WorkflowConnections,
    nodes: &HashMap<String, Node>,
) -> Result<Vec<LoopInfo>, WorkflowError> {
    let cycles = detect_cycles(trigger_key, connections);
    let mut loop_info = Vec::with_capacity(cycles.len());

    for (i, cycle) in cycles.into_iter().enumerate() {
        let termination = cycle
            .nodes
            .iter()
            .find(|key| nodes.get(*key).is_some_and(|n| n.node_type == NodeType::Logic));

        let termination_node_key = match termination {
            Some(key) if cycle.nodes.len() <= MAX_SAFE_CYCLE_LEN => key.clone(),
            _ => {
                return Err(WorkflowError::UnsafeCycle {
                    nodes: cycle.nodes,
                })
            }
        };

        loop_info.push(LoopInfo {
            loop_id: format!("loop-{i}"),
            nodes: cycle.nodes,
            termination_node_key,
        });
    }

    Ok(loop_info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Action, ActionError, NodeResult};
    use async_trait::async_trait;
    use prana_workflow::{Value, WorkflowBuilder};
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl Action for Noop {
        async fn execute(&self, _: &Value) -> Result<NodeResult, ActionError> {
            Ok(NodeResult::OkDefault { data: Value::Null })
        }
    }

    fn registry() -> ActionRegistry {
        let r = ActionRegistry::new();
        r.register("core", "trigger", vec![], vec!["success".to_string()], Arc::new(Noop));
        r.register("core", "noop", vec!["main".to_string()], vec!["success".to_string()], Arc::new(Noop));
        r.register(
            "core",
            "if",
            vec!["main".to_string()],
            vec!["true".to_string(), "false".to_string()],
            Arc::new(Noop),
        );
        r
    }

    #[test]
    fn prunes_unreachable_nodes() {
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("t", "Trigger", NodeType::Trigger, "core", "trigger"))
            .node(Node::new("a", "A", NodeType::Action, "core", "noop"))
            .node(Node::new("orphan", "Orphan", NodeType::Action, "core", "noop"))
            .connect("t", "success", "a", "main")
            .build()
            .unwrap();

        let graph = compile(&wf, None, &registry()).unwrap();
        assert!(graph.nodes.contains_key("a"));
        assert!(!graph.nodes.contains_key("orphan"));
    }

    #[test]
    fn no_trigger_nodes_errors() {
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("a", "A", NodeType::Action, "core", "noop"))
            .build()
            .unwrap();
        assert!(matches!(
            compile(&wf, None, &registry()),
            Err(WorkflowError::NoTriggerNodes)
        ));
    }

    #[test]
    fn multiple_triggers_errors() {
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("t1", "T1", NodeType::Trigger, "core", "trigger"))
            .node(Node::new("t2", "T2", NodeType::Trigger, "core", "trigger"))
            .build()
            .unwrap();
        assert!(matches!(
            compile(&wf, None, &registry()),
            Err(WorkflowError::MultipleTriggersFound { .. })
        ));
    }

    #[test]
    fn unknown_action_errors() {
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("t", "Trigger", NodeType::Trigger, "core", "trigger"))
            .node(Node::new("a", "A", NodeType::Action, "ghost", "ghost"))
            .connect("t", "success", "a", "main")
            .build()
            .unwrap();
        assert!(matches!(
            compile(&wf, None, &registry()),
            Err(WorkflowError::UnknownAction { .. })
        ));
    }

    #[test]
    fn safe_loop_with_logic_node_is_accepted() {
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("t", "Trigger", NodeType::Trigger, "core", "trigger"))
            .node(
                Node::new("cond", "Cond", NodeType::Logic, "core", "if")
                    .with_output_ports(vec!["true".to_string(), "false".to_string()]),
            )
            .node(Node::new("a", "A", NodeType::Action, "core", "noop"))
            .connect("t", "success", "cond", "main")
            .connect("cond", "true", "a", "main")
            .connect("a", "success", "cond", "main")
            .build()
            .unwrap();
        let graph = compile(&wf, None, &registry()).unwrap();
        assert_eq!(graph.loop_info.len(), 1);
        assert_eq!(graph.loop_info[0].termination_node_key, "cond");
    }

    #[test]
    fn cycle_without_logic_node_is_unsafe() {
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("t", "Trigger", NodeType::Trigger, "core", "trigger"))
            .node(Node::new("a", "A", NodeType::Action, "core", "noop"))
            .node(Node::new("b", "B", NodeType::Action, "core", "noop"))
            .connect("t", "success", "a", "main")
            .connect("a", "success", "b", "main")
            .connect("b", "success", "a", "main")
            .build()
            .unwrap();
        assert!(matches!(
            compile(&wf, None, &registry()),
            Err(WorkflowError::UnsafeCycle { .. })
        ));
    }
}
