//! Connections wire node output ports to node input ports.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A directed edge `(from_key, from_port) -> (to_key, to_port)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub from_port: String,
    pub to: String,
    pub to_port: String,
}

impl Connection {
    pub fn new(
        from: impl Into<String>,
        from_port: impl Into<String>,
        to: impl Into<String>,
        to_port: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            from_port: from_port.into(),
            to: to.into(),
            to_port: to_port.into(),
        }
    }
}

/// Double-indexed map `from_node_key -> from_port -> ordered list of
/// Connection`, as authored on a `Workflow`. Order is stable iteration order
/// for fan-out.
pub type WorkflowConnections = HashMap<String, HashMap<String, Vec<Connection>>>;

/// Add a connection to a `WorkflowConnections` map, preserving insertion
/// order within each `(from, from_port)` bucket.
pub fn add_connection(connections: &mut WorkflowConnections, connection: Connection) {
    connections
        .entry(connection.from.clone())
        .or_default()
        .entry(connection.from_port.clone())
        .or_default()
        .push(connection);
}

/// Flatten a `WorkflowConnections` map back into a stable-ordered list, for
/// iteration contexts that want a single sequence (compiler index building,
/// validation).
pub fn iter_all(connections: &WorkflowConnections) -> Vec<&Connection> {
    let mut from_keys: Vec<&String> = connections.keys().collect();
    from_keys.sort();
    let mut out = Vec::new();
    for from_key in from_keys {
        let by_port = &connections[from_key];
        let mut ports: Vec<&String> = by_port.keys().collect();
        ports.sort();
        for port in ports {
            out.extend(by_port[port].iter());
        }
    }
    out
}

pub mod graph {
    //! Forward-reachability and cycle-detection primitives. These operate
    //! purely on node keys and connections; classifying a detected cycle as
    //! a "safe simple loop" requires node-type information and is the
    //! compiler's job (it has the `Node` map), not this module's.

    use super::{Connection, WorkflowConnections};
    use std::collections::{HashSet, VecDeque};

    /// BFS forward reachability from `start` via `connections`. Includes
    /// `start` itself.
    pub fn reachable_from(start: &str, connections: &WorkflowConnections) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(start.to_string());
        queue.push_back(start.to_string());
        while let Some(key) = queue.pop_front() {
            if let Some(by_port) = connections.get(&key) {
                for conns in by_port.values() {
                    for c in conns {
                        if seen.insert(c.to.clone()) {
                            queue.push_back(c.to.clone());
                        }
                    }
                }
            }
        }
        seen
    }

    /// A cycle detected via DFS back-edge, in discovery order.
    #[derive(Debug, Clone)]
    pub struct Cycle {
        pub nodes: Vec<String>,
    }

    /// Detect simple cycles reachable from `start` via DFS back-edges.
    /// Each back-edge to a node currently on the DFS stack yields one
    /// `Cycle` containing the stack suffix from that node to the current
    /// one.
    pub fn detect_cycles(start: &str, connections: &WorkflowConnections) -> Vec<Cycle> {
        let mut cycles = Vec::new();
        let mut stack: Vec<String> = Vec::new();
        let mut on_stack: HashSet<String> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();
        dfs(start, connections, &mut stack, &mut on_stack, &mut visited, &mut cycles);
        cycles
    }

    fn dfs(
        key: &str,
        connections: &WorkflowConnections,
        stack: &mut Vec<String>,
        on_stack: &mut HashSet<String>,
        visited: &mut HashSet<String>,
        cycles: &mut Vec<Cycle>,
    ) {
        visited.insert(key.to_string());
        stack.push(key.to_string());
        on_stack.insert(key.to_string());

        let successors: Vec<&Connection> = connections
            .get(key)
            .map(|by_port| by_port.values().flatten().collect())
            .unwrap_or_default();

        for c in successors {
            if on_stack.contains(&c.to) {
                let start_idx = stack.iter().position(|k| k == &c.to).unwrap();
                cycles.push(Cycle {
                    nodes: stack[start_idx..].to_vec(),
                });
            } else if !visited.contains(&c.to) {
                dfs(&c.to, connections, stack, on_stack, visited, cycles);
            }
        }

        stack.pop();
        on_stack.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conns(edges: &[(&str, &str, &str, &str)]) -> WorkflowConnections {
        let mut map = WorkflowConnections::new();
        for (from, from_port, to, to_port) in edges {
            add_connection(&mut map, Connection::new(*from, *from_port, *to, *to_port));
        }
        map
    }

    #[test]
    fn reachable_from_follows_fan_out() {
        let map = conns(&[
            ("t", "success", "a", "main"),
            ("t", "success", "b", "main"),
            ("a", "success", "c", "main"),
        ]);
        let reachable = graph::reachable_from("t", &map);
        assert_eq!(reachable.len(), 4);
        assert!(reachable.contains("c"));
    }

    #[test]
    fn unreachable_node_excluded() {
        let map = conns(&[("t", "success", "a", "main")]);
        let reachable = graph::reachable_from("t", &map);
        assert!(!reachable.contains("orphan"));
    }

    #[test]
    fn detect_cycles_finds_back_edge() {
        let map = conns(&[
            ("a", "success", "b", "main"),
            ("b", "success", "c", "main"),
            ("c", "true", "a", "main"),
        ]);
        let cycles = graph::detect_cycles("a", &map);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].nodes, vec!["a", "b", "c"]);
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let map = conns(&[("a", "success", "b", "main")]);
        assert!(graph::detect_cycles("a", &map).is_empty());
    }
}
