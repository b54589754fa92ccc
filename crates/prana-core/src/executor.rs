//! Graph executor (§4.6). Single-threaded cooperative driver: pick at
//! most one ready node per step, run it to completion, update runtime
//! state, repeat. Grounded on the teacher's `WorkflowExecute` main loop
//! (`processRunExecutionData`'s step-and-update shape), generalized to
//! this spec's ready-node selection, branch-following tie-break, and
//! loop safety checks.

use crate::expression::TemplateLimits;
use crate::middleware::MiddlewareChain;
use crate::node_executor::{self, NodeOutcome, RoutedInput};
use crate::registry::ActionRegistry;
use chrono::Utc;
use prana_workflow::{
    Connection, ErrorKind, ExecutionError, ExecutionStatus, LiveExecution, LoopInfo, LoopState,
    Node, NodeExecutionStatus, Suspension, Value, DEFAULT_LOOP_TIMEOUT_MS, DEFAULT_MAX_ITERATIONS,
};

/// Result of driving an Execution to its next stopping point.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Completed,
    Suspended(Suspension),
    Failed(ExecutionError),
}

enum StepOutcome {
    Stepped,
    Suspended(Suspension),
    Failed(ExecutionError),
    Done,
}

/// Drive `live` until it completes, suspends, or fails. Emits
/// `execution_started` immediately and the matching terminal event
/// through `middleware` once a stopping point is reached.
pub async fn run(
    live: &mut LiveExecution,
    registry: &ActionRegistry,
    limits: &TemplateLimits,
    middleware: &MiddlewareChain,
) -> ExecutionOutcome {
    middleware.execution_started(&live.persisted).await;
    let outcome = drive(live, registry, limits, middleware).await;
    emit_terminal(live, &outcome, middleware).await;
    outcome
}

/// Resume a suspended `live` with `resume_input`, then continue driving
/// it to its next stopping point. Does not re-emit `execution_started`.
pub async fn resume_workflow(
    live: &mut LiveExecution,
    resume_input: Value,
    registry: &ActionRegistry,
    limits: &TemplateLimits,
    middleware: &MiddlewareChain,
) -> Result<ExecutionOutcome, crate::error::EngineError> {
    let suspension = live
        .begin_resume()
        .ok_or(crate::error::EngineError::ResumeOnNonSuspended)?;
    let node = live
        .graph
        .nodes
        .get(&suspension.node_key)
        .cloned()
        .ok_or_else(|| {
            crate::error::EngineError::Internal(format!(
                "suspended node '{}' missing from graph",
                suspension.node_key
            ))
        })?;

    let execution_index = live.next_execution_index();
    let run_index = live.next_run_index(&node.key);
    let outcome = node_executor::resume_node(
        &node,
        &live.persisted.id,
        run_index,
        &suspension.data,
        &resume_input,
        registry,
    )
    .await;

    let step_outcome = apply_outcome(live, &node, execution_index, run_index, outcome, middleware).await;
    let outcome = match step_outcome {
        StepOutcome::Stepped => drive(live, registry, limits, middleware).await,
        StepOutcome::Suspended(s) => ExecutionOutcome::Suspended(s),
        StepOutcome::Failed(e) => ExecutionOutcome::Failed(e),
        StepOutcome::Done => ExecutionOutcome::Completed,
    };
    emit_terminal(live, &outcome, middleware).await;
    Ok(outcome)
}

async fn drive(
    live: &mut LiveExecution,
    registry: &ActionRegistry,
    limits: &TemplateLimits,
    middleware: &MiddlewareChain,
) -> ExecutionOutcome {
    loop {
        match step(live, registry, limits, middleware).await {
            StepOutcome::Stepped => continue,
            StepOutcome::Suspended(s) => return ExecutionOutcome::Suspended(s),
            StepOutcome::Failed(e) => return ExecutionOutcome::Failed(e),
            StepOutcome::Done => {
                live.persisted.status = ExecutionStatus::Completed;
                live.persisted.completed_at = Some(Utc::now());
                return ExecutionOutcome::Completed;
            }
        }
    }
}

async fn emit_terminal(live: &LiveExecution, outcome: &ExecutionOutcome, middleware: &MiddlewareChain) {
    match outcome {
        ExecutionOutcome::Completed => middleware.execution_completed(&live.persisted).await,
        ExecutionOutcome::Failed(e) => middleware.execution_failed(&live.persisted, e).await,
        ExecutionOutcome::Suspended(s) => middleware.execution_suspended(&live.persisted, s).await,
    }
}

async fn step(
    live: &mut LiveExecution,
    registry: &ActionRegistry,
    limits: &TemplateLimits,
    middleware: &MiddlewareChain,
) -> StepOutcome {
    ensure_loop_states(live);

    if let Some(error) = check_loop_violations(live) {
        live.persisted.status = ExecutionStatus::Failed;
        live.persisted.completed_at = Some(Utc::now());
        return StepOutcome::Failed(error);
    }

    let Some(node_key) = select_ready(live) else {
        return StepOutcome::Done;
    };
    let node = live
        .graph
        .nodes
        .get(&node_key)
        .cloned()
        .expect("node selected by select_ready must exist in the graph");

    let routed_input = route_input(live, &node);

    // §4.3: `prepare` runs once before a node's first execution in this
    // Execution; its result is persisted and surfaced as `$execution.preparation`.
    if !live.persisted.preparation_data.contains_key(&node.key) {
        match node_executor::prepare_node(&node, &live.persisted.id, registry).await {
            Ok(data) => {
                live.persisted.preparation_data.insert(node.key.clone(), data);
            }
            Err(error) => {
                let execution_index = live.next_execution_index();
                let run_index = live.next_run_index(&node.key);
                let ne = live.fail_node(&node.key, execution_index, run_index, error.clone()).clone();
                middleware.node_failed(&node, &ne).await;
                live.persisted.status = ExecutionStatus::Failed;
                live.persisted.completed_at = Some(Utc::now());
                return StepOutcome::Failed(error);
            }
        }
    }

    // §4.4 retry policy: an internal "retry" suspension is resumed
    // immediately in this same step loop rather than surfaced to the
    // host — only a hard failure or a genuine (non-retry) suspension
    // ends the step.
    loop {
        let execution_index = live.next_execution_index();
        let run_index = live.next_run_index(&node.key);
        middleware.node_started(&node, run_index).await;
        let outcome = node_executor::execute_node(&node, live, &routed_input, run_index, registry, limits).await;

        if let NodeOutcome::Suspended { suspension_type, data } = &outcome {
            if suspension_type == "retry" {
                let error = retry_original_error(&node, &live.persisted.id, data);
                let ne = live.fail_node(&node.key, execution_index, run_index, error).clone();
                middleware.node_failed(&node, &ne).await;
                continue;
            }
        }

        return apply_outcome(live, &node, execution_index, run_index, outcome, middleware).await;
    }
}

fn retry_original_error(node: &Node, execution_id: &str, suspension_data: &Value) -> ExecutionError {
    suspension_data
        .get("original_error")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(|| {
            ExecutionError::new(ErrorKind::ActionError, "retry suspended with no original_error", &node.key, execution_id)
        })
}

async fn apply_outcome(
    live: &mut LiveExecution,
    node: &Node,
    execution_index: u64,
    run_index: u32,
    outcome: NodeOutcome,
    middleware: &MiddlewareChain,
) -> StepOutcome {
    match outcome {
        NodeOutcome::Completed { output_port, output_data } => {
            let ne = live
                .complete_node(&node.key, execution_index, run_index, output_port.clone(), output_data)
                .clone();
            middleware.node_completed(node, &ne).await;
            if let Some(loop_info) = live.graph.loop_containing(&node.key).cloned() {
                if node.key == loop_info.termination_node_key {
                    if let Some(ls) = live.runtime.loop_state.get_mut(&loop_info.loop_id) {
                        ls.current_iteration += 1;
                        if output_port == "false" {
                            ls.terminated = true;
                        }
                    }
                }
            }
            StepOutcome::Stepped
        }
        NodeOutcome::Failed(error) => {
            if let Some(port) = connected_error_port(live, node) {
                let data = serde_json::to_value(&error).unwrap_or(Value::Null);
                let ne = live.complete_node(&node.key, execution_index, run_index, port, data).clone();
                middleware.node_completed(node, &ne).await;
                StepOutcome::Stepped
            } else {
                let ne = live.fail_node(&node.key, execution_index, run_index, error.clone()).clone();
                middleware.node_failed(node, &ne).await;
                live.persisted.status = ExecutionStatus::Failed;
                live.persisted.completed_at = Some(Utc::now());
                StepOutcome::Failed(error)
            }
        }
        NodeOutcome::Suspended { suspension_type, data } => {
            live.suspend_node(&node.key, execution_index, run_index, suspension_type, data);
            let suspension = live
                .persisted
                .suspension
                .clone()
                .expect("suspend_node always sets persisted.suspension");
            StepOutcome::Suspended(suspension)
        }
    }
}

fn ensure_loop_states(live: &mut LiveExecution) {
    let loops = live.graph.loop_info.clone();
    for loop_info in &loops {
        live.runtime
            .loop_state
            .entry(loop_info.loop_id.clone())
            .or_insert_with(|| LoopState {
                loop_id: loop_info.loop_id.clone(),
                nodes: loop_info.nodes.clone(),
                current_iteration: 0,
                termination_node_key: loop_info.termination_node_key.clone(),
                created_at: Utc::now(),
                max_iterations: DEFAULT_MAX_ITERATIONS,
                loop_timeout_ms: DEFAULT_LOOP_TIMEOUT_MS,
                terminated: false,
            });
    }
}

/// §4.6 "Simple loops": a loop that stops continuing without having
/// terminated normally (via its termination node's `false` port) blew
/// either its iteration cap or its wall-clock timeout.
fn check_loop_violations(live: &mut LiveExecution) -> Option<ExecutionError> {
    let now = Utc::now();
    let loop_infos = live.graph.loop_info.clone();
    for loop_info in &loop_infos {
        let violates = live
            .runtime
            .loop_state
            .get(&loop_info.loop_id)
            .map(|ls| !ls.terminated && !ls.should_continue(now))
            .unwrap_or(false);
        if violates {
            if let Some(ls) = live.runtime.loop_state.get_mut(&loop_info.loop_id) {
                ls.terminated = true;
            }
            return Some(ExecutionError::new(
                ErrorKind::ActionError,
                format!("loop '{}' exceeded its iteration cap or wall-clock timeout", loop_info.loop_id),
                &loop_info.termination_node_key,
                &live.persisted.id,
            ));
        }
    }
    None
}

/// Ready-node selection (§4.6 steps 1-6). Returns at most one node key.
fn select_ready(live: &LiveExecution) -> Option<String> {
    let now = Utc::now();
    let mut best: Option<(&str, i64)> = None;

    for key in &live.graph.node_order {
        let Some(node) = live.graph.nodes.get(key) else { continue };

        if !should_execute(live, key, now) {
            continue;
        }
        if matches!(
            live.latest_status(key),
            Some(NodeExecutionStatus::Running) | Some(NodeExecutionStatus::Suspended)
        ) {
            continue;
        }
        if !dependencies_satisfied(live, node) {
            continue;
        }

        let score = most_recent_predecessor_index(live, key).map(|i| i as i64).unwrap_or(-1);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((key.as_str(), score)),
        }
    }

    best.map(|(key, _)| key.to_string())
}

fn should_execute(live: &LiveExecution, key: &str, now: chrono::DateTime<Utc>) -> bool {
    match live.graph.loop_containing(key) {
        Some(loop_info) => live
            .runtime
            .loop_state
            .get(&loop_info.loop_id)
            .map(|ls| ls.should_continue(now))
            .unwrap_or(true),
        None => live.latest_status(key) != Some(NodeExecutionStatus::Completed),
    }
}

/// Per §4.6 step 4/5, satisfied per `to_port`. A port joining sibling
/// branches (e.g. a merge node's `main`, fed by two plain DAG
/// predecessors) needs ALL of its edges to have fired — that's a real
/// join. A port that re-enters from within the SAME loop as `node` (e.g.
/// a loop body's `main`, fed by both the trigger and the loop-back edge)
/// needs only ONE of its edges to have fired, since the loop-back
/// predecessor hasn't run yet on the first iteration and never will again
/// once the non-loop entry edge has already satisfied it. Whether a port
/// is loop-relative is a whole-port decision (any edge from a loop-mate
/// makes it so); within either mode, an edge from a branching (logic)
/// predecessor additionally requires its specific `(from, from_port)` to
/// be the currently active path.
fn dependencies_satisfied(live: &LiveExecution, node: &Node) -> bool {
    let Some(incoming) = live.graph.reverse_connection_map.get(&node.key) else {
        return true;
    };
    let my_loop = live.graph.loop_containing(&node.key);
    for to_port in &node.input_ports {
        let edges: Vec<&Connection> = incoming.iter().filter(|c| &c.to_port == to_port).collect();
        if edges.is_empty() {
            continue;
        }
        let edge_fired = |c: &Connection| -> bool {
            let fired = live
                .latest_completed(&c.from)
                .map(|ne| ne.output_port.as_deref() == Some(c.from_port.as_str()))
                .unwrap_or(false);
            if !fired {
                return false;
            }
            let is_branching = live.graph.nodes.get(&c.from).map(|n| n.is_logic()).unwrap_or(false);
            !is_branching || live.runtime.active_paths.contains(&(c.from.clone(), c.from_port.clone()))
        };
        let is_loop_port = edges.iter().any(|c| {
            my_loop.is_some_and(|loop_info| loop_info.nodes.contains(&c.from))
        });
        let satisfied = if is_loop_port {
            edges.iter().any(|c| edge_fired(c))
        } else {
            edges.iter().all(|c| edge_fired(c))
        };
        if !satisfied {
            return false;
        }
    }
    true
}

fn most_recent_predecessor_index(live: &LiveExecution, key: &str) -> Option<u64> {
    let preds = live.graph.dependency_graph.get(key)?;
    preds
        .iter()
        .filter_map(|p| live.latest_completed(p))
        .map(|ne| ne.execution_index)
        .max()
}

fn connected_error_port(live: &LiveExecution, node: &Node) -> Option<String> {
    if node.output_ports.iter().any(|p| p == "error")
        && live
            .graph
            .connection_map
            .contains_key(&(node.key.clone(), "error".to_string()))
    {
        Some("error".to_string())
    } else {
        None
    }
}

/// Input routing (§4.6 "Input routing for the selected node"): aggregate,
/// per input port, the most recent completed output of each connected
/// predecessor whose `output_port` matches the connection.
fn route_input(live: &LiveExecution, node: &Node) -> RoutedInput {
    let mut routed = RoutedInput::new();
    let Some(incoming) = live.graph.reverse_connection_map.get(&node.key) else {
        return routed;
    };
    for to_port in &node.input_ports {
        let mut contributors: Vec<Value> = Vec::new();
        for conn in incoming.iter().filter(|c| &c.to_port == to_port) {
            if let Some(output) = live.runtime.nodes.get(&conn.from) {
                if output.output_port == conn.from_port {
                    contributors.push(output.output_data.clone());
                }
            }
        }
        match contributors.len() {
            0 => {}
            1 => {
                routed.insert(to_port.clone(), contributors.into_iter().next().unwrap());
            }
            _ => {
                routed.insert(to_port.clone(), Value::Array(contributors));
            }
        }
    }
    routed
}

#[allow(dead_code)]
fn loop_info_by_id<'a>(live: &'a LiveExecution, loop_id: &str) -> Option<&'a LoopInfo> {
    live.graph.loop_info.iter().find(|l| l.loop_id == loop_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler;
    use crate::registry::{Action, ActionError, NodeResult};
    use async_trait::async_trait;
    use prana_workflow::{NodeType, WorkflowBuilder};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Trigger;
    #[async_trait]
    impl Action for Trigger {
        async fn execute(&self, _: &Value) -> Result<NodeResult, ActionError> {
            Ok(NodeResult::OkDefault { data: Value::Null })
        }
    }

    struct Echo;
    #[async_trait]
    impl Action for Echo {
        async fn execute(&self, rendered: &Value) -> Result<NodeResult, ActionError> {
            Ok(NodeResult::OkDefault { data: rendered.clone() })
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl Action for AlwaysFails {
        async fn execute(&self, _: &Value) -> Result<NodeResult, ActionError> {
            Err(ActionError("boom".to_string()))
        }
    }

    struct Suspends;
    #[async_trait]
    impl Action for Suspends {
        async fn execute(&self, _: &Value) -> Result<NodeResult, ActionError> {
            Ok(NodeResult::Suspend {
                suspension_type: "webhook".to_string(),
                data: serde_json::json!({ "resume_url": "https://example.test/r" }),
            })
        }

        async fn resume(&self, _suspension_data: &Value, resume_input: &Value) -> Result<NodeResult, ActionError> {
            Ok(NodeResult::OkDefault { data: resume_input.clone() })
        }
    }

    struct CountingLoopCond {
        calls: AtomicU32,
    }
    #[async_trait]
    impl Action for CountingLoopCond {
        async fn execute(&self, _: &Value) -> Result<NodeResult, ActionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let port = if n < 2 { "true" } else { "false" };
            Ok(NodeResult::Ok { data: Value::Null, port: port.to_string() })
        }
    }

    fn base_registry() -> ActionRegistry {
        let r = ActionRegistry::new();
        r.register("core", "trigger", vec![], vec!["success".to_string()], Arc::new(Trigger));
        r.register("core", "echo", vec!["main".to_string()], vec!["success".to_string()], Arc::new(Echo));
        r.register(
            "core",
            "echo_err",
            vec!["main".to_string()],
            vec!["success".to_string(), "error".to_string()],
            Arc::new(Echo),
        );
        r
    }

    fn start(graph: prana_workflow::ExecutionGraph) -> LiveExecution {
        LiveExecution::start("exec-1", graph, Value::Null, HashMap::new(), HashMap::new(), HashMap::new())
    }

    #[tokio::test]
    async fn linear_workflow_completes() {
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("t", "Trigger", NodeType::Trigger, "core", "trigger"))
            .node(Node::new("a", "A", NodeType::Action, "core", "echo"))
            .connect("t", "success", "a", "main")
            .build()
            .unwrap();
        let graph = compiler::compile(&wf, None, &base_registry()).unwrap();
        let mut live = start(graph);
        let outcome = run(&mut live, &base_registry(), &TemplateLimits::default(), &MiddlewareChain::new()).await;
        assert!(matches!(outcome, ExecutionOutcome::Completed));
        assert_eq!(live.runtime.executed_nodes, vec!["t".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn branching_node_only_follows_active_path() {
        struct Router;
        #[async_trait]
        impl Action for Router {
            async fn execute(&self, _: &Value) -> Result<NodeResult, ActionError> {
                Ok(NodeResult::Ok { data: Value::Null, port: "true".to_string() })
            }
        }
        let registry = base_registry();
        registry.register(
            "core",
            "router",
            vec!["main".to_string()],
            vec!["true".to_string(), "false".to_string()],
            Arc::new(Router),
        );

        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("t", "Trigger", NodeType::Trigger, "core", "trigger"))
            .node(
                Node::new("r", "Router", NodeType::Logic, "core", "router")
                    .with_output_ports(vec!["true".to_string(), "false".to_string()]),
            )
            .node(Node::new("yes", "Yes", NodeType::Action, "core", "echo"))
            .node(Node::new("no", "No", NodeType::Action, "core", "echo"))
            .connect("t", "success", "r", "main")
            .connect("r", "true", "yes", "main")
            .connect("r", "false", "no", "main")
            .build()
            .unwrap();
        let graph = compiler::compile(&wf, None, &registry).unwrap();
        let mut live = start(graph);
        let outcome = run(&mut live, &registry, &TemplateLimits::default(), &MiddlewareChain::new()).await;
        assert!(matches!(outcome, ExecutionOutcome::Completed));
        assert!(live.runtime.executed_nodes.contains(&"yes".to_string()));
        assert!(!live.runtime.executed_nodes.contains(&"no".to_string()));
    }

    #[tokio::test]
    async fn unconsumed_failure_fails_execution() {
        let registry = base_registry();
        registry.register("core", "fails", vec!["main".to_string()], vec!["success".to_string()], Arc::new(AlwaysFails));
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("t", "Trigger", NodeType::Trigger, "core", "trigger"))
            .node(Node::new("a", "A", NodeType::Action, "core", "fails"))
            .connect("t", "success", "a", "main")
            .build()
            .unwrap();
        let graph = compiler::compile(&wf, None, &registry).unwrap();
        let mut live = start(graph);
        let outcome = run(&mut live, &registry, &TemplateLimits::default(), &MiddlewareChain::new()).await;
        assert!(matches!(outcome, ExecutionOutcome::Failed(_)));
        assert_eq!(live.persisted.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn failure_on_connected_error_port_completes_execution() {
        let registry = base_registry();
        registry.register(
            "core",
            "fails_routed",
            vec!["main".to_string()],
            vec!["success".to_string(), "error".to_string()],
            Arc::new(AlwaysFails),
        );
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("t", "Trigger", NodeType::Trigger, "core", "trigger"))
            .node(
                Node::new("a", "A", NodeType::Action, "core", "fails_routed")
                    .with_output_ports(vec!["success".to_string(), "error".to_string()]),
            )
            .node(Node::new("handler", "Handler", NodeType::Action, "core", "echo"))
            .connect("t", "success", "a", "main")
            .connect("a", "error", "handler", "main")
            .build()
            .unwrap();
        let graph = compiler::compile(&wf, None, &registry).unwrap();
        let mut live = start(graph);
        let outcome = run(&mut live, &registry, &TemplateLimits::default(), &MiddlewareChain::new()).await;
        assert!(matches!(outcome, ExecutionOutcome::Completed));
        assert!(live.runtime.executed_nodes.contains(&"handler".to_string()));
    }

    #[tokio::test]
    async fn suspend_then_resume_completes() {
        let registry = base_registry();
        registry.register("core", "suspends", vec!["main".to_string()], vec!["success".to_string()], Arc::new(Suspends));
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("t", "Trigger", NodeType::Trigger, "core", "trigger"))
            .node(Node::new("a", "A", NodeType::Action, "core", "suspends"))
            .connect("t", "success", "a", "main")
            .build()
            .unwrap();
        let graph = compiler::compile(&wf, None, &registry).unwrap();
        let mut live = start(graph);
        let outcome = run(&mut live, &registry, &TemplateLimits::default(), &MiddlewareChain::new()).await;
        assert!(matches!(outcome, ExecutionOutcome::Suspended(_)));
        assert_eq!(live.persisted.status, ExecutionStatus::Suspended);

        let outcome = resume_workflow(&mut live, Value::String("resumed".to_string()), &registry, &TemplateLimits::default(), &MiddlewareChain::new())
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Completed));
    }

    #[tokio::test]
    async fn safe_loop_runs_to_termination() {
        let registry = base_registry();
        registry.register(
            "core",
            "loopcond",
            vec!["main".to_string()],
            vec!["true".to_string(), "false".to_string()],
            Arc::new(CountingLoopCond { calls: AtomicU32::new(0) }),
        );
        let wf = WorkflowBuilder::new("wf")
            .node(Node::new("t", "Trigger", NodeType::Trigger, "core", "trigger"))
            .node(
                Node::new("cond", "Cond", NodeType::Logic, "core", "loopcond")
                    .with_output_ports(vec!["true".to_string(), "false".to_string()]),
            )
            .node(Node::new("body", "Body", NodeType::Action, "core", "echo"))
            .connect("t", "success", "cond", "main")
            .connect("cond", "true", "body", "main")
            .connect("body", "success", "cond", "main")
            .build()
            .unwrap();
        let graph = compiler::compile(&wf, None, &registry).unwrap();
        let mut live = start(graph);
        let outcome = run(&mut live, &registry, &TemplateLimits::default(), &MiddlewareChain::new()).await;
        assert!(matches!(outcome, ExecutionOutcome::Completed));
        let body_runs = live.runtime.executed_nodes.iter().filter(|k| *k == "body").count();
        assert_eq!(body_runs, 2);
    }
}
