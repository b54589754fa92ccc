//! Node executor (§4.4). Grounded on the teacher's `NodeExecutor::execute`
//! dispatch shape (node + routed input + context in, classified output
//! out), generalized to the spec's richer result classification (retry,
//! timeout, port validation, structured JSON errors) and the
//! prepare/execute/resume `Action` contract instead of a single `execute`.

use crate::expression::{self, RenderContext, TemplateLimits};
use crate::registry::{ActionRegistry, NodeResult};
use prana_workflow::{ErrorKind, ExecutionError, LiveExecution, Node, Value};
use std::collections::HashMap;
use std::time::Duration;

/// Port-keyed data aggregated from completed predecessor executions,
/// passed into a node's template context as `$input`.
pub type RoutedInput = HashMap<String, Value>;

/// Outcome of one `NodeExecution` attempt, already classified against
/// `node.output_ports` and retry policy — what the `GraphExecutor` acts on.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    Completed { output_port: String, output_data: Value },
    Failed(ExecutionError),
    Suspended { suspension_type: String, data: Value },
}

fn routed_input_to_value(routed_input: &RoutedInput) -> Value {
    let mut map = serde_json::Map::new();
    for (port, data) in routed_input {
        map.insert(port.clone(), data.clone());
    }
    Value::Object(map)
}

fn build_context(
    node: &Node,
    live: &LiveExecution,
    routed_input: &RoutedInput,
) -> Value {
    let mut nodes = serde_json::Map::new();
    for (key, output) in &live.runtime.nodes {
        nodes.insert(key.clone(), output.output_data.clone());
    }
    let mut env = serde_json::Map::new();
    for (k, v) in &live.runtime.env {
        env.insert(k.clone(), v.clone());
    }
    let mut vars = serde_json::Map::new();
    for (k, v) in &live.persisted.vars {
        vars.insert(k.clone(), v.clone());
    }

    let mut root = serde_json::Map::new();
    root.insert("id".to_string(), Value::String(node.key.clone()));
    root.insert("input".to_string(), routed_input_to_value(routed_input));
    root.insert("nodes".to_string(), Value::Object(nodes));
    root.insert("env".to_string(), Value::Object(env));
    root.insert("vars".to_string(), Value::Object(vars));
    root.insert(
        "workflow".to_string(),
        serde_json::json!({ "id": live.graph.workflow_id, "version": live.graph.workflow_version }),
    );
    root.insert(
        "execution".to_string(),
        serde_json::json!({
            "id": live.persisted.id,
            "mode": live.persisted.mode,
            "preparation": live.persisted.preparation_data,
        }),
    );
    Value::Object(root)
}

/// Render `node.params` per §4.4's two-mode input handling: structured mode
/// renders every leaf through the template renderer; raw mode passes
/// `routed_input` straight through unrendered.
fn render_params(
    node: &Node,
    context: &Value,
    routed_input: &RoutedInput,
    limits: &TemplateLimits,
) -> Result<Value, ExecutionError> {
    if node.params.is_empty() {
        return Ok(routed_input_to_value(routed_input));
    }
    let mut params_value = serde_json::Map::new();
    for (k, v) in &node.params {
        params_value.insert(k.clone(), v.clone());
    }
    let mut ctx = RenderContext::new(context.as_object().cloned().unwrap_or_default());
    expression::process_map(&Value::Object(params_value), &mut ctx, limits, true).map_err(|e| {
        ExecutionError::new(ErrorKind::RenderError, e.to_string(), &node.key, "")
            .with_details(Value::String(format!("{e:?}")))
    })
}

/// Run `node`'s one-time `Action::prepare` hook (§4.3), invoked by the
/// executor before a node's first execution in an Execution. The result
/// is persisted as `preparation_data` and surfaced as `$execution.preparation`.
pub async fn prepare_node(
    node: &Node,
    execution_id: &str,
    registry: &ActionRegistry,
) -> Result<Value, ExecutionError> {
    let descriptor = match registry.get(&node.integration_name, &node.action_name) {
        Some(d) => d,
        None => {
            return Err(ExecutionError::new(
                ErrorKind::MissingAction,
                format!("no action registered for {}.{}", node.integration_name, node.action_name),
                &node.key,
                execution_id,
            ))
        }
    };
    descriptor
        .action
        .prepare(&node.params)
        .await
        .map_err(|e| ExecutionError::new(ErrorKind::ActionException, e.0, &node.key, execution_id))
}

/// Execute one invocation of `node` to completion, classifying the
/// action's result per §4.4's table. `execution_id` is stamped into any
/// structured error produced.
pub async fn execute_node(
    node: &Node,
    live: &LiveExecution,
    routed_input: &RoutedInput,
    run_index: u32,
    registry: &ActionRegistry,
    limits: &TemplateLimits,
) -> NodeOutcome {
    let execution_id = live.persisted.id.clone();
    let descriptor = match registry.get(&node.integration_name, &node.action_name) {
        Some(d) => d,
        None => {
            return NodeOutcome::Failed(ExecutionError::new(
                ErrorKind::MissingAction,
                format!("no action registered for {}.{}", node.integration_name, node.action_name),
                &node.key,
                &execution_id,
            ))
        }
    };

    let context = build_context(node, live, routed_input);
    let rendered = match render_params(node, &context, routed_input, limits) {
        Ok(v) => v,
        Err(mut e) => {
            e.execution_id = execution_id;
            return NodeOutcome::Failed(e);
        }
    };

    let call = descriptor.action.execute(&rendered);
    let result = match node.settings.timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), call).await {
            Ok(r) => r,
            Err(_) => {
                return NodeOutcome::Failed(ExecutionError::new(
                    ErrorKind::Timeout,
                    format!("node '{}' exceeded timeout of {ms}ms", node.key),
                    &node.key,
                    &execution_id,
                ))
            }
        },
        None => call.await,
    };

    classify(node, &execution_id, run_index, result.map_err(|e| e.0))
}

/// Resume a suspended `node` via `Action::resume`, classified the same way
/// as a fresh `execute` result (§4.6 Resume).
pub async fn resume_node(
    node: &Node,
    execution_id: &str,
    run_index: u32,
    suspension_data: &Value,
    resume_input: &Value,
    registry: &ActionRegistry,
) -> NodeOutcome {
    let descriptor = match registry.get(&node.integration_name, &node.action_name) {
        Some(d) => d,
        None => {
            return NodeOutcome::Failed(ExecutionError::new(
                ErrorKind::MissingAction,
                format!("no action registered for {}.{}", node.integration_name, node.action_name),
                &node.key,
                execution_id,
            ))
        }
    };
    let result = descriptor
        .action
        .resume(suspension_data, resume_input)
        .await
        .map_err(|e| e.0);
    classify(node, execution_id, run_index, result)
}

fn classify(
    node: &Node,
    execution_id: &str,
    run_index: u32,
    result: Result<NodeResult, String>,
) -> NodeOutcome {
    let result = match result {
        Ok(r) => r,
        Err(message) => {
            return retry_or_fail(
                node,
                run_index,
                ExecutionError::new(ErrorKind::ActionException, message, &node.key, execution_id),
            )
        }
    };

    match result {
        NodeResult::Ok { data, port } => validate_port(node, execution_id, data, port),
        NodeResult::OkDefault { data } => {
            let port = node
                .output_ports
                .first()
                .cloned()
                .unwrap_or_else(|| "success".to_string());
            validate_port(node, execution_id, data, port)
        }
        NodeResult::Suspend { suspension_type, data } => NodeOutcome::Suspended {
            suspension_type,
            data,
        },
        NodeResult::Error { data, port } => {
            let message = prana_workflow::stringify(&data);
            let mut error = ExecutionError::new(ErrorKind::ActionError, message, &node.key, execution_id)
                .with_details(data);
            if let Some(port) = port {
                if !node.output_ports.contains(&port) {
                    error = ExecutionError::new(
                        ErrorKind::InvalidPort,
                        format!("action returned unknown output port '{port}'"),
                        &node.key,
                        execution_id,
                    );
                }
            }
            retry_or_fail(node, run_index, error)
        }
    }
}

fn validate_port(node: &Node, execution_id: &str, data: Value, port: String) -> NodeOutcome {
    if !node.output_ports.contains(&port) {
        return NodeOutcome::Failed(ExecutionError::new(
            ErrorKind::InvalidPort,
            format!("action returned unknown output port '{port}'"),
            &node.key,
            execution_id,
        ));
    }
    NodeOutcome::Completed {
        output_port: port,
        output_data: data,
    }
}

/// §4.4 retry policy: a non-suspend failure becomes an internal retry
/// suspension when the node's settings allow another attempt.
fn retry_or_fail(node: &Node, run_index: u32, error: ExecutionError) -> NodeOutcome {
    if node.settings.retry_on_failed && run_index < node.settings.max_retries {
        let suspension_data = serde_json::json!({
            "resumed_at": chrono::Utc::now() + chrono::Duration::milliseconds(node.settings.retry_delay_ms as i64),
            "attempt_number": run_index + 1,
            "max_attempts": node.settings.max_retries,
            "original_error": error,
        });
        return NodeOutcome::Suspended {
            suspension_type: "retry".to_string(),
            data: suspension_data,
        };
    }
    NodeOutcome::Failed(error)
}
