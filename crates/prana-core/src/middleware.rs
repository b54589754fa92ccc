//! Event pipeline (§6 "Middleware events"). Grounded on the teacher's
//! `ExecutionEvent` enum emitted over an `mpsc::channel` during
//! `WorkflowEngine::execute_with_events`, generalized to the spec's
//! trait-based handler pipeline: failures are logged via `tracing` and
//! never interrupt the driver.

use async_trait::async_trait;
use prana_workflow::{ExecutionError, Node, NodeExecution, PersistedExecution, Suspension};
use std::sync::Arc;

/// A pipeline stage reacting to driver lifecycle events. Every method
/// defaults to a no-op so implementors only override what they need.
/// Errors are logged by the `MiddlewareChain` and never propagate.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn execution_started(&self, _execution: &PersistedExecution) -> Result<(), String> {
        Ok(())
    }

    async fn execution_completed(&self, _execution: &PersistedExecution) -> Result<(), String> {
        Ok(())
    }

    async fn execution_failed(&self, _execution: &PersistedExecution, _reason: &ExecutionError) -> Result<(), String> {
        Ok(())
    }

    async fn execution_suspended(&self, _execution: &PersistedExecution, _suspension: &Suspension) -> Result<(), String> {
        Ok(())
    }

    async fn node_started(&self, _node: &Node, _run_index: u32) -> Result<(), String> {
        Ok(())
    }

    async fn node_completed(&self, _node: &Node, _node_execution: &NodeExecution) -> Result<(), String> {
        Ok(())
    }

    async fn node_failed(&self, _node: &Node, _node_execution: &NodeExecution) -> Result<(), String> {
        Ok(())
    }
}

/// An ordered list of `Middleware` handlers, invoked in registration order.
/// A handler returning `Err` is logged via `tracing::warn!` and does not
/// stop the remaining handlers or the driver (§6: "Middleware failures
/// MUST NOT break the pipeline; log and continue").
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    handlers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn Middleware>) {
        self.handlers.push(handler);
    }

    pub async fn execution_started(&self, execution: &PersistedExecution) {
        for h in &self.handlers {
            if let Err(e) = h.execution_started(execution).await {
                tracing::warn!(error = %e, execution_id = %execution.id, "middleware execution_started failed");
            }
        }
    }

    pub async fn execution_completed(&self, execution: &PersistedExecution) {
        for h in &self.handlers {
            if let Err(e) = h.execution_completed(execution).await {
                tracing::warn!(error = %e, execution_id = %execution.id, "middleware execution_completed failed");
            }
        }
    }

    pub async fn execution_failed(&self, execution: &PersistedExecution, reason: &ExecutionError) {
        for h in &self.handlers {
            if let Err(e) = h.execution_failed(execution, reason).await {
                tracing::warn!(error = %e, execution_id = %execution.id, "middleware execution_failed failed");
            }
        }
    }

    pub async fn execution_suspended(&self, execution: &PersistedExecution, suspension: &Suspension) {
        for h in &self.handlers {
            if let Err(e) = h.execution_suspended(execution, suspension).await {
                tracing::warn!(error = %e, execution_id = %execution.id, "middleware execution_suspended failed");
            }
        }
    }

    pub async fn node_started(&self, node: &Node, run_index: u32) {
        for h in &self.handlers {
            if let Err(e) = h.node_started(node, run_index).await {
                tracing::warn!(error = %e, node_key = %node.key, "middleware node_started failed");
            }
        }
    }

    pub async fn node_completed(&self, node: &Node, node_execution: &NodeExecution) {
        for h in &self.handlers {
            if let Err(e) = h.node_completed(node, node_execution).await {
                tracing::warn!(error = %e, node_key = %node.key, "middleware node_completed failed");
            }
        }
    }

    pub async fn node_failed(&self, node: &Node, node_execution: &NodeExecution) {
        for h in &self.handlers {
            if let Err(e) = h.node_failed(node, node_execution).await {
                tracing::warn!(error = %e, node_key = %node.key, "middleware node_failed failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prana_workflow::{ErrorKind, ExecutionStatus};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter {
        started: AtomicU32,
    }

    #[async_trait]
    impl Middleware for Counter {
        async fn execution_started(&self, _execution: &PersistedExecution) -> Result<(), String> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Middleware for AlwaysFails {
        async fn execution_started(&self, _execution: &PersistedExecution) -> Result<(), String> {
            Err("boom".to_string())
        }
    }

    fn execution() -> PersistedExecution {
        PersistedExecution::new("exec-1", "wf")
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let counter = Arc::new(Counter { started: AtomicU32::new(0) });
        let mut chain = MiddlewareChain::new();
        chain.register(counter.clone());
        chain.register(counter.clone());
        chain.execution_started(&execution()).await;
        assert_eq!(counter.started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_handler_does_not_block_others() {
        let counter = Arc::new(Counter { started: AtomicU32::new(0) });
        let mut chain = MiddlewareChain::new();
        chain.register(Arc::new(AlwaysFails));
        chain.register(counter.clone());
        chain.execution_started(&execution()).await;
        assert_eq!(counter.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_chain_is_a_no_op() {
        let chain = MiddlewareChain::new();
        chain.execution_completed(&execution()).await;
        chain
            .execution_failed(
                &execution(),
                &ExecutionError::new(ErrorKind::ActionError, "x", "node", "exec-1"),
            )
            .await;
        assert_eq!(execution().status, ExecutionStatus::Running);
    }
}
