//! Error types for the execution engine. Grounded on the teacher's
//! `ExecutionEngineError` (one `thiserror` enum wrapping the workflow-level
//! error plus the engine's own runtime failure modes).

use crate::expression::RenderError;
use prana_workflow::WorkflowError;
use thiserror::Error;

/// Errors the execution engine itself can raise, beyond the compile-time
/// `WorkflowError`s.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("no ready nodes found, execution stalled")]
    ExecutionStalled,

    #[error("resume requested on execution that is not suspended")]
    ResumeOnNonSuspended,

    #[error("unknown action: {integration}.{action}")]
    UnknownAction { integration: String, action: String },

    #[error("node '{0}' timed out")]
    Timeout(String),

    #[error("template render error on node '{node}': {source}")]
    Render { node: String, source: RenderError },

    #[error("invalid output port '{port}' from node '{node}'")]
    InvalidPort { node: String, port: String },

    #[error("internal error: {0}")]
    Internal(String),
}
