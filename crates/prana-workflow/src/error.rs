//! Compile-time errors (`compile.*`) and the structured runtime error map
//! (`node.*`) used throughout the engine.

use crate::data::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors the `WorkflowCompiler` can report (§4.5, §7 `compile.*`).
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowError {
    #[error("unknown action {integration}.{action}")]
    UnknownAction { integration: String, action: String },

    #[error("invalid connection: {reason}")]
    InvalidConnection { reason: String },

    #[error("no trigger nodes found")]
    NoTriggerNodes,

    #[error("multiple trigger nodes found: {keys:?}")]
    MultipleTriggersFound { keys: Vec<String> },

    #[error("node {key} is not of type trigger")]
    TriggerNotTriggerType { key: String },

    #[error("unsafe cycle detected: {nodes:?}")]
    UnsafeCycle { nodes: Vec<String> },
}

/// One of the `node.*` error kinds (§4.4, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ActionError,
    ActionException,
    InvalidPort,
    Timeout,
    MissingAction,
    RenderError,
}

/// The structured, JSON-serializable error map every failed NodeExecution
/// carries: `{kind, message, details?, node_key, execution_id, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub node_key: String,
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionError {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        node_key: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            node_key: node_key.into(),
            execution_id: execution_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} on node {}: {}", self.kind, self.node_key, self.message)
    }
}

impl std::error::Error for ExecutionError {}
