//! Static data model for the Prana workflow execution engine: workflows,
//! nodes, connections, compiled execution graphs, and the
//! persisted/live execution split.

pub mod connection;
pub mod data;
pub mod error;
pub mod execution;
pub mod node;
pub mod workflow;

pub use connection::{Connection, WorkflowConnections};
pub use data::{is_truthy, stringify, NodeSettings, ParamMap, Value};
pub use error::{ErrorKind, ExecutionError, WorkflowError};
pub use execution::{
    ExecutionGraph, ExecutionStatus, LiveExecution, LoopInfo, LoopState, NodeExecution,
    NodeExecutionStatus, NodeOutput, PersistedExecution, RuntimeState, Suspension,
    DEFAULT_LOOP_TIMEOUT_MS, DEFAULT_MAX_ITERATIONS,
};
pub use node::{Node, NodeType};
pub use workflow::{Workflow, WorkflowBuilder};
