//! The shared error taxonomy (spec.md §7), realised as one `thiserror` enum per the
//! teacher's `NodeEngineError` convention. Other crates define their own narrower error
//! enums and convert into `FlowError` at their public boundary.

use crate::node::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("interpreter failed to load: {0}")]
    InterpreterLoadError(String),

    #[error("host environment is not cross-origin isolated; the interpreter bridge refuses to start")]
    HostNotIsolated,

    #[error("adding this edge would create a cycle")]
    CycleDetected,

    #[error("an edge already connects this source handle to this target handle")]
    DuplicateEdge,

    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("unknown edge: {0}")]
    UnknownEdge(u64),

    #[error("unsupported document version: {0}")]
    UnsupportedVersion(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("document references a node that is not present: {0}")]
    MissingNode(NodeId),

    #[error("node {0} cannot run: an upstream node is not configured")]
    UpstreamUnconfigured(NodeId),

    #[error("node {node_id} raised an error during execution: {traceback}")]
    InterpreterExecError { node_id: NodeId, traceback: String },

    #[error("node {0}'s result exceeds the preview row cap")]
    PreviewOverflow(NodeId),

    #[error("execution pass touches {size} nodes, over the {max} cap for a single pass")]
    PassTooLarge { size: usize, max: usize },

    #[error("large-content store is full")]
    StorageFull,

    #[error("large-content store is unavailable: {0}")]
    StorageUnavailable(String),

    #[error("operation was cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_offending_node() {
        let err = FlowError::UpstreamUnconfigured(42);
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn interpreter_exec_error_carries_traceback() {
        let err = FlowError::InterpreterExecError { node_id: 3, traceback: "TypeError: x".into() };
        assert!(err.to_string().contains("TypeError: x"));
    }
}
