use flow_contracts::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("interpreter is not available for this pass")]
    InterpreterUnavailable,
    #[error("node {0} cannot run: an upstream node is not configured")]
    UpstreamUnconfigured(NodeId),
    #[error("adding this node would create a cycle")]
    CycleDetected,
    #[error("execution pass touches {size} nodes, over the {max} cap for a single pass")]
    PassTooLarge { size: usize, max: usize },
    #[error("node {node_id} raised an error during execution: {traceback}")]
    ExecFailed { node_id: NodeId, traceback: String },
    #[error("node {0}'s result exceeds the preview row cap")]
    PreviewOverflow(NodeId),
    #[error("large-content store error: {0}")]
    Storage(#[from] flow_store::StoreError),
    #[error("dataframe engine error: {0}")]
    Polars(#[from] polars::error::PolarsError),
    #[error("interpreter bridge error: {0}")]
    Bridge(#[from] interpreter_bridge::BridgeError),
    #[error("operation was cancelled")]
    Cancelled,
}

impl From<EngineError> for flow_contracts::FlowError {
    fn from(err: EngineError) -> Self {
        use flow_contracts::FlowError;
        match err {
            EngineError::InterpreterUnavailable => FlowError::InterpreterLoadError("interpreter unavailable".into()),
            EngineError::UpstreamUnconfigured(id) => FlowError::UpstreamUnconfigured(id),
            EngineError::CycleDetected => FlowError::CycleDetected,
            EngineError::PassTooLarge { size, max } => FlowError::PassTooLarge { size, max },
            EngineError::ExecFailed { node_id, traceback } => FlowError::InterpreterExecError { node_id, traceback },
            EngineError::PreviewOverflow(id) => FlowError::PreviewOverflow(id),
            EngineError::Storage(e) => e.into(),
            EngineError::Polars(e) => FlowError::InterpreterExecError { node_id: 0, traceback: e.to_string() },
            EngineError::Bridge(e) => e.into(),
            EngineError::Cancelled => FlowError::Cancelled,
        }
    }
}
