//! The single outward-facing error type the Host Interface returns, composing each
//! collaborator's own `thiserror` enum (spec.md §7).

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("{0}")]
    Flow(#[from] flow_contracts::FlowError),
    #[error("{0}")]
    Engine(#[from] flow_engine::EngineError),
    #[error("{0}")]
    Bridge(#[from] interpreter_bridge::BridgeError),
    #[error("{0}")]
    Store(#[from] flow_store::StoreError),
    #[error("an execution pass is already running")]
    AlreadyExecuting,
}
