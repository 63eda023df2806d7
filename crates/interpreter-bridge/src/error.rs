#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("host environment is not cross-origin isolated; the interpreter bridge refuses to start")]
    HostNotIsolated,
    #[error("interpreter bridge is not ready")]
    NotReady,
    #[error("interpreter raised an error: {0}")]
    Exec(String),
}

impl From<BridgeError> for flow_contracts::FlowError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::HostNotIsolated => flow_contracts::FlowError::HostNotIsolated,
            BridgeError::NotReady => flow_contracts::FlowError::InterpreterLoadError("not ready".into()),
            BridgeError::Exec(msg) => flow_contracts::FlowError::InterpreterLoadError(msg),
        }
    }
}
