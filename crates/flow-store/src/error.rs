use flow_contracts::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("large-content store is full: {0}")]
    Full(String),
    #[error("large-content store is unavailable: {0}")]
    Unavailable(String),
    #[error("large-content entry for node {0} failed its integrity check")]
    Corrupt(NodeId),
}

impl From<StoreError> for flow_contracts::FlowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Full(_) => flow_contracts::FlowError::StorageFull,
            StoreError::Unavailable(msg) => flow_contracts::FlowError::StorageUnavailable(msg),
            StoreError::Corrupt(id) => flow_contracts::FlowError::StorageUnavailable(format!(
                "node {id} large-content entry failed integrity check"
            )),
        }
    }
}
