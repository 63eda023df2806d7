//! Canonical data model for the Flowfile-WASM execution engine.
//!
//! This crate has no I/O and no interpreter dependency. It defines the node/edge
//! identities, the per-node-type settings union, schema and result types, and the
//! error taxonomy shared by every other crate in the workspace.

pub mod edge;
pub mod error;
pub mod node;
pub mod result;
pub mod schema;
pub mod settings;

pub use edge::{Edge, EdgeId, Handle, HandleKind};
pub use error::FlowError;
pub use node::{Node, NodeId, NodeType};
pub use result::{NodeResult, PreviewData, PREVIEW_ROW_CAP};
pub use schema::{ColumnSchema, DataType, Schema};
pub use settings::*;
