//! Edges and the handle addressing scheme used to attach them to node ports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Unique identifier for an edge. Monotonic and positive within a document, assigned by
/// the Flow Graph Model at `add_edge` time (spec.md §3).
pub type EdgeId = u64;

/// Whether a handle addresses an output port (upstream side of an edge) or an input port
/// (downstream side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    Output,
    Input,
}

/// A port address of the form `output-<index>` / `input-<index>`, e.g. `"input-0"` for a
/// node's first input (the "left" side of a join) and `"input-1"` for its second (the
/// "right" side). Every node exposes at least `output-0`; binary nodes additionally
/// expose `input-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub kind: HandleKind,
    pub index: u32,
}

impl Handle {
    pub fn output(index: u32) -> Self {
        Self { kind: HandleKind::Output, index }
    }

    pub fn input(index: u32) -> Self {
        Self { kind: HandleKind::Input, index }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            HandleKind::Output => "output",
            HandleKind::Input => "input",
        };
        write!(f, "{prefix}-{}", self.index)
    }
}

/// Error returned when a handle string does not match the `output-<n>`/`input-<n>` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed handle: {0:?}")]
pub struct HandleParseError(pub String);

impl FromStr for Handle {
    type Err = HandleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, idx) = s.split_once('-').ok_or_else(|| HandleParseError(s.to_string()))?;
        let kind = match prefix {
            "output" => HandleKind::Output,
            "input" => HandleKind::Input,
            _ => return Err(HandleParseError(s.to_string())),
        };
        let index: u32 = idx.parse().map_err(|_| HandleParseError(s.to_string()))?;
        Ok(Handle { kind, index })
    }
}

impl Serialize for Handle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Handle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Handle::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A directed connection from one node's output port to another node's input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source_node: NodeId,
    pub source_handle: Handle,
    pub target_node: NodeId,
    pub target_handle: Handle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_round_trips_through_display_and_parse() {
        let h = Handle::input(1);
        assert_eq!(h.to_string(), "input-1");
        assert_eq!("input-1".parse::<Handle>().unwrap(), h);
    }

    #[test]
    fn handle_rejects_malformed_strings() {
        assert!("sideways-0".parse::<Handle>().is_err());
        assert!("input-x".parse::<Handle>().is_err());
        assert!("input".parse::<Handle>().is_err());
    }

    #[test]
    fn handle_serializes_as_plain_string() {
        let h = Handle::output(0);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, "\"output-0\"");
        let back: Handle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }
}
