//! Column schema types shared by Schema Inference, the Flow Graph Model, and the
//! Execution Engine.

use serde::{Deserialize, Serialize};

/// The closed set of column types the engine reasons about. Deliberately coarser than
/// `polars`' native `DataType` — the Schema Inference Subsystem never needs to distinguish
/// `Int32` from `Int64`, for instance, and collapsing the lattice keeps inference rules
/// simple and the wire format stable across dataframe-engine upgrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int64,
    Float64,
    Boolean,
    String,
    Date,
    Datetime,
    /// Emitted when inference cannot determine a type without running the interpreter
    /// (e.g. the output of `polars_code` before execution, or an empty manual-input
    /// column with no declared type).
    Unknown,
}

impl DataType {
    /// The widest of two types under implicit numeric promotion, used when inferring the
    /// type of a unioned or concatenated column. `Unknown` is absorbing.
    pub fn promote(self, other: DataType) -> DataType {
        use DataType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Unknown, _) | (_, Unknown) => Unknown,
            (Int64, Float64) | (Float64, Int64) => Float64,
            _ => Unknown,
        }
    }
}

/// A single column's name and inferred type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self { name: name.into(), data_type }
    }
}

/// An ordered list of columns. Order is significant: it is the column order a
/// materialised dataframe would present.
pub type Schema = Vec<ColumnSchema>;

/// Look up a column by name.
pub fn find_column<'a>(schema: &'a Schema, name: &str) -> Option<&'a ColumnSchema> {
    schema.iter().find(|c| c.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_matching_types_is_identity() {
        assert_eq!(DataType::String.promote(DataType::String), DataType::String);
    }

    #[test]
    fn promote_int_and_float_widens_to_float() {
        assert_eq!(DataType::Int64.promote(DataType::Float64), DataType::Float64);
        assert_eq!(DataType::Float64.promote(DataType::Int64), DataType::Float64);
    }

    #[test]
    fn promote_unrelated_types_is_unknown() {
        assert_eq!(DataType::String.promote(DataType::Boolean), DataType::Unknown);
    }

    #[test]
    fn find_column_locates_by_name() {
        let schema: Schema = vec![
            ColumnSchema::new("a", DataType::Int64),
            ColumnSchema::new("b", DataType::String),
        ];
        assert_eq!(find_column(&schema, "b").unwrap().data_type, DataType::String);
        assert!(find_column(&schema, "c").is_none());
    }
}
