//! Per-node-type settings. `NodeSettings` is a tagged union with one variant per entry
//! in the closed node-type taxonomy (spec.md §6); each variant carries the configuration
//! specific to that operator.

use serde::{Deserialize, Serialize};

use crate::node::NodeType;
use crate::schema::DataType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum NodeSettings {
    ReadCsv(ReadCsvSettings),
    ManualInput(ManualInputSettings),
    #[serde(rename = "external-data")]
    ExternalData(ExternalDataSettings),
    Filter(FilterSettings),
    Select(SelectSettings),
    GroupBy(GroupBySettings),
    Join(JoinSettings),
    Sort(SortSettings),
    Unique(UniqueSettings),
    Head(HeadSettings),
    Pivot(PivotSettings),
    Unpivot(UnpivotSettings),
    PolarsCode(PolarsCodeSettings),
    Preview(PreviewSettings),
    Output(OutputSettings),
    #[serde(rename = "external-output")]
    ExternalOutput(ExternalOutputSettings),
}

impl NodeSettings {
    /// The node type this settings value belongs to, used to keep `Node::node_type` and
    /// `Node::settings` in sync when settings are replaced wholesale.
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeSettings::ReadCsv(_) => NodeType::ReadCsv,
            NodeSettings::ManualInput(_) => NodeType::ManualInput,
            NodeSettings::ExternalData(_) => NodeType::ExternalData,
            NodeSettings::Filter(_) => NodeType::Filter,
            NodeSettings::Select(_) => NodeType::Select,
            NodeSettings::GroupBy(_) => NodeType::GroupBy,
            NodeSettings::Join(_) => NodeType::Join,
            NodeSettings::Sort(_) => NodeType::Sort,
            NodeSettings::Unique(_) => NodeType::Unique,
            NodeSettings::Head(_) => NodeType::Head,
            NodeSettings::Pivot(_) => NodeType::Pivot,
            NodeSettings::Unpivot(_) => NodeType::Unpivot,
            NodeSettings::PolarsCode(_) => NodeType::PolarsCode,
            NodeSettings::Preview(_) => NodeType::Preview,
            NodeSettings::Output(_) => NodeType::Output,
            NodeSettings::ExternalOutput(_) => NodeType::ExternalOutput,
        }
    }

    /// A settings value with sensible empty defaults for a freshly created node of
    /// `node_type`, following the teacher's `NodeSettings::default_for` convention for
    /// dynamically-dispatched settings construction.
    pub fn default_for(node_type: NodeType) -> Self {
        match node_type {
            NodeType::ReadCsv => NodeSettings::ReadCsv(ReadCsvSettings::default()),
            NodeType::ManualInput => NodeSettings::ManualInput(ManualInputSettings::default()),
            NodeType::ExternalData => NodeSettings::ExternalData(ExternalDataSettings::default()),
            NodeType::Filter => NodeSettings::Filter(FilterSettings::default()),
            NodeType::Select => NodeSettings::Select(SelectSettings::default()),
            NodeType::GroupBy => NodeSettings::GroupBy(GroupBySettings::default()),
            NodeType::Join => NodeSettings::Join(JoinSettings::default()),
            NodeType::Sort => NodeSettings::Sort(SortSettings::default()),
            NodeType::Unique => NodeSettings::Unique(UniqueSettings::default()),
            NodeType::Head => NodeSettings::Head(HeadSettings::default()),
            NodeType::Pivot => NodeSettings::Pivot(PivotSettings::default()),
            NodeType::Unpivot => NodeSettings::Unpivot(UnpivotSettings::default()),
            NodeType::PolarsCode => NodeSettings::PolarsCode(PolarsCodeSettings::default()),
            NodeType::Preview => NodeSettings::Preview(PreviewSettings::default()),
            NodeType::Output => NodeSettings::Output(OutputSettings::default()),
            NodeType::ExternalOutput => NodeSettings::ExternalOutput(ExternalOutputSettings::default()),
        }
    }

    /// Minimal per-type validation used to derive the Flow Graph Model's `is_setup` flag
    /// (SPEC_FULL.md §4.D). This is deliberately shallow: it checks that the settings
    /// carry enough information to attempt execution, not that execution will succeed.
    pub fn is_minimally_configured(&self) -> bool {
        match self {
            NodeSettings::ReadCsv(s) => !s.path.is_empty(),
            NodeSettings::ManualInput(s) => !s.columns.is_empty(),
            NodeSettings::ExternalData(s) => !s.input_name.is_empty(),
            NodeSettings::Filter(s) => match s.mode {
                FilterMode::Basic => s.basic.is_some(),
                FilterMode::Advanced => s.advanced_expr.as_deref().is_some_and(|e| !e.is_empty()),
            },
            NodeSettings::Select(s) => !s.columns.is_empty(),
            NodeSettings::GroupBy(s) => !s.keys.is_empty() || !s.aggregations.is_empty(),
            NodeSettings::Join(s) => !s.left_on.is_empty() && s.left_on.len() == s.right_on.len(),
            NodeSettings::Sort(s) => !s.keys.is_empty(),
            NodeSettings::Unique(_) => true,
            NodeSettings::Head(s) => s.n > 0,
            NodeSettings::Pivot(s) => !s.index.is_empty() && !s.columns.is_empty() && !s.values.is_empty(),
            NodeSettings::Unpivot(s) => !s.index.is_empty(),
            NodeSettings::PolarsCode(s) => !s.source.trim().is_empty(),
            NodeSettings::Preview(_) => true,
            NodeSettings::Output(s) => !s.path.is_empty(),
            NodeSettings::ExternalOutput(s) => !s.name.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadCsvSettings {
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default)]
    pub encoding: CsvEncoding,
    #[serde(default)]
    pub skip_rows: usize,
    #[serde(default)]
    pub n_rows: Option<usize>,
    #[serde(default)]
    pub null_values: Vec<String>,
    #[serde(default)]
    pub schema_overrides: Vec<ColumnTypeOverride>,
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvEncoding {
    #[default]
    Utf8,
    Utf8Lossy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnTypeOverride {
    pub column: String,
    pub data_type: DataType,
}

/// Inline literal data, keyed by column name. The original Flowfile `manual_input` node
/// accepts row-major JSON; this keeps that shape rather than the column-major form used
/// internally by `polars`, because it is what a document on disk or a UI form naturally
/// produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualInputSettings {
    pub columns: Vec<ManualColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualColumn {
    pub name: String,
    pub data_type: DataType,
}

/// A node whose data arrives from the host rather than from within the flow document
/// itself (spec.md §3: "nodes that receive data from outside the flow").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalDataSettings {
    pub input_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    Basic,
    Advanced,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSettings {
    pub mode: FilterMode,
    #[serde(default)]
    pub basic: Option<BasicFilter>,
    #[serde(default)]
    pub advanced_expr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicFilter {
    pub column: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value1: Option<serde_json::Value>,
    #[serde(default)]
    pub value2: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsNull,
    IsNotNull,
    In,
    NotIn,
    Between,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectSettings {
    pub columns: Vec<SelectColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectColumn {
    pub old_name: String,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default = "default_true")]
    pub keep: bool,
    pub position: usize,
    #[serde(default)]
    pub data_type_change: bool,
    #[serde(default)]
    pub new_type: Option<DataType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupBySettings {
    pub keys: Vec<String>,
    pub aggregations: Vec<AggSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggSpec {
    pub column: String,
    pub agg: AggFunc,
    #[serde(default)]
    pub new_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    GroupKey,
    Count,
    NUnique,
    First,
    Last,
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Std,
    Var,
    Quantile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinHow {
    #[default]
    Inner,
    Left,
    Right,
    #[serde(alias = "outer")]
    Full,
    Semi,
    Anti,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinSettings {
    pub how: JoinHow,
    pub left_on: Vec<String>,
    pub right_on: Vec<String>,
    #[serde(default = "default_left_suffix")]
    pub left_suffix: String,
    #[serde(default = "default_right_suffix")]
    pub right_suffix: String,
}

fn default_left_suffix() -> String {
    "_left".to_string()
}

fn default_right_suffix() -> String {
    "_right".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SortSettings {
    pub keys: Vec<SortKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepStrategy {
    #[default]
    First,
    Last,
    None,
    Any,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniqueSettings {
    #[serde(default)]
    pub subset: Option<Vec<String>>,
    #[serde(default)]
    pub keep: KeepStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadSettings {
    #[serde(default = "default_head_n")]
    pub n: usize,
}

fn default_head_n() -> usize {
    10
}

impl Default for HeadSettings {
    fn default() -> Self {
        Self { n: default_head_n() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PivotSettings {
    pub index: Vec<String>,
    pub columns: Vec<String>,
    pub values: Vec<String>,
    #[serde(default)]
    pub agg: Option<AggFunc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnpivotSettings {
    pub index: Vec<String>,
    #[serde(default)]
    pub value_columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolarsCodeSettings {
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewSettings {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFileFormat {
    #[default]
    Csv,
    Parquet,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub format: OutputFileFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalOutputSettings {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_for_matches_node_type() {
        for nt in [
            NodeType::ReadCsv,
            NodeType::ManualInput,
            NodeType::ExternalData,
            NodeType::Filter,
            NodeType::Select,
            NodeType::GroupBy,
            NodeType::Join,
            NodeType::Sort,
            NodeType::Unique,
            NodeType::Head,
            NodeType::Pivot,
            NodeType::Unpivot,
            NodeType::PolarsCode,
            NodeType::Preview,
            NodeType::Output,
            NodeType::ExternalOutput,
        ] {
            assert_eq!(NodeSettings::default_for(nt).node_type(), nt);
        }
    }

    #[test]
    fn fresh_read_csv_is_not_minimally_configured() {
        let s = NodeSettings::default_for(NodeType::ReadCsv);
        assert!(!s.is_minimally_configured());
    }

    #[test]
    fn join_requires_matching_key_counts() {
        let mut s = JoinSettings::default();
        s.left_on = vec!["a".into()];
        s.right_on = vec!["b".into(), "c".into()];
        assert!(!NodeSettings::Join(s).is_minimally_configured());
    }

    #[test]
    fn settings_tag_round_trips() {
        let settings = NodeSettings::Head(HeadSettings { n: 5 });
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"node_type\":\"head\""));
        let back: NodeSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.node_type(), NodeType::Head);
    }
}
