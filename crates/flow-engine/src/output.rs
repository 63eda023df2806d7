//! Sink lowering for `output` and `external-output` nodes (spec.md §4.F, §6): content is
//! captured as a byte-sequence available to the host rather than written to disk, and
//! surfaces through the Host Interface's `output(nodeId, content, fileName, mimeType,
//! rowCount)` event.

use polars::prelude::*;

use flow_contracts::{Node, NodeSettings, OutputFileFormat};

use crate::error::EngineError;

/// A single sink's materialised payload, ready for the host to hand to the browser's
/// download machinery (`output`) or expose under a name (`external-output`).
#[derive(Debug, Clone)]
pub struct EmittedOutput {
    pub node_id: flow_contracts::NodeId,
    pub content: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    pub row_count: usize,
}

/// Serialise `lf` per `node`'s sink settings. Only called for `output`/`external-output`
/// nodes; any other node type is a caller bug.
pub fn emit(node: &Node, lf: &LazyFrame) -> Result<EmittedOutput, EngineError> {
    let mut df = lf.clone().collect().map_err(|e| EngineError::ExecFailed { node_id: node.id, traceback: e.to_string() })?;
    let row_count = df.height();

    match &node.settings {
        NodeSettings::Output(s) => {
            let (content, mime_type) = match s.format {
                OutputFileFormat::Csv => (write_csv(&mut df, node.id)?, "text/csv".to_string()),
                OutputFileFormat::Parquet => (write_parquet(&mut df, node.id)?, "application/octet-stream".to_string()),
            };
            let file_name = if s.path.is_empty() {
                default_file_name(node.id, s.format)
            } else {
                s.path.clone()
            };
            Ok(EmittedOutput { node_id: node.id, content, file_name, mime_type, row_count })
        }
        NodeSettings::ExternalOutput(s) => {
            let rows = json_rows(&df, node.id)?;
            let content = serde_json::to_vec(&rows).map_err(|e| EngineError::ExecFailed { node_id: node.id, traceback: e.to_string() })?;
            Ok(EmittedOutput { node_id: node.id, content, file_name: s.name.clone(), mime_type: "application/json".to_string(), row_count })
        }
        other => Err(EngineError::ExecFailed {
            node_id: node.id,
            traceback: format!("{other:?} is not a sink node"),
        }),
    }
}

fn write_csv(df: &mut DataFrame, node_id: flow_contracts::NodeId) -> Result<Vec<u8>, EngineError> {
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf)
        .include_header(true)
        .finish(df)
        .map_err(|e| EngineError::ExecFailed { node_id, traceback: format!("CSV write error: {e}") })?;
    Ok(buf)
}

fn write_parquet(df: &mut DataFrame, node_id: flow_contracts::NodeId) -> Result<Vec<u8>, EngineError> {
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf)
        .finish(df)
        .map_err(|e| EngineError::ExecFailed { node_id, traceback: format!("Parquet write error: {e}") })?;
    Ok(buf)
}

fn json_rows(df: &DataFrame, node_id: flow_contracts::NodeId) -> Result<Vec<serde_json::Value>, EngineError> {
    let names: Vec<String> = df.get_column_names_owned().into_iter().map(|s| s.to_string()).collect();
    let mut rows = Vec::with_capacity(df.height());
    for row_idx in 0..df.height() {
        let mut obj = serde_json::Map::with_capacity(names.len());
        for (col_idx, series) in df.get_columns().iter().enumerate() {
            let value = series.get(row_idx).map_err(|e| EngineError::ExecFailed { node_id, traceback: e.to_string() })?;
            obj.insert(names[col_idx].clone(), crate::preview::any_value_to_json(&value));
        }
        rows.push(serde_json::Value::Object(obj));
    }
    Ok(rows)
}

fn default_file_name(node_id: flow_contracts::NodeId, format: OutputFileFormat) -> String {
    let ext = match format {
        OutputFileFormat::Csv => "csv",
        OutputFileFormat::Parquet => "parquet",
    };
    format!("output_{node_id}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_contracts::{NodeType, OutputSettings};

    fn output_node(format: OutputFileFormat) -> Node {
        let mut node = Node::new(1, NodeType::Output, 0.0, 0.0);
        node.settings = NodeSettings::Output(OutputSettings { path: String::new(), format });
        node
    }

    #[test]
    fn csv_output_carries_header_and_row_count() {
        let lf = df! { "a" => [1i64, 2], "b" => ["x", "y"] }.unwrap().lazy();
        let node = output_node(OutputFileFormat::Csv);
        let out = emit(&node, &lf).unwrap();
        assert_eq!(out.row_count, 2);
        assert_eq!(out.mime_type, "text/csv");
        assert!(String::from_utf8(out.content).unwrap().starts_with("a,b"));
    }

    #[test]
    fn external_output_renders_row_objects() {
        let lf = df! { "a" => [1i64] }.unwrap().lazy();
        let mut node = Node::new(2, NodeType::ExternalOutput, 0.0, 0.0);
        node.settings = NodeSettings::ExternalOutput(flow_contracts::ExternalOutputSettings { name: "result".into() });
        let out = emit(&node, &lf).unwrap();
        assert_eq!(out.file_name, "result");
        let rows: Vec<serde_json::Value> = serde_json::from_slice(&out.content).unwrap();
        assert_eq!(rows[0]["a"], serde_json::json!(1));
    }
}
