//! Bounded preview materialisation (spec.md §4.F "Preview materialisation").

use polars::prelude::*;

use flow_contracts::{ColumnSchema, DataType as FlowType, PreviewData, Schema};

use crate::error::EngineError;

/// Collect `lf` and return both its schema and a preview capped at `row_cap` rows, with
/// `total_rows` reporting the true (uncapped) count.
pub fn materialize(lf: &LazyFrame, row_cap: usize) -> Result<(Schema, PreviewData), EngineError> {
    let df = lf.clone().collect().map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: e.to_string() })?;
    let schema = polars_schema_to_flow(&df.schema());

    let total_rows = df.height();
    let head = if total_rows > row_cap { df.head(Some(row_cap)) } else { df };
    let columns: Vec<String> = head.get_column_names_owned().into_iter().map(|s| s.to_string()).collect();
    let mut rows = Vec::with_capacity(head.height());
    for row_idx in 0..head.height() {
        let mut row = Vec::with_capacity(head.width());
        for series in head.get_columns() {
            let value = series.get(row_idx).map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: e.to_string() })?;
            row.push(any_value_to_json(&value));
        }
        rows.push(row);
    }

    Ok((schema, PreviewData { columns, rows, total_rows }))
}

fn polars_schema_to_flow(schema: &Schema_) -> Schema {
    schema.iter_fields().map(|f| ColumnSchema::new(f.name().to_string(), polars_dtype_to_flow(f.dtype()))).collect()
}

type Schema_ = polars::prelude::Schema;

fn polars_dtype_to_flow(dtype: &DataType) -> FlowType {
    match dtype {
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 | DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => FlowType::Int64,
        DataType::Float32 | DataType::Float64 => FlowType::Float64,
        DataType::Boolean => FlowType::Boolean,
        DataType::String => FlowType::String,
        DataType::Date => FlowType::Date,
        DataType::Datetime(_, _) => FlowType::Datetime,
        _ => FlowType::Unknown,
    }
}

/// Render a single cell as a JSON value. Nulls become `Value::Null` (the "distinguished
/// null marker" of spec.md §4.F); nested/complex values are JSON-stringified.
pub(crate) fn any_value_to_json(value: &AnyValue) -> serde_json::Value {
    match value {
        AnyValue::Null => serde_json::Value::Null,
        AnyValue::Boolean(b) => serde_json::json!(b),
        AnyValue::String(s) => serde_json::json!(s),
        AnyValue::StringOwned(s) => serde_json::json!(s.as_str()),
        AnyValue::Int8(v) => serde_json::json!(v),
        AnyValue::Int16(v) => serde_json::json!(v),
        AnyValue::Int32(v) => serde_json::json!(v),
        AnyValue::Int64(v) => serde_json::json!(v),
        AnyValue::UInt8(v) => serde_json::json!(v),
        AnyValue::UInt16(v) => serde_json::json!(v),
        AnyValue::UInt32(v) => serde_json::json!(v),
        AnyValue::UInt64(v) => serde_json::json!(v),
        AnyValue::Float32(v) => serde_json::json!(v),
        AnyValue::Float64(v) => serde_json::json!(v),
        other => serde_json::Value::String(other.to_string()),
    }
}
