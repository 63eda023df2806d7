//! Lowering for the two node shapes whose body is user-authored code run through the
//! shared Interpreter Bridge rather than compiled to a native `polars` expression tree
//! (SPEC_FULL.md §4.F): `polars_code`, and advanced-mode `filter`.
//!
//! Both trade plan-level laziness for interpreter fidelity: the input is materialised
//! (bounded by `row_sample_cap`) before the user's source ever runs. This is an explicit,
//! documented cost of letting arbitrary user code see real data, not an oversight.

use std::sync::Arc;

use polars::prelude::*;

use flow_contracts::Node;
use interpreter_bridge::InterpreterBridge;

use crate::error::EngineError;

/// Run `source` as a filter predicate evaluated once per row. Row fields are bound as
/// interpreter globals keyed by column name; the predicate's return value (truthy) keeps
/// the row.
pub async fn run_advanced_filter(
    source: &str,
    input: LazyFrame,
    bridge: &Arc<InterpreterBridge>,
    row_sample_cap: usize,
) -> Result<LazyFrame, EngineError> {
    let df = input.collect().map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: e.to_string() })?;
    let sampled = if df.height() > row_sample_cap { df.head(Some(row_sample_cap)) } else { df };

    let mut keep = Vec::with_capacity(sampled.height());
    for row_idx in 0..sampled.height() {
        bind_row_globals(bridge, &sampled, row_idx).await?;
        let verdict = bridge.eval(source).await.map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: e.to_string() })?;
        unbind_row_globals(bridge, &sampled).await;
        keep.push(json_is_truthy(&verdict));
    }

    let mask = BooleanChunked::from_iter_values("mask".into(), keep.into_iter());
    sampled.filter(&mask).map(|df| df.lazy()).map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: e.to_string() })
}

/// Run a `polars_code` node's source against its input frame(s), following the lowering
/// note in SPEC_FULL.md §4.F: the input(s) are materialised into JSON row-tables bound as
/// globals under the usual binding names, the user source runs as the body of a wrapping
/// function, and the JSON table it returns is lifted back into a `polars::DataFrame`.
pub async fn run_polars_code(
    source: &str,
    node: &Node,
    left: Option<&LazyFrame>,
    right: Option<&LazyFrame>,
    bridge: &Arc<InterpreterBridge>,
    row_sample_cap: usize,
) -> Result<LazyFrame, EngineError> {
    let binding = node.binding_name();
    let mut bound_names = Vec::new();

    if let Some(lf) = left {
        let table = frame_to_json_table(lf, row_sample_cap)?;
        bridge.set_global(&binding, &table).await?;
        bound_names.push(binding.clone());
    }
    if let Some(lf) = right {
        let name = format!("{binding}_right");
        let table = frame_to_json_table(lf, row_sample_cap)?;
        bridge.set_global(&name, &table).await?;
        bound_names.push(name);
    }

    let wrapped = format!("(function({args}) {{ {source} }})({args})", args = bound_names.join(", "));
    let result = bridge.eval(&wrapped).await;

    for name in &bound_names {
        let _ = bridge.del_global(name).await;
    }

    let table = result?;
    json_table_to_frame(&table)
}

async fn bind_row_globals(bridge: &Arc<InterpreterBridge>, df: &DataFrame, row_idx: usize) -> Result<(), EngineError> {
    for series in df.get_columns() {
        let value = series.get(row_idx).map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: e.to_string() })?;
        bridge.set_global(series.name().as_str(), &crate::preview::any_value_to_json(&value)).await?;
    }
    Ok(())
}

async fn unbind_row_globals(bridge: &Arc<InterpreterBridge>, df: &DataFrame) {
    for series in df.get_columns() {
        let _ = bridge.del_global(series.name().as_str()).await;
    }
}

fn json_is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Null => false,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

/// A row-major JSON rendering of (a bounded sample of) `lf`, the shape `polars_code`
/// globals carry: `{ "columns": [...], "rows": [[...], ...] }`.
fn frame_to_json_table(lf: &LazyFrame, row_sample_cap: usize) -> Result<serde_json::Value, EngineError> {
    let (_, preview) = crate::preview::materialize(lf, row_sample_cap)?;
    Ok(serde_json::json!({ "columns": preview.columns, "rows": preview.rows }))
}

fn json_table_to_frame(table: &serde_json::Value) -> Result<LazyFrame, EngineError> {
    let err = |msg: &str| EngineError::ExecFailed { node_id: 0, traceback: format!("polars_code returned an unexpected shape: {msg}") };
    let columns: Vec<String> = table
        .get("columns")
        .and_then(|c| c.as_array())
        .ok_or_else(|| err("missing `columns`"))?
        .iter()
        .map(|v| v.as_str().unwrap_or_default().to_string())
        .collect();
    let rows = table.get("rows").and_then(|r| r.as_array()).ok_or_else(|| err("missing `rows`"))?;

    let mut series_vec: Vec<Column> = Vec::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        let values: Vec<&serde_json::Value> = rows.iter().map(|row| row.get(idx).unwrap_or(&serde_json::Value::Null)).collect();
        series_vec.push(json_column_to_series(name, &values).into());
    }
    DataFrame::new(series_vec).map(|df| df.lazy()).map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: e.to_string() })
}

fn json_column_to_series(name: &str, values: &[&serde_json::Value]) -> Series {
    if values.iter().all(|v| v.is_null() || v.is_boolean()) {
        Series::new(name.into(), values.iter().map(|v| v.as_bool()).collect::<Vec<Option<bool>>>())
    } else if values.iter().all(|v| v.is_null() || v.is_i64() || v.is_u64()) {
        Series::new(name.into(), values.iter().map(|v| v.as_i64()).collect::<Vec<Option<i64>>>())
    } else if values.iter().all(|v| v.is_null() || v.is_number()) {
        Series::new(name.into(), values.iter().map(|v| v.as_f64()).collect::<Vec<Option<f64>>>())
    } else {
        Series::new(
            name.into(),
            values
                .iter()
                .map(|v| match v {
                    serde_json::Value::Null => None,
                    serde_json::Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect::<Vec<Option<String>>>(),
        )
    }
}
