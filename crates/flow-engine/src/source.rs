//! Lowering for the three source node types: `read_csv`, `manual_input`, `external-data`.

use std::io::Cursor;

use polars::prelude::*;

use flow_contracts::{CsvEncoding, DataType as FlowType, ManualInputSettings, ReadCsvSettings};

use crate::error::EngineError;
use crate::{ExternalInput, ExternalInputFormat};

/// Read CSV text (already resolved from inline settings or the Large-Content Store)
/// into a lazy frame, honouring the options named in spec.md §6 "File payload format".
pub fn read_csv(content: &[u8], settings: &ReadCsvSettings) -> Result<LazyFrame, EngineError> {
    let separator = settings.delimiter.as_bytes().first().copied().unwrap_or(b',');
    let encoding = match settings.encoding {
        CsvEncoding::Utf8 => polars::prelude::CsvEncoding::Utf8,
        CsvEncoding::Utf8Lossy => polars::prelude::CsvEncoding::LossyUtf8,
    };
    let null_values = if settings.null_values.is_empty() {
        None
    } else {
        Some(NullValues::AllColumns(settings.null_values.clone()))
    };

    let parse_options = CsvParseOptions::default().with_separator(separator).with_encoding(encoding).with_null_values(null_values);

    let mut reader = CsvReadOptions::default()
        .with_has_header(settings.has_header)
        .with_skip_rows(settings.skip_rows)
        .with_n_rows(settings.n_rows)
        .with_parse_options(parse_options)
        .into_reader_with_file_handle(Cursor::new(content.to_vec()))
        .finish()
        .map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: format!("CSV parse error: {e}") })?;

    for over in &settings.schema_overrides {
        let dtype = flow_to_polars_dtype(over.data_type);
        reader = reader
            .lazy()
            .with_column(col(&over.column).cast(dtype))
            .collect()
            .map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: e.to_string() })?;
    }

    Ok(reader.lazy())
}

/// Build a dataframe from inline literal columns/rows (spec.md §6 `manual_input`).
pub fn manual_input(settings: &ManualInputSettings) -> Result<LazyFrame, EngineError> {
    let mut columns: Vec<Column> = Vec::with_capacity(settings.columns.len());
    for (idx, column) in settings.columns.iter().enumerate() {
        let values: Vec<&serde_json::Value> = settings.rows.iter().map(|row| row.get(idx).unwrap_or(&serde_json::Value::Null)).collect();
        columns.push(build_series(&column.name, column.data_type, &values)?.into());
    }
    DataFrame::new(columns)
        .map(|df| df.lazy())
        .map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: e.to_string() })
}

/// Materialise an externally pushed dataset (Host API `setInputData`, spec.md §6) into a
/// lazy frame.
pub fn external_data(input: &ExternalInput) -> Result<LazyFrame, EngineError> {
    match input.format {
        ExternalInputFormat::Csv => {
            let separator = input.delimiter.map(|c| c as u8).unwrap_or(b',');
            let parse_options = CsvParseOptions::default().with_separator(separator);
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(parse_options)
                .into_reader_with_file_handle(Cursor::new(input.content.clone()))
                .finish()
                .map(|df| df.lazy())
                .map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: format!("external input CSV parse error: {e}") })
        }
        ExternalInputFormat::Json => {
            let cursor = Cursor::new(input.content.clone());
            JsonReader::new(cursor)
                .finish()
                .map(|df| df.lazy())
                .map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: format!("external input JSON parse error: {e}") })
        }
    }
}

fn flow_to_polars_dtype(dtype: FlowType) -> DataType {
    match dtype {
        FlowType::Int64 => DataType::Int64,
        FlowType::Float64 => DataType::Float64,
        FlowType::Boolean => DataType::Boolean,
        FlowType::String => DataType::String,
        FlowType::Date => DataType::Date,
        FlowType::Datetime => DataType::Datetime(TimeUnit::Microseconds, None),
        FlowType::Unknown => DataType::String,
    }
}

fn build_series(name: &str, dtype: FlowType, values: &[&serde_json::Value]) -> Result<Series, EngineError> {
    let series = match dtype {
        FlowType::Int64 => Series::new(name.into(), values.iter().map(|v| v.as_i64()).collect::<Vec<Option<i64>>>()),
        FlowType::Float64 => Series::new(name.into(), values.iter().map(|v| v.as_f64()).collect::<Vec<Option<f64>>>()),
        FlowType::Boolean => Series::new(name.into(), values.iter().map(|v| v.as_bool()).collect::<Vec<Option<bool>>>()),
        FlowType::String | FlowType::Unknown => {
            Series::new(name.into(), values.iter().map(|v| v.as_str().map(str::to_string)).collect::<Vec<Option<String>>>())
        }
        FlowType::Date => {
            let days: Vec<Option<i32>> = values.iter().map(|v| v.as_str().and_then(parse_date_days)).collect();
            Series::new(name.into(), days).cast(&DataType::Date).map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: e.to_string() })?
        }
        FlowType::Datetime => {
            let micros: Vec<Option<i64>> = values.iter().map(|v| v.as_str().and_then(parse_datetime_micros)).collect();
            Series::new(name.into(), micros)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
                .map_err(|e| EngineError::ExecFailed { node_id: 0, traceback: e.to_string() })?
        }
    };
    Ok(series)
}

fn parse_date_days(text: &str) -> Option<i32> {
    use chrono::Datelike;
    let date = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1)?;
    Some((date - epoch).num_days() as i32)
}

fn parse_datetime_micros(text: &str) -> Option<i64> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_micros());
    }
    let naive = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").ok()?;
    Some(naive.and_utc().timestamp_micros())
}
