//! Pure, interpreter-free schema inference.
//!
//! `infer` is the only entry point this crate exposes. It never touches data, never
//! allocates global state, and never mutates anything it is given — calling it twice
//! with identical inputs always produces identical outputs.

use flow_contracts::{AggFunc, ColumnSchema, DataType, JoinHow, NodeSettings, Schema};

/// Derive a node's output schema from its settings and the schema(s) of its inputs.
/// Returns `None` when static inference is not possible — the caller (the Flow Graph
/// Model) treats that as "unknown" and propagates it downstream.
pub fn infer(settings: &NodeSettings, left: Option<&Schema>, right: Option<&Schema>) -> Option<Schema> {
    match settings {
        NodeSettings::ReadCsv(_) | NodeSettings::ExternalData(_) => None,
        NodeSettings::ManualInput(s) => Some(
            s.columns
                .iter()
                .map(|c| ColumnSchema::new(c.name.clone(), c.data_type))
                .collect(),
        ),
        NodeSettings::Filter(_)
        | NodeSettings::Sort(_)
        | NodeSettings::Unique(_)
        | NodeSettings::Head(_)
        | NodeSettings::Preview(_) => left.cloned(),
        NodeSettings::Select(s) => infer_select(s, left?),
        NodeSettings::GroupBy(s) => infer_group_by(s, left?),
        NodeSettings::Join(s) => infer_join(s, left, right),
        NodeSettings::Unpivot(s) => infer_unpivot(s, left?),
        // Not named by any inference rule; falls into the closed set's "anything else
        // unknown" bucket rather than guessing at pass-through semantics.
        NodeSettings::Pivot(_) | NodeSettings::PolarsCode(_) | NodeSettings::Output(_) | NodeSettings::ExternalOutput(_) => None,
    }
}

fn infer_select(settings: &flow_contracts::SelectSettings, input: &Schema) -> Option<Schema> {
    let mut kept: Vec<(&flow_contracts::SelectColumn, &ColumnSchema)> = settings
        .columns
        .iter()
        .filter(|c| c.keep)
        .filter_map(|c| flow_contracts::find_column(input, &c.old_name).map(|col| (c, col)))
        .collect();
    kept.sort_by_key(|(c, _)| c.position);
    Some(
        kept.into_iter()
            .map(|(c, col)| {
                let name = c.new_name.clone().unwrap_or_else(|| col.name.clone());
                let data_type = if c.data_type_change {
                    c.new_type.unwrap_or(col.data_type)
                } else {
                    col.data_type
                };
                ColumnSchema::new(name, data_type)
            })
            .collect(),
    )
}

fn infer_group_by(settings: &flow_contracts::GroupBySettings, input: &Schema) -> Option<Schema> {
    if settings.aggregations.is_empty() {
        return None;
    }
    let mut out = Vec::new();
    for key in &settings.keys {
        let data_type = flow_contracts::find_column(input, key).map(|c| c.data_type).unwrap_or(DataType::Unknown);
        out.push(ColumnSchema::new(key.clone(), data_type));
    }
    for agg in &settings.aggregations {
        if agg.agg == AggFunc::GroupKey {
            continue;
        }
        let source_type = flow_contracts::find_column(input, &agg.column).map(|c| c.data_type).unwrap_or(DataType::Unknown);
        let data_type = aggregated_type(agg.agg, source_type);
        let name = agg.new_name.clone().unwrap_or_else(|| agg.column.clone());
        out.push(ColumnSchema::new(name, data_type));
    }
    Some(out)
}

fn aggregated_type(agg: AggFunc, source: DataType) -> DataType {
    match agg {
        AggFunc::Count | AggFunc::NUnique => DataType::Int64,
        AggFunc::First | AggFunc::Last => source,
        AggFunc::Sum | AggFunc::Mean | AggFunc::Median | AggFunc::Min | AggFunc::Max | AggFunc::Std
        | AggFunc::Var | AggFunc::Quantile => match source {
            DataType::Int64 | DataType::Float64 => {
                if matches!(agg, AggFunc::Sum | AggFunc::Min | AggFunc::Max) {
                    source
                } else {
                    DataType::Float64
                }
            }
            other => other,
        },
        AggFunc::GroupKey => source,
    }
}

fn infer_join(settings: &flow_contracts::JoinSettings, left: Option<&Schema>, right: Option<&Schema>) -> Option<Schema> {
    match settings.how {
        JoinHow::Semi | JoinHow::Anti => left.cloned(),
        JoinHow::Inner | JoinHow::Left | JoinHow::Right | JoinHow::Full => {
            let left = left?;
            let right = right?;
            let mut out = Vec::new();
            for col in left {
                let collides = right.iter().any(|r| r.name == col.name)
                    && !settings.right_on.contains(&col.name)
                    && !settings.left_on.contains(&col.name);
                let name = if collides { format!("{}{}", col.name, settings.left_suffix) } else { col.name.clone() };
                out.push(ColumnSchema::new(name, col.data_type));
            }
            for col in right {
                if settings.right_on.contains(&col.name) {
                    continue;
                }
                let collides = left.iter().any(|l| l.name == col.name) && !settings.right_on.contains(&col.name);
                let name = if collides { format!("{}{}", col.name, settings.right_suffix) } else { col.name.clone() };
                out.push(ColumnSchema::new(name, col.data_type));
            }
            Some(out)
        }
    }
}

fn infer_unpivot(settings: &flow_contracts::UnpivotSettings, input: &Schema) -> Option<Schema> {
    let mut out = Vec::new();
    for name in &settings.index {
        let data_type = flow_contracts::find_column(input, name).map(|c| c.data_type).unwrap_or(DataType::Unknown);
        out.push(ColumnSchema::new(name.clone(), data_type));
    }
    out.push(ColumnSchema::new("variable", DataType::String));
    out.push(ColumnSchema::new("value", DataType::String));
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_contracts::*;

    fn schema(cols: &[(&str, DataType)]) -> Schema {
        cols.iter().map(|(n, t)| ColumnSchema::new(*n, *t)).collect()
    }

    #[test]
    fn source_nodes_infer_to_none() {
        assert!(infer(&NodeSettings::ReadCsv(ReadCsvSettings::default()), None, None).is_none());
        assert!(infer(&NodeSettings::ExternalData(ExternalDataSettings::default()), None, None).is_none());
    }

    #[test]
    fn manual_input_returns_declared_columns() {
        let settings = NodeSettings::ManualInput(ManualInputSettings {
            columns: vec![
                ManualColumn { name: "region".into(), data_type: DataType::String },
                ManualColumn { name: "amount".into(), data_type: DataType::Int64 },
            ],
            rows: vec![],
        });
        let out = infer(&settings, None, None).unwrap();
        assert_eq!(out, schema(&[("region", DataType::String), ("amount", DataType::Int64)]));
    }

    #[test]
    fn pass_through_nodes_return_input_unchanged() {
        let input = schema(&[("id", DataType::Int64), ("val", DataType::Int64)]);
        let settings = NodeSettings::Filter(FilterSettings::default());
        assert_eq!(infer(&settings, Some(&input), None), Some(input));
    }

    #[test]
    fn select_drops_unkept_renames_and_reorders_by_position() {
        let input = schema(&[("a", DataType::Int64), ("b", DataType::String), ("c", DataType::Boolean)]);
        let settings = NodeSettings::Select(SelectSettings {
            columns: vec![
                SelectColumn { old_name: "b".into(), new_name: Some("bee".into()), keep: true, position: 0, data_type_change: false, new_type: None },
                SelectColumn { old_name: "a".into(), new_name: None, keep: true, position: 1, data_type_change: false, new_type: None },
                SelectColumn { old_name: "c".into(), new_name: None, keep: false, position: 2, data_type_change: false, new_type: None },
            ],
        });
        let out = infer(&settings, Some(&input), None).unwrap();
        assert_eq!(out, schema(&[("bee", DataType::String), ("a", DataType::Int64)]));
    }

    #[test]
    fn select_applies_declared_type_change() {
        let input = schema(&[("a", DataType::Int64)]);
        let settings = NodeSettings::Select(SelectSettings {
            columns: vec![SelectColumn {
                old_name: "a".into(),
                new_name: None,
                keep: true,
                position: 0,
                data_type_change: true,
                new_type: Some(DataType::String),
            }],
        });
        let out = infer(&settings, Some(&input), None).unwrap();
        assert_eq!(out, schema(&[("a", DataType::String)]));
    }

    #[test]
    fn group_by_sum_produces_key_then_aggregated_columns() {
        let input = schema(&[("region", DataType::String), ("amount", DataType::Int64)]);
        let settings = NodeSettings::GroupBy(GroupBySettings {
            keys: vec!["region".into()],
            aggregations: vec![AggSpec { column: "amount".into(), agg: AggFunc::Sum, new_name: Some("total".into()) }],
        });
        let out = infer(&settings, Some(&input), None).unwrap();
        assert_eq!(out, schema(&[("region", DataType::String), ("total", DataType::Int64)]));
    }

    #[test]
    fn group_by_with_no_aggregations_is_unknown() {
        let input = schema(&[("region", DataType::String)]);
        let settings = NodeSettings::GroupBy(GroupBySettings { keys: vec!["region".into()], aggregations: vec![] });
        assert!(infer(&settings, Some(&input), None).is_none());
    }

    #[test]
    fn group_by_mean_widens_int_to_float() {
        let input = schema(&[("region", DataType::String), ("amount", DataType::Int64)]);
        let settings = NodeSettings::GroupBy(GroupBySettings {
            keys: vec!["region".into()],
            aggregations: vec![AggSpec { column: "amount".into(), agg: AggFunc::Mean, new_name: None }],
        });
        let out = infer(&settings, Some(&input), None).unwrap();
        assert_eq!(out[1].data_type, DataType::Float64);
    }

    #[test]
    fn inner_join_suffixes_colliding_non_key_columns() {
        let left = schema(&[("id", DataType::Int64), ("v", DataType::String)]);
        let right = schema(&[("id", DataType::Int64), ("v", DataType::String)]);
        let settings = JoinSettings {
            how: JoinHow::Inner,
            left_on: vec!["id".into()],
            right_on: vec!["id".into()],
            left_suffix: "_L".into(),
            right_suffix: "_R".into(),
        };
        let out = infer(&NodeSettings::Join(settings), Some(&left), Some(&right)).unwrap();
        assert_eq!(out, schema(&[("id", DataType::Int64), ("v_L", DataType::String), ("v_R", DataType::String)]));
    }

    #[test]
    fn inner_join_does_not_suffix_a_left_key_colliding_with_a_right_non_key() {
        let left = schema(&[("customer_id", DataType::Int64), ("name", DataType::String)]);
        let right = schema(&[("id", DataType::Int64), ("customer_id", DataType::String)]);
        let settings = JoinSettings {
            how: JoinHow::Inner,
            left_on: vec!["customer_id".into()],
            right_on: vec!["id".into()],
            left_suffix: "_L".into(),
            right_suffix: "_R".into(),
        };
        let out = infer(&NodeSettings::Join(settings), Some(&left), Some(&right)).unwrap();
        assert_eq!(
            out,
            schema(&[
                ("customer_id", DataType::Int64),
                ("name", DataType::String),
                ("customer_id_R", DataType::String),
            ])
        );
    }

    #[test]
    fn join_without_both_schemas_is_unknown() {
        let left = schema(&[("id", DataType::Int64)]);
        let settings = JoinSettings::default();
        assert!(infer(&NodeSettings::Join(settings), Some(&left), None).is_none());
    }

    #[test]
    fn semi_join_returns_left_schema_only() {
        let left = schema(&[("id", DataType::Int64), ("v", DataType::String)]);
        let settings = JoinSettings { how: JoinHow::Semi, ..JoinSettings::default() };
        let out = infer(&NodeSettings::Join(settings), Some(&left), None).unwrap();
        assert_eq!(out, left);
    }

    #[test]
    fn unpivot_produces_index_then_variable_then_value() {
        let input = schema(&[("id", DataType::Int64), ("a", DataType::Int64), ("b", DataType::Int64)]);
        let settings = NodeSettings::Unpivot(UnpivotSettings { index: vec!["id".into()], value_columns: None });
        let out = infer(&settings, Some(&input), None).unwrap();
        assert_eq!(
            out,
            schema(&[("id", DataType::Int64), ("variable", DataType::String), ("value", DataType::String)])
        );
    }

    #[test]
    fn pivot_and_polars_code_are_unknown() {
        assert!(infer(&NodeSettings::Pivot(PivotSettings::default()), None, None).is_none());
        assert!(infer(&NodeSettings::PolarsCode(PolarsCodeSettings::default()), None, None).is_none());
    }

    #[test]
    fn infer_is_pure_and_deterministic() {
        let input = schema(&[("a", DataType::Int64)]);
        let settings = NodeSettings::Filter(FilterSettings::default());
        let first = infer(&settings, Some(&input), None);
        let second = infer(&settings, Some(&input), None);
        assert_eq!(first, second);
    }
}
