//! Starter-config generation: from a bare CSV to a runnable YAML with one
//! basic metric and one 6-12 block per numeric column.
//!
//! Columns suffixed `__Target` or `__target` pair up as target lines on
//! their base metric's chart instead of getting their own block.

use serde_yaml::{Mapping, Value};

use crate::error::WbrResult;
use crate::models::frame::{ColumnData, DailyTable, DATE_COLUMN};

const TARGET_SUFFIXES: [&str; 2] = ["__Target", "__target"];

/// Pick a display mask from the column's magnitude.
fn scaling_mask(values: &[Option<f64>]) -> Option<&'static str> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    if mean / 1e9 > 1.0 {
        return Some("##BB");
    }
    if mean / 1e6 > 1.0 {
        return Some("##MM");
    }
    if mean / 1e3 > 1.0 {
        return Some("##KK");
    }
    if present.iter().all(|v| (0.0..=1.0).contains(v)) {
        return Some("##%");
    }
    None
}

fn mapping(entries: Vec<(&str, Value)>) -> Value {
    let mut map = Mapping::new();
    for (key, value) in entries {
        map.insert(Value::String(key.to_string()), value);
    }
    Value::Mapping(map)
}

/// Generate the starter YAML for a daily table.
pub fn starter_yaml(table: &DailyTable) -> WbrResult<String> {
    let numeric: Vec<&str> = table
        .columns()
        .iter()
        .filter(|c| c.name != DATE_COLUMN && matches!(c.data, ColumnData::Float(_)))
        .map(|c| c.name.as_str())
        .collect();

    let setup = mapping(vec![
        (
            "weekEnding",
            Value::String("Please enter a week ending date, <dd-MMM-YYYY> eg: 25-SEP-2021".into()),
        ),
        (
            "weekNumber",
            Value::String("Enter the week number of the week ending date".into()),
        ),
        ("title", Value::String("A title for your WBR".into())),
        (
            "xAxisMonthlyDisplay",
            Value::String("trailing_twelve_months".into()),
        ),
    ]);

    let mut metrics = Mapping::new();
    for name in &numeric {
        metrics.insert(
            Value::String(name.to_string()),
            mapping(vec![
                ("column", Value::String(name.to_string())),
                ("aggf", Value::String("sum".into())),
            ]),
        );
    }

    let mut blocks = Vec::new();
    for name in &numeric {
        if TARGET_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            continue;
        }
        let target = TARGET_SUFFIXES
            .iter()
            .map(|suffix| format!("{}{}", name, suffix))
            .find(|candidate| numeric.iter().any(|n| n == candidate));

        let mut block_metrics = Mapping::new();
        block_metrics.insert(
            Value::String(name.to_string()),
            mapping(vec![
                ("lineStyle", Value::String("primary".into())),
                ("graphPriorYearFlag", Value::Bool(true)),
            ]),
        );
        if let Some(target) = &target {
            block_metrics.insert(
                Value::String(target.clone()),
                mapping(vec![
                    ("lineStyle", Value::String("target".into())),
                    ("graphPriorYearFlag", Value::Bool(false)),
                ]),
            );
        }

        let mut block = Mapping::new();
        block.insert(Value::String("uiType".into()), Value::String("6_12Graph".into()));
        block.insert(Value::String("title".into()), Value::String(name.to_string()));
        if let Some(mask) = table
            .float_column(name)
            .and_then(|values| scaling_mask(values))
        {
            block.insert(Value::String("yScaling".into()), Value::String(mask.into()));
        }
        block.insert(Value::String("metrics".into()), Value::Mapping(block_metrics));
        blocks.push(Value::Mapping(block));
    }

    let mut root = Mapping::new();
    root.insert(Value::String("setup".into()), setup);
    root.insert(Value::String("metrics".into()), Value::Mapping(metrics));
    root.insert(Value::String("deck".into()), Value::Sequence(blocks));

    serde_yaml::to_string(&Value::Mapping(root)).map_err(Into::into)
}
