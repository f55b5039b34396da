//! Source namespacing and merging.
//!
//! Each loaded source is namespaced (`alias.column`) and then outer-joined
//! on `Date` into the master table the metric engine consumes. `Date` is the
//! sole un-namespaced column. Merging is deterministic: columns ordered by
//! `(source order, column order in source)`, rows stably sorted by date.

use crate::error::{WbrError, WbrResult};
use crate::models::frame::{DailyTable, DATE_COLUMN};

/// Namespace and outer-merge the loaded sources, in declaration order.
pub fn merge_sources(sources: Vec<(String, DailyTable)>) -> WbrResult<DailyTable> {
    if sources.is_empty() {
        return Err(WbrError::data(
            "no data sources are declared and no CSV was uploaded",
        ));
    }
    let namespaced: Vec<DailyTable> = sources
        .into_iter()
        .map(|(alias, table)| table.namespaced(&alias))
        .collect();
    let merged = DailyTable::merge_outer(namespaced)?;
    if merged.is_empty() {
        return Err(WbrError::data("merged table has no rows"));
    }
    debug_assert!(merged.column_names().iter().all(|n| *n != DATE_COLUMN));
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::{Column, ColumnData};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn source(name: &str, rows: &[(NaiveDate, f64)]) -> DailyTable {
        DailyTable::new(
            rows.iter().map(|(d, _)| *d).collect(),
            vec![Column {
                name: name.to_string(),
                data: ColumnData::Float(rows.iter().map(|(_, v)| Some(*v)).collect()),
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_merge_namespaces_columns() {
        let merged = merge_sources(vec![
            (
                "main".to_string(),
                source("PageViews", &[(date(2021, 9, 1), 10.0)]),
            ),
            (
                "ext".to_string(),
                source("MobilePV", &[(date(2021, 9, 1), 4.0), (date(2021, 9, 2), 5.0)]),
            ),
        ])
        .unwrap();
        assert_eq!(merged.column_names(), vec!["main.PageViews", "ext.MobilePV"]);
        assert_eq!(merged.len(), 2);
        assert_eq!(
            merged.float_column("main.PageViews").unwrap(),
            &[Some(10.0), None]
        );
        assert_eq!(
            merged.float_column("ext.MobilePV").unwrap(),
            &[Some(4.0), Some(5.0)]
        );
    }

    #[test]
    fn test_empty_sources_error() {
        assert!(merge_sources(vec![]).is_err());
    }
}
