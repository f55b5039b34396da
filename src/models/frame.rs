//! The daily table: the canonical in-memory form of loaded source data.
//!
//! Every loader (CSV, database connector) produces a `DailyTable`; the
//! merger combines them; the metric engine reads them. Tables are
//! single-writer: every transformation returns a new table.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::{WbrError, WbrResult};

/// Name of the mandatory date column. Exact spelling; it is the join key and
/// the only column the merger leaves un-namespaced.
pub const DATE_COLUMN: &str = "Date";

/// Column payload: numeric series or text series, with per-row nulls.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn empty_like(&self) -> ColumnData {
        match self {
            ColumnData::Float(_) => ColumnData::Float(Vec::new()),
            ColumnData::Text(_) => ColumnData::Text(Vec::new()),
        }
    }

    fn push_null(&mut self) {
        match self {
            ColumnData::Float(v) => v.push(None),
            ColumnData::Text(v) => v.push(None),
        }
    }

    fn push_from(&mut self, other: &ColumnData, row: usize) {
        match (self, other) {
            (ColumnData::Float(dst), ColumnData::Float(src)) => dst.push(src[row]),
            (ColumnData::Text(dst), ColumnData::Text(src)) => dst.push(src[row].clone()),
            // Type drift between chunks of the same source is a loader bug;
            // degrade to null rather than panic.
            (dst, _) => dst.push_null(),
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// One raw cell as produced by a connector, before column typing.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Null,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

/// An ordered, date-keyed table of daily rows.
///
/// Rows are kept sorted by date (stable, so source order breaks ties).
/// Duplicate dates are allowed; the metric engine combines them during
/// aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyTable {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl DailyTable {
    /// Build a table from a parallel date vector and columns. All columns
    /// must have the same length as `dates`.
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<Column>) -> WbrResult<Self> {
        for col in &columns {
            if col.data.len() != dates.len() {
                return Err(WbrError::internal(format!(
                    "column '{}' has {} rows but the table has {} dates",
                    col.name,
                    col.data.len(),
                    dates.len()
                )));
            }
        }
        let mut table = Self { dates, columns };
        table.sort_by_date();
        Ok(table)
    }

    /// Build a table from column names and raw row cells. The `Date` column
    /// is required; other columns become numeric when every non-null cell is
    /// a number (or a numeric string, thousands separators allowed), text
    /// otherwise.
    pub fn from_cells(names: &[String], rows: Vec<Vec<RawCell>>) -> WbrResult<Self> {
        let date_idx = names
            .iter()
            .position(|n| n == DATE_COLUMN)
            .ok_or_else(|| {
                WbrError::data(format!(
                    "source is missing the required '{}' column; found columns: {:?}",
                    DATE_COLUMN, names
                ))
            })?;

        let null_cell = RawCell::Null;
        let mut dates = Vec::with_capacity(rows.len());
        for (row_no, row) in rows.iter().enumerate() {
            let cell = row.get(date_idx).unwrap_or(&null_cell);
            let parsed = match cell {
                RawCell::Date(d) => Some(*d),
                RawCell::Text(s) => parse_flexible_date(s),
                _ => None,
            };
            match parsed {
                Some(d) => dates.push(d),
                None => {
                    return Err(WbrError::data(format!(
                        "could not parse '{}' value {:?} in row {}",
                        DATE_COLUMN,
                        cell,
                        row_no + 1
                    )))
                }
            }
        }

        let mut columns = Vec::new();
        for (idx, name) in names.iter().enumerate() {
            if idx == date_idx {
                continue;
            }
            let cells: Vec<&RawCell> = rows
                .iter()
                .map(|row| row.get(idx).unwrap_or(&null_cell))
                .collect();
            let numeric = cells.iter().all(|c| match c {
                RawCell::Null | RawCell::Number(_) => true,
                RawCell::Text(s) => parse_number(s).is_some(),
                RawCell::Date(_) => false,
            });
            let data = if numeric {
                ColumnData::Float(
                    cells
                        .iter()
                        .map(|c| match c {
                            RawCell::Number(v) => Some(*v),
                            RawCell::Text(s) => parse_number(s),
                            _ => None,
                        })
                        .collect(),
                )
            } else {
                ColumnData::Text(
                    cells
                        .iter()
                        .map(|c| match c {
                            RawCell::Text(s) => Some(s.clone()),
                            RawCell::Number(v) => Some(v.to_string()),
                            RawCell::Date(d) => Some(d.to_string()),
                            RawCell::Null => None,
                        })
                        .collect(),
                )
            };
            columns.push(Column {
                name: name.clone(),
                data,
            });
        }

        Self::new(dates, columns)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Numeric view of a column, if it exists and is numeric.
    pub fn float_column(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Float(v)) => Some(v),
            _ => None,
        }
    }

    /// Text view of a column, if it exists and is textual.
    pub fn text_column(&self, name: &str) -> Option<&[Option<String>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Text(v)) => Some(v),
            _ => None,
        }
    }

    /// Rename every column to `alias.column`, leaving only `Date` untouched.
    pub fn namespaced(mut self, alias: &str) -> Self {
        for col in &mut self.columns {
            col.name = format!("{}.{}", alias, col.name);
        }
        self
    }

    /// Stable sort of all rows by date.
    pub fn sort_by_date(&mut self) {
        let mut order: Vec<usize> = (0..self.dates.len()).collect();
        order.sort_by_key(|&i| self.dates[i]);
        if order.iter().enumerate().all(|(i, &j)| i == j) {
            return;
        }
        self.dates = order.iter().map(|&i| self.dates[i]).collect();
        for col in &mut self.columns {
            col.data = match &col.data {
                ColumnData::Float(v) => {
                    ColumnData::Float(order.iter().map(|&i| v[i]).collect())
                }
                ColumnData::Text(v) => {
                    ColumnData::Text(order.iter().map(|&i| v[i].clone()).collect())
                }
            };
        }
    }

    /// Keep only the rows where `keep` is true.
    pub fn filter_rows(&self, keep: &[bool]) -> Self {
        let mut dates = Vec::new();
        let mut columns: Vec<Column> = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                data: c.data.empty_like(),
            })
            .collect();
        for (row, &flag) in keep.iter().enumerate() {
            if !flag {
                continue;
            }
            dates.push(self.dates[row]);
            for (col, src) in columns.iter_mut().zip(self.columns.iter()) {
                col.data.push_from(&src.data, row);
            }
        }
        Self { dates, columns }
    }

    /// Outer-merge already-namespaced source tables on `Date`.
    ///
    /// The first row per date from each source joins into one output row;
    /// additional rows for the same date are appended afterwards with nulls
    /// for the other sources' columns. Column order is `(source order,
    /// column order within source)`; row order is a stable date sort.
    pub fn merge_outer(tables: Vec<DailyTable>) -> WbrResult<DailyTable> {
        if tables.is_empty() {
            return Err(WbrError::data("no data sources produced any table"));
        }
        if tables.len() == 1 {
            let mut only = tables.into_iter().next().expect("one table");
            only.sort_by_date();
            return Ok(only);
        }

        // Union of dates across all sources, sorted.
        let mut all_dates: Vec<NaiveDate> = tables
            .iter()
            .flat_map(|t| t.dates.iter().copied())
            .collect();
        all_dates.sort();
        all_dates.dedup();

        // First occurrence per date in each source.
        let firsts: Vec<HashMap<NaiveDate, usize>> = tables
            .iter()
            .map(|t| {
                let mut map = HashMap::new();
                for (row, d) in t.dates.iter().enumerate() {
                    map.entry(*d).or_insert(row);
                }
                map
            })
            .collect();

        let mut dates = Vec::new();
        let mut columns: Vec<(usize, Column)> = Vec::new();
        for (src_idx, table) in tables.iter().enumerate() {
            for col in &table.columns {
                columns.push((
                    src_idx,
                    Column {
                        name: col.name.clone(),
                        data: col.data.empty_like(),
                    },
                ));
            }
        }

        let mut push_row = |dates: &mut Vec<NaiveDate>,
                            columns: &mut Vec<(usize, Column)>,
                            date: NaiveDate,
                            rows: &dyn Fn(usize) -> Option<usize>| {
            dates.push(date);
            let mut col_cursor = 0usize;
            for (src_idx, table) in tables.iter().enumerate() {
                let row = rows(src_idx);
                for src_col in &table.columns {
                    let (_, out_col) = &mut columns[col_cursor];
                    match row {
                        Some(r) => out_col.data.push_from(&src_col.data, r),
                        None => out_col.data.push_null(),
                    }
                    col_cursor += 1;
                }
            }
        };

        for &date in &all_dates {
            push_row(&mut dates, &mut columns, date, &|src| {
                firsts[src].get(&date).copied()
            });
        }

        // Duplicate-date rows beyond the first, per source in source order.
        for (src_idx, table) in tables.iter().enumerate() {
            for (row, d) in table.dates.iter().enumerate() {
                if firsts[src_idx][d] == row {
                    continue;
                }
                push_row(&mut dates, &mut columns, *d, &|src| {
                    (src == src_idx).then_some(row)
                });
            }
        }

        let mut merged = DailyTable {
            dates,
            columns: columns.into_iter().map(|(_, c)| c).collect(),
        };
        merged.sort_by_date();
        Ok(merged)
    }
}

/// Parse a number, tolerating thousands separators (`1,234,567.5`).
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains(',') {
        trimmed.replace(',', "")
    } else {
        trimmed.to_string()
    };
    candidate.parse::<f64>().ok()
}

/// Parse a date in the formats daily sources actually produce.
pub fn parse_flexible_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    // Timestamps reduce to their date part.
    let date_part = trimmed
        .split(|c| c == ' ' || c == 'T')
        .next()
        .unwrap_or(trimmed);
    for format in ["%Y-%m-%d", "%d-%b-%Y", "%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(date_part, format) {
            return Some(d);
        }
    }
    None
}
