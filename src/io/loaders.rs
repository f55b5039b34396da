//! CSV and annotation loading.
//!
//! Daily data CSVs go through polars and land in a [`DailyTable`]; the
//! engine never sees a raw DataFrame. Annotation CSVs have a fixed
//! three-column schema and are read with typed `csv` rows instead.

use std::io::Cursor;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Deserialize;
use tracing::info;

use crate::error::{WbrError, WbrResult};
use crate::models::frame::{
    parse_flexible_date, parse_number, Column as TableColumn, ColumnData, DailyTable, DATE_COLUMN,
};

/// Whether a source string points at an HTTP location rather than a file.
pub fn is_url(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Fetch raw bytes from a URL or a local path.
pub async fn fetch_bytes(location: &str) -> WbrResult<Vec<u8>> {
    if is_url(location) {
        let response = reqwest::get(location)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                WbrError::connection(location, format!("failed to fetch: {}", e))
            })?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| WbrError::connection(location, format!("failed to read body: {}", e)))?;
        info!(location, bytes = bytes.len(), "fetched remote file");
        Ok(bytes.to_vec())
    } else {
        let bytes = std::fs::read(location)
            .map_err(|e| WbrError::data(format!("could not read '{}': {}", location, e)))?;
        Ok(bytes)
    }
}

/// Fetch UTF-8 text from a URL or a local path.
pub async fn fetch_text(location: &str) -> WbrResult<String> {
    let bytes = fetch_bytes(location).await?;
    String::from_utf8(bytes)
        .map_err(|_| WbrError::data(format!("'{}' is not valid UTF-8", location)))
}

/// Load a daily data CSV from a URL or path.
pub async fn load_daily_csv(location: &str) -> WbrResult<DailyTable> {
    if is_url(location) {
        let bytes = fetch_bytes(location).await?;
        load_daily_csv_from_bytes(bytes)
    } else {
        load_daily_csv_from_path(Path::new(location))
    }
}

/// Parse a daily data CSV from a local file.
pub fn load_daily_csv_from_path(path: &Path) -> WbrResult<DailyTable> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.into()))
        .map_err(|e| WbrError::data(format!("could not open CSV '{}': {}", path.display(), e)))?
        .finish()
        .map_err(|e| WbrError::data(format!("could not parse CSV '{}': {}", path.display(), e)))?;
    dataframe_to_daily_table(df)
}

/// Parse a daily data CSV already held in memory (uploads, HTTP bodies).
pub fn load_daily_csv_from_bytes(bytes: Vec<u8>) -> WbrResult<DailyTable> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| WbrError::data(format!("could not parse uploaded CSV: {}", e)))?;
    dataframe_to_daily_table(df)
}

fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Convert a parsed DataFrame into the engine's typed daily table.
///
/// The `Date` column is required and parsed to date-only values, failing
/// fast on anything unparseable. Other columns become numeric when the
/// inferred dtype is numeric or every non-null string parses as a number
/// (thousands separators tolerated), text otherwise.
pub fn dataframe_to_daily_table(df: DataFrame) -> WbrResult<DailyTable> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    if !names.iter().any(|n| n == DATE_COLUMN) {
        return Err(WbrError::data(format!(
            "CSV is missing the required '{}' column; found columns: {:?}",
            DATE_COLUMN, names
        )));
    }

    let mut dates: Vec<NaiveDate> = Vec::with_capacity(df.height());
    let mut columns: Vec<TableColumn> = Vec::new();

    for name in &names {
        let col = df
            .column(name)
            .map_err(|e| WbrError::internal(format!("column lookup failed: {}", e)))?;

        if name == DATE_COLUMN {
            // Dates may arrive as an inferred date dtype or as raw strings;
            // a cast to String gives one code path for both.
            let as_text = col
                .cast(&DataType::String)
                .map_err(|e| WbrError::data(format!("could not read '{}': {}", DATE_COLUMN, e)))?;
            let values = as_text
                .str()
                .map_err(|e| WbrError::data(format!("could not read '{}': {}", DATE_COLUMN, e)))?;
            for (row, value) in values.into_iter().enumerate() {
                let parsed = value.and_then(parse_flexible_date);
                match parsed {
                    Some(d) => dates.push(d),
                    None => {
                        return Err(WbrError::data(format!(
                            "could not parse '{}' value {:?} in row {}",
                            DATE_COLUMN,
                            value,
                            row + 1
                        )))
                    }
                }
            }
            continue;
        }

        let data = if is_numeric_dtype(col.dtype()) {
            let casted = col
                .cast(&DataType::Float64)
                .map_err(|e| WbrError::data(format!("could not read column '{}': {}", name, e)))?;
            let values = casted
                .f64()
                .map_err(|e| WbrError::data(format!("could not read column '{}': {}", name, e)))?;
            ColumnData::Float(values.into_iter().collect())
        } else {
            let casted = col
                .cast(&DataType::String)
                .map_err(|e| WbrError::data(format!("could not read column '{}': {}", name, e)))?;
            let values = casted
                .str()
                .map_err(|e| WbrError::data(format!("could not read column '{}': {}", name, e)))?;
            let texts: Vec<Option<String>> =
                values.into_iter().map(|v| v.map(|s| s.to_string())).collect();
            let all_numeric = texts
                .iter()
                .flatten()
                .all(|s| parse_number(s).is_some())
                && texts.iter().any(|v| v.is_some());
            if all_numeric {
                ColumnData::Float(
                    texts
                        .iter()
                        .map(|v| v.as_deref().and_then(parse_number))
                        .collect(),
                )
            } else {
                ColumnData::Text(texts)
            }
        };

        columns.push(TableColumn {
            name: name.clone(),
            data,
        });
    }

    DailyTable::new(dates, columns)
}

/// One annotation row: `Date, MetricName, EventDescription`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRow {
    pub date: NaiveDate,
    pub metric_name: String,
    pub event_description: String,
}

#[derive(Debug, Deserialize)]
struct RawAnnotationRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "MetricName")]
    metric_name: String,
    #[serde(rename = "EventDescription")]
    event_description: String,
}

/// Parse an annotation CSV held in memory.
pub fn parse_annotation_csv(bytes: &[u8]) -> WbrResult<Vec<AnnotationRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<RawAnnotationRow>().enumerate() {
        let raw = result.map_err(|e| {
            WbrError::data(format!("annotation row {} is malformed: {}", index + 1, e))
        })?;
        let date = parse_flexible_date(&raw.date).ok_or_else(|| {
            WbrError::data(format!(
                "annotation row {} has unparseable Date '{}'",
                index + 1,
                raw.date
            ))
        })?;
        rows.push(AnnotationRow {
            date,
            metric_name: raw.metric_name,
            event_description: raw.event_description,
        });
    }
    Ok(rows)
}

/// Load one annotation CSV from a URL or path.
pub async fn load_annotation_csv(location: &str) -> WbrResult<Vec<AnnotationRow>> {
    let bytes = fetch_bytes(location).await?;
    parse_annotation_csv(&bytes)
}
