//! The deck document: the render-agnostic output of a build.
//!
//! This is the stable wire/storage format. A renderer reconstructs the UI
//! from this JSON without consulting the engine, so the types here guarantee
//! that no NaN or infinity ever reaches serialization: undefined values
//! become `"N/A"` cells and empty slots become `""`.

use serde::Serialize;

/// A single chart/table cell: a finite number, or a display string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// `None` and non-finite values render as `"N/A"`.
    pub fn from_opt(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => CellValue::Number(v),
            _ => CellValue::Text("N/A".to_string()),
        }
    }

    /// `None` and non-finite values render as a blank cell.
    pub fn from_opt_blank(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => CellValue::Number(v),
            _ => CellValue::Text(" ".to_string()),
        }
    }

    /// The empty slot used to pad axis-aligned series.
    pub fn empty() -> Self {
        CellValue::Text(String::new())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => Some(*v),
            CellValue::Text(_) => None,
        }
    }
}

/// The deck: an ordered document of blocks plus build-level metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub title: String,
    /// Long-form week ending, e.g. `25 September 2021`.
    pub week_ending: String,
    pub block_starting_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_axis_monthly_display: Option<String>,
    /// Annotation rows that could not be attached, surfaced non-fatally.
    pub event_errors: Vec<String>,
    pub blocks: Vec<Block>,
}

/// One renderable block.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Block {
    Graph(Box<SixTwelveChart>),
    Table(TrailingTable),
    Section(SectionBlock),
    Embedded(EmbeddedContent),
}

impl Block {
    pub fn title(&self) -> Option<&str> {
        match self {
            Block::Graph(b) => b.title.as_deref(),
            Block::Table(b) => b.title.as_deref(),
            Block::Section(b) => b.title.as_deref(),
            Block::Embedded(b) => b.title.as_deref(),
        }
    }
}

/// The signature 6-12 chart: six trailing weeks next to twelve trailing
/// months on one x axis, with the summary table beneath.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SixTwelveChart {
    pub plot_style: String,
    pub block_number: u32,
    pub title: Option<String>,
    pub y_scale: String,
    /// Unit of the summary-table comparison columns: `%` or `bps`.
    pub box_total_scale: String,
    pub tooltip: bool,
    /// 1 when weekly and monthly series share an axis, 2 otherwise.
    pub axes: u8,
    pub x_axis: Vec<String>,
    pub y_axis: Vec<SeriesEntry>,
    pub table: SummaryTable,
    pub noteworthy_events: Vec<NoteworthyEvent>,
}

/// One plotted metric: its legend, line style, and axis-aligned series.
/// `target` styles emit their series under `Target` instead of `metric`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesEntry {
    pub legend_name: String,
    pub line_style: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricSeries>,
    #[serde(rename = "Target", skip_serializing_if = "Option::is_none")]
    pub target: Option<MetricSeries>,
}

/// Current-year and prior-year series for one metric. Each entry is a
/// 19-slot array aligned to the x axis: weeks at 0..=5, a separator at 6,
/// months at 7..=18; unused slots hold `""`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSeries {
    pub current: Vec<AxisSeries>,
    pub previous: Vec<AxisSeries>,
}

/// One axis-aligned value vector, keyed by which axis it belongs to.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AxisSeries {
    Primary {
        #[serde(rename = "primaryAxis")]
        primary_axis: Vec<CellValue>,
    },
    Secondary {
        #[serde(rename = "secondaryAxis")]
        secondary_axis: Vec<CellValue>,
    },
}

impl AxisSeries {
    pub fn values(&self) -> &[CellValue] {
        match self {
            AxisSeries::Primary { primary_axis } => primary_axis,
            AxisSeries::Secondary { secondary_axis } => secondary_axis,
        }
    }
}

/// The summary table beneath a 6-12 chart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTable {
    pub table_header: Vec<String>,
    pub table_body: Vec<Vec<CellValue>>,
}

/// An annotation attached to a block whose metric matched.
#[derive(Debug, Clone, Serialize)]
pub struct NoteworthyEvent {
    pub metric: String,
    /// Long-form date, e.g. `September 08 2021`.
    pub date: String,
    pub description: String,
}

/// A `6_WeeksTable` or `12_MonthsTable` block.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailingTable {
    pub plot_style: String,
    pub block_number: u32,
    pub title: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
    pub noteworthy_events: Vec<NoteworthyEvent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub row_header: String,
    pub row_style: String,
    pub y_scale: String,
    pub row_data: Vec<CellValue>,
}

/// A section divider.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionBlock {
    pub plot_style: String,
    pub title: Option<String>,
}

/// Externally hosted content shown inline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedContent {
    pub plot_style: String,
    pub id: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value_guards_non_finite() {
        assert_eq!(CellValue::from_opt(Some(1.5)), CellValue::Number(1.5));
        assert_eq!(
            CellValue::from_opt(None),
            CellValue::Text("N/A".to_string())
        );
        assert_eq!(
            CellValue::from_opt(Some(f64::NAN)),
            CellValue::Text("N/A".to_string())
        );
        assert_eq!(
            CellValue::from_opt(Some(f64::INFINITY)),
            CellValue::Text("N/A".to_string())
        );
    }

    #[test]
    fn test_cell_value_serializes_untagged() {
        let cells = vec![CellValue::Number(2.0), CellValue::Text("N/A".into())];
        let json = serde_json::to_string(&cells).unwrap();
        assert_eq!(json, r#"[2.0,"N/A"]"#);
    }

    #[test]
    fn test_axis_series_field_names() {
        let series = AxisSeries::Primary {
            primary_axis: vec![CellValue::Number(1.0), CellValue::empty()],
        };
        let json = serde_json::to_value(&series).unwrap();
        assert!(json.get("primaryAxis").is_some());

        let series = AxisSeries::Secondary {
            secondary_axis: vec![CellValue::empty()],
        };
        let json = serde_json::to_value(&series).unwrap();
        assert!(json.get("secondaryAxis").is_some());
    }

    #[test]
    fn test_target_series_field_is_capitalized() {
        let entry = SeriesEntry {
            legend_name: "Goal".into(),
            line_style: "target".into(),
            metric: None,
            target: Some(MetricSeries {
                current: vec![],
                previous: vec![],
            }),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("Target").is_some());
        assert!(json.get("metric").is_none());
    }
}
