//! The deck builder: walks the declared deck and produces the deck document.
//!
//! Series arrays are axis-aligned 19-slot vectors: the six trailing weeks at
//! indices 0..=5, a separator at 6, and the twelve displayed months at
//! 7..=18. Missing values inside a series render as empty cells; missing
//! summary values render as `"N/A"`.

use crate::error::{WbrError, WbrResult};
use crate::models::config::{
    BlockSpec, ComparisonMethod, Config, GraphMetric, LineStyle, RowSpec, X_AXIS_FISCAL,
    X_AXIS_TRAILING,
};
use crate::models::deck::{
    AxisSeries, Block, CellValue, Deck, EmbeddedContent, MetricSeries, SectionBlock, SeriesEntry,
    SixTwelveChart, SummaryTable, TableRow, TrailingTable,
};
use crate::services::annotations::ResolvedAnnotations;
use crate::services::metrics::{warn_duplicate_line_style, MetricEngine, MetricRollup};

/// Total axis slots: 6 weeks + separator + 12 months.
pub const AXIS_SLOTS: usize = 19;
/// Slot index of the week/month separator.
pub const SEPARATOR_SLOT: usize = 6;
/// First month slot.
pub const MONTH_SLOT: usize = 7;
/// Months shown on the axis.
pub const MONTHS_SHOWN: usize = 12;

const SUMMARY_HEADER: [&str; 9] = [
    "Metric", "LastWeek", "YOY", "MTD", "YOY", "QTD", "YOY", "YTD", "YOY",
];

/// Builds the deck document from the engine's rollups.
pub struct DeckBuilder<'a> {
    cfg: &'a Config,
    engine: &'a MetricEngine,
    annotations: &'a ResolvedAnnotations,
    week_labels: Vec<String>,
}

impl<'a> DeckBuilder<'a> {
    pub fn new(
        cfg: &'a Config,
        engine: &'a MetricEngine,
        annotations: &'a ResolvedAnnotations,
    ) -> Self {
        let week_number = cfg
            .setup
            .week_number
            .unwrap_or_else(|| engine.calendar().default_week_number());
        Self {
            cfg,
            engine,
            annotations,
            week_labels: engine.calendar().week_labels(week_number),
        }
    }

    /// Assemble the whole deck in declaration order.
    pub fn build(self) -> WbrResult<Deck> {
        let mut blocks = Vec::with_capacity(self.cfg.deck.len());
        let mut block_number = self.cfg.setup.block_starting_number();

        for (index, spec) in self.cfg.deck.iter().enumerate() {
            let number = block_number;
            if spec.is_numbered() {
                block_number += 1;
            }
            let block = self.build_block(spec, number).map_err(|e| match e {
                WbrError::Config { path, message } => WbrError::Config {
                    path: format!("deck[{}].{}", index, path),
                    message,
                },
                other => other,
            })?;
            blocks.push(block);
        }

        let week_ending = self.engine.calendar().week_ending();
        Ok(Deck {
            title: self.cfg.setup.title.clone().unwrap_or_default(),
            week_ending: format!(
                "{} {} {}",
                week_ending.format("%d"),
                week_ending.format("%B"),
                week_ending.format("%Y")
            ),
            block_starting_number: self.cfg.setup.block_starting_number(),
            x_axis_monthly_display: self.cfg.setup.x_axis_monthly_display.clone(),
            event_errors: self.annotations.errors.clone(),
            blocks,
        })
    }

    fn build_block(&self, spec: &BlockSpec, number: u32) -> WbrResult<Block> {
        match spec {
            BlockSpec::SixTwelveGraph {
                title,
                y_scaling,
                axes,
                x_axis_monthly_display,
                metrics,
            } => self.build_graph(
                title.as_deref(),
                y_scaling.as_deref(),
                *axes,
                x_axis_monthly_display.as_deref(),
                metrics.iter().map(|(k, v)| (k, v.clone().unwrap_or_default())),
                number,
            ),
            BlockSpec::SixWeeksTable { title, rows } => {
                self.build_six_weeks_table(title.as_deref(), rows, number)
            }
            BlockSpec::TwelveMonthsTable {
                title,
                x_axis_monthly_display,
                rows,
            } => self.build_twelve_months_table(
                title.as_deref(),
                x_axis_monthly_display.as_deref(),
                rows,
                number,
            ),
            BlockSpec::Section { title } => Ok(Block::Section(SectionBlock {
                plot_style: "section".to_string(),
                title: title.clone(),
            })),
            BlockSpec::EmbeddedContent {
                title,
                source,
                name,
                width,
                height,
            } => Ok(Block::Embedded(EmbeddedContent {
                plot_style: "embedded_content".to_string(),
                id: "iframe_id".to_string(),
                source: source.clone(),
                name: name.clone(),
                title: title.clone(),
                width: width.as_deref().and_then(parse_pixels),
                height: height.as_deref().and_then(parse_pixels),
            })),
        }
    }

    /// Which display-month cells a block shows, per its monthly display
    /// mode. Returns indices into the engine's display months.
    fn month_window(&self, block_mode: Option<&str>) -> Vec<usize> {
        let months = self.engine.display_months();
        let mode = block_mode
            .or(self.cfg.setup.x_axis_monthly_display.as_deref())
            .unwrap_or(X_AXIS_TRAILING);
        if mode == X_AXIS_FISCAL {
            let start_month = self.engine.calendar().fiscal_start_month();
            if let Some(start) = months.iter().position(|m| m.month == start_month) {
                return (start..months.len().min(start + MONTHS_SHOWN)).collect();
            }
        }
        (0..months.len().min(MONTHS_SHOWN)).collect()
    }

    fn month_labels(&self, window: &[usize]) -> Vec<String> {
        let months = self.engine.display_months();
        let mut labels: Vec<String> = window
            .iter()
            .map(|&idx| months[idx].label().to_string())
            .collect();
        labels.resize(MONTHS_SHOWN, String::new());
        labels
    }

    fn x_axis(&self, window: &[usize]) -> Vec<String> {
        let mut labels = self.week_labels.clone();
        labels.push(" ".to_string());
        labels.extend(self.month_labels(window));
        labels
    }

    /// The 19-slot weekly series: weeks at 0..=5, the rest empty.
    fn weekly_slots(rollup: &MetricRollup, prior_year: bool) -> Vec<CellValue> {
        let mut slots = vec![CellValue::empty(); AXIS_SLOTS];
        for (k, slot) in slots.iter_mut().take(SEPARATOR_SLOT).enumerate() {
            let value = if prior_year {
                rollup.week_py(k)
            } else {
                rollup.week_cy(k)
            };
            if let Some(v) = value.filter(|v| v.is_finite()) {
                *slot = CellValue::Number(v);
            }
        }
        slots
    }

    /// The 19-slot monthly series: the window's months at 7..=18.
    fn monthly_slots(
        rollup: &MetricRollup,
        window: &[usize],
        prior_year: bool,
    ) -> Vec<CellValue> {
        let cells = if prior_year {
            rollup.display_months_py()
        } else {
            rollup.display_months_cy()
        };
        let mut slots = vec![CellValue::empty(); AXIS_SLOTS];
        for (offset, &idx) in window.iter().take(MONTHS_SHOWN).enumerate() {
            if let Some(v) = cells.get(idx).copied().flatten().filter(|v| v.is_finite()) {
                slots[MONTH_SLOT + offset] = CellValue::Number(v);
            }
        }
        slots
    }

    /// Whether a series fits one axis: weekly max positive and monthly max
    /// within three times the weekly max.
    fn single_axis(weekly: &[CellValue], monthly: &[CellValue]) -> bool {
        let max_of = |cells: &[CellValue]| {
            cells
                .iter()
                .filter_map(CellValue::as_number)
                .fold(f64::NEG_INFINITY, f64::max)
        };
        let weekly_max = max_of(weekly);
        let monthly_max = max_of(monthly);
        if !(weekly_max.is_finite() && monthly_max.is_finite()) || weekly_max <= 0.0 {
            return false;
        }
        let ratio = monthly_max / weekly_max;
        ratio > 0.0 && ratio <= 3.0
    }

    #[allow(clippy::too_many_arguments)]
    fn build_graph<'m>(
        &self,
        title: Option<&str>,
        y_scaling: Option<&str>,
        axes_override: Option<u8>,
        block_mode: Option<&str>,
        metrics: impl Iterator<Item = (&'m str, GraphMetric)>,
        number: u32,
    ) -> WbrResult<Block> {
        let window = self.month_window(block_mode);
        let mut y_axis = Vec::new();
        let mut table_body = Vec::new();
        let mut box_total_scale: Option<ComparisonMethod> = None;
        let mut is_single_axis = false;
        let mut seen_styles: Vec<LineStyle> = Vec::new();
        let mut metric_names = Vec::new();

        for (name, options) in metrics {
            metric_names.push(name.to_string());
            let rollup = self.engine.rollup(name).ok_or_else(|| {
                WbrError::config(
                    format!("metrics.{}", name),
                    format!("metric '{}' is not defined", name),
                )
            })?;

            let style = options.line_style();
            if seen_styles.contains(&style) {
                warn_duplicate_line_style(title.unwrap_or(""), name, style.name());
            }
            seen_styles.push(style);

            let current_weekly = Self::weekly_slots(rollup, false);
            let current_monthly = Self::monthly_slots(rollup, &window, false);
            is_single_axis = Self::single_axis(&current_weekly, &current_monthly);

            let show_py = rollup.py_available && options.graph_prior_year();
            let previous = if show_py {
                let py_weekly = Self::weekly_slots(rollup, true);
                let py_monthly = Self::monthly_slots(rollup, &window, true);
                is_single_axis = Self::single_axis(&py_weekly, &py_monthly);
                vec![
                    AxisSeries::Primary {
                        primary_axis: py_weekly,
                    },
                    AxisSeries::Secondary {
                        secondary_axis: py_monthly,
                    },
                ]
            } else {
                Vec::new()
            };

            let series = MetricSeries {
                current: vec![
                    AxisSeries::Primary {
                        primary_axis: current_weekly,
                    },
                    AxisSeries::Secondary {
                        secondary_axis: current_monthly,
                    },
                ],
                previous,
            };

            let is_target = style == LineStyle::Target;
            y_axis.push(SeriesEntry {
                legend_name: options
                    .legend_name
                    .clone()
                    .unwrap_or_else(|| name.to_string()),
                line_style: style.name().to_string(),
                metric: (!is_target).then(|| series.clone()),
                target: is_target.then_some(series),
            });

            if !is_target {
                box_total_scale.get_or_insert(self.engine.comparison_method(name));
                let summary = self
                    .engine
                    .summary(name)
                    .ok_or_else(|| WbrError::internal(format!("no summary for '{}'", name)))?;
                table_body.push(vec![
                    CellValue::Text(name.to_string()),
                    CellValue::from_opt(summary.last_week),
                    CellValue::from_opt(summary.last_week_yoy),
                    CellValue::from_opt(summary.mtd),
                    CellValue::from_opt(summary.mtd_yoy),
                    CellValue::from_opt(summary.qtd),
                    CellValue::from_opt(summary.qtd_yoy),
                    CellValue::from_opt(summary.ytd),
                    CellValue::from_opt(summary.ytd_yoy),
                ]);
            }
        }

        let noteworthy_events = self
            .annotations
            .events_for(metric_names.iter().map(String::as_str));

        Ok(Block::Graph(Box::new(SixTwelveChart {
            plot_style: "6_12_chart".to_string(),
            block_number: number,
            title: title.map(|t| t.to_string()),
            y_scale: y_scaling.unwrap_or("").to_string(),
            box_total_scale: match box_total_scale.unwrap_or_default() {
                ComparisonMethod::Bps => "bps".to_string(),
                ComparisonMethod::PctChange => "%".to_string(),
            },
            tooltip: self.cfg.setup.tooltip,
            axes: axes_override.unwrap_or(if is_single_axis { 1 } else { 2 }),
            x_axis: self.x_axis(&window),
            y_axis,
            table: SummaryTable {
                table_header: SUMMARY_HEADER.iter().map(|s| s.to_string()).collect(),
                table_body,
            },
            noteworthy_events,
        })))
    }

    fn build_six_weeks_table(
        &self,
        title: Option<&str>,
        rows: &[RowSpec],
        number: u32,
    ) -> WbrResult<Block> {
        let mut headers: Vec<String> = self.week_labels.clone();
        headers.push("QTD".to_string());
        headers.push("YTD".to_string());
        let column_count = headers.len();

        let mut table_rows = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let row_data = match row.metric.as_deref() {
                None => vec![CellValue::empty(); column_count],
                Some(metric) => {
                    if metric.ends_with("MOM") {
                        return Err(WbrError::config(
                            format!("rows[{}].metric", index),
                            "month-over-month metrics are not supported in a 6-weeks table",
                        ));
                    }
                    let rollup = self.engine.rollup(metric).ok_or_else(|| {
                        WbrError::config(
                            format!("rows[{}].metric", index),
                            format!("metric '{}' is not defined", metric),
                        )
                    })?;
                    let mut data: Vec<CellValue> = (0..6)
                        .map(|k| CellValue::from_opt_blank(rollup.week_cy(k)))
                        .collect();
                    if metric.ends_with("WOW") {
                        data.push(CellValue::Text(" ".to_string()));
                        data.push(CellValue::Text(" ".to_string()));
                    } else {
                        data.push(CellValue::from_opt_blank(rollup.qtd_cy));
                        data.push(CellValue::from_opt_blank(rollup.ytd_cy));
                    }
                    data
                }
            };
            table_rows.push(TableRow {
                row_header: row.header.clone().unwrap_or_default(),
                row_style: row.style.clone().unwrap_or_default(),
                y_scale: row.y_scaling.clone().unwrap_or_default(),
                row_data,
            });
        }

        let noteworthy_events = self
            .annotations
            .events_for(rows.iter().filter_map(|r| r.metric.as_deref()));

        Ok(Block::Table(TrailingTable {
            plot_style: "6_week_table".to_string(),
            block_number: number,
            title: title.map(|t| t.to_string()),
            headers,
            rows: table_rows,
            noteworthy_events,
        }))
    }

    fn build_twelve_months_table(
        &self,
        title: Option<&str>,
        block_mode: Option<&str>,
        rows: &[RowSpec],
        number: u32,
    ) -> WbrResult<Block> {
        let window = self.month_window(block_mode);
        let headers = self.month_labels(&window);

        let mut table_rows = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let row_data = match row.metric.as_deref() {
                None => vec![CellValue::empty(); MONTHS_SHOWN],
                Some(metric) => {
                    let rollup = self.engine.rollup(metric).ok_or_else(|| {
                        WbrError::config(
                            format!("rows[{}].metric", index),
                            format!("metric '{}' is not defined", metric),
                        )
                    })?;
                    let cells = rollup.display_months_cy();
                    let mut data: Vec<CellValue> = window
                        .iter()
                        .take(MONTHS_SHOWN)
                        .map(|&idx| CellValue::from_opt_blank(cells.get(idx).copied().flatten()))
                        .collect();
                    data.resize(MONTHS_SHOWN, CellValue::empty());
                    data
                }
            };
            table_rows.push(TableRow {
                row_header: row.header.clone().unwrap_or_default(),
                row_style: row.style.clone().unwrap_or_default(),
                y_scale: row.y_scaling.clone().unwrap_or_default(),
                row_data,
            });
        }

        Ok(Block::Table(TrailingTable {
            plot_style: "12_MonthsTable".to_string(),
            block_number: number,
            title: title.map(|t| t.to_string()),
            headers,
            rows: table_rows,
            // Annotations attach to 6-12 graphs and 6-weeks tables only.
            noteworthy_events: Vec::new(),
        }))
    }
}

fn parse_pixels(text: &str) -> Option<u32> {
    text.trim()
        .trim_end_matches("px")
        .trim()
        .parse::<u32>()
        .ok()
}
