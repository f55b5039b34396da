//! The metric engine: materializes daily series, aggregates them into the
//! period rollups the deck needs, and evaluates function metrics and
//! auto-generated growth derivatives.
//!
//! The load-bearing rule is aggregate-first-then-combine: a function
//! metric's value in any rollup period applies its op to the operands'
//! already-aggregated values for that period. Rates like CTR come out as
//! `sum(Clicks) / sum(Impressions)` per window, never as a daily average of
//! ratios.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::warn;

use crate::error::{WbrError, WbrResult};
use crate::models::calendar::{
    parse_fiscal_month, parse_week_ending, DaySpan, Month, ReportCalendar, NUM_TRAILING_MONTHS,
    NUM_TRAILING_WEEKS,
};
use crate::models::config::{
    split_reserved_suffix, AggFunc, ComparisonMethod, Config, FunctionOp, FunctionSpec, MetricSpec,
    Operand,
};
use crate::models::frame::{ColumnData, DailyTable};
use crate::parsing::filter::parse_filter;

/// Scaling applied when a comparison is displayed.
pub const PCT_MULTIPLIER: f64 = 100.0;
pub const BPS_MULTIPLIER: f64 = 10_000.0;

/// A daily value series: sorted by date, one entry per distinct date.
pub type DailySeries = Vec<(NaiveDate, Option<f64>)>;

/// Every periodized value of one metric.
///
/// Weekly vectors have seven entries: index 0 is the week before the
/// trailing window (needed by week-over-week), indices 1..=6 are the six
/// trailing weeks oldest to newest. Monthly vectors parallel
/// [`MetricEngine::months`]: index 0 is the extra-early month (for
/// month-over-month), then the twelve trailing complete months, then any
/// partial-month and fiscal-year extension cells.
#[derive(Debug, Clone, Default)]
pub struct MetricRollup {
    pub weekly_cy: Vec<Option<f64>>,
    pub weekly_py: Vec<Option<f64>>,
    pub monthly_cy: Vec<Option<f64>>,
    pub monthly_py: Vec<Option<f64>>,
    pub mtd_cy: Option<f64>,
    pub mtd_py: Option<f64>,
    pub qtd_cy: Option<f64>,
    pub qtd_py: Option<f64>,
    pub ytd_cy: Option<f64>,
    pub ytd_py: Option<f64>,
    /// False for growth derivatives, which have no prior-year series.
    pub py_available: bool,
}

impl MetricRollup {
    /// Trailing week `k` (0 = oldest, 5 = newest) of the current year.
    pub fn week_cy(&self, k: usize) -> Option<f64> {
        self.weekly_cy.get(k + 1).copied().flatten()
    }

    pub fn week_py(&self, k: usize) -> Option<f64> {
        self.weekly_py.get(k + 1).copied().flatten()
    }

    /// The most recent full week.
    pub fn last_week(&self) -> Option<f64> {
        self.week_cy(NUM_TRAILING_WEEKS - 1)
    }

    /// Display cells: the monthly vector without the extra-early month.
    pub fn display_months_cy(&self) -> &[Option<f64>] {
        &self.monthly_cy[1..]
    }

    pub fn display_months_py(&self) -> &[Option<f64>] {
        &self.monthly_py[1..]
    }
}

/// Summary-table values for one metric, comparisons already scaled by the
/// metric's comparison method.
#[derive(Debug, Clone, Default)]
pub struct SummaryValues {
    pub last_week: Option<f64>,
    pub last_week_yoy: Option<f64>,
    pub mtd: Option<f64>,
    pub mtd_yoy: Option<f64>,
    pub qtd: Option<f64>,
    pub qtd_yoy: Option<f64>,
    pub ytd: Option<f64>,
    pub ytd_yoy: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Derivative {
    Wow,
    Mom,
    Yoy,
}

impl Derivative {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "WOW" => Some(Self::Wow),
            "MOM" => Some(Self::Mom),
            "YOY" => Some(Self::Yoy),
            _ => None,
        }
    }
}

/// The built metric engine: one per deck request.
pub struct MetricEngine {
    calendar: ReportCalendar,
    weeks_cy: Vec<DaySpan>,
    weeks_py: Vec<DaySpan>,
    /// Index 0 is the extra-early month; the rest are display months.
    months: Vec<Month>,
    partial_month: Option<Month>,
    /// First extension cell index in `months`, if any.
    extension_start: Option<usize>,
    specs: Vec<(String, MetricSpec)>,
    rollups: HashMap<String, MetricRollup>,
}

impl MetricEngine {
    /// Materialize every declared metric and its growth derivatives from the
    /// merged master table.
    pub fn build(cfg: &Config, master: &DailyTable) -> WbrResult<Self> {
        let week_ending = parse_week_ending(&cfg.setup.week_ending)?;
        let fiscal_month = parse_fiscal_month(cfg.setup.fiscal_year_end_month())?;
        let calendar = ReportCalendar::new(week_ending, fiscal_month);

        if master.dates().first().map(|d| *d > week_ending).unwrap_or(true) {
            return Err(WbrError::data(format!(
                "the data has no rows on or before the configured week ending {}",
                week_ending
            )));
        }

        // One extra week/month before the trailing window feeds WOW/MOM.
        let weeks_cy = ReportCalendar::weeks_ending(week_ending, NUM_TRAILING_WEEKS + 1);
        let weeks_py = calendar.py_weeks(NUM_TRAILING_WEEKS + 1);

        let trailing = calendar.trailing_months(NUM_TRAILING_MONTHS);
        let (extension, partial_month) = calendar.extension_months();
        let mut months = Vec::with_capacity(trailing.len() + extension.len() + 1);
        months.push(trailing[0].pred());
        months.extend(trailing.iter().copied());
        let extension_start = (!extension.is_empty()).then_some(months.len());
        months.extend(extension.iter().copied());

        let mut engine = Self {
            calendar,
            weeks_cy,
            weeks_py,
            months,
            partial_month,
            extension_start,
            specs: cfg
                .metrics
                .iter()
                .map(|(name, spec)| (name.to_string(), spec.clone()))
                .collect(),
            rollups: HashMap::new(),
        };

        // Base (non-function) metrics first: daily series then rollups.
        for (name, spec) in engine.specs.clone() {
            let aggf = match spec.aggf() {
                Some(aggf) => aggf,
                None => continue,
            };
            let series = engine.materialize_daily(&name, &spec, master)?;
            let rollup = engine.rollup_from_daily(&series, aggf);
            engine.rollups.insert(name.clone(), rollup);
        }

        // Function metrics in dependency order, then every derivative.
        let names: Vec<String> = engine.specs.iter().map(|(n, _)| n.clone()).collect();
        for name in &names {
            engine.ensure(name, &mut Vec::new())?;
        }
        for name in &names {
            for suffix in ["WOW", "MOM", "YOY"] {
                engine.ensure(&format!("{}{}", name, suffix), &mut Vec::new())?;
            }
        }

        Ok(engine)
    }

    pub fn calendar(&self) -> &ReportCalendar {
        &self.calendar
    }

    /// Display months: the twelve trailing complete months plus any
    /// partial-month and fiscal-extension cells.
    pub fn display_months(&self) -> &[Month] {
        &self.months[1..]
    }

    /// Names declared in the config, in declaration order.
    pub fn declared_names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|(n, _)| n.as_str())
    }

    /// Whether `name` is a declared metric or a derivable growth metric.
    pub fn is_defined(&self, name: &str) -> bool {
        self.rollups.contains_key(name)
    }

    pub fn is_derivative(&self, name: &str) -> bool {
        self.spec_of(name).is_none() && self.rollups.contains_key(name)
    }

    pub fn rollup(&self, name: &str) -> Option<&MetricRollup> {
        self.rollups.get(name)
    }

    /// The comparison method of a metric; derivatives inherit their base's.
    pub fn comparison_method(&self, name: &str) -> ComparisonMethod {
        if let Some(spec) = self.spec_of(name) {
            return spec.comparison_method();
        }
        split_reserved_suffix(name)
            .and_then(|(base, _)| self.spec_of(base))
            .map(|spec| spec.comparison_method())
            .unwrap_or_default()
    }

    /// Summary-table values, comparisons scaled for display.
    pub fn summary(&self, name: &str) -> Option<SummaryValues> {
        let rollup = self.rollups.get(name)?;
        let method = self.comparison_method(name);
        let scaled = |cy: Option<f64>, py: Option<f64>| {
            compare(cy, py, method).map(|v| v * multiplier(method))
        };
        let last = NUM_TRAILING_WEEKS - 1;
        Some(SummaryValues {
            last_week: rollup.last_week(),
            last_week_yoy: scaled(rollup.week_cy(last), rollup.week_py(last)),
            mtd: rollup.mtd_cy,
            mtd_yoy: scaled(rollup.mtd_cy, rollup.mtd_py),
            qtd: rollup.qtd_cy,
            qtd_yoy: scaled(rollup.qtd_cy, rollup.qtd_py),
            ytd: rollup.ytd_cy,
            ytd_yoy: scaled(rollup.ytd_cy, rollup.ytd_py),
        })
    }

    fn spec_of(&self, name: &str) -> Option<&MetricSpec> {
        self.specs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec)
    }

    /// Build the daily series for a basic or filter metric.
    fn materialize_daily(
        &self,
        name: &str,
        spec: &MetricSpec,
        master: &DailyTable,
    ) -> WbrResult<DailySeries> {
        match spec {
            MetricSpec::Basic { column, aggf, .. } => {
                let values = master.float_column(column).ok_or_else(|| {
                    WbrError::data(format!(
                        "metric '{}' references column '{}', which is not a numeric \
                         column of the merged table",
                        name, column
                    ))
                })?;
                Ok(group_by_date(master.dates(), values, *aggf))
            }
            MetricSpec::Filter { filter, aggf, .. } => {
                let expr = parse_filter(&filter.query).map_err(|e| {
                    WbrError::config(format!("metrics.{}.filter.query", name), e)
                })?;
                let mut keep = Vec::with_capacity(master.len());
                for row in 0..master.len() {
                    let matched = expr.matches(master, row).map_err(|e| {
                        WbrError::config(format!("metrics.{}.filter.query", name), e)
                    })?;
                    keep.push(matched);
                }
                let kept = master.filter_rows(&keep);
                let values = match kept.column(&filter.base_column).map(|c| &c.data) {
                    Some(ColumnData::Float(values)) => values.clone(),
                    _ => {
                        return Err(WbrError::data(format!(
                            "filter metric '{}' aggregates column '{}', which is not a \
                             numeric column of the merged table",
                            name, filter.base_column
                        )))
                    }
                };
                Ok(group_by_date(kept.dates(), &values, *aggf))
            }
            MetricSpec::Function { .. } => Ok(Vec::new()),
        }
    }

    /// Aggregate a daily series into the full rollup.
    fn rollup_from_daily(&self, series: &DailySeries, aggf: AggFunc) -> MetricRollup {
        let weekly_cy = self
            .weeks_cy
            .iter()
            .map(|span| aggregate_span(series, *span, aggf, false))
            .collect();
        let weekly_py = self
            .weeks_py
            .iter()
            .map(|span| aggregate_span(series, *span, aggf, false))
            .collect();

        let month_cell = |month: Month, guard: bool| {
            aggregate_span(
                series,
                DaySpan::new(month.first_day(), month.last_day()),
                aggf,
                guard,
            )
        };
        let mut monthly_cy: Vec<Option<f64>> = self
            .months
            .iter()
            .map(|m| month_cell(*m, Some(*m) == self.partial_month))
            .collect();
        let mut monthly_py: Vec<Option<f64>> = self
            .months
            .iter()
            .map(|m| month_cell(m.years_back(1), false))
            .collect();

        // Future months with zero sums are missing data, not real zeros.
        if let Some(start) = self.extension_start {
            for cell in monthly_cy[start..].iter_mut().chain(monthly_py[start..].iter_mut()) {
                if *cell == Some(0.0) {
                    *cell = None;
                }
            }
        }

        MetricRollup {
            weekly_cy,
            weekly_py,
            monthly_cy,
            monthly_py,
            mtd_cy: aggregate_span(series, self.calendar.mtd(), aggf, false),
            mtd_py: aggregate_span(series, self.calendar.py_mtd(), aggf, false),
            qtd_cy: aggregate_span(series, self.calendar.qtd(), aggf, false),
            qtd_py: aggregate_span(series, self.calendar.py_qtd(), aggf, false),
            ytd_cy: aggregate_span(series, self.calendar.ytd(), aggf, false),
            ytd_py: aggregate_span(series, self.calendar.py_ytd(), aggf, false),
            py_available: true,
        }
    }

    /// Make sure `name` has a rollup, evaluating function metrics and
    /// synthesizing derivatives on demand. Results are cached per build;
    /// `visiting` backstops cycle detection (validation already rejects
    /// cycles up front).
    fn ensure(&mut self, name: &str, visiting: &mut Vec<String>) -> WbrResult<()> {
        if self.rollups.contains_key(name) {
            return Ok(());
        }
        if visiting.iter().any(|n| n == name) {
            return Err(WbrError::config(
                format!("metrics.{}", name),
                "circular dependency between function metrics",
            ));
        }
        visiting.push(name.to_string());
        let result = self.compute(name, visiting);
        visiting.pop();

        let rollup = result?;
        self.rollups.insert(name.to_string(), rollup);
        Ok(())
    }

    fn compute(&mut self, name: &str, visiting: &mut Vec<String>) -> WbrResult<MetricRollup> {
        if let Some(MetricSpec::Function { function, .. }) = self.spec_of(name).cloned() {
            return self.evaluate_function(&function, visiting);
        }
        if let Some((base, suffix)) = split_reserved_suffix(name) {
            let base = base.to_string();
            if self.spec_of(&base).is_some() {
                let derivative = Derivative::from_suffix(suffix).expect("reserved suffix");
                self.ensure(&base, visiting)?;
                let method = self.comparison_method(&base);
                let base_rollup = self.rollups.get(&base).expect("base rollup just ensured");
                return Ok(derive(base_rollup, derivative, method));
            }
        }
        Err(WbrError::config(
            format!("metrics.{}", name),
            format!("metric '{}' is not defined", name),
        ))
    }

    fn evaluate_function(
        &mut self,
        function: &FunctionSpec,
        visiting: &mut Vec<String>,
    ) -> WbrResult<MetricRollup> {
        let mut operands: Vec<MetricRollup> = Vec::with_capacity(function.operands.len());
        for operand in &function.operands {
            match operand {
                Operand::Metric { metric } => {
                    self.ensure(&metric.name, visiting)?;
                    operands.push(self.rollups[&metric.name].clone());
                }
                Operand::Value { value } => {
                    operands.push(self.constant_rollup(value.n));
                }
            }
        }
        Ok(combine_rollups(function.op, &operands))
    }

    /// A constant operand has the same value in every period.
    fn constant_rollup(&self, value: f64) -> MetricRollup {
        let some = Some(value);
        MetricRollup {
            weekly_cy: vec![some; self.weeks_cy.len()],
            weekly_py: vec![some; self.weeks_py.len()],
            monthly_cy: vec![some; self.months.len()],
            monthly_py: vec![some; self.months.len()],
            mtd_cy: some,
            mtd_py: some,
            qtd_cy: some,
            qtd_py: some,
            ytd_cy: some,
            ytd_py: some,
            py_available: true,
        }
    }
}

/// Displayed multiplier for a comparison method.
pub fn multiplier(method: ComparisonMethod) -> f64 {
    match method {
        ComparisonMethod::PctChange => PCT_MULTIPLIER,
        ComparisonMethod::Bps => BPS_MULTIPLIER,
    }
}

/// Raw comparison of a current value against a prior value: relative change
/// for `%` metrics, absolute difference for `bps` metrics. Undefined when
/// either side is missing or the result is not finite.
pub fn compare(cy: Option<f64>, py: Option<f64>, method: ComparisonMethod) -> Option<f64> {
    let (cy, py) = (cy?, py?);
    let result = match method {
        ComparisonMethod::PctChange => {
            if py == 0.0 {
                return None;
            }
            cy / py - 1.0
        }
        ComparisonMethod::Bps => cy - py,
    };
    result.is_finite().then_some(result)
}

fn combine_values(op: FunctionOp, values: &[Option<f64>]) -> Option<f64> {
    // A missing operand makes the period undefined rather than zero.
    if values.iter().any(|v| v.is_none()) {
        return None;
    }
    let values: Vec<f64> = values.iter().map(|v| v.expect("checked")).collect();
    let result = match op {
        FunctionOp::Sum => values.iter().sum(),
        FunctionOp::Difference => values[0] - values[1..].iter().sum::<f64>(),
        FunctionOp::Product => values.iter().product(),
        FunctionOp::Divide => {
            if values[1] == 0.0 {
                return None;
            }
            values[0] / values[1]
        }
    };
    result.is_finite().then_some(result)
}

fn combine_rollups(op: FunctionOp, operands: &[MetricRollup]) -> MetricRollup {
    let cell = |select: &dyn Fn(&MetricRollup) -> Option<f64>| {
        let values: Vec<Option<f64>> = operands.iter().map(select).collect();
        combine_values(op, &values)
    };
    let vector = |select: &dyn Fn(&MetricRollup) -> &Vec<Option<f64>>| {
        let len = operands.first().map(|r| select(r).len()).unwrap_or(0);
        (0..len)
            .map(|i| {
                let values: Vec<Option<f64>> = operands
                    .iter()
                    .map(|r| select(r).get(i).copied().flatten())
                    .collect();
                combine_values(op, &values)
            })
            .collect()
    };
    MetricRollup {
        weekly_cy: vector(&|r| &r.weekly_cy),
        weekly_py: vector(&|r| &r.weekly_py),
        monthly_cy: vector(&|r| &r.monthly_cy),
        monthly_py: vector(&|r| &r.monthly_py),
        mtd_cy: cell(&|r| r.mtd_cy),
        mtd_py: cell(&|r| r.mtd_py),
        qtd_cy: cell(&|r| r.qtd_cy),
        qtd_py: cell(&|r| r.qtd_py),
        ytd_cy: cell(&|r| r.ytd_cy),
        ytd_py: cell(&|r| r.ytd_py),
        py_available: true,
    }
}

/// Synthesize a growth derivative from its base rollup.
fn derive(base: &MetricRollup, derivative: Derivative, method: ComparisonMethod) -> MetricRollup {
    let mut rollup = MetricRollup {
        weekly_cy: vec![None; base.weekly_cy.len()],
        weekly_py: vec![None; base.weekly_py.len()],
        monthly_cy: vec![None; base.monthly_cy.len()],
        monthly_py: vec![None; base.monthly_py.len()],
        py_available: false,
        ..Default::default()
    };
    match derivative {
        Derivative::Wow => {
            for i in 1..base.weekly_cy.len() {
                rollup.weekly_cy[i] = compare(base.weekly_cy[i], base.weekly_cy[i - 1], method);
            }
        }
        Derivative::Mom => {
            for i in 1..base.monthly_cy.len() {
                rollup.monthly_cy[i] = compare(base.monthly_cy[i], base.monthly_cy[i - 1], method);
            }
        }
        Derivative::Yoy => {
            for i in 0..base.weekly_cy.len() {
                rollup.weekly_cy[i] = compare(base.weekly_cy[i], base.weekly_py[i], method);
            }
            for i in 0..base.monthly_cy.len() {
                rollup.monthly_cy[i] = compare(base.monthly_cy[i], base.monthly_py[i], method);
            }
            rollup.mtd_cy = compare(base.mtd_cy, base.mtd_py, method);
            rollup.qtd_cy = compare(base.qtd_cy, base.qtd_py, method);
            rollup.ytd_cy = compare(base.ytd_cy, base.ytd_py, method);
        }
    }
    rollup
}

/// Collapse duplicate dates in a daily column with the metric's aggregation.
///
/// `sum` keeps a partial day (nulls are skipped, all-null stays null);
/// `mean`/`min`/`max` skip nulls; `last` takes the final non-null value.
pub fn group_by_date(
    dates: &[NaiveDate],
    values: &[Option<f64>],
    aggf: AggFunc,
) -> DailySeries {
    let mut series: DailySeries = Vec::new();
    let mut row = 0;
    while row < dates.len() {
        let date = dates[row];
        let mut end = row;
        while end < dates.len() && dates[end] == date {
            end += 1;
        }
        let group: Vec<f64> = values[row..end].iter().flatten().copied().collect();
        let value = if group.is_empty() {
            None
        } else {
            match aggf {
                AggFunc::Sum => Some(group.iter().sum()),
                AggFunc::Mean => Some(group.iter().sum::<f64>() / group.len() as f64),
                AggFunc::Min => group.iter().copied().fold(None, |acc: Option<f64>, v| {
                    Some(acc.map_or(v, |a| a.min(v)))
                }),
                AggFunc::Max => group.iter().copied().fold(None, |acc: Option<f64>, v| {
                    Some(acc.map_or(v, |a| a.max(v)))
                }),
                AggFunc::Last => group.last().copied(),
            }
        };
        series.push((date, value));
        row = end;
    }
    series
}

/// Aggregate a daily series over an inclusive day span.
///
/// An empty span is undefined. `sum` is strict: a null value inside the span
/// makes the whole period undefined, so a week with missing days shows as
/// `N/A` instead of a misleading partial total. With `guard_missing` every
/// aggregation gets that strictness (used for the partial current month).
pub fn aggregate_span(
    series: &DailySeries,
    span: DaySpan,
    aggf: AggFunc,
    guard_missing: bool,
) -> Option<f64> {
    let start = series.partition_point(|(d, _)| *d < span.start);
    let end = series.partition_point(|(d, _)| *d <= span.end);
    let window = &series[start..end];
    if window.is_empty() {
        return None;
    }
    let has_null = window.iter().any(|(_, v)| v.is_none());
    if has_null && (guard_missing || aggf == AggFunc::Sum) {
        return None;
    }
    let values: Vec<f64> = window.iter().filter_map(|(_, v)| *v).collect();
    if values.is_empty() {
        return None;
    }
    match aggf {
        AggFunc::Sum => Some(values.iter().sum()),
        AggFunc::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
        AggFunc::Min => values.iter().copied().reduce(f64::min),
        AggFunc::Max => values.iter().copied().reduce(f64::max),
        AggFunc::Last => values.last().copied(),
    }
}

/// Warn-level helper used by the deck builder when a block repeats a line
/// style; kept here so the engine owns all metric-name diagnostics.
pub fn warn_duplicate_line_style(block_title: &str, metric: &str, style: &str) {
    warn!(
        block = block_title,
        metric, style, "line style already used in this block; first wins"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::{Column, DailyTable};
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// 730 days of data ending 25-SEP-2021 with value = day index + 1,
    /// mirroring the canonical ramp fixture.
    fn ramp_table(column: &str) -> DailyTable {
        let end = date(2021, 9, 25);
        let dates: Vec<NaiveDate> = (0..730)
            .map(|i| end - Duration::days(729 - i))
            .collect();
        let values: Vec<Option<f64>> = (1..=730).map(|v| Some(v as f64)).collect();
        DailyTable::new(
            dates,
            vec![Column {
                name: column.to_string(),
                data: ColumnData::Float(values),
            }],
        )
        .unwrap()
    }

    fn ramp_config(extra: &str) -> Config {
        Config::from_yaml_str(&format!(
            r#"
setup:
  weekEnding: 25-SEP-2021
  weekNumber: 38
metrics:
  Impressions:
    column: ext.Impressions
    aggf: sum
{}
deck: []
"#,
            extra
        ))
        .unwrap()
    }

    fn ramp_engine() -> MetricEngine {
        let cfg = ramp_config("");
        let master = ramp_table("ext.Impressions");
        MetricEngine::build(&cfg, &master).unwrap()
    }

    #[test]
    fn test_weekly_rollups_are_seven_day_sums() {
        let engine = ramp_engine();
        let rollup = engine.rollup("Impressions").unwrap();
        // Latest week covers days 724..=730: sum = 7 * 727.
        assert_relative_eq!(rollup.last_week().unwrap(), 7.0 * 727.0);
        // One week earlier: 7 * 720.
        assert_relative_eq!(rollup.week_cy(4).unwrap(), 7.0 * 720.0);
        // PY week sits 364 days back: day indices shift by 364.
        assert_relative_eq!(rollup.week_py(5).unwrap(), 7.0 * (727.0 - 364.0));
    }

    #[test]
    fn test_monthly_rollups_cover_complete_months() {
        let engine = ramp_engine();
        let months = engine.display_months();
        // Trailing window: Sep 2020 through Aug 2021.
        assert_eq!(months[0], Month { year: 2020, month: 9 });
        assert_eq!(months[11], Month { year: 2021, month: 8 });
        let rollup = engine.rollup("Impressions").unwrap();
        // August 2021: days 675..=705 (31 days ending 20 days before 730).
        let expected: f64 = (675..=705).map(|v| v as f64).sum();
        assert_relative_eq!(rollup.display_months_cy()[11].unwrap(), expected);
    }

    #[test]
    fn test_partial_month_appended_after_trailing_twelve() {
        let engine = ramp_engine();
        let months = engine.display_months();
        // Partial September 2021 follows the twelve complete months.
        assert_eq!(months[12], Month { year: 2021, month: 9 });
        let rollup = engine.rollup("Impressions").unwrap();
        // All 25 September days are present, so the guard passes.
        let expected: f64 = (706..=730).map(|v| v as f64).sum();
        assert_relative_eq!(rollup.display_months_cy()[12].unwrap(), expected);
    }

    #[test]
    fn test_fiscal_extension_months_are_undefined() {
        let engine = ramp_engine();
        let months = engine.display_months();
        // October through December 2021 extend to the fiscal year end.
        assert_eq!(months.last().unwrap(), &Month { year: 2021, month: 12 });
        let rollup = engine.rollup("Impressions").unwrap();
        assert_eq!(rollup.display_months_cy().last().unwrap(), &None);
    }

    #[test]
    fn test_mtd_qtd_ytd() {
        let engine = ramp_engine();
        let rollup = engine.rollup("Impressions").unwrap();
        let mtd: f64 = (706..=730).map(|v| v as f64).sum();
        assert_relative_eq!(rollup.mtd_cy.unwrap(), mtd);
        // QTD: Jul 1 through Sep 25 = days 644..=730.
        let qtd: f64 = (644..=730).map(|v| v as f64).sum();
        assert_relative_eq!(rollup.qtd_cy.unwrap(), qtd);
        // YTD: Jan 1 2021 through Sep 25 = days 463..=730.
        let ytd: f64 = (463..=730).map(|v| v as f64).sum();
        assert_relative_eq!(rollup.ytd_cy.unwrap(), ytd);
        // PY MTD: Sep 1-25 2020, days 341..=365.
        let py_mtd: f64 = (341..=365).map(|v| v as f64).sum();
        assert_relative_eq!(rollup.mtd_py.unwrap(), py_mtd);
    }

    #[test]
    fn test_function_aggregate_first_then_combine() {
        let cfg = Config::from_yaml_str(
            r#"
setup:
  weekEnding: 25-SEP-2021
metrics:
  Clicks:
    column: ext.Clicks
    aggf: sum
  Impressions:
    column: ext.Impressions
    aggf: sum
  ClickThruRate:
    function:
      divide:
        - metric:
            name: Clicks
        - metric:
            name: Impressions
    metricComparisonMethod: bps
deck: []
"#,
        )
        .unwrap();
        // Clicks ramp up, impressions constant: the weekly rate must be
        // sum(clicks)/sum(impressions), not a mean of daily ratios.
        let end = date(2021, 9, 25);
        let dates: Vec<NaiveDate> = (0..730).map(|i| end - Duration::days(729 - i)).collect();
        let clicks: Vec<Option<f64>> = (1..=730).map(|v| Some(v as f64)).collect();
        let impressions: Vec<Option<f64>> = vec![Some(1000.0); 730];
        let master = DailyTable::new(
            dates,
            vec![
                Column {
                    name: "ext.Clicks".into(),
                    data: ColumnData::Float(clicks),
                },
                Column {
                    name: "ext.Impressions".into(),
                    data: ColumnData::Float(impressions),
                },
            ],
        )
        .unwrap();
        let engine = MetricEngine::build(&cfg, &master).unwrap();
        let rate = engine.rollup("ClickThruRate").unwrap();
        assert_relative_eq!(rate.last_week().unwrap(), (7.0 * 727.0) / 7000.0);
    }

    #[test]
    fn test_identical_operands_give_unit_ratio() {
        let cfg = Config::from_yaml_str(
            r#"
setup:
  weekEnding: 25-SEP-2021
metrics:
  Clicks:
    column: ext.Views
    aggf: sum
  Impressions:
    column: ext.Views
    aggf: sum
  ClickThruRate:
    function:
      divide:
        - metric:
            name: Clicks
        - metric:
            name: Impressions
    metricComparisonMethod: bps
deck: []
"#,
        )
        .unwrap();
        let engine = MetricEngine::build(&cfg, &ramp_table("ext.Views")).unwrap();
        let rate = engine.rollup("ClickThruRate").unwrap();
        for k in 0..6 {
            assert_relative_eq!(rate.week_cy(k).unwrap(), 1.0);
        }
        assert_relative_eq!(rate.mtd_cy.unwrap(), 1.0);
    }

    #[test]
    fn test_divide_by_zero_is_undefined() {
        let values = [Some(5.0), Some(0.0)];
        assert_eq!(combine_values(FunctionOp::Divide, &values), None);
        let values = [Some(0.0), Some(0.0)];
        assert_eq!(combine_values(FunctionOp::Divide, &values), None);
        let values = [Some(5.0), None];
        assert_eq!(combine_values(FunctionOp::Divide, &values), None);
    }

    #[test]
    fn test_function_ops() {
        assert_eq!(
            combine_values(FunctionOp::Sum, &[Some(1.0), Some(2.0), Some(3.0)]),
            Some(6.0)
        );
        assert_eq!(
            combine_values(FunctionOp::Difference, &[Some(10.0), Some(2.0), Some(3.0)]),
            Some(5.0)
        );
        assert_eq!(
            combine_values(FunctionOp::Product, &[Some(2.0), Some(3.0)]),
            Some(6.0)
        );
        assert_eq!(
            combine_values(FunctionOp::Divide, &[Some(6.0), Some(3.0)]),
            Some(2.0)
        );
    }

    #[test]
    fn test_growth_derivatives_resolve_without_declaration() {
        let engine = ramp_engine();
        for name in ["ImpressionsWOW", "ImpressionsMOM", "ImpressionsYOY"] {
            assert!(engine.is_defined(name), "{} should resolve", name);
            assert!(engine.is_derivative(name));
        }
        assert!(!engine.is_defined("ImpressionsQOQ"));
    }

    #[test]
    fn test_yoy_symmetry() {
        let engine = ramp_engine();
        let base = engine.rollup("Impressions").unwrap().clone();
        let yoy = engine.rollup("ImpressionsYOY").unwrap();
        for k in 0..6 {
            let expected = base.week_cy(k).unwrap() / base.week_py(k).unwrap() - 1.0;
            assert_relative_eq!(yoy.week_cy(k).unwrap(), expected);
        }
        let expected_mtd = base.mtd_cy.unwrap() / base.mtd_py.unwrap() - 1.0;
        assert_relative_eq!(yoy.mtd_cy.unwrap(), expected_mtd);
    }

    #[test]
    fn test_wow_uses_the_week_before_the_window() {
        let engine = ramp_engine();
        let wow = engine.rollup("ImpressionsWOW").unwrap();
        // Oldest trailing week still has a WOW value thanks to the extra
        // week kept before the window.
        assert!(wow.week_cy(0).is_some());
        // Ramp of slope 1: every week's total is 49 above the prior week's.
        let base = engine.rollup("Impressions").unwrap();
        let expected = base.week_cy(5).unwrap() / base.week_cy(4).unwrap() - 1.0;
        assert_relative_eq!(wow.week_cy(5).unwrap(), expected);
    }

    #[test]
    fn test_bps_metric_compares_by_difference() {
        let cfg = ramp_config(
            r#"  Rate:
    column: ext.Impressions
    aggf: mean
    metricComparisonMethod: bps
"#,
        );
        let master = ramp_table("ext.Impressions");
        let engine = MetricEngine::build(&cfg, &master).unwrap();
        let base = engine.rollup("Rate").unwrap().clone();
        let yoy = engine.rollup("RateYOY").unwrap();
        let expected = base.week_cy(5).unwrap() - base.week_py(5).unwrap();
        assert_relative_eq!(yoy.week_cy(5).unwrap(), expected);
        // Summary scales by 10,000.
        let summary = engine.summary("Rate").unwrap();
        assert_relative_eq!(summary.last_week_yoy.unwrap(), expected * 10_000.0);
    }

    #[test]
    fn test_summary_values_scaled() {
        let engine = ramp_engine();
        let summary = engine.summary("Impressions").unwrap();
        let base = engine.rollup("Impressions").unwrap();
        assert_relative_eq!(summary.last_week.unwrap(), base.last_week().unwrap());
        let expected = (base.week_cy(5).unwrap() / base.week_py(5).unwrap() - 1.0) * 100.0;
        assert_relative_eq!(summary.last_week_yoy.unwrap(), expected);
    }

    #[test]
    fn test_filter_metric_sums_only_matching_rows() {
        let cfg = Config::from_yaml_str(
            r#"
setup:
  weekEnding: 25-SEP-2021
metrics:
  USRevenue:
    filter:
      baseColumn: ext.RevenueUSD
      query: "ext.Country == 'US'"
    aggf: sum
  JPRevenue:
    filter:
      baseColumn: ext.RevenueUSD
      query: "ext.Country == 'JP'"
    aggf: sum
deck: []
"#,
        )
        .unwrap();
        // Two rows per day: US fixed 100, JP fixed 40.
        let end = date(2021, 9, 25);
        let mut dates = Vec::new();
        let mut country = Vec::new();
        let mut revenue = Vec::new();
        for i in 0..730 {
            let day = end - Duration::days(729 - i);
            dates.push(day);
            country.push(Some("US".to_string()));
            revenue.push(Some(100.0));
            dates.push(day);
            country.push(Some("JP".to_string()));
            revenue.push(Some(40.0));
        }
        let master = DailyTable::new(
            dates,
            vec![
                Column {
                    name: "ext.Country".into(),
                    data: ColumnData::Text(country),
                },
                Column {
                    name: "ext.RevenueUSD".into(),
                    data: ColumnData::Float(revenue),
                },
            ],
        )
        .unwrap();
        let engine = MetricEngine::build(&cfg, &master).unwrap();
        assert_relative_eq!(
            engine.rollup("USRevenue").unwrap().last_week().unwrap(),
            700.0
        );
        assert_relative_eq!(
            engine.rollup("JPRevenue").unwrap().last_week().unwrap(),
            280.0
        );
    }

    #[test]
    fn test_duplicate_dates_combined_before_weekly_rollup() {
        let cfg = ramp_config("");
        let end = date(2021, 9, 25);
        // Two rows on the final day, one row on every earlier day.
        let mut dates: Vec<NaiveDate> = (0..30).map(|i| end - Duration::days(29 - i)).collect();
        dates.push(end);
        let mut values: Vec<Option<f64>> = (0..30).map(|_| Some(10.0)).collect();
        values.push(Some(5.0));
        let master = DailyTable::new(
            dates,
            vec![Column {
                name: "ext.Impressions".into(),
                data: ColumnData::Float(values),
            }],
        )
        .unwrap();
        let engine = MetricEngine::build(&cfg, &master).unwrap();
        // Last week: six days of 10 plus a 15 on the final day.
        assert_relative_eq!(
            engine.rollup("Impressions").unwrap().last_week().unwrap(),
            6.0 * 10.0 + 15.0
        );
    }

    #[test]
    fn test_sum_is_strict_about_missing_days() {
        let series: DailySeries = vec![
            (date(2021, 9, 20), Some(1.0)),
            (date(2021, 9, 21), None),
            (date(2021, 9, 22), Some(3.0)),
        ];
        let span = DaySpan::new(date(2021, 9, 19), date(2021, 9, 25));
        assert_eq!(aggregate_span(&series, span, AggFunc::Sum, false), None);
        // Mean skips the null.
        assert_relative_eq!(
            aggregate_span(&series, span, AggFunc::Mean, false).unwrap(),
            2.0
        );
        // The guard makes every aggregation strict.
        assert_eq!(aggregate_span(&series, span, AggFunc::Mean, true), None);
    }

    #[test]
    fn test_last_takes_latest_value_in_period() {
        let series: DailySeries = vec![
            (date(2021, 9, 20), Some(7.0)),
            (date(2021, 9, 24), Some(9.0)),
        ];
        let span = DaySpan::new(date(2021, 9, 19), date(2021, 9, 25));
        assert_eq!(
            aggregate_span(&series, span, AggFunc::Last, false),
            Some(9.0)
        );
        let empty = DaySpan::new(date(2020, 1, 1), date(2020, 1, 7));
        assert_eq!(aggregate_span(&series, empty, AggFunc::Last, false), None);
    }

    #[test]
    fn test_group_by_date_aggfs() {
        let d = date(2021, 9, 1);
        let dates = vec![d, d, d];
        assert_eq!(
            group_by_date(&dates, &[Some(1.0), None, Some(3.0)], AggFunc::Sum),
            vec![(d, Some(4.0))]
        );
        assert_eq!(
            group_by_date(&dates, &[Some(1.0), None, Some(3.0)], AggFunc::Last),
            vec![(d, Some(3.0))]
        );
        assert_eq!(
            group_by_date(&dates, &[None, None, None], AggFunc::Sum),
            vec![(d, None)]
        );
        assert_eq!(
            group_by_date(&dates, &[Some(5.0), Some(1.0), Some(3.0)], AggFunc::Min),
            vec![(d, Some(1.0))]
        );
    }

    #[test]
    fn test_no_rows_before_week_ending_is_a_data_error() {
        let cfg = ramp_config("");
        let master = DailyTable::new(
            vec![date(2022, 1, 1)],
            vec![Column {
                name: "ext.Impressions".into(),
                data: ColumnData::Float(vec![Some(1.0)]),
            }],
        )
        .unwrap();
        let err = MetricEngine::build(&cfg, &master).unwrap_err();
        assert_eq!(err.kind(), "data");
    }

    #[test]
    fn test_constant_operand() {
        let cfg = ramp_config(
            r#"  Commission:
    function:
      product:
        - metric:
            name: Impressions
        - value:
            n: 0.1
"#,
        );
        let master = ramp_table("ext.Impressions");
        let engine = MetricEngine::build(&cfg, &master).unwrap();
        let base = engine.rollup("Impressions").unwrap().clone();
        let commission = engine.rollup("Commission").unwrap();
        assert_relative_eq!(
            commission.last_week().unwrap(),
            base.last_week().unwrap() * 0.1
        );
    }
}
