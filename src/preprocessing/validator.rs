//! Config validation with detailed, gathered error reporting.
//!
//! Validation is total: every check runs and every failure is collected, so
//! a user fixes one round of errors instead of replaying them one at a
//! time. Structural YAML errors are caught earlier, at deserialization.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{WbrError, WbrResult};
use crate::formatting::ScaleMask;
use crate::models::calendar::{parse_fiscal_month, parse_week_ending};
use crate::models::config::{
    split_reserved_suffix, BlockSpec, Config, FunctionOp, MetricSpec, Operand, X_AXIS_FISCAL,
    X_AXIS_TRAILING,
};
use crate::parsing::filter::parse_filter;

/// One validation finding.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigIssue {
    /// Stable error kind tag.
    pub kind: String,
    /// Config path such as `metrics.ClickThruRate.function`.
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ConfigIssue>,
    pub warnings: Vec<ConfigIssue>,
}

impl ValidationReport {
    fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn add_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(ConfigIssue {
            kind: "config".to_string(),
            path: path.into(),
            message: message.into(),
        });
    }

    fn add_warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigIssue {
            kind: "config".to_string(),
            path: path.into(),
            message: message.into(),
        });
    }

    /// Collapse the report into a fatal error when invalid.
    pub fn into_result(self) -> WbrResult<()> {
        if self.is_valid {
            return Ok(());
        }
        let summary = self
            .errors
            .iter()
            .map(|issue| format!("{}: {}", issue.path, issue.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(WbrError::config("config", summary))
    }
}

/// Validator for the parsed WBR configuration.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Run every check and gather the findings.
    pub fn validate(cfg: &Config) -> ValidationReport {
        let mut report = ValidationReport::new();

        Self::check_setup(cfg, &mut report);
        Self::check_metrics(cfg, &mut report);
        Self::check_function_cycles(cfg, &mut report);
        Self::check_deck(cfg, &mut report);

        report
    }

    fn check_setup(cfg: &Config, report: &mut ValidationReport) {
        if let Err(err) = parse_week_ending(&cfg.setup.week_ending) {
            report.add_error("setup.weekEnding", err.to_string());
        }
        if let Err(err) = parse_fiscal_month(cfg.setup.fiscal_year_end_month()) {
            report.add_error("setup.fiscalYearEndMonth", err.to_string());
        }
        if let Some(mode) = cfg.setup.x_axis_monthly_display.as_deref() {
            Self::check_axis_mode(mode, "setup.xAxisMonthlyDisplay", report);
        }
        if let Some(week_number) = cfg.setup.week_number {
            if week_number == 0 || week_number > 53 {
                report.add_warning(
                    "setup.weekNumber",
                    format!("week number {} is outside 1..=53", week_number),
                );
            }
        }
    }

    fn check_axis_mode(mode: &str, path: &str, report: &mut ValidationReport) {
        if mode != X_AXIS_TRAILING && mode != X_AXIS_FISCAL {
            report.add_error(
                path,
                format!(
                    "expected '{}' or '{}' but got '{}'",
                    X_AXIS_TRAILING, X_AXIS_FISCAL, mode
                ),
            );
        }
    }

    /// Whether `name` resolves to a declared metric or an auto-generated
    /// growth derivative of one.
    pub fn resolves(cfg: &Config, name: &str) -> bool {
        if cfg.metrics.contains_key(name) {
            return true;
        }
        split_reserved_suffix(name)
            .map(|(base, _)| cfg.metrics.contains_key(base))
            .unwrap_or(false)
    }

    fn check_metrics(cfg: &Config, report: &mut ValidationReport) {
        for (name, spec) in cfg.metrics.iter() {
            let path = format!("metrics.{}", name);

            if split_reserved_suffix(name).is_some() {
                report.add_error(
                    &path,
                    "metric names ending in WOW, MOM or YOY are reserved for \
                     auto-generated growth metrics",
                );
            }

            match spec {
                MetricSpec::Basic { column, .. } => {
                    if column.is_empty() {
                        report.add_error(format!("{}.column", path), "column must not be empty");
                    }
                }
                MetricSpec::Filter { filter, .. } => {
                    if filter.base_column.is_empty() {
                        report.add_error(
                            format!("{}.filter.baseColumn", path),
                            "baseColumn must not be empty",
                        );
                    }
                    if let Err(err) = parse_filter(&filter.query) {
                        report.add_error(format!("{}.filter.query", path), err);
                    }
                }
                MetricSpec::Function { function, .. } => {
                    let fn_path = format!("{}.function", path);
                    if function.operands.is_empty() {
                        report.add_error(&fn_path, "function has no operands");
                    }
                    if function.op == FunctionOp::Divide && function.operands.len() != 2 {
                        report.add_error(
                            &fn_path,
                            format!(
                                "divide takes exactly 2 operands, got {}",
                                function.operands.len()
                            ),
                        );
                    }
                    for operand in &function.operands {
                        if let Operand::Metric { metric } = operand {
                            if !Self::resolves(cfg, &metric.name) {
                                report.add_error(
                                    &fn_path,
                                    format!(
                                        "operand metric '{}' is not defined in the metrics \
                                         section",
                                        metric.name
                                    ),
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    /// Reject cycles in the `functionMetric -> operandMetric` graph with a
    /// depth-first topological walk.
    fn check_function_cycles(cfg: &Config, report: &mut ValidationReport) {
        // Edges only between declared metrics; derivative references point
        // at their base metric.
        let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
        for (name, spec) in cfg.metrics.iter() {
            if let MetricSpec::Function { function, .. } = spec {
                let deps = function
                    .operands
                    .iter()
                    .filter_map(|operand| match operand {
                        Operand::Metric { metric } => {
                            let name = metric.name.as_str();
                            if cfg.metrics.contains_key(name) {
                                Some(name)
                            } else {
                                split_reserved_suffix(name)
                                    .map(|(base, _)| base)
                                    .filter(|base| cfg.metrics.contains_key(*base))
                            }
                        }
                        Operand::Value { .. } => None,
                    })
                    .collect();
                edges.insert(name, deps);
            }
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            node: &'a str,
            edges: &HashMap<&'a str, Vec<&'a str>>,
            marks: &mut HashMap<&'a str, Mark>,
            cycle: &mut Option<String>,
        ) {
            match marks.get(node) {
                Some(Mark::Done) => return,
                Some(Mark::Visiting) => {
                    cycle.get_or_insert_with(|| node.to_string());
                    return;
                }
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            if let Some(deps) = edges.get(node) {
                for &dep in deps {
                    visit(dep, edges, marks, cycle);
                }
            }
            marks.insert(node, Mark::Done);
        }

        let mut marks = HashMap::new();
        let mut cycle = None;
        let nodes: Vec<&str> = edges.keys().copied().collect();
        for node in nodes {
            visit(node, &edges, &mut marks, &mut cycle);
        }
        if let Some(node) = cycle {
            report.add_error(
                format!("metrics.{}", node),
                "circular dependency between function metrics",
            );
        }
    }

    fn check_deck(cfg: &Config, report: &mut ValidationReport) {
        for (index, block) in cfg.deck.iter().enumerate() {
            let path = format!("deck[{}]", index);
            match block {
                BlockSpec::SixTwelveGraph {
                    y_scaling,
                    x_axis_monthly_display,
                    metrics,
                    ..
                } => {
                    if metrics.is_empty() {
                        report.add_error(
                            format!("{}.metrics", path),
                            "a 6_12Graph block must name at least one metric",
                        );
                    }
                    if let Some(mask) = y_scaling.as_deref() {
                        if let Err(err) = ScaleMask::parse(mask) {
                            report.add_error(format!("{}.yScaling", path), err);
                        }
                    }
                    if let Some(mode) = x_axis_monthly_display.as_deref() {
                        Self::check_axis_mode(
                            mode,
                            &format!("{}.xAxisMonthlyDisplay", path),
                            report,
                        );
                    }
                    for (metric, _) in metrics.iter() {
                        if !Self::resolves(cfg, metric) {
                            report.add_error(
                                format!("{}.metrics.{}", path, metric),
                                format!("metric '{}' is not defined", metric),
                            );
                        }
                    }
                }
                BlockSpec::SixWeeksTable { rows, .. } => {
                    Self::check_rows(cfg, rows, &path, report);
                }
                BlockSpec::TwelveMonthsTable {
                    rows,
                    x_axis_monthly_display,
                    ..
                } => {
                    if let Some(mode) = x_axis_monthly_display.as_deref() {
                        Self::check_axis_mode(
                            mode,
                            &format!("{}.xAxisMonthlyDisplay", path),
                            report,
                        );
                    }
                    Self::check_rows(cfg, rows, &path, report);
                }
                BlockSpec::Section { .. } => {}
                BlockSpec::EmbeddedContent { source, .. } => {
                    if source.is_empty() {
                        report.add_error(format!("{}.source", path), "source must not be empty");
                    }
                }
            }
        }
    }

    fn check_rows(
        cfg: &Config,
        rows: &[crate::models::config::RowSpec],
        path: &str,
        report: &mut ValidationReport,
    ) {
        let mut seen_headers = HashSet::new();
        for (index, row) in rows.iter().enumerate() {
            let row_path = format!("{}.rows[{}]", path, index);
            if let Some(metric) = row.metric.as_deref() {
                if !Self::resolves(cfg, metric) {
                    report.add_error(
                        format!("{}.metric", row_path),
                        format!("metric '{}' is not defined", metric),
                    );
                }
            }
            if let Some(mask) = row.y_scaling.as_deref() {
                if let Err(err) = ScaleMask::parse(mask) {
                    report.add_error(format!("{}.yScaling", row_path), err);
                }
            }
            if let Some(header) = row.header.as_deref() {
                if !seen_headers.insert(header.to_string()) {
                    report.add_warning(
                        format!("{}.header", row_path),
                        format!("duplicate row header '{}'", header),
                    );
                }
            }
        }
    }
}
