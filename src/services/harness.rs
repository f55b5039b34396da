//! Scenario harness: re-runs the pipeline over golden scenario directories
//! and diffs the built deck against declared expectations.
//!
//! A scenario directory holds `original.csv` (the daily input),
//! `config.yaml` (the WBR configuration), and `testconfig.yml`:
//!
//! ```yaml
//! tests:
//!   - test:
//!       testCaseNo: "1"
//!       blockTitle: Impressions
//!       cyDataframeLength: 19
//!       xAxis: ["wk 33", ..., "Aug"]
//!       cySixWeeks: [...]
//!       cyTwelveMonths: [...]
//!       pySixWeeks: [...]
//!       pyTwelveMonths: [...]
//!       summaryRow: [Impressions, ...]
//!       headers: [...]          # trailing-table blocks
//!       rows:
//!         - header: US
//!           data: [...]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{WbrError, WbrResult};
use crate::io::loaders::load_daily_csv_from_path;
use crate::models::config::Config;
use crate::models::deck::{Block, CellValue, Deck, SixTwelveChart, TrailingTable};
use crate::services::pipeline::build_deck;

const FLOAT_TOLERANCE: f64 = 1e-6;

/// The declared expectations of one scenario.
#[derive(Debug, Deserialize)]
pub struct TestSuite {
    pub tests: Vec<TestEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TestEntry {
    pub test: TestCase,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default)]
    pub test_case_no: Option<String>,
    /// Matches the block by its title.
    pub block_title: String,
    /// Selects the summary row by metric name; defaults to the first row.
    #[serde(default)]
    pub metric_name: Option<String>,
    #[serde(default)]
    pub cy_dataframe_length: Option<usize>,
    #[serde(default)]
    pub py_dataframe_length: Option<usize>,
    #[serde(default)]
    pub x_axis: Option<Vec<String>>,
    #[serde(default)]
    pub cy_six_weeks: Option<Vec<serde_yaml::Value>>,
    #[serde(default)]
    pub py_six_weeks: Option<Vec<serde_yaml::Value>>,
    #[serde(default)]
    pub cy_twelve_months: Option<Vec<serde_yaml::Value>>,
    #[serde(default)]
    pub py_twelve_months: Option<Vec<serde_yaml::Value>>,
    #[serde(default)]
    pub summary_row: Option<Vec<serde_yaml::Value>>,
    #[serde(default)]
    pub headers: Option<Vec<String>>,
    #[serde(default)]
    pub rows: Option<Vec<ExpectedRow>>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectedRow {
    #[serde(default)]
    pub header: Option<String>,
    pub data: Vec<serde_yaml::Value>,
}

/// Outcome of one comparison.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: Some(message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub test_number: Option<String>,
    pub block_type: Option<String>,
    pub passed: bool,
    pub checks: Vec<CheckResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub scenario: String,
    pub week_ending: String,
    pub fiscal_month: String,
    pub passed: bool,
    pub test_cases: Vec<CaseResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    pub scenarios: Vec<ScenarioResult>,
}

impl HarnessReport {
    pub fn all_passed(&self) -> bool {
        self.scenarios.iter().all(|s| s.passed)
    }
}

/// Walk `scenario*` directories under `suite_dir` and evaluate each one.
pub async fn run_scenarios(suite_dir: &Path) -> WbrResult<HarnessReport> {
    let mut directories: Vec<_> = std::fs::read_dir(suite_dir)
        .map_err(|e| {
            WbrError::data(format!(
                "could not read test suite directory '{}': {}",
                suite_dir.display(),
                e
            ))
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.contains("scenario"))
                    .unwrap_or(false)
        })
        .collect();
    directories.sort();

    let mut scenarios = Vec::with_capacity(directories.len());
    for directory in directories {
        scenarios.push(run_scenario(&directory).await?);
    }
    Ok(HarnessReport { scenarios })
}

/// Build and evaluate one scenario directory.
pub async fn run_scenario(directory: &Path) -> WbrResult<ScenarioResult> {
    let name = directory
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("scenario")
        .to_string();

    let config_text = std::fs::read_to_string(directory.join("config.yaml"))
        .map_err(|e| WbrError::data(format!("scenario '{}' has no config.yaml: {}", name, e)))?;
    let cfg = Config::from_yaml_str(&config_text)?;
    let table = load_daily_csv_from_path(&directory.join("original.csv"))?;
    let suite_text = std::fs::read_to_string(directory.join("testconfig.yml"))
        .map_err(|e| WbrError::data(format!("scenario '{}' has no testconfig.yml: {}", name, e)))?;
    let suite: TestSuite = serde_yaml::from_str(&suite_text).map_err(|e| {
        WbrError::config(format!("{}/testconfig.yml", name), e.to_string())
    })?;

    let deck = build_deck(&cfg, Some(table)).await?;

    let test_cases: Vec<CaseResult> = suite
        .tests
        .iter()
        .map(|entry| evaluate_case(&deck, &entry.test))
        .collect();
    let passed = test_cases.iter().all(|c| c.passed);

    Ok(ScenarioResult {
        scenario: name,
        week_ending: deck.week_ending.clone(),
        fiscal_month: cfg.setup.fiscal_year_end_month().to_string(),
        passed,
        test_cases,
    })
}

fn evaluate_case(deck: &Deck, case: &TestCase) -> CaseResult {
    let block = deck
        .blocks
        .iter()
        .find(|b| b.title() == Some(case.block_title.as_str()));

    let (block_type, checks) = match block {
        None => (
            None,
            vec![CheckResult::fail(
                "blockExists",
                format!("no block titled '{}'", case.block_title),
            )],
        ),
        Some(Block::Graph(chart)) => (
            Some("SixTwelveChart".to_string()),
            evaluate_chart(chart, case),
        ),
        Some(Block::Table(table)) => (
            Some("TrailingTable".to_string()),
            evaluate_table(table, case),
        ),
        Some(_) => (
            None,
            vec![CheckResult::fail(
                "blockType",
                format!("block '{}' is not a chart or table", case.block_title),
            )],
        ),
    };

    CaseResult {
        test_number: case.test_case_no.clone(),
        block_type,
        passed: checks.iter().all(|c| c.passed),
        checks,
    }
}

fn evaluate_chart(chart: &SixTwelveChart, case: &TestCase) -> Vec<CheckResult> {
    let mut checks = Vec::new();

    let series = chart
        .y_axis
        .first()
        .and_then(|entry| entry.metric.as_ref().or(entry.target.as_ref()));
    let current_weekly: &[CellValue] = series
        .and_then(|s| s.current.first())
        .map(|s| s.values())
        .unwrap_or(&[]);
    let current_monthly: &[CellValue] = series
        .and_then(|s| s.current.get(1))
        .map(|s| s.values())
        .unwrap_or(&[]);
    let py_weekly: &[CellValue] = series
        .and_then(|s| s.previous.first())
        .map(|s| s.values())
        .unwrap_or(&[]);
    let py_monthly: &[CellValue] = series
        .and_then(|s| s.previous.get(1))
        .map(|s| s.values())
        .unwrap_or(&[]);

    if let Some(expected) = case.cy_dataframe_length {
        checks.push(check_equal(
            "cyDataframeLength",
            &expected.to_string(),
            &current_weekly.len().to_string(),
        ));
    }
    if let Some(expected) = case.py_dataframe_length {
        checks.push(check_equal(
            "pyDataframeLength",
            &expected.to_string(),
            &py_weekly.len().to_string(),
        ));
    }
    if let Some(expected) = &case.x_axis {
        checks.push(check_equal(
            "xAxis",
            &format!("{:?}", expected),
            &format!("{:?}", chart.x_axis),
        ));
    }
    if let Some(expected) = &case.cy_six_weeks {
        let actual = current_weekly.get(..6).unwrap_or(current_weekly);
        checks.push(check_cells("cySixWeeks", expected, actual));
    }
    if let Some(expected) = &case.py_six_weeks {
        let actual = if py_weekly.len() >= 6 {
            &py_weekly[..6]
        } else {
            py_weekly
        };
        checks.push(check_cells("pySixWeeks", expected, actual));
    }
    if let Some(expected) = &case.cy_twelve_months {
        let actual = if current_monthly.len() >= 19 {
            &current_monthly[7..19]
        } else {
            current_monthly
        };
        checks.push(check_cells("cyTwelveMonths", expected, actual));
    }
    if let Some(expected) = &case.py_twelve_months {
        let actual = if py_monthly.len() >= 19 {
            &py_monthly[7..19]
        } else {
            py_monthly
        };
        checks.push(check_cells("pyTwelveMonths", expected, actual));
    }
    if let Some(expected) = &case.summary_row {
        let row = match &case.metric_name {
            Some(metric) => chart.table.table_body.iter().find(|row| {
                matches!(row.first(), Some(CellValue::Text(name)) if name == metric)
            }),
            None => chart.table.table_body.first(),
        };
        match row {
            Some(row) => checks.push(check_cells("summaryRow", expected, row)),
            None => checks.push(CheckResult::fail(
                "summaryRow",
                "no summary row found".to_string(),
            )),
        }
    }

    checks
}

fn evaluate_table(table: &TrailingTable, case: &TestCase) -> Vec<CheckResult> {
    let mut checks = Vec::new();

    if let Some(expected) = &case.headers {
        checks.push(check_equal(
            "headers",
            &format!("{:?}", expected),
            &format!("{:?}", table.headers),
        ));
    }
    if let Some(expected_rows) = &case.rows {
        for (index, expected) in expected_rows.iter().enumerate() {
            let name = format!("rows[{}]", index);
            let actual = match &expected.header {
                Some(header) => table.rows.iter().find(|r| &r.row_header == header),
                None => table.rows.get(index),
            };
            match actual {
                Some(row) => checks.push(check_cells(&name, &expected.data, &row.row_data)),
                None => checks.push(CheckResult::fail(
                    &name,
                    format!("no matching table row for {:?}", expected.header),
                )),
            }
        }
    }

    checks
}

fn check_equal(name: &str, expected: &str, actual: &str) -> CheckResult {
    if expected == actual {
        CheckResult::pass(name)
    } else {
        CheckResult::fail(
            name,
            format!("expected {} but calculated {}", expected, actual),
        )
    }
}

fn check_cells(name: &str, expected: &[serde_yaml::Value], actual: &[CellValue]) -> CheckResult {
    if expected.len() != actual.len() {
        return CheckResult::fail(
            name,
            format!(
                "expected {} values but calculated {}",
                expected.len(),
                actual.len()
            ),
        );
    }
    for (index, (want, got)) in expected.iter().zip(actual.iter()).enumerate() {
        if !cell_matches(want, got) {
            return CheckResult::fail(
                name,
                format!(
                    "mismatch at index {}: expected {:?} but calculated {:?}",
                    index, want, got
                ),
            );
        }
    }
    CheckResult::pass(name)
}

fn cell_matches(expected: &serde_yaml::Value, actual: &CellValue) -> bool {
    match (expected, actual) {
        (serde_yaml::Value::Number(want), CellValue::Number(got)) => {
            let want = want.as_f64().unwrap_or(f64::NAN);
            let scale = want.abs().max(got.abs()).max(1.0);
            (want - got).abs() <= FLOAT_TOLERANCE * scale
        }
        (serde_yaml::Value::String(want), CellValue::Text(got)) => want == got,
        // A numeric string expectation against a numeric cell.
        (serde_yaml::Value::String(want), CellValue::Number(got)) => want
            .parse::<f64>()
            .map(|w| (w - got).abs() <= FLOAT_TOLERANCE * w.abs().max(1.0))
            .unwrap_or(false),
        (serde_yaml::Value::Null, CellValue::Text(got)) => got.trim().is_empty(),
        _ => false,
    }
}
