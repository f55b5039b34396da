//! Typed model of the WBR YAML configuration.
//!
//! Metric kinds are a closed sum (basic, filter, function) because the
//! engine branches on kind at materialization. Mapping order is preserved
//! everywhere it is semantic: metric declaration order breaks topological
//! ties, data-source order fixes merged column order, and deck order is the
//! layout.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::error::{WbrError, WbrResult};

/// A string-keyed map that preserves YAML insertion order and rejects
/// duplicate keys.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(pub Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for MapVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, V)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    if entries.iter().any(|(k, _)| *k == key) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate key '{}'",
                            key
                        )));
                    }
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(MapVisitor(PhantomData))
    }
}

/// The full user-authored configuration, immutable per run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub setup: Setup,
    #[serde(default)]
    pub data_sources: Option<DataSources>,
    #[serde(default)]
    pub annotations: Option<AnnotationsConfig>,
    pub metrics: OrderedMap<MetricSpec>,
    pub deck: Vec<BlockSpec>,
}

impl Config {
    pub fn from_yaml_str(text: &str) -> WbrResult<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| WbrError::config("yaml", format!("could not parse configuration: {}", e)))
    }
}

/// The `setup` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Mandatory `DD-MMM-YYYY` week-ending date.
    pub week_ending: String,
    pub week_number: Option<u32>,
    pub title: Option<String>,
    /// Three-letter month, defaults to DEC.
    pub fiscal_year_end_month: Option<String>,
    pub block_starting_number: Option<u32>,
    #[serde(default)]
    pub tooltip: bool,
    pub db_config_url: Option<String>,
    /// Deck-wide monthly display: `trailing_twelve_months` or `fiscal_year`.
    pub x_axis_monthly_display: Option<String>,
}

impl Setup {
    pub fn fiscal_year_end_month(&self) -> &str {
        self.fiscal_year_end_month.as_deref().unwrap_or("DEC")
    }

    pub fn block_starting_number(&self) -> u32 {
        self.block_starting_number.unwrap_or(1)
    }
}

/// Key under `dataSources` that holds CSV sources instead of a connection.
pub const CSV_FILES_KEY: &str = "csvFiles";

/// The `dataSources` section: connection name (or `csvFiles`) to a group of
/// aliased sources.
#[derive(Debug, Clone, Deserialize)]
pub struct DataSources(pub OrderedMap<SourceGroup>);

/// The sources declared under one `dataSources` key.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceGroup {
    /// `csvFiles`: alias to file location.
    Csv(OrderedMap<CsvSource>),
    /// A connection: query alias to query text.
    Queries(OrderedMap<QuerySource>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CsvSource {
    pub url_or_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySource {
    pub query: String,
}

/// The `annotations` section: either a flat list of CSV locations or a
/// mapping with `csvFiles` and/or `dataSources`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AnnotationsConfig {
    Files(Vec<String>),
    Sources {
        #[serde(default, rename = "csvFiles")]
        csv_files: Vec<String>,
        #[serde(default, rename = "dataSources")]
        data_sources: OrderedMap<OrderedMap<QuerySource>>,
    },
}

/// Aggregation function applied when collapsing daily rows into a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    Sum,
    Mean,
    Min,
    Max,
    Last,
}

/// How growth and variance are reported for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ComparisonMethod {
    /// Relative change `(CY / PY) - 1`, displayed x100.
    #[default]
    #[serde(rename = "%")]
    PctChange,
    /// Absolute difference `CY - PY`, displayed x10,000.
    #[serde(rename = "bps")]
    Bps,
}

/// One metric declaration: exactly one of the three kinds.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MetricSpec {
    Function {
        function: FunctionSpec,
        #[serde(rename = "metricComparisonMethod")]
        metric_comparison_method: Option<ComparisonMethod>,
    },
    Filter {
        filter: FilterSpec,
        aggf: AggFunc,
        #[serde(rename = "metricComparisonMethod")]
        metric_comparison_method: Option<ComparisonMethod>,
    },
    Basic {
        column: String,
        aggf: AggFunc,
        #[serde(rename = "metricComparisonMethod")]
        metric_comparison_method: Option<ComparisonMethod>,
    },
}

impl MetricSpec {
    pub fn comparison_method(&self) -> ComparisonMethod {
        match self {
            MetricSpec::Function {
                metric_comparison_method,
                ..
            }
            | MetricSpec::Filter {
                metric_comparison_method,
                ..
            }
            | MetricSpec::Basic {
                metric_comparison_method,
                ..
            } => metric_comparison_method.unwrap_or_default(),
        }
    }

    pub fn aggf(&self) -> Option<AggFunc> {
        match self {
            MetricSpec::Function { .. } => None,
            MetricSpec::Filter { aggf, .. } | MetricSpec::Basic { aggf, .. } => Some(*aggf),
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, MetricSpec::Function { .. })
    }
}

/// A filter metric: row predicate over the merged table, then aggregation of
/// the base column.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FilterSpec {
    pub base_column: String,
    pub query: String,
}

/// Operation of a function metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionOp {
    Sum,
    Difference,
    Divide,
    Product,
}

impl FunctionOp {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Self::Sum),
            "difference" => Some(Self::Difference),
            "divide" => Some(Self::Divide),
            "product" => Some(Self::Product),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Difference => "difference",
            Self::Divide => "divide",
            Self::Product => "product",
        }
    }
}

/// A function metric body: `{op: [operand, ...]}` with exactly one op key.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub op: FunctionOp,
    pub operands: Vec<Operand>,
}

impl<'de> Deserialize<'de> for FunctionSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FnVisitor;

        impl<'de> Visitor<'de> for FnVisitor {
            type Value = FunctionSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping with one of: sum, difference, divide, product")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut spec: Option<FunctionSpec> = None;
                while let Some((key, operands)) = access.next_entry::<String, Vec<Operand>>()? {
                    let op = FunctionOp::parse(&key).ok_or_else(|| {
                        serde::de::Error::custom(format!(
                            "unknown function op '{}'; expected sum, difference, divide or product",
                            key
                        ))
                    })?;
                    if spec.is_some() {
                        return Err(serde::de::Error::custom(
                            "a function must declare exactly one op",
                        ));
                    }
                    spec = Some(FunctionSpec { op, operands });
                }
                spec.ok_or_else(|| serde::de::Error::custom("empty function body"))
            }
        }

        deserializer.deserialize_map(FnVisitor)
    }
}

/// A function operand: another metric, or a constant.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Metric { metric: MetricRef },
    Value { value: ValueOperand },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueOperand {
    pub n: f64,
}

/// Line rendering style for a graph metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Primary,
    Secondary,
    Tertiary,
    Quaternary,
    /// Scatter-only target series; contributes no summary-table row.
    Target,
}

impl LineStyle {
    pub fn name(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Tertiary => "tertiary",
            Self::Quaternary => "quaternary",
            Self::Target => "target",
        }
    }
}

/// Per-metric options inside a `6_12Graph` block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetric {
    pub line_style: Option<LineStyle>,
    pub legend_name: Option<String>,
    pub graph_prior_year_flag: Option<bool>,
}

impl GraphMetric {
    pub fn line_style(&self) -> LineStyle {
        self.line_style.unwrap_or_default()
    }

    pub fn graph_prior_year(&self) -> bool {
        self.graph_prior_year_flag.unwrap_or(true)
    }
}

/// A row declaration inside a trailing-table block. A row without a metric
/// renders as an empty row with the table's column count.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowSpec {
    pub header: Option<String>,
    pub metric: Option<String>,
    pub style: Option<String>,
    pub y_scaling: Option<String>,
}

/// One declared deck block, discriminated by `uiType`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "uiType")]
pub enum BlockSpec {
    #[serde(rename = "6_12Graph", rename_all = "camelCase")]
    SixTwelveGraph {
        title: Option<String>,
        y_scaling: Option<String>,
        axes: Option<u8>,
        x_axis_monthly_display: Option<String>,
        /// Metric name to options; a bare `Name:` entry takes all defaults.
        metrics: OrderedMap<Option<GraphMetric>>,
    },
    #[serde(rename = "6_WeeksTable", rename_all = "camelCase")]
    SixWeeksTable {
        title: Option<String>,
        rows: Vec<RowSpec>,
    },
    #[serde(rename = "12_MonthsTable", rename_all = "camelCase")]
    TwelveMonthsTable {
        title: Option<String>,
        x_axis_monthly_display: Option<String>,
        rows: Vec<RowSpec>,
    },
    #[serde(rename = "section", rename_all = "camelCase")]
    Section { title: Option<String> },
    #[serde(rename = "embedded_content", rename_all = "camelCase")]
    EmbeddedContent {
        title: Option<String>,
        source: String,
        name: Option<String>,
        width: Option<String>,
        height: Option<String>,
    },
}

impl BlockSpec {
    /// Whether this block advances the deck's block counter.
    pub fn is_numbered(&self) -> bool {
        matches!(
            self,
            BlockSpec::SixTwelveGraph { .. }
                | BlockSpec::SixWeeksTable { .. }
                | BlockSpec::TwelveMonthsTable { .. }
        )
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            BlockSpec::SixTwelveGraph { title, .. }
            | BlockSpec::SixWeeksTable { title, .. }
            | BlockSpec::TwelveMonthsTable { title, .. }
            | BlockSpec::Section { title }
            | BlockSpec::EmbeddedContent { title, .. } => title.as_deref(),
        }
    }
}

/// Reserved suffixes for auto-generated growth derivatives.
pub const RESERVED_SUFFIXES: [&str; 3] = ["WOW", "MOM", "YOY"];

/// Split an auto-metric name into its base and suffix, if it has one.
pub fn split_reserved_suffix(name: &str) -> Option<(&str, &str)> {
    RESERVED_SUFFIXES.iter().find_map(|suffix| {
        name.strip_suffix(suffix)
            .filter(|base| !base.is_empty())
            .map(|base| (base, *suffix))
    })
}

/// Valid values for `xAxisMonthlyDisplay`.
pub const X_AXIS_TRAILING: &str = "trailing_twelve_months";
pub const X_AXIS_FISCAL: &str = "fiscal_year";
