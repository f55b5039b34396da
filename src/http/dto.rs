//! Request DTOs for the HTTP API.

use serde::Deserialize;

use crate::models::config::Setup;

/// Query-parameter overrides accepted by the report endpoints. Any field
/// present replaces the corresponding `setup` value from the uploaded YAML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub week_ending: Option<String>,
    pub week_number: Option<u32>,
    pub title: Option<String>,
    pub fiscal_year_end_month: Option<String>,
    pub block_starting_number: Option<u32>,
    pub tooltip: Option<bool>,
    /// Consumed by the external publisher flow; accepted and ignored here.
    pub password: Option<String>,
    /// `JSON` or `HTML`; rendering is the browser renderer's concern, so the
    /// deck JSON is returned either way.
    pub output_type: Option<String>,
}

impl ReportQuery {
    /// Apply the overrides onto a parsed setup section.
    pub fn apply_to(&self, setup: &mut Setup) {
        if let Some(week_ending) = &self.week_ending {
            setup.week_ending = week_ending.clone();
        }
        if let Some(week_number) = self.week_number {
            setup.week_number = Some(week_number);
        }
        if let Some(title) = &self.title {
            setup.title = Some(title.clone());
        }
        if let Some(fiscal) = &self.fiscal_year_end_month {
            setup.fiscal_year_end_month = Some(fiscal.clone());
        }
        if let Some(number) = self.block_starting_number {
            setup.block_starting_number = Some(number);
        }
        if let Some(tooltip) = self.tooltip {
            setup.tooltip = tooltip;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::Config;

    #[test]
    fn test_overrides_replace_setup_values() {
        let mut cfg = Config::from_yaml_str(
            r#"
setup:
  weekEnding: 25-SEP-2021
  title: Original
metrics:
  A:
    column: A
    aggf: sum
deck: []
"#,
        )
        .unwrap();
        let query = ReportQuery {
            week_ending: Some("02-OCT-2021".to_string()),
            tooltip: Some(true),
            ..Default::default()
        };
        query.apply_to(&mut cfg.setup);
        assert_eq!(cfg.setup.week_ending, "02-OCT-2021");
        assert_eq!(cfg.setup.title.as_deref(), Some("Original"));
        assert!(cfg.setup.tooltip);
    }
}
