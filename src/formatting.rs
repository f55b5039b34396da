//! Numeric formatting under the `##(.n){BB,MM,KK,%,bps}` mask grammar.
//!
//! A mask is `##`, optionally `.` plus a single precision digit (0-3),
//! followed by an optional unit. The formatter applies the unit's operation,
//! rounds to the precision, and appends the unit suffix. Comparison values
//! are formatted by the metric's comparison method instead, regardless of
//! the display mask: `%` with two decimals, `bps` as an integer.

use crate::models::config::ComparisonMethod;

/// Unit part of a scaling mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleUnit {
    Billions,
    Millions,
    Thousands,
    Percent,
    BasisPoints,
    #[default]
    None,
}

impl ScaleUnit {
    fn suffix(self) -> &'static str {
        match self {
            Self::Billions => "B",
            Self::Millions => "M",
            Self::Thousands => "K",
            Self::Percent => "%",
            Self::BasisPoints => "bps",
            Self::None => "",
        }
    }

    fn apply(self, value: f64) -> f64 {
        match self {
            Self::Billions => value / 1e9,
            Self::Millions => value / 1e6,
            Self::Thousands => value / 1e3,
            Self::Percent => value * 100.0,
            Self::BasisPoints => value * 10_000.0,
            Self::None => value,
        }
    }
}

/// A parsed `##(.n)unit` scaling mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScaleMask {
    pub precision: u8,
    pub unit: ScaleUnit,
}

impl ScaleMask {
    /// Parse a mask string. The empty string is the identity mask.
    pub fn parse(mask: &str) -> Result<Self, String> {
        if mask.is_empty() {
            return Ok(Self::default());
        }
        let rest = mask
            .strip_prefix("##")
            .ok_or_else(|| format!("mask '{}' must start with ##", mask))?;

        let (precision, rest) = match rest.strip_prefix('.') {
            Some(tail) => {
                let digit = tail
                    .chars()
                    .next()
                    .and_then(|c| c.to_digit(10))
                    .ok_or_else(|| format!("mask '{}' has no precision digit after '.'", mask))?;
                if digit > 3 {
                    return Err(format!(
                        "mask '{}' precision must be between 0 and 3",
                        mask
                    ));
                }
                (digit as u8, &tail[1..])
            }
            None => (0, rest),
        };

        let unit = match rest {
            "" => ScaleUnit::None,
            "BB" => ScaleUnit::Billions,
            "MM" => ScaleUnit::Millions,
            "KK" => ScaleUnit::Thousands,
            "%" => ScaleUnit::Percent,
            "bps" => ScaleUnit::BasisPoints,
            other => return Err(format!("mask '{}' has unknown unit '{}'", mask, other)),
        };

        Ok(Self { precision, unit })
    }

    /// Format a value under this mask.
    pub fn format(&self, value: f64) -> String {
        let scaled = self.unit.apply(value);
        format!(
            "{:.*}{}",
            self.precision as usize,
            scaled,
            self.unit.suffix()
        )
    }
}

/// Format a cell that may carry the `"N/A"` pass-through.
pub fn format_cell(value: &str, mask: &ScaleMask) -> String {
    if value == "N/A" {
        return value.to_string();
    }
    match value.parse::<f64>() {
        Ok(v) => mask.format(v),
        Err(_) => value.to_string(),
    }
}

/// Format a raw comparison ratio/difference under the metric's comparison
/// method: `%` with two decimals, `bps` as an integer.
pub fn format_comparison(value: f64, method: ComparisonMethod) -> String {
    match method {
        ComparisonMethod::PctChange => format!("{:.2}%", value * 100.0),
        ComparisonMethod::Bps => format!("{:.0}bps", value * 10_000.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_masks() {
        assert_eq!(
            ScaleMask::parse("##").unwrap(),
            ScaleMask { precision: 0, unit: ScaleUnit::None }
        );
        assert_eq!(
            ScaleMask::parse("##MM").unwrap(),
            ScaleMask { precision: 0, unit: ScaleUnit::Millions }
        );
        assert_eq!(
            ScaleMask::parse("##.2MM").unwrap(),
            ScaleMask { precision: 2, unit: ScaleUnit::Millions }
        );
        assert_eq!(
            ScaleMask::parse("##.0%").unwrap(),
            ScaleMask { precision: 0, unit: ScaleUnit::Percent }
        );
        assert_eq!(
            ScaleMask::parse("##bps").unwrap(),
            ScaleMask { precision: 0, unit: ScaleUnit::BasisPoints }
        );
        assert_eq!(ScaleMask::parse("").unwrap(), ScaleMask::default());
    }

    #[test]
    fn test_parse_rejects_bad_masks() {
        assert!(ScaleMask::parse("#").is_err());
        assert!(ScaleMask::parse("##.4MM").is_err());
        assert!(ScaleMask::parse("##.MM").is_err());
        assert!(ScaleMask::parse("##GG").is_err());
        assert!(ScaleMask::parse("MM").is_err());
    }

    #[test]
    fn test_format_magnitudes() {
        assert_eq!(ScaleMask::parse("##.2MM").unwrap().format(1_234_567.0), "1.23M");
        assert_eq!(ScaleMask::parse("##BB").unwrap().format(2.6e9), "3B");
        assert_eq!(ScaleMask::parse("##.1KK").unwrap().format(1_500.0), "1.5K");
        assert_eq!(ScaleMask::parse("##").unwrap().format(42.4), "42");
    }

    #[test]
    fn test_format_rates() {
        assert_eq!(ScaleMask::parse("##.1%").unwrap().format(0.1234), "12.3%");
        // A ratio of 1.0 in basis points: the scenario-2 expectation.
        assert_eq!(ScaleMask::parse("##bps").unwrap().format(1.0), "10000bps");
        assert_eq!(ScaleMask::parse("##bps").unwrap().format(0.0005), "5bps");
    }

    #[test]
    fn test_na_passes_through() {
        let mask = ScaleMask::parse("##.2MM").unwrap();
        assert_eq!(format_cell("N/A", &mask), "N/A");
        assert_eq!(format_cell("1000000", &mask), "1.00M");
    }

    #[test]
    fn test_comparison_formatting_ignores_display_mask() {
        assert_eq!(format_comparison(0.5, ComparisonMethod::PctChange), "50.00%");
        assert_eq!(format_comparison(-0.015, ComparisonMethod::PctChange), "-1.50%");
        assert_eq!(format_comparison(0.0025, ComparisonMethod::Bps), "25bps");
    }

    #[test]
    fn test_round_trip_is_idempotent_modulo_precision() {
        // Parse, format, and re-parse the numeric part; formatting again
        // must produce the same string.
        for mask_text in ["##", "##.1MM", "##.3BB", "##.2%", "##bps", "##.0KK"] {
            let mask = ScaleMask::parse(mask_text).unwrap();
            let first = mask.format(1_234_567.891);
            let suffix = mask.unit.suffix();
            let numeric: f64 = first.trim_end_matches(suffix).parse().unwrap();
            // Undo the scaling operation to recover an input value.
            let recovered = match mask.unit {
                ScaleUnit::Billions => numeric * 1e9,
                ScaleUnit::Millions => numeric * 1e6,
                ScaleUnit::Thousands => numeric * 1e3,
                ScaleUnit::Percent => numeric / 100.0,
                ScaleUnit::BasisPoints => numeric / 10_000.0,
                ScaleUnit::None => numeric,
            };
            assert_eq!(mask.format(recovered), first, "mask {}", mask_text);
        }
    }
}
