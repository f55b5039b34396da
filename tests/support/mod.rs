//! Shared fixture builders for the integration suites.
//
// Each integration binary compiles this module independently; not every
// binary uses every helper.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};

/// A daily ramp CSV: `days` rows ending at `end`, value = day index + 1,
/// one column per name in `columns` (all carrying the ramp value).
pub fn ramp_csv(end: NaiveDate, days: i64, columns: &[&str]) -> String {
    let mut text = String::from("Date");
    for column in columns {
        text.push(',');
        text.push_str(column);
    }
    text.push('\n');
    for i in 0..days {
        let day = end - Duration::days(days - 1 - i);
        text.push_str(&day.format("%Y-%m-%d").to_string());
        for _ in columns {
            text.push_str(&format!(",{}", i + 1));
        }
        text.push('\n');
    }
    text
}

/// Create a scenario directory holding `original.csv`, `config.yaml`, and
/// `testconfig.yml` under `root`.
pub fn write_scenario(
    root: &Path,
    name: &str,
    csv: &str,
    config: &str,
    testconfig: &str,
) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("original.csv"), csv).unwrap();
    std::fs::write(dir.join("config.yaml"), config).unwrap();
    std::fs::write(dir.join("testconfig.yml"), testconfig).unwrap();
    dir
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
