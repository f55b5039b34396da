//! Annotation resolution: windowing, metric matching, and dedupe.
//!
//! Annotations are noteworthy events pinned to a date and a metric. Only
//! rows inside the trailing six current-year weeks or their prior-year
//! counterparts survive; rows naming an unknown metric are dropped into the
//! deck's `eventErrors` rather than failing the build; and when several
//! surviving rows share a metric, the last one in source order wins.

use std::collections::HashMap;

use chrono::Duration;

use crate::io::loaders::AnnotationRow;
use crate::models::calendar::{
    DaySpan, ReportCalendar, PY_WEEKLY_OFFSET_DAYS, SIX_WEEKS_LOOKBACK_DAYS,
};
use crate::models::deck::NoteworthyEvent;

/// Long-form date used on rendered events, e.g. `September 08 2021`.
const EVENT_DATE_FORMAT: &str = "%B %d %Y";

/// Annotations ready for attachment, keyed by metric name.
#[derive(Debug, Default)]
pub struct ResolvedAnnotations {
    by_metric: HashMap<String, NoteworthyEvent>,
    /// Non-fatal drops, surfaced on the deck.
    pub errors: Vec<String>,
}

impl ResolvedAnnotations {
    /// The event attached to a metric, if any survived resolution.
    pub fn event_for(&self, metric: &str) -> Option<&NoteworthyEvent> {
        self.by_metric.get(metric)
    }

    /// Events for any of the named metrics, in the given name order.
    pub fn events_for<'a>(
        &self,
        metrics: impl Iterator<Item = &'a str>,
    ) -> Vec<NoteworthyEvent> {
        metrics
            .filter_map(|name| self.by_metric.get(name).cloned())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_metric.is_empty()
    }
}

/// Filter annotation rows to the relevant windows and dedupe per metric.
pub fn resolve_annotations(
    rows: Vec<AnnotationRow>,
    calendar: &ReportCalendar,
    metric_defined: impl Fn(&str) -> bool,
) -> ResolvedAnnotations {
    let cy_end = calendar.week_ending();
    let cy_window = DaySpan::new(cy_end - Duration::days(SIX_WEEKS_LOOKBACK_DAYS), cy_end);
    let py_end = cy_end - Duration::days(PY_WEEKLY_OFFSET_DAYS);
    let py_window = DaySpan::new(py_end - Duration::days(SIX_WEEKS_LOOKBACK_DAYS), py_end);

    let mut resolved = ResolvedAnnotations::default();
    for row in rows {
        if !cy_window.contains(row.date) && !py_window.contains(row.date) {
            continue;
        }
        if !metric_defined(&row.metric_name) {
            resolved.errors.push(format!(
                "annotation for '{}' on {} was dropped: metric is not defined",
                row.metric_name, row.date
            ));
            continue;
        }
        // Last row in source order wins for a repeated metric.
        resolved.by_metric.insert(
            row.metric_name.clone(),
            NoteworthyEvent {
                metric: row.metric_name,
                date: row.date.format(EVENT_DATE_FORMAT).to_string(),
                description: row.event_description,
            },
        );
    }
    resolved
}
