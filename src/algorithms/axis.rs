//! "Nice number" axis scaling.
//!
//! Given a data min/max this produces the rounded axis bounds and tick size
//! the renderer draws: five intervals, bounds snapped to a nice tick, and an
//! extra interval on any edge the data crowds within 10% of an interval.

/// Number of intervals on a chart axis.
pub const AXIS_INTERVALS: f64 = 5.0;

/// Round `value` to a "nice" number: a power of ten times 1, 2, 5, or 10.
///
/// With `round` false the result rounds up (used for the overall range);
/// with `round` true it rounds to the nearest nice fraction with thresholds
/// at 1.5, 3, and 7 (used for the tick size).
pub fn nice_num(value: f64, round: bool) -> f64 {
    if value <= 0.0 || !value.is_finite() {
        return 0.0;
    }
    let exponent = value.log10().floor();
    let fraction = value / 10f64.powf(exponent);
    let nice_fraction = if round {
        if fraction < 1.5 {
            1.0
        } else if fraction < 3.0 {
            2.0
        } else if fraction < 7.0 {
            5.0
        } else {
            10.0
        }
    } else if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice_fraction * 10f64.powf(exponent)
}

/// A computed axis scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisScale {
    pub min: f64,
    pub max: f64,
    pub tick: f64,
}

/// Compute the axis bounds for a data range.
pub fn nice_scale(data_min: f64, data_max: f64) -> AxisScale {
    if !(data_min.is_finite() && data_max.is_finite()) || data_min >= data_max {
        return AxisScale {
            min: data_min,
            max: data_min + 1.0,
            tick: 0.2,
        };
    }
    let range = nice_num(data_max - data_min, false);
    let tick = nice_num(range / AXIS_INTERVALS, true);
    let mut min = (data_min / tick).floor() * tick;
    let mut max = (data_max / tick).ceil() * tick;

    // Expand an edge the data touches within 10% of one interval.
    if data_min - min < 0.1 * tick {
        min -= tick;
    }
    if max - data_max < 0.1 * tick {
        max += tick;
    }

    AxisScale { min, max, tick }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nice_num_round_up() {
        assert_relative_eq!(nice_num(1.0, false), 1.0);
        assert_relative_eq!(nice_num(1.2, false), 2.0);
        assert_relative_eq!(nice_num(3.7, false), 5.0);
        assert_relative_eq!(nice_num(7.5, false), 10.0);
        assert_relative_eq!(nice_num(42.0, false), 50.0);
        assert_relative_eq!(nice_num(0.03, false), 0.05);
    }

    #[test]
    fn test_nice_num_round_nearest() {
        assert_relative_eq!(nice_num(1.4, true), 1.0);
        assert_relative_eq!(nice_num(1.6, true), 2.0);
        assert_relative_eq!(nice_num(2.9, true), 2.0);
        assert_relative_eq!(nice_num(3.1, true), 5.0);
        assert_relative_eq!(nice_num(6.9, true), 5.0);
        assert_relative_eq!(nice_num(7.1, true), 10.0);
    }

    #[test]
    fn test_nice_scale_snaps_to_tick() {
        let scale = nice_scale(13.0, 87.0);
        // range 74 -> 100; tick 100/5 = 20.
        assert_relative_eq!(scale.tick, 20.0);
        assert_relative_eq!(scale.min, 0.0);
        assert_relative_eq!(scale.max, 100.0);
        // Bounds are multiples of the tick.
        assert_relative_eq!(scale.min % scale.tick, 0.0);
        assert_relative_eq!(scale.max % scale.tick, 0.0);
    }

    #[test]
    fn test_nice_scale_expands_crowded_edges() {
        // Data min exactly on the snapped bound gets a whole extra interval.
        let scale = nice_scale(0.0, 100.0);
        assert!(scale.min < 0.0);
        assert!(scale.max > 100.0);
    }

    #[test]
    fn test_degenerate_range() {
        let scale = nice_scale(5.0, 5.0);
        assert!(scale.max > scale.min);
    }
}
