//! Adaptive y-axis for the hash-rate chart.
//!
//! The axis always spans exactly two "nice" steps so the grid lines at 25%,
//! 50% and 75% land on readable values, and it only moves when the data
//! leaves the padded window.

/// Spreads below this are treated as flat data.
pub const MIN_SPREAD: f64 = 1e-6;

/// Fraction of the data range added above and below.
const PAD_FRACTION: f64 = 0.10;

/// Upper bound on step doublings when the first guess does not cover the
/// padded range.
const MAX_WIDEN_STEPS: usize = 12;

/// Unit shown next to the tick labels.
pub const UNIT_LABEL: &str = "MH/s";

/// Derived axis bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// Labels for the three horizontal grid lines, top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickLabels {
    pub unit: &'static str,
    /// Value at 75% of the height.
    pub top: String,
    /// Value at 50% of the height.
    pub mid: String,
    /// Value at 25% of the height.
    pub bottom: String,
}

impl Axis {
    /// False for the degenerate axes that must not be drawn.
    pub fn is_drawable(&self) -> bool {
        self.max > self.min && self.step > 0.0 && self.step.is_finite()
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Labels for the 25/50/75% lines, or `None` for an undrawable axis.
    pub fn tick_labels(&self) -> Option<TickLabels> {
        if !self.is_drawable() {
            return None;
        }
        let span = self.span();
        let decimals = decimals_for_step(span / 4.0);
        let format_value = |v: f64| {
            let v = if v < 0.0 || v.abs() < 1e-9 { 0.0 } else { v };
            format!("{:.*}", decimals, v)
        };
        Some(TickLabels {
            unit: UNIT_LABEL,
            top: format_value(self.max - span * 0.25),
            mid: format_value(self.max - span * 0.50),
            bottom: format_value(self.max - span * 0.75),
        })
    }
}

/// Compute the axis for the current window of points.
///
/// Returns `None` for an empty window.
pub fn axis_range(points: &[f64]) -> Option<Axis> {
    let (&first, rest) = points.split_first()?;
    let (data_min, mut data_max) = rest
        .iter()
        .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if data_max - data_min < MIN_SPREAD {
        data_max = data_min + 1.0;
    }
    let pad = (data_max - data_min) * PAD_FRACTION;
    let padded_min = (data_min - pad).max(0.0);
    let mut padded_max = data_max + pad;
    if padded_max <= padded_min {
        padded_max = padded_min + 1.0;
    }

    let mut step = nice_step((padded_max - padded_min) / 2.0);
    let mut min = (padded_min / step).floor() * step;
    let mut max = min + 2.0 * step;
    for _ in 0..MAX_WIDEN_STEPS {
        if max >= padded_max {
            break;
        }
        step = nice_step(step * 2.0);
        min = (padded_min / step).floor() * step;
        max = min + 2.0 * step;
    }

    Some(Axis { min, max, step })
}

/// Round `target` up to the next value of the form {1, 2, 5, 10} × 10^k.
///
/// Non-positive or non-finite targets give 1.
pub fn nice_step(target: f64) -> f64 {
    if target <= 0.0 || !target.is_finite() {
        return 1.0;
    }
    let base = 10f64.powf(target.log10().floor());
    let fraction = target / base;
    let nice_fraction = if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice_fraction * base
}

/// Decimal places needed to tell apart values `step` apart: none for steps of
/// one or more, otherwise one per decade below 1, at most four.
pub fn decimals_for_step(step: f64) -> usize {
    if step <= 0.0 || !step.is_finite() {
        return 2;
    }
    let exp = step.log10().floor();
    if exp >= 0.0 {
        0
    } else {
        ((-exp) as usize).min(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// True if `step` is {1,2,5,10} × 10^k within float noise.
    fn is_nice(step: f64) -> bool {
        let base = 10f64.powf(step.log10().floor());
        let mantissa = step / base;
        [1.0, 2.0, 5.0, 10.0]
            .iter()
            .any(|m| (mantissa - m).abs() < 1e-9)
    }

    #[test]
    fn test_nice_step_rounds_up() {
        assert_eq!(nice_step(0.6), 1.0);
        assert_eq!(nice_step(1.0), 1.0);
        assert_eq!(nice_step(1.5), 2.0);
        assert_eq!(nice_step(3.0), 5.0);
        assert_eq!(nice_step(7.0), 10.0);
        assert_eq!(nice_step(40.0), 50.0);
        assert_eq!(nice_step(0.0), 1.0);
        assert_eq!(nice_step(-3.0), 1.0);
        assert_eq!(nice_step(f64::NAN), 1.0);
        assert_eq!(nice_step(f64::INFINITY), 1.0);
    }

    #[test]
    fn test_empty_window_has_no_axis() {
        assert_eq!(axis_range(&[]), None);
    }

    #[test]
    fn test_flat_data_gets_unit_spread() {
        let axis = axis_range(&[10.0, 10.0, 10.0]).unwrap();
        assert_eq!(axis, Axis { min: 8.0, max: 12.0, step: 2.0 });
    }

    #[test]
    fn test_axis_covers_padded_range() {
        let axis = axis_range(&[30.0, 31.0]).unwrap();
        assert_eq!(axis, Axis { min: 28.0, max: 32.0, step: 2.0 });

        let points = [120.5, 98.2, 143.9, 101.0, 0.4];
        let axis = axis_range(&points).unwrap();
        assert!(axis.min <= 0.4);
        assert!(axis.max >= 143.9);
        assert!((axis.max - axis.min - 2.0 * axis.step).abs() < 1e-9);
    }

    #[test]
    fn test_lower_bound_never_negative() {
        let axis = axis_range(&[0.0123]).unwrap();
        assert_eq!(axis.min, 0.0);
        assert_eq!(axis.step, 1.0);
        assert_eq!(axis.max, 2.0);
    }

    #[test]
    fn test_step_is_always_nice() {
        let windows: &[&[f64]] = &[
            &[0.0],
            &[0.001, 0.002],
            &[3.3, 3.31, 3.29],
            &[12.0, 48.0, 30.0],
            &[999.0, 1001.0],
            &[0.0, 250_000.0],
            &[5.0e-7, 5.5e-7],
        ];
        for window in windows {
            let axis = axis_range(window).unwrap();
            assert!(is_nice(axis.step), "step {} for {:?}", axis.step, window);
            assert!(axis.is_drawable());
        }
    }

    #[test]
    fn test_decimals_for_step() {
        assert_eq!(decimals_for_step(5.0), 0);
        assert_eq!(decimals_for_step(1.0), 0);
        assert_eq!(decimals_for_step(0.5), 1);
        assert_eq!(decimals_for_step(0.05), 2);
        assert_eq!(decimals_for_step(0.00001), 4);
        assert_eq!(decimals_for_step(0.0), 2);
        assert_eq!(decimals_for_step(f64::NAN), 2);
    }

    #[test]
    fn test_tick_labels() {
        let axis = Axis { min: 28.0, max: 32.0, step: 2.0 };
        let ticks = axis.tick_labels().unwrap();
        assert_eq!(ticks.unit, "MH/s");
        assert_eq!(ticks.top, "31");
        assert_eq!(ticks.mid, "30");
        assert_eq!(ticks.bottom, "29");

        let axis = Axis { min: 0.0, max: 2.0, step: 1.0 };
        let ticks = axis.tick_labels().unwrap();
        assert_eq!((ticks.top.as_str(), ticks.mid.as_str(), ticks.bottom.as_str()), ("1.5", "1.0", "0.5"));
    }

    #[test]
    fn test_degenerate_axis_has_no_labels() {
        assert_eq!(Axis { min: 0.0, max: 0.0, step: 0.0 }.tick_labels(), None);
        assert_eq!(Axis { min: 1.0, max: 2.0, step: f64::NAN }.tick_labels(), None);
    }
}
