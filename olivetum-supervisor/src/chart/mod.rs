//! Rolling hash-rate chart.
//!
//! [`RollingChart`] keeps the last N aggregate hash-rate samples (MH/s), the
//! axis derived from them, and renders the series on demand. It is written
//! from the telemetry dispatcher and read by displays, so the series has its
//! own lock.

pub mod axis;
pub mod render;

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use image::RgbaImage;

pub use axis::{axis_range, Axis, TickLabels};
pub use render::ChartPalette;

/// Default number of samples kept.
pub const DEFAULT_CAPACITY: usize = 300;

#[derive(Debug)]
struct Series {
    points: VecDeque<f64>,
    capacity: usize,
    axis: Option<Axis>,
}

/// Bounded FIFO of hash-rate samples with an adaptive axis.
#[derive(Debug)]
pub struct RollingChart {
    inner: Mutex<Series>,
    palette: ChartPalette,
}

impl RollingChart {
    /// Create a chart keeping at most `capacity` samples (minimum 2).
    pub fn new(capacity: usize) -> Self {
        Self::with_palette(capacity, ChartPalette::default())
    }

    pub fn with_palette(capacity: usize, palette: ChartPalette) -> Self {
        let capacity = capacity.max(2);
        Self {
            inner: Mutex::new(Series {
                points: VecDeque::with_capacity(capacity),
                capacity,
                axis: None,
            }),
            palette,
        }
    }

    /// Record a sample in MH/s.
    ///
    /// Negative, NaN, and infinite values are ignored.
    pub fn add(&self, mhs: f64) {
        if !mhs.is_finite() || mhs < 0.0 {
            return;
        }
        let mut series = self.lock();
        if series.points.len() == series.capacity {
            series.points.pop_front();
        }
        series.points.push_back(mhs);
        let axis = axis_range(series.points.make_contiguous());
        series.axis = axis;
    }

    /// Mean of the retained samples, `None` when there are none.
    pub fn average(&self) -> Option<f64> {
        let series = self.lock();
        if series.points.is_empty() {
            return None;
        }
        let sum: f64 = series.points.iter().sum();
        Some(sum / series.points.len() as f64)
    }

    /// Drop all samples and the axis.
    pub fn reset(&self) {
        let mut series = self.lock();
        series.points.clear();
        series.axis = None;
    }

    pub fn len(&self) -> usize {
        self.lock().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Snapshot of the samples, oldest first.
    pub fn points(&self) -> Vec<f64> {
        self.lock().points.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<f64> {
        self.lock().points.back().copied()
    }

    pub fn axis(&self) -> Option<Axis> {
        self.lock().axis
    }

    pub fn tick_labels(&self) -> Option<TickLabels> {
        self.axis().and_then(|axis| axis.tick_labels())
    }

    /// Render the current series. The lock is held only for the snapshot.
    pub fn render(&self, width: u32, height: u32) -> RgbaImage {
        let (points, axis) = {
            let series = self.lock();
            (series.points.iter().copied().collect::<Vec<_>>(), series.axis)
        };
        render::render(&points, axis, width, height, &self.palette)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Series> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RollingChart {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_beyond_capacity() {
        let chart = RollingChart::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            chart.add(v);
        }
        assert_eq!(chart.len(), 3);
        assert_eq!(chart.points(), vec![2.0, 3.0, 4.0]);
        assert_eq!(chart.latest(), Some(4.0));
    }

    #[test]
    fn test_default_capacity_eviction() {
        let chart = RollingChart::default();
        for i in 0..=DEFAULT_CAPACITY {
            chart.add(i as f64);
        }
        assert_eq!(chart.len(), DEFAULT_CAPACITY);
        assert_eq!(chart.points()[0], 1.0);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let chart = RollingChart::new(10);
        chart.add(5.0);
        let axis = chart.axis();
        for v in [-1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            chart.add(v);
        }
        assert_eq!(chart.len(), 1);
        assert_eq!(chart.axis(), axis);

        // Zero is a legitimate reading
        chart.add(0.0);
        assert_eq!(chart.len(), 2);
    }

    #[test]
    fn test_average() {
        let chart = RollingChart::new(10);
        assert_eq!(chart.average(), None);
        chart.add(10.0);
        chart.add(20.0);
        chart.add(30.0);
        assert_eq!(chart.average(), Some(20.0));
    }

    #[test]
    fn test_axis_follows_inserts() {
        let chart = RollingChart::new(10);
        assert_eq!(chart.axis(), None);
        assert_eq!(chart.tick_labels(), None);

        chart.add(30.0);
        chart.add(31.0);
        assert_eq!(chart.axis(), Some(Axis { min: 28.0, max: 32.0, step: 2.0 }));
        assert_eq!(chart.tick_labels().unwrap().mid, "30");
    }

    #[test]
    fn test_reset_clears_points_and_axis() {
        let chart = RollingChart::new(10);
        chart.add(12.5);
        chart.reset();
        assert!(chart.is_empty());
        assert_eq!(chart.axis(), None);
        assert_eq!(chart.average(), None);

        let img = chart.render(40, 30);
        assert!(img.pixels().all(|p| *p == ChartPalette::default().background));
    }

    #[test]
    fn test_capacity_clamped_to_two() {
        let chart = RollingChart::new(0);
        assert_eq!(chart.capacity(), 2);
        chart.add(1.0);
        chart.add(2.0);
        chart.add(3.0);
        assert_eq!(chart.points(), vec![2.0, 3.0]);
    }
}
