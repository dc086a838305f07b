//! Raster rendering of the hash-rate series.

use image::{Pixel, Rgba, RgbaImage};

use super::axis::Axis;

const PAD_LEFT: u32 = 8;
const PAD_RIGHT: u32 = 8;
const PAD_TOP: u32 = 8;
const PAD_BOTTOM: u32 = 10;

const GRID_ALPHA: u8 = 0x45;
const FILL_ALPHA: u8 = 0x2A;
const LINE_WIDTH: i64 = 2;
const MARKER_RADIUS: i64 = 3;

/// Colours used by [`render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartPalette {
    pub background: Rgba<u8>,
    /// Grid lines, drawn translucent over the background.
    pub grid: Rgba<u8>,
    pub line: Rgba<u8>,
    /// Area under the curve, drawn translucent.
    pub fill: Rgba<u8>,
}

impl Default for ChartPalette {
    /// Dark slate background with the olive accent.
    fn default() -> Self {
        let accent = Rgba([0x7C, 0xB3, 0x42, 0xFF]);
        Self {
            background: Rgba([0x11, 0x18, 0x27, 0xFF]),
            grid: Rgba([0x2A, 0x33, 0x42, GRID_ALPHA]),
            line: accent,
            fill: Rgba([accent[0], accent[1], accent[2], FILL_ALPHA]),
        }
    }
}

/// Draw `points` scaled to `axis` into a `width` x `height` image.
///
/// Sizes below 2 in either dimension give a 2x2 background image. No points,
/// no axis, or a degenerate axis give a background-only image of the
/// requested size.
pub fn render(
    points: &[f64],
    axis: Option<Axis>,
    width: u32,
    height: u32,
    palette: &ChartPalette,
) -> RgbaImage {
    if width < 2 || height < 2 {
        return RgbaImage::from_pixel(2, 2, palette.background);
    }
    let mut img = RgbaImage::from_pixel(width, height, palette.background);

    let axis = match axis {
        Some(axis) if axis.is_drawable() && !points.is_empty() => axis,
        _ => return img,
    };

    let chart_w = width.saturating_sub(PAD_LEFT + PAD_RIGHT) as i64;
    let chart_h = height.saturating_sub(PAD_TOP + PAD_BOTTOM) as i64;
    if chart_w < 2 || chart_h < 2 {
        return img;
    }
    let left = PAD_LEFT as i64;
    let top = PAD_TOP as i64;
    let bottom = top + chart_h - 1;

    let mut canvas = Canvas { img: &mut img };

    for i in 1..=3 {
        let y = top + ((chart_h - 1) as f64 * i as f64 / 4.0) as i64;
        canvas.hline(left, left + chart_w - 1, y, palette.grid);
    }

    let ys = resample(points, axis, chart_w as usize, top, chart_h);

    for (x, &y) in ys.iter().enumerate() {
        canvas.vline(left + x as i64, y, bottom, palette.fill);
    }
    for (x, pair) in ys.windows(2).enumerate() {
        let x = left + x as i64;
        canvas.line(x, pair[0], x + 1, pair[1], palette.line);
    }

    if let Some(&last_y) = ys.last() {
        canvas.disc(left + chart_w - 1, last_y, MARKER_RADIUS, palette.line);
    }

    img
}

/// Linearly interpolate the series to one y coordinate per pixel column.
fn resample(points: &[f64], axis: Axis, columns: usize, top: i64, chart_h: i64) -> Vec<i64> {
    let last = points.len() - 1;
    let span = axis.span();
    (0..columns)
        .map(|x| {
            let t = x as f64 / (columns - 1) as f64 * last as f64;
            let i0 = t.floor().max(0.0) as usize;
            let i1 = (i0 + 1).min(last);
            let f = t - i0 as f64;
            let v = points[i0] * (1.0 - f) + points[i1] * f;
            let rel = (axis.max - v) / span;
            let y = top + (rel * (chart_h - 1) as f64).round() as i64;
            y.clamp(top, top + chart_h - 1)
        })
        .collect()
}

/// Clipped drawing primitives over an image.
struct Canvas<'a> {
    img: &'a mut RgbaImage,
}

impl Canvas<'_> {
    fn plot(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        if x < 0 || y < 0 || x >= self.img.width() as i64 || y >= self.img.height() as i64 {
            return;
        }
        let pixel = self.img.get_pixel_mut(x as u32, y as u32);
        if color[3] == u8::MAX {
            *pixel = color;
        } else {
            pixel.blend(&color);
        }
    }

    fn hline(&mut self, x0: i64, x1: i64, y: i64, color: Rgba<u8>) {
        let (x0, x1) = (x0.min(x1), x0.max(x1));
        for x in x0..=x1 {
            self.plot(x, y, color);
        }
    }

    fn vline(&mut self, x: i64, y0: i64, y1: i64, color: Rgba<u8>) {
        let (y0, y1) = (y0.min(y1), y0.max(y1));
        for y in y0..=y1 {
            self.plot(x, y, color);
        }
    }

    /// Bresenham line, thickened to the right.
    fn line(&mut self, mut x0: i64, mut y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            for w in 0..LINE_WIDTH {
                self.plot(x0 + w, y0, color);
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn disc(&mut self, cx: i64, cy: i64, r: i64, color: Rgba<u8>) {
        for y in -r..=r {
            for x in -r..=r {
                if x * x + y * y <= r * r {
                    self.plot(cx + x, cy + y, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::axis::axis_range;

    #[test]
    fn test_degenerate_size_is_blank_2x2() {
        let palette = ChartPalette::default();
        let axis = axis_range(&[10.0]);
        for (w, h) in [(0, 0), (1, 100), (100, 1)] {
            let img = render(&[10.0], axis, w, h, &palette);
            assert_eq!(img.dimensions(), (2, 2));
            assert!(img.pixels().all(|p| *p == palette.background));
        }
    }

    #[test]
    fn test_no_data_is_background_only() {
        let palette = ChartPalette::default();
        let img = render(&[], None, 100, 60, &palette);
        assert_eq!(img.dimensions(), (100, 60));
        assert!(img.pixels().all(|p| *p == palette.background));

        let flat = Axis { min: 5.0, max: 5.0, step: 0.0 };
        let img = render(&[5.0], Some(flat), 100, 60, &palette);
        assert!(img.pixels().all(|p| *p == palette.background));
    }

    #[test]
    fn test_marker_grid_and_fill() {
        let palette = ChartPalette::default();
        let points = [10.0];
        // Axis 8..12: the value sits half way, row 8 + round(0.5 * 41) = 29
        let img = render(&points, axis_range(&points), 100, 60, &palette);

        // Last column is 8 + 84 - 1
        assert_eq!(*img.get_pixel(91, 29), palette.line);
        assert_eq!(*img.get_pixel(91, 26), palette.line);

        // First grid line at 8 + floor(41 / 4)
        let grid = *img.get_pixel(8, 18);
        assert_ne!(grid, palette.background);
        assert_ne!(grid, palette.line);

        // Under the curve: tinted, not the line colour
        let fill = *img.get_pixel(50, 40);
        assert_ne!(fill, palette.background);
        assert_ne!(fill, palette.line);

        // Padding stays untouched
        assert_eq!(*img.get_pixel(2, 2), palette.background);
        assert_eq!(*img.get_pixel(50, 55), palette.background);
    }

    #[test]
    fn test_rising_series_ends_high() {
        let palette = ChartPalette::default();
        let points = [10.0, 20.0, 30.0, 40.0];
        let axis = axis_range(&points);
        let img = render(&points, axis, 120, 80, &palette);

        // The line reaches lower rows on the left than on the right
        let first_line_row = |x: u32| (0..80).find(|&y| *img.get_pixel(x, y) == palette.line);
        let left = first_line_row(8).unwrap();
        let right = first_line_row(111).unwrap();
        assert!(left > right, "left {} right {}", left, right);
    }
}
