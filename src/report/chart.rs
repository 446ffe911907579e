//! Line chart rasterizer for score history.
//!
//! Y is fixed at 0..=100. X spans the first to last capture time; a single
//! capture (or several at the same instant) is centred.

use chrono::{Duration, NaiveDateTime};
use image::{Rgb, RgbImage};

use crate::db::ScorePoint;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const AXIS: Rgb<u8> = Rgb([90, 90, 90]);
const LABEL: Rgb<u8> = Rgb([60, 60, 60]);
const SERIES: Rgb<u8> = Rgb([0x2e, 0xcc, 0x71]);
const FILL_ALPHA: f32 = 0.3;

const MARGIN_LEFT: u32 = 80;
const MARGIN_RIGHT: u32 = 40;
const MARGIN_TOP: u32 = 40;
const MARGIN_BOTTOM: u32 = 70;

pub const MIN_WIDTH: u32 = 320;
pub const MIN_HEIGHT: u32 = 200;

const GLYPH_SCALE: i64 = 2;
const X_TICKS: usize = 6;

/// Pixel bounds of the plotting area.
#[derive(Debug, Clone, Copy)]
struct PlotArea {
    left: i64,
    right: i64,
    top: i64,
    bottom: i64,
}

impl PlotArea {
    fn new(width: u32, height: u32) -> Self {
        Self {
            left: MARGIN_LEFT as i64,
            right: (width - MARGIN_RIGHT) as i64,
            top: MARGIN_TOP as i64,
            bottom: (height - MARGIN_BOTTOM) as i64,
        }
    }

    fn y_for(&self, score: f64) -> i64 {
        let span = (self.bottom - self.top) as f64;
        self.bottom - (score.clamp(0.0, 100.0) / 100.0 * span).round() as i64
    }

    fn x_for(&self, at: NaiveDateTime, first: NaiveDateTime, last: NaiveDateTime) -> i64 {
        let total = (last - first).num_milliseconds();
        if total <= 0 {
            return (self.left + self.right) / 2;
        }
        let offset = (at - first).num_milliseconds() as f64 / total as f64;
        self.left + (offset * (self.right - self.left) as f64).round() as i64
    }
}

/// Pixel position of every point, in input order.
pub fn project(points: &[ScorePoint], width: u32, height: u32) -> Vec<(i64, i64)> {
    let (width, height) = (width.max(MIN_WIDTH), height.max(MIN_HEIGHT));
    let area = PlotArea::new(width, height);
    let (first, last) = match time_bounds(points) {
        Some(bounds) => bounds,
        None => return Vec::new(),
    };
    points
        .iter()
        .map(|p| (area.x_for(p.captured_at, first, last), area.y_for(p.plant_score)))
        .collect()
}

/// Render `points` (expected oldest first) as a line chart.
pub fn render(points: &[ScorePoint], width: u32, height: u32) -> RgbImage {
    let (width, height) = (width.max(MIN_WIDTH), height.max(MIN_HEIGHT));
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
    let area = PlotArea::new(width, height);

    draw_y_axis(&mut img, &area);

    let Some((first, last)) = time_bounds(points) else {
        draw_frame(&mut img, &area);
        return img;
    };
    draw_x_axis(&mut img, &area, first, last);
    draw_frame(&mut img, &area);

    let coords = project(points, width, height);
    fill_under(&mut img, &area, &coords);
    for pair in coords.windows(2) {
        draw_thick_line(&mut img, pair[0], pair[1], SERIES);
    }
    for &(x, y) in &coords {
        fill_circle(&mut img, x, y, 5, SERIES);
    }
    img
}

fn time_bounds(points: &[ScorePoint]) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let first = points.iter().map(|p| p.captured_at).min()?;
    let last = points.iter().map(|p| p.captured_at).max()?;
    Some((first, last))
}

fn draw_frame(img: &mut RgbImage, area: &PlotArea) {
    draw_line(img, (area.left, area.top), (area.left, area.bottom), AXIS);
    draw_line(img, (area.left, area.bottom), (area.right, area.bottom), AXIS);
}

fn draw_y_axis(img: &mut RgbImage, area: &PlotArea) {
    for score in (0..=100).step_by(20) {
        let y = area.y_for(score as f64);
        draw_line(img, (area.left, y), (area.right, y), GRID);
        draw_line(img, (area.left - 6, y), (area.left, y), AXIS);

        let label = score.to_string();
        let label_width = text_width(&label);
        draw_text(
            img,
            &label,
            area.left - 12 - label_width,
            y - GLYPH_HEIGHT * GLYPH_SCALE / 2,
            LABEL,
        );
    }
}

fn draw_x_axis(img: &mut RgbImage, area: &PlotArea, first: NaiveDateTime, last: NaiveDateTime) {
    let span = last - first;
    let format = if span < Duration::days(2) {
        "%H:%M"
    } else {
        "%m-%d"
    };

    let ticks: Vec<NaiveDateTime> = if span.num_milliseconds() <= 0 {
        vec![first]
    } else {
        (0..X_TICKS)
            .map(|i| first + span * i as i32 / (X_TICKS as i32 - 1))
            .collect()
    };

    for at in ticks {
        let x = area.x_for(at, first, last);
        draw_line(img, (x, area.top), (x, area.bottom), GRID);
        draw_line(img, (x, area.bottom), (x, area.bottom + 6), AXIS);

        let label = at.format(format).to_string();
        let label_width = text_width(&label);
        draw_text(img, &label, x - label_width / 2, area.bottom + 14, LABEL);
    }
}

fn fill_under(img: &mut RgbImage, area: &PlotArea, coords: &[(i64, i64)]) {
    for pair in coords.windows(2) {
        let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
        if x1 <= x0 {
            continue;
        }
        for x in x0..x1 {
            let t = (x - x0) as f64 / (x1 - x0) as f64;
            let y_top = y0 as f64 + t * (y1 - y0) as f64;
            for y in y_top.round() as i64..area.bottom {
                blend_pixel(img, x, y, SERIES, FILL_ALPHA);
            }
        }
    }
}

fn in_bounds(img: &RgbImage, x: i64, y: i64) -> bool {
    x >= 0 && y >= 0 && x < img.width() as i64 && y < img.height() as i64
}

fn put_pixel(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if in_bounds(img, x, y) {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn blend_pixel(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>, alpha: f32) {
    if !in_bounds(img, x, y) {
        return;
    }
    let px = img.get_pixel_mut(x as u32, y as u32);
    for c in 0..3 {
        let blended = px.0[c] as f32 * (1.0 - alpha) + color.0[c] as f32 * alpha;
        px.0[c] = blended.round() as u8;
    }
}

/// Bresenham.
fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_pixel(img, x, y, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_thick_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    for ox in -1..=1 {
        for oy in -1..=1 {
            draw_line(img, (from.0 + ox, from.1 + oy), (to.0 + ox, to.1 + oy), color);
        }
    }
}

fn fill_circle(img: &mut RgbImage, cx: i64, cy: i64, radius: i64, color: Rgb<u8>) {
    for y in -radius..=radius {
        for x in -radius..=radius {
            if x * x + y * y <= radius * radius {
                put_pixel(img, cx + x, cy + y, color);
            }
        }
    }
}

// 5x7 bitmap glyphs, one byte per row, bit 4 is the leftmost column.
const GLYPH_WIDTH: i64 = 5;
const GLYPH_HEIGHT: i64 = 7;

fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        ' ' => [0x00; 7],
        _ => return None,
    };
    Some(rows)
}

fn text_width(text: &str) -> i64 {
    let n = text.chars().count() as i64;
    if n == 0 {
        0
    } else {
        (n * (GLYPH_WIDTH + 1) - 1) * GLYPH_SCALE
    }
}

fn draw_text(img: &mut RgbImage, text: &str, x: i64, y: i64, color: Rgb<u8>) {
    let mut cursor = x;
    for c in text.chars() {
        if let Some(rows) = glyph(c) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (0x10 >> col) != 0 {
                        for sy in 0..GLYPH_SCALE {
                            for sx in 0..GLYPH_SCALE {
                                put_pixel(
                                    img,
                                    cursor + col * GLYPH_SCALE + sx,
                                    y + row as i64 * GLYPH_SCALE + sy,
                                    color,
                                );
                            }
                        }
                    }
                }
            }
        }
        cursor += (GLYPH_WIDTH + 1) * GLYPH_SCALE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn point(day: u32, score: f64) -> ScorePoint {
        ScorePoint {
            captured_at: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            plant_score: score,
        }
    }

    #[test]
    fn test_project_orders_by_time_and_score() {
        let points = [point(1, 20.0), point(2, 80.0), point(3, 50.0)];
        let coords = project(&points, 800, 400);
        assert_eq!(coords.len(), 3);
        assert!(coords[0].0 < coords[1].0 && coords[1].0 < coords[2].0);
        assert!(coords[1].1 < coords[2].1 && coords[2].1 < coords[0].1);
        assert_eq!(coords[0].0, MARGIN_LEFT as i64);
        assert_eq!(coords[2].0, (800 - MARGIN_RIGHT) as i64);
    }

    #[test]
    fn test_single_point_is_centred() {
        let coords = project(&[point(5, 100.0)], 800, 400);
        let expected_x = (MARGIN_LEFT as i64 + (800 - MARGIN_RIGHT) as i64) / 2;
        assert_eq!(coords, vec![(expected_x, MARGIN_TOP as i64)]);
    }

    #[test]
    fn test_render_marks_points() {
        let points = [point(1, 10.0), point(4, 90.0)];
        let img = render(&points, 640, 320);
        assert_eq!(img.dimensions(), (640, 320));

        for (x, y) in project(&points, 640, 320) {
            assert_eq!(*img.get_pixel(x as u32, y as u32), SERIES);
        }
    }

    #[test]
    fn test_render_clamps_tiny_sizes() {
        let img = render(&[point(1, 50.0)], 10, 10);
        assert_eq!(img.dimensions(), (MIN_WIDTH, MIN_HEIGHT));
    }

    #[test]
    fn test_text_width() {
        assert_eq!(text_width(""), 0);
        assert_eq!(text_width("1"), GLYPH_WIDTH * GLYPH_SCALE);
        assert_eq!(text_width("100"), (3 * 6 - 1) * GLYPH_SCALE);
    }
}
