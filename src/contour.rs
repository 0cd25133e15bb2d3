use anyhow::{Context, Result};
use image::{ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;
use tiny_skia::{LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};

use crate::render::colorize;

/// Canvas pixels per grid cell. Cone grids are coarse, so isolines need
/// more resolution than the cell raster itself.
const PIXELS_PER_CELL: f32 = 8.0;

const LINE_WIDTH: f32 = 1.5;

/// One isoline crossing of a grid cell, in fractional grid coordinates
/// (`x` along columns, `y` along rows).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: (f32, f32),
    pub end: (f32, f32),
}

/// Evenly spaced contour levels strictly inside `[min, max]`.
pub fn contour_levels(min: f64, max: f64, count: usize) -> Vec<f64> {
    if !(max > min) || count == 0 {
        return Vec::new();
    }
    let step = (max - min) / (count + 1) as f64;
    (1..=count).map(|i| min + step * i as f64).collect()
}

/// Where `level` crosses the edge between two corner values.
fn interpolate_edge(
    a: (f32, f32),
    b: (f32, f32),
    value_a: f64,
    value_b: f64,
    level: f64,
) -> (f32, f32) {
    if (value_b - value_a).abs() < 1e-9 {
        return ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
    }
    let t = (((level - value_a) / (value_b - value_a)).clamp(0.0, 1.0)) as f32;
    (a.0 + t * (b.0 - a.0), a.1 + t * (b.1 - a.1))
}

/// Marching squares over a row-major value grid.
///
/// Cells touching a NaN corner produce no segments, so the isolines stop
/// at the edge of the valid region instead of inventing crossings.
pub fn march_squares(values: &[f64], rows: usize, cols: usize, level: f64) -> Vec<Segment> {
    if rows < 2 || cols < 2 || values.len() != rows * cols {
        return Vec::new();
    }

    let mut segments = Vec::new();
    for r in 0..rows - 1 {
        for c in 0..cols - 1 {
            let sw = values[r * cols + c];
            let se = values[r * cols + c + 1];
            let nw = values[(r + 1) * cols + c];
            let ne = values[(r + 1) * cols + c + 1];

            if sw.is_nan() || se.is_nan() || nw.is_nan() || ne.is_nan() {
                continue;
            }

            let mut index = 0u8;
            if sw >= level {
                index |= 1;
            }
            if se >= level {
                index |= 2;
            }
            if ne >= level {
                index |= 4;
            }
            if nw >= level {
                index |= 8;
            }

            let (x, y) = (c as f32, r as f32);
            let south = interpolate_edge((x, y), (x + 1.0, y), sw, se, level);
            let east = interpolate_edge((x + 1.0, y), (x + 1.0, y + 1.0), se, ne, level);
            let north = interpolate_edge((x, y + 1.0), (x + 1.0, y + 1.0), nw, ne, level);
            let west = interpolate_edge((x, y), (x, y + 1.0), sw, nw, level);

            let mut emit = |start: (f32, f32), end: (f32, f32)| {
                segments.push(Segment { start, end });
            };
            match index {
                0 | 15 => {}
                1 | 14 => emit(west, south),
                2 | 13 => emit(south, east),
                3 | 12 => emit(west, east),
                4 | 11 => emit(east, north),
                // Saddles cross twice.
                5 => {
                    emit(west, south);
                    emit(east, north);
                }
                6 | 9 => emit(south, north),
                7 | 8 => emit(west, north),
                10 => {
                    emit(south, east);
                    emit(west, north);
                }
                _ => {}
            }
        }
    }
    segments
}

/// Render isolines of a value grid as a north-up PNG.
///
/// Levels are spread over the grid's value range and each level is
/// stroked in its gradient color; NaN cells stay blank. `values` is
/// row-major with row 0 at the southern edge, the same orientation as a
/// height grid.
pub fn render_contours(
    values: &[f64],
    rows: usize,
    cols: usize,
    level_count: usize,
) -> Result<Vec<u8>> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &value in values {
        if !value.is_nan() {
            min = min.min(value);
            max = max.max(value);
        }
    }
    let levels = contour_levels(min, max, level_count);

    let width = ((cols.max(2) - 1) as f32 * PIXELS_PER_CELL).ceil() as u32;
    let height = ((rows.max(2) - 1) as f32 * PIXELS_PER_CELL).ceil() as u32;
    let mut pixmap =
        Pixmap::new(width, height).context("failed to allocate contour canvas")?;

    // Grid y points north, canvas y points down.
    let to_canvas = |point: (f32, f32)| -> (f32, f32) {
        (
            point.0 * PIXELS_PER_CELL,
            ((rows - 1) as f32 - point.1) * PIXELS_PER_CELL,
        )
    };

    let mut stroke = Stroke::default();
    stroke.width = LINE_WIDTH;
    stroke.line_cap = LineCap::Round;
    stroke.line_join = LineJoin::Round;

    for &level in &levels {
        let color = colorize((level - min) / (max - min));
        let mut paint = Paint::default();
        paint.set_color_rgba8(color.0[0], color.0[1], color.0[2], 255);
        paint.anti_alias = true;

        let segments = march_squares(values, rows, cols, level);
        if segments.is_empty() {
            continue;
        }

        let mut builder = PathBuilder::new();
        for segment in &segments {
            let (x0, y0) = to_canvas(segment.start);
            let (x1, y1) = to_canvas(segment.end);
            builder.move_to(x0, y0);
            builder.line_to(x1, y1);
        }
        if let Some(path) = builder.finish() {
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }

    // tiny-skia keeps premultiplied pixels; the encoder wants straight
    // alpha.
    let mut img = RgbaImage::new(width, height);
    for (i, pixel) in pixmap.pixels().iter().enumerate() {
        let color = pixel.demultiply();
        img.put_pixel(
            (i as u32) % width,
            (i as u32) / width,
            Rgba([color.red(), color.green(), color.blue(), color.alpha()]),
        );
    }

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .context("failed to encode PNG")?;
    Ok(bytes)
}
