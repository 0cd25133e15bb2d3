use anyhow::{Context, Result};
use image::{ImageOutputFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Color ramp for cone imagery: red at the bottom of the range through
/// olive to blue at the top.
const COLOR_STOPS: [(f64, [f64; 3]); 3] = [
    (0.0, [255.0, 0.0, 0.0]),
    (0.5, [180.0, 190.0, 0.0]),
    (1.0, [0.0, 150.0, 255.0]),
];

/// Map a normalized value to a gradient color. NaN (cells outside the
/// reachable set) renders fully transparent.
pub fn colorize(fraction: f64) -> Rgba<u8> {
    if fraction.is_nan() {
        return Rgba([0, 0, 0, 0]);
    }
    let fraction = fraction.clamp(0.0, 1.0);

    let mut color = COLOR_STOPS[COLOR_STOPS.len() - 1].1;
    for pair in COLOR_STOPS.windows(2) {
        let (start, start_color) = pair[0];
        let (end, end_color) = pair[1];
        if fraction <= end {
            let t = (fraction - start) / (end - start);
            color = [
                start_color[0] + (end_color[0] - start_color[0]) * t,
                start_color[1] + (end_color[1] - start_color[1]) * t,
                start_color[2] + (end_color[2] - start_color[2]) * t,
            ];
            break;
        }
    }

    Rgba([color[0] as u8, color[1] as u8, color[2] as u8, 255])
}

/// Encode a grid of normalized values as a north-up PNG.
///
/// `values` is row-major with row 0 at the southern edge, the same
/// orientation as a height grid; rows are flipped so the image reads
/// north at the top.
pub fn render_normalized(values: &[f64], rows: usize, cols: usize) -> Result<Vec<u8>> {
    let mut img = RgbaImage::new(cols as u32, rows as u32);
    for row in 0..rows {
        for col in 0..cols {
            let pixel = colorize(values[row * cols + col]);
            img.put_pixel(col as u32, (rows - 1 - row) as u32, pixel);
        }
    }

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .context("failed to encode PNG")?;
    Ok(bytes)
}
