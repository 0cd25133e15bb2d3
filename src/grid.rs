use anyhow::{Result, bail};

use crate::tiles::TileStore;

pub const ARC_SECOND_IN_M_EQUATOR: f64 = 1852.0 / 60.0;
pub const ARC_SECOND_IN_DEGREE: f64 = 1.0 / 3600.0;

/// Length of one arcsecond of longitude in meters at the given latitude.
pub fn arcsecond_in_meters(latitude: f64) -> f64 {
    latitude.to_radians().cos() * ARC_SECOND_IN_M_EQUATOR
}

pub fn meter_in_arcseconds(latitude: f64) -> f64 {
    1.0 / arcsecond_in_meters(latitude)
}

/// `n` evenly spaced values from `a` to `b`, both inclusive.
pub fn linspace(a: f64, b: f64, n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![a];
    }
    let step = (b - a) / (n - 1) as f64;
    (0..n).map(|i| a + step * i as f64).collect()
}

/// Isotropic raster of ground elevations in meters.
///
/// Row-major storage with row 0 at the south-west corner: increasing row
/// index means increasing latitude, increasing column index means
/// increasing longitude. `cell_size` is the metric spacing on both axes;
/// grids are never mutated after assembly.
#[derive(Debug, Clone)]
pub struct HeightGrid {
    pub heights: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
    pub cell_size: f64,
    pub latitudes: (f64, f64),
    pub longitudes: (f64, f64),
}

impl HeightGrid {
    pub fn new(
        heights: Vec<f64>,
        rows: usize,
        cols: usize,
        cell_size: f64,
        latitudes: (f64, f64),
        longitudes: (f64, f64),
    ) -> Self {
        debug_assert_eq!(heights.len(), rows * cols);
        Self {
            heights,
            rows,
            cols,
            cell_size,
            latitudes,
            longitudes,
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.heights[row * self.cols + col]
    }

    pub fn height_at(&self, ix: (usize, usize)) -> f64 {
        self.get(ix.0, ix.1)
    }

    /// Degrees spanned per cell on each axis.
    pub fn angular_resolution(&self) -> (f64, f64) {
        (
            (self.latitudes.1 - self.latitudes.0) / self.rows as f64,
            (self.longitudes.1 - self.longitudes.0) / self.cols as f64,
        )
    }

    /// Latitude of every row and longitude of every column.
    pub fn coordinates_for_indices(&self) -> (Vec<f64>, Vec<f64>) {
        (
            linspace(self.latitudes.0, self.latitudes.1, self.rows),
            linspace(self.longitudes.0, self.longitudes.1, self.cols),
        )
    }

    /// Bilinear sample at fractional grid coordinates, clamped to the edge.
    fn interpolate(&self, row: f64, col: f64) -> f64 {
        let r0 = (row.floor().max(0.0) as usize).min(self.rows - 1);
        let c0 = (col.floor().max(0.0) as usize).min(self.cols - 1);
        let r1 = (r0 + 1).min(self.rows - 1);
        let c1 = (c0 + 1).min(self.cols - 1);
        let rf = (row - r0 as f64).clamp(0.0, 1.0);
        let cf = (col - c0 as f64).clamp(0.0, 1.0);

        let low = self.get(r0, c0) * (1.0 - cf) + self.get(r0, c1) * cf;
        let high = self.get(r1, c0) * (1.0 - cf) + self.get(r1, c1) * cf;
        low * (1.0 - rf) + high * rf
    }

    /// Resample by independent factors per axis using bilinear
    /// interpolation; corner samples are preserved. The geographic bounds
    /// are unchanged, only the raster density varies.
    pub fn resample(&self, row_factor: f64, col_factor: f64) -> HeightGrid {
        let out_rows = ((self.rows as f64 * row_factor).round() as usize).max(1);
        let out_cols = ((self.cols as f64 * col_factor).round() as usize).max(1);

        let row_step = if out_rows > 1 {
            (self.rows - 1) as f64 / (out_rows - 1) as f64
        } else {
            0.0
        };
        let col_step = if out_cols > 1 {
            (self.cols - 1) as f64 / (out_cols - 1) as f64
        } else {
            0.0
        };

        let mut heights = Vec::with_capacity(out_rows * out_cols);
        for r in 0..out_rows {
            for c in 0..out_cols {
                heights.push(self.interpolate(r as f64 * row_step, c as f64 * col_step));
            }
        }

        HeightGrid::new(
            heights,
            out_rows,
            out_cols,
            self.cell_size,
            self.latitudes,
            self.longitudes,
        )
    }

    /// Resample both axes by `factor`, scaling `cell_size` accordingly.
    pub fn downsample(&self, factor: f64) -> HeightGrid {
        let mut grid = self.resample(factor, factor);
        grid.cell_size = self.cell_size / factor;
        grid
    }

    /// Crop to the inclusive row/column window, narrowing the geographic
    /// bounds to the coordinates of the window's corner cells.
    pub fn crop(&self, row_range: (usize, usize), col_range: (usize, usize)) -> HeightGrid {
        let (r0, r1) = row_range;
        let (c0, c1) = col_range;
        let out_rows = r1 - r0 + 1;
        let out_cols = c1 - c0 + 1;

        let mut heights = Vec::with_capacity(out_rows * out_cols);
        for r in r0..=r1 {
            let start = r * self.cols + c0;
            heights.extend_from_slice(&self.heights[start..start + out_cols]);
        }

        let (lats, lons) = self.coordinates_for_indices();
        HeightGrid::new(
            heights,
            out_rows,
            out_cols,
            self.cell_size,
            (lats[r0], lats[r1]),
            (lons[c0], lons[c1]),
        )
    }
}

/// Ground elevation at a single geographic point, sampled from the tile
/// that contains it.
pub fn height_at_point(store: &TileStore, latitude: f64, longitude: f64) -> Result<f64> {
    let lat_floor = latitude.floor() as i32;
    let lon_floor = longitude.floor() as i32;
    let tile = store.load(lat_floor, lon_floor)?;
    tile.sample(latitude, longitude)
}

/// Assemble an isotropic height grid covering `distance_m` meters in every
/// direction around `(latitude, longitude)`.
///
/// Every 1°×1° tile intersecting the bounding box is loaded and stitched
/// into a mosaic, the mosaic is cropped to the box, no-data samples are
/// clamped to sea level, and the result is resampled so that both axes
/// share the coarser of the two metric resolutions.
pub fn height_data_around_point(
    store: &TileStore,
    latitude: f64,
    longitude: f64,
    distance_m: f64,
) -> Result<HeightGrid> {
    let distance_degree_lat = distance_m * ARC_SECOND_IN_DEGREE / ARC_SECOND_IN_M_EQUATOR;
    let distance_degree_lon =
        meter_in_arcseconds(latitude) * distance_m * ARC_SECOND_IN_DEGREE;

    let lower_latitude = latitude - distance_degree_lat;
    let upper_latitude = latitude + distance_degree_lat;
    let lower_longitude = longitude - distance_degree_lon;
    let upper_longitude = longitude + distance_degree_lon;

    let lat_lo = lower_latitude.floor() as i32;
    let lat_hi = upper_latitude.floor() as i32;
    let lon_lo = lower_longitude.floor() as i32;
    let lon_hi = upper_longitude.floor() as i32;

    let mut tile_rows = Vec::new();
    for lat in lat_lo..=lat_hi {
        let mut row = Vec::new();
        for lon in lon_lo..=lon_hi {
            row.push(store.load(lat, lon)?);
        }
        tile_rows.push(row);
    }

    let dim = tile_rows[0][0].dim();
    for row in &tile_rows {
        for tile in row {
            if tile.dim() != dim {
                bail!(
                    "mixed tile resolutions in region: {} vs {}",
                    tile.dim(),
                    dim
                );
            }
        }
    }

    // Mosaic dimensions; tile band 0 is the southernmost and the tiles are
    // already stored south-up, so mosaic row 0 is the southern edge.
    let mosaic_rows = tile_rows.len() * dim;
    let mosaic_cols = tile_rows[0].len() * dim;

    let degree_per_lat_ix = ((lat_hi + 1) - lat_lo) as f64 / mosaic_rows as f64;
    let degree_per_lon_ix = ((lon_hi + 1) - lon_lo) as f64 / mosaic_cols as f64;

    let lower_lat_ix = ((lower_latitude - lat_lo as f64) / degree_per_lat_ix) as usize;
    let upper_lat_ix =
        (((upper_latitude - lat_lo as f64) / degree_per_lat_ix) as usize).min(mosaic_rows);
    let lower_lon_ix = ((lower_longitude - lon_lo as f64) / degree_per_lon_ix) as usize;
    let upper_lon_ix =
        (((upper_longitude - lon_lo as f64) / degree_per_lon_ix) as usize).min(mosaic_cols);

    let out_rows = upper_lat_ix - lower_lat_ix;
    let out_cols = upper_lon_ix - lower_lon_ix;
    if out_rows == 0 || out_cols == 0 {
        bail!("requested region is smaller than one raster cell");
    }

    let mut heights = Vec::with_capacity(out_rows * out_cols);
    for r in lower_lat_ix..upper_lat_ix {
        let band = r / dim;
        let tile_row = r % dim;
        for c in lower_lon_ix..upper_lon_ix {
            let value = tile_rows[band][c / dim].get(tile_row, c % dim) as f64;
            // Voids in SRTM data are large negative sentinels.
            heights.push(if value < -1000.0 { 0.0 } else { value });
        }
    }

    let lat_resolution_degree = (upper_latitude - lower_latitude) / out_rows as f64;
    let lon_resolution_degree = (upper_longitude - lower_longitude) / out_cols as f64;

    let lat_resolution_meters =
        lat_resolution_degree / ARC_SECOND_IN_DEGREE * ARC_SECOND_IN_M_EQUATOR;
    let lon_resolution_meters =
        lon_resolution_degree / ARC_SECOND_IN_DEGREE * arcsecond_in_meters(latitude);

    let cell_size = lat_resolution_meters.max(lon_resolution_meters);

    let grid = HeightGrid::new(
        heights,
        out_rows,
        out_cols,
        cell_size,
        (lower_latitude, upper_latitude),
        (lower_longitude, upper_longitude),
    );

    Ok(grid.resample(
        lat_resolution_meters / cell_size,
        lon_resolution_meters / cell_size,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hgt::HgtTile;
    use std::io::Write;

    fn flat_grid(rows: usize, cols: usize, value: f64) -> HeightGrid {
        HeightGrid::new(
            vec![value; rows * cols],
            rows,
            cols,
            100.0,
            (47.0, 48.0),
            (11.0, 12.0),
        )
    }

    fn write_tile_fn(
        dir: &std::path::Path,
        lat: i32,
        lon: i32,
        dim: usize,
        f: impl Fn(usize, usize) -> i16,
    ) {
        // Files are written north-first, matching the on-disk format.
        let mut buffer = Vec::with_capacity(dim * dim * 2);
        for file_row in 0..dim {
            let south_row = dim - 1 - file_row;
            for col in 0..dim {
                buffer.extend_from_slice(&f(south_row, col).to_be_bytes());
            }
        }
        let path = dir.join(HgtTile::file_name(lat, lon));
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(&buffer).unwrap();
    }

    #[test]
    fn test_linspace_inclusive() {
        let xs = linspace(0.0, 1.0, 5);
        assert_eq!(xs, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
    }

    #[test]
    fn test_resample_preserves_flat_grid() {
        let grid = flat_grid(10, 10, 42.0);
        let resampled = grid.resample(0.5, 0.5);
        assert_eq!(resampled.rows, 5);
        assert_eq!(resampled.cols, 5);
        assert!(resampled.heights.iter().all(|&h| (h - 42.0).abs() < 1e-9));
        assert_eq!(resampled.latitudes, grid.latitudes);
    }

    #[test]
    fn test_resample_gradient_corners() {
        // Column gradient: corner values must survive resampling exactly.
        let mut heights = Vec::new();
        for _ in 0..4 {
            for c in 0..4 {
                heights.push(c as f64 * 10.0);
            }
        }
        let grid = HeightGrid::new(heights, 4, 4, 50.0, (0.0, 1.0), (0.0, 1.0));
        let doubled = grid.resample(2.0, 2.0);
        assert_eq!(doubled.rows, 8);
        assert!((doubled.get(0, 0) - 0.0).abs() < 1e-9);
        assert!((doubled.get(7, 7) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_downsample_scales_cell_size() {
        let grid = flat_grid(20, 20, 0.0);
        let down = grid.downsample(0.5);
        assert_eq!(down.rows, 10);
        assert!((down.cell_size - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_crop_narrows_bounds() {
        let mut heights = Vec::new();
        for r in 0..5 {
            for c in 0..5 {
                heights.push((r * 10 + c) as f64);
            }
        }
        let grid = HeightGrid::new(heights, 5, 5, 100.0, (47.0, 48.0), (11.0, 12.0));
        let cropped = grid.crop((1, 3), (2, 4));
        assert_eq!(cropped.rows, 3);
        assert_eq!(cropped.cols, 3);
        assert_eq!(cropped.get(0, 0), 12.0);
        assert_eq!(cropped.get(2, 2), 34.0);
        assert!((cropped.latitudes.0 - 47.25).abs() < 1e-9);
        assert!((cropped.latitudes.1 - 47.75).abs() < 1e-9);
    }

    #[test]
    fn test_assembly_is_isotropic_and_south_up() {
        let dir = tempfile::tempdir().unwrap();
        // Elevation grows with latitude so orientation errors are visible.
        write_tile_fn(dir.path(), 47, 11, 61, |row, _col| row as i16 * 10);
        let store = TileStore::with_dir(dir.path().to_path_buf());

        let grid = height_data_around_point(&store, 47.5, 11.5, 5000.0).unwrap();

        let (lat_res, lon_res) = grid.angular_resolution();
        let lat_m = lat_res / ARC_SECOND_IN_DEGREE * ARC_SECOND_IN_M_EQUATOR;
        let lon_m = lon_res / ARC_SECOND_IN_DEGREE * arcsecond_in_meters(47.5);
        assert!(
            (lat_m - lon_m).abs() / grid.cell_size < 0.05,
            "metric resolutions differ after assembly: {} vs {}",
            lat_m,
            lon_m
        );

        // Row 0 is the southern edge, hence the lowest elevation.
        assert!(grid.get(0, 0) < grid.get(grid.rows - 1, 0));
    }

    #[test]
    fn test_assembly_clamps_voids() {
        let dir = tempfile::tempdir().unwrap();
        write_tile_fn(dir.path(), 47, 11, 61, |_row, _col| -32768);
        let store = TileStore::with_dir(dir.path().to_path_buf());

        let grid = height_data_around_point(&store, 47.5, 11.5, 2000.0).unwrap();
        assert!(grid.heights.iter().all(|&h| h == 0.0));
    }

    #[test]
    fn test_assembly_spans_multiple_tiles() {
        let dir = tempfile::tempdir().unwrap();
        for lat in 46..=47 {
            for lon in 10..=11 {
                write_tile_fn(dir.path(), lat, lon, 31, move |_r, _c| {
                    (lat * 100 + lon) as i16
                });
            }
        }
        let store = TileStore::with_dir(dir.path().to_path_buf());

        // A point near the four-tile corner pulls from all four tiles.
        let grid = height_data_around_point(&store, 47.001, 11.001, 15000.0).unwrap();
        assert!(grid.rows > 0 && grid.cols > 0);
        let min = grid.heights.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = grid
            .heights
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(min >= 4610.0 && max <= 4711.0);
        assert!(max - min > 50.0, "expected samples from different tiles");
    }

    #[test]
    fn test_height_at_point() {
        let dir = tempfile::tempdir().unwrap();
        write_tile_fn(dir.path(), 47, 11, 11, |_r, _c| 1234);
        let store = TileStore::with_dir(dir.path().to_path_buf());
        let h = height_at_point(&store, 47.5, 11.5).unwrap();
        assert!((h - 1234.0).abs() < 1e-9);
    }
}
