use anyhow::{Context, Result, bail};
use std::path::Path;

/// SRTM elevation tile covering the 1°×1° square north-east of its
/// south-west corner.
///
/// The on-disk format is a square raster of big-endian signed 16-bit
/// meters with row 0 at the *northern* edge. The parser flips the rows so
/// that row 0 is the southern edge, matching the orientation of assembled
/// height grids (increasing row index = increasing latitude).
#[derive(Debug, Clone)]
pub struct HgtTile {
    samples: Vec<i16>,
    dim: usize,
    sw_corner: (i32, i32),
}

impl HgtTile {
    /// Parse a tile from its raw file contents.
    ///
    /// The raster dimension is inferred from the file size: a valid tile
    /// holds `2 * dim * dim` bytes for some integer `dim` (3601 for
    /// 1-arcsecond SRTM, 1201 for 3-arcsecond, but any square size is
    /// accepted).
    pub fn parse(buffer: &[u8], sw_corner: (i32, i32)) -> Result<Self> {
        let dim = ((buffer.len() / 2) as f64).sqrt() as usize;
        if dim * dim * 2 != buffer.len() || dim < 2 {
            bail!(
                "invalid HGT tile: {} bytes is not a square of 16-bit samples",
                buffer.len()
            );
        }

        // Decode north-first rows into a south-first sample array.
        let mut samples = vec![0i16; dim * dim];
        for file_row in 0..dim {
            let grid_row = dim - 1 - file_row;
            for col in 0..dim {
                let offset = (file_row * dim + col) * 2;
                samples[grid_row * dim + col] =
                    i16::from_be_bytes([buffer[offset], buffer[offset + 1]]);
            }
        }

        Ok(Self {
            samples,
            dim,
            sw_corner,
        })
    }

    /// Load a tile from disk. The file is read whole and closed before the
    /// tile is returned; a missing file is a hard error.
    pub fn from_file(path: &Path, sw_corner: (i32, i32)) -> Result<Self> {
        let buffer = std::fs::read(path)
            .with_context(|| format!("failed to read HGT tile {}", path.display()))?;
        Self::parse(&buffer, sw_corner)
            .with_context(|| format!("failed to parse HGT tile {}", path.display()))
    }

    /// File name for the tile whose south-west corner is `(lat, lon)`,
    /// e.g. `N47E011.hgt`, `S33W070.hgt`.
    pub fn file_name(lat: i32, lon: i32) -> String {
        let lat_prefix = if lat < 0 { "S" } else { "N" };
        let lon_prefix = if lon < 0 { "W" } else { "E" };
        format!(
            "{}{:02}{}{:03}.hgt",
            lat_prefix,
            lat.abs(),
            lon_prefix,
            lon.abs()
        )
    }

    /// Raster dimension (samples per side).
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn sw_corner(&self) -> (i32, i32) {
        self.sw_corner
    }

    /// Raw sample at `(row, col)` with row 0 at the southern edge.
    pub fn get(&self, row: usize, col: usize) -> i16 {
        self.samples[row * self.dim + col]
    }

    /// Elevation in meters at geographic coordinates inside this tile,
    /// bilinearly interpolated between the four nearest posts.
    pub fn sample(&self, lat: f64, lon: f64) -> Result<f64> {
        let posts = (self.dim - 1) as f64;
        let row = (lat - self.sw_corner.0 as f64) * posts;
        let col = (lon - self.sw_corner.1 as f64) * posts;

        if row < 0.0 || col < 0.0 || row > posts || col > posts {
            bail!(
                "coordinates ({}, {}) outside tile with SW corner {:?}",
                lat,
                lon,
                self.sw_corner
            );
        }

        let row_low = row.floor();
        let col_low = col.floor();
        let row_frac = row - row_low;
        let col_frac = col - col_low;

        let r0 = row_low as usize;
        let c0 = col_low as usize;
        let r1 = (r0 + 1).min(self.dim - 1);
        let c1 = (c0 + 1).min(self.dim - 1);

        let low = self.get(r0, c0) as f64 * (1.0 - col_frac) + self.get(r0, c1) as f64 * col_frac;
        let high = self.get(r1, c0) as f64 * (1.0 - col_frac) + self.get(r1, c1) as f64 * col_frac;

        Ok(low * (1.0 - row_frac) + high * row_frac)
    }
}
