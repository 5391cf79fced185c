//! Voxel ranges and the tile grids that cover them

use crate::error::{ImportError, Result};
use crate::types::{Point3d, TileSize};
use serde::{Deserialize, Serialize};

/// Axis-aligned box of voxels described by an offset and an end point
///
/// `end` is `offset + size`; it is the point handed to tile-index math, so a
/// range whose end lands exactly on a tile boundary also pulls in that
/// neighbouring tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelRange {
    offset: Point3d,
    end: Point3d,
}

impl VoxelRange {
    /// Build a range from an offset and a non-negative size
    pub fn from_size(offset: Point3d, size: Point3d) -> Result<Self> {
        if size.0.iter().any(|&s| s < 0) {
            return Err(ImportError::Parse(format!(
                "size must be non-negative, got {}",
                size
            )));
        }
        Self::from_endpoint(offset, offset.add_size(&size)?)
    }

    /// Build a range from an offset and an explicit end point
    pub fn from_endpoint(offset: Point3d, end: Point3d) -> Result<Self> {
        if !offset.le_all(&end) {
            return Err(ImportError::Parse(format!(
                "offset {} lies past end point {}",
                offset, end
            )));
        }
        Ok(Self { offset, end })
    }

    pub fn offset(&self) -> Point3d {
        self.offset
    }

    pub fn end(&self) -> Point3d {
        self.end
    }
}

/// Index of the tile holding voxel coordinate `v` for tiles of edge `t`
pub fn tile_index(v: i32, t: i32) -> i32 {
    v.div_euclid(t)
}

/// Position of one tile in the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub row: i32,
    pub col: i32,
}

/// Inclusive tile-index bounds on the two horizontal axes
///
/// Columns run along x, rows along y. A grid may be empty when built from
/// an extent smaller than one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    pub start_col: i32,
    pub end_col: i32,
    pub start_row: i32,
    pub end_row: i32,
}

impl TileGrid {
    /// Every tile whose footprint intersects `range`, bounds inclusive
    ///
    /// Fails when the first tile's corner would fall below `i32::MIN`.
    pub fn covering(range: &VoxelRange, tile_size: TileSize) -> Result<Self> {
        let offset = range.offset();
        let end = range.end();
        let grid = Self {
            start_col: tile_index(offset.x(), tile_size.width),
            end_col: tile_index(end.x(), tile_size.width),
            start_row: tile_index(offset.y(), tile_size.height),
            end_row: tile_index(end.y(), tile_size.height),
        };
        if grid.start_col.checked_mul(tile_size.width).is_none()
            || grid.start_row.checked_mul(tile_size.height).is_none()
        {
            return Err(ImportError::Parse(format!(
                "offset {} is outside the addressable tile range",
                offset
            )));
        }
        Ok(grid)
    }

    /// The whole tiles that fit inside a volume of `extent` voxels starting
    /// at the origin. Partial tiles at the far edges are left out.
    pub fn whole_tiles(extent: Point3d, tile_size: TileSize) -> Self {
        Self {
            start_col: 0,
            end_col: extent.x() / tile_size.width - 1,
            start_row: 0,
            end_row: extent.y() / tile_size.height - 1,
        }
    }

    pub fn num_cols(&self) -> usize {
        (i64::from(self.end_col) - i64::from(self.start_col) + 1).max(0) as usize
    }

    pub fn num_rows(&self) -> usize {
        (i64::from(self.end_row) - i64::from(self.start_row) + 1).max(0) as usize
    }

    /// Total number of tiles in one slice
    pub fn tile_count(&self) -> usize {
        self.num_cols() * self.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.tile_count() == 0
    }

    /// Tiles in row-major order: rows outer, columns inner
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (self.start_row..=self.end_row).flat_map(move |row| {
            (self.start_col..=self.end_col).map(move |col| TileCoord { row, col })
        })
    }

    /// Voxel (x, y) of a tile's top-left corner
    pub fn tile_origin(coord: TileCoord, tile_size: TileSize) -> (i32, i32) {
        (coord.col * tile_size.width, coord.row * tile_size.height)
    }

    /// Short description for logs
    pub fn summary(&self) -> String {
        format!(
            "X tiles {}..={}, Y tiles {}..={} ({} per slice)",
            self.start_col,
            self.end_col,
            self.start_row,
            self.end_row,
            self.tile_count()
        )
    }
}
