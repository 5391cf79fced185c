//! On-disk tile naming for the supported source layouts
//!
//! Resolvers are pure: they build paths and never touch the filesystem.
//! Whether a tile exists is the storage server's business when it tries to
//! read it.

use crate::layout::TileCoord;
use crate::types::TileKind;
use std::path::{Path, PathBuf};

/// Tile edge used by Raveler tile trees
pub const RAVELER_TILE_SIZE: i32 = 1024;

/// Slices at or past this z are grouped into bucket directories
const RAVELER_BUCKET: i32 = 1000;

/// Maps a tile position, slice and kind to the file holding it
pub trait TilePathResolver: Send + Sync {
    fn tile_path(&self, coord: TileCoord, z: i32, kind: TileKind) -> PathBuf;
}

/// Path of a Raveler tile relative to the tiles directory.
///
/// `<T>/0/<row>/<col>/<g|s>/<z>.png`, with z zero-padded to three digits, or
/// `<T>/0/<row>/<col>/<g|s>/<bucket>/<z>.png` once z reaches 1000.
pub fn raveler_tile_name(tile_size: i32, coord: TileCoord, z: i32, kind: TileKind) -> String {
    let type_dir = match kind {
        TileKind::Grayscale => "g",
        TileKind::Label => "s",
    };
    if z >= RAVELER_BUCKET {
        let bucket = (z / RAVELER_BUCKET) * RAVELER_BUCKET;
        format!(
            "{}/0/{}/{}/{}/{}/{}.png",
            tile_size, coord.row, coord.col, type_dir, bucket, z
        )
    } else {
        format!(
            "{}/0/{}/{}/{}/{:03}.png",
            tile_size, coord.row, coord.col, type_dir, z
        )
    }
}

/// Raveler tile tree: `tiles/<T>/0/<y>/<x>/{g,s}/[bucket/]<z>.png`
#[derive(Debug, Clone)]
pub struct RavelerLayout {
    root: PathBuf,
    tile_size: i32,
}

impl RavelerLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            tile_size: RAVELER_TILE_SIZE,
        }
    }

    pub fn tile_size(&self) -> i32 {
        self.tile_size
    }
}

impl TilePathResolver for RavelerLayout {
    fn tile_path(&self, coord: TileCoord, z: i32, kind: TileKind) -> PathBuf {
        self.root
            .join(raveler_tile_name(self.tile_size, coord, z, kind))
    }
}

/// VoxelProof data directory:
///
/// ```text
/// <root>/z/<z>/<row>-<col>.jpg        grayscale
/// <root>/comps/z/<z>/<row>-<col>.png  labels
/// ```
#[derive(Debug, Clone)]
pub struct VoxelProofLayout {
    root: PathBuf,
}

impl VoxelProofLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl TilePathResolver for VoxelProofLayout {
    fn tile_path(&self, coord: TileCoord, z: i32, kind: TileKind) -> PathBuf {
        let (base, ext) = match kind {
            TileKind::Grayscale => (self.root.clone(), "jpg"),
            TileKind::Label => (self.root.join("comps"), "png"),
        };
        base.join("z")
            .join(z.to_string())
            .join(format!("{}-{}.{}", coord.row, coord.col, ext))
    }
}
