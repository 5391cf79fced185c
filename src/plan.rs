//! Import schedules: which tile goes to which dataset at which offset, in order
//!
//! Plans are computed up front from the run configuration and are consumed
//! slice by slice by the import loop. Nothing here talks to the server.

use crate::config::{
    TileServerImportConfig, VolumeImportConfig, GRAYSCALE_DATASET, LABELS_DATASET,
};
use crate::error::Result;
use crate::layout::{TileCoord, TileGrid};
use crate::paths::{RavelerLayout, TilePathResolver, VoxelProofLayout, RAVELER_TILE_SIZE};
use crate::types::{Point3d, TileKind, TileSize, ZRange};
use std::path::PathBuf;

/// One `server-add` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileImport {
    pub dataset: String,
    pub kind: TileKind,
    pub z: i32,
    pub coord: TileCoord,
    /// Absolute voxel offset of the tile's corner in the target volume
    pub offset: Point3d,
    pub path: PathBuf,
}

/// All imports for one z slice, plus what to report once it is done
#[derive(Debug, Clone)]
pub struct SliceBatch {
    pub z: i32,
    /// Dataset named in the progress line
    pub dataset: String,
    /// Grid positions visited for this slice
    pub positions: usize,
    pub imports: Vec<TileImport>,
}

/// Schedule for the Raveler importer
///
/// Tiles are addressed with absolute z. At each grid position the
/// superpixel tile goes first, then grayscale, both into the same dataset.
#[derive(Debug, Clone)]
pub struct TileServerPlan {
    dataset: String,
    layout: RavelerLayout,
    tile_size: TileSize,
    grid: TileGrid,
    z_range: ZRange,
    kinds: Vec<TileKind>,
}

impl TileServerPlan {
    pub fn new(config: &TileServerImportConfig) -> Result<Self> {
        let layout = RavelerLayout::new(&config.tiles_dir);
        let tile_size = TileSize {
            width: RAVELER_TILE_SIZE,
            height: RAVELER_TILE_SIZE,
        };
        let grid = TileGrid::covering(&config.range, tile_size)?;
        let z_range = ZRange::new(config.range.offset().z(), config.range.end().z())?;

        let mut kinds = Vec::with_capacity(2);
        if config.load_superpixels {
            kinds.push(TileKind::Label);
        }
        if config.load_grayscale {
            kinds.push(TileKind::Grayscale);
        }

        Ok(Self {
            dataset: config.dataset.clone(),
            layout,
            tile_size,
            grid,
            z_range,
            kinds,
        })
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn z_range(&self) -> ZRange {
        self.z_range
    }

    pub fn kinds(&self) -> &[TileKind] {
        &self.kinds
    }

    pub fn batches(&self) -> impl Iterator<Item = SliceBatch> + '_ {
        self.z_range.iter().map(move |z| {
            let imports = self
                .grid
                .tiles()
                .flat_map(|coord| {
                    let (x, y) = TileGrid::tile_origin(coord, self.tile_size);
                    self.kinds.iter().map(move |&kind| TileImport {
                        dataset: self.dataset.clone(),
                        kind,
                        z,
                        coord,
                        offset: Point3d::new(x, y, z),
                        path: self.layout.tile_path(coord, z, kind),
                    })
                })
                .collect();
            SliceBatch {
                z,
                dataset: self.dataset.clone(),
                positions: self.grid.tile_count(),
                imports,
            }
        })
    }
}

/// Schedule for the VoxelProof importers
///
/// Every grayscale slice is imported before any label slice. Offsets put the
/// first slice of the z range at z = 0 in the new volume.
#[derive(Debug, Clone)]
pub struct VolumePlan {
    layout: VoxelProofLayout,
    tile_size: TileSize,
    grid: TileGrid,
    z_range: ZRange,
}

impl VolumePlan {
    pub const PASSES: [(&'static str, TileKind); 2] = [
        (GRAYSCALE_DATASET, TileKind::Grayscale),
        (LABELS_DATASET, TileKind::Label),
    ];

    pub fn new(config: &VolumeImportConfig, extent: Point3d) -> Self {
        Self {
            layout: VoxelProofLayout::new(&config.source_dir),
            tile_size: config.tile_size,
            grid: TileGrid::whole_tiles(extent, config.tile_size),
            z_range: config.z_range,
        }
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Imports issued per pass
    pub fn imports_per_pass(&self) -> usize {
        self.grid.tile_count() * self.z_range.slice_count()
    }

    pub fn batches(&self) -> impl Iterator<Item = SliceBatch> + '_ {
        Self::PASSES.into_iter().flat_map(move |(dataset, kind)| {
            self.z_range
                .iter()
                .map(move |z| self.slice(dataset, kind, z))
        })
    }

    fn slice(&self, dataset: &str, kind: TileKind, z: i32) -> SliceBatch {
        let oz = z - self.z_range.min;
        let imports = self
            .grid
            .tiles()
            .map(|coord| {
                let (x, y) = TileGrid::tile_origin(coord, self.tile_size);
                TileImport {
                    dataset: dataset.to_string(),
                    kind,
                    z,
                    coord,
                    offset: Point3d::new(x, y, oz),
                    path: self.layout.tile_path(coord, z, kind),
                }
            })
            .collect();
        SliceBatch {
            z,
            dataset: dataset.to_string(),
            positions: self.grid.tile_count(),
            imports,
        }
    }
}
