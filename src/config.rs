//! Run configuration
//!
//! Everything a driver needs is collected into immutable values before any
//! command is issued, then passed down explicitly.

use crate::error::{ImportError, Result};
use crate::layout::VoxelRange;
use crate::types::{Point3d, TileSize, ZRange};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the server executable
pub const SERVER_BIN_ENV: &str = "VOXEL_IMPORT_SERVER_BIN";

/// Environment variable overriding the post-start settle delay, in seconds
pub const SETTLE_SECS_ENV: &str = "VOXEL_IMPORT_SETTLE_SECS";

/// Default name of the storage server executable
pub const DEFAULT_SERVER_BIN: &str = "dvid";

/// Volume extent used by the fixed-volume VoxelProof importer
pub const FIXED_VOLUME_EXTENT: Point3d = Point3d([700, 700, 620]);

/// Dataset receiving grayscale tiles in the volume importers
pub const GRAYSCALE_DATASET: &str = "grayscale";
/// Value type of the grayscale dataset
pub const GRAYSCALE_TYPE: &str = "grayscale8";
/// Dataset receiving label tiles in the volume importers
pub const LABELS_DATASET: &str = "labels";
/// Value type of the label dataset
pub const LABELS_TYPE: &str = "labels32";

/// How to reach the storage server executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Executable name or path
    pub executable: PathBuf,
    /// Wait after `serve` before the first command; the server exposes no
    /// readiness signal.
    pub settle_delay: Duration,
    /// Upper bound on `init` output lines scanned for the root version
    pub max_init_lines: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_SERVER_BIN),
            settle_delay: Duration::from_secs(3),
            max_init_lines: 1000,
        }
    }
}

impl ServerSettings {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        if let Ok(bin) = std::env::var(SERVER_BIN_ENV) {
            if !bin.trim().is_empty() {
                settings.executable = PathBuf::from(bin);
            }
        }
        if let Ok(secs) = std::env::var(SETTLE_SECS_ENV) {
            let secs: u64 = secs.trim().parse().map_err(|e| {
                ImportError::Config(format!("{} must be whole seconds: {}", SETTLE_SECS_ENV, e))
            })?;
            settings.settle_delay = Duration::from_secs(secs);
        }
        Ok(settings)
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_max_init_lines(mut self, lines: usize) -> Self {
        self.max_init_lines = lines;
        self
    }
}

/// The volume configuration JSON handed to `init`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Volume extent in voxels
    #[serde(rename = "VolumeMax")]
    pub volume_max: [i32; 3],

    #[serde(rename = "VoxelRes", default, skip_serializing_if = "Option::is_none")]
    pub voxel_res: Option<[f32; 3]>,

    #[serde(rename = "VoxelResUnits", default, skip_serializing_if = "Option::is_none")]
    pub voxel_res_units: Option<String>,
}

impl VolumeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: VolumeConfig = serde_json::from_str(json)?;
        if config.volume_max.iter().any(|&v| v <= 0) {
            return Err(ImportError::Config(format!(
                "VolumeMax must be positive on every axis, got {:?}",
                config.volume_max
            )));
        }
        Ok(config)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ImportError::Config(format!("cannot read volume config {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn extent(&self) -> Point3d {
        Point3d(self.volume_max)
    }
}

/// Where a volume importer gets its extent from
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeSource {
    /// Read `VolumeMax` from this JSON file, also passed to `init`
    ConfigFile(PathBuf),
    /// Hard-coded extent
    Fixed(Point3d),
}

impl VolumeSource {
    pub fn extent(&self) -> Result<Point3d> {
        match self {
            VolumeSource::ConfigFile(path) => {
                let config = VolumeConfig::read(path)?;
                if let (Some(res), Some(units)) = (&config.voxel_res, &config.voxel_res_units) {
                    tracing::info!(?res, %units, "Voxel resolution");
                }
                Ok(config.extent())
            }
            VolumeSource::Fixed(extent) => Ok(*extent),
        }
    }

    pub fn config_file(&self) -> Option<&Path> {
        match self {
            VolumeSource::ConfigFile(path) => Some(path),
            VolumeSource::Fixed(_) => None,
        }
    }
}

/// How datastore-bound commands name their directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStyle {
    /// `init config=<cfg> dir=<dir>`, `serve dir=<dir>`
    KeyValue,
    /// `-datastore=<dir> init`, `-datastore=<dir> serve`
    DatastoreFlag,
}

/// Configuration for importing into an already running server
#[derive(Debug, Clone)]
pub struct TileServerImportConfig {
    pub uuid: String,
    pub dataset: String,
    pub tiles_dir: PathBuf,
    pub range: VoxelRange,
    pub load_superpixels: bool,
    pub load_grayscale: bool,
}

/// Configuration for creating a datastore and filling it from VoxelProof tiles
#[derive(Debug, Clone)]
pub struct VolumeImportConfig {
    pub source_dir: PathBuf,
    pub z_range: ZRange,
    pub tile_size: TileSize,
    pub volume: VolumeSource,
    pub output_dir: PathBuf,
    pub style: InvocationStyle,
    /// Stop cleanly on Ctrl-C
    pub handle_interrupt: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_volume_config_json() {
        let config = VolumeConfig::from_json(
            r#"{"VolumeMax": [700, 700, 620], "VoxelRes": [10.0, 10.0, 10.0], "VoxelResUnits": "nanometers"}"#,
        )
        .unwrap();
        assert_eq!(config.extent(), Point3d::new(700, 700, 620));
        assert_eq!(config.voxel_res_units.as_deref(), Some("nanometers"));

        let minimal = VolumeConfig::from_json(r#"{"VolumeMax": [1, 2, 3]}"#).unwrap();
        assert!(minimal.voxel_res.is_none());
    }

    #[test]
    fn test_volume_config_rejects_bad_extent() {
        assert!(VolumeConfig::from_json(r#"{"VolumeMax": [0, 700, 620]}"#).is_err());
        assert!(matches!(
            VolumeConfig::from_json(r#"{"VoxelRes": [1, 1, 1]}"#),
            Err(ImportError::Serialization(_))
        ));
    }

    #[test]
    fn test_volume_source_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"VolumeMax": [300, 200, 10]}}"#).unwrap();

        let source = VolumeSource::ConfigFile(file.path().to_path_buf());
        assert_eq!(source.extent().unwrap(), Point3d::new(300, 200, 10));
        assert_eq!(source.config_file(), Some(file.path()));

        let missing = VolumeSource::ConfigFile(PathBuf::from("/nonexistent/volume.json"));
        assert!(matches!(missing.extent(), Err(ImportError::Config(_))));
    }

    #[test]
    fn test_fixed_source() {
        let source = VolumeSource::Fixed(FIXED_VOLUME_EXTENT);
        assert_eq!(source.extent().unwrap(), Point3d::new(700, 700, 620));
        assert!(source.config_file().is_none());
    }

    #[test]
    fn test_server_settings_builders() {
        let settings = ServerSettings::default()
            .with_executable("/opt/bin/dvid")
            .with_settle_delay(Duration::ZERO)
            .with_max_init_lines(5);
        assert_eq!(settings.executable, PathBuf::from("/opt/bin/dvid"));
        assert_eq!(settings.settle_delay, Duration::ZERO);
        assert_eq!(settings.max_init_lines, 5);
        assert_eq!(ServerSettings::default().settle_delay, Duration::from_secs(3));
    }
}
