//! voxel-import - bulk loaders for tiled microscopy volumes
//!
//! Drives an external voxel storage server through its command-line
//! interface, one tile per call. The server owns storage, versioning and
//! compression; this crate only works out which tile file goes where and
//! sequences the server's lifecycle around the imports.
//!
//! # Drivers
//!
//! - [`import::run_tile_server_import`]: Raveler tile trees into a running
//!   server, for a voxel offset and size.
//! - [`import::run_volume_import`]: VoxelProof directories into a freshly
//!   created datastore, with the volume extent taken from a JSON config or
//!   fixed up front.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voxel_import::{CliServer, InvocationStyle, ServerSettings};
//!
//! # async fn example(config: voxel_import::VolumeImportConfig) -> voxel_import::Result<()> {
//! let settings = ServerSettings::from_env()?;
//! let server = Arc::new(CliServer::new(settings.clone(), InvocationStyle::KeyValue));
//! let report = voxel_import::import::run_volume_import(server, &settings, &config).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod import;
pub mod layout;
pub mod logging;
pub mod paths;
pub mod plan;
pub mod server;
pub mod types;

// Re-exports
pub use cancel::{CancelHandle, CancelToken};
pub use config::{
    InvocationStyle, ServerSettings, TileServerImportConfig, VolumeConfig, VolumeImportConfig,
    VolumeSource,
};
pub use error::{ImportError, Result};
pub use import::{ImportOutcome, ImportReport};
pub use layout::{TileCoord, TileGrid, VoxelRange};
pub use paths::{RavelerLayout, TilePathResolver, VoxelProofLayout};
pub use server::{CliServer, DatastoreHandle, ServerClient, ServerSession};
pub use types::{Point2d, Point3d, TileKind, TileSize, ZRange};

/// Version of this crate
pub const VOXEL_IMPORT_VERSION: &str = env!("CARGO_PKG_VERSION");
