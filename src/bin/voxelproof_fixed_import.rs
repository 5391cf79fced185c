//! Creates a datastore from a VoxelProof data directory of known extent
//! (700 x 700 x 620 voxels). Ctrl-C stops the import after the current tile
//! and shuts the server down before exiting.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use voxel_import::cli::{exit_code, parse_arg, single_dash_long_flags};
use voxel_import::config::FIXED_VOLUME_EXTENT;
use voxel_import::import::run_volume_import;
use voxel_import::{
    CliServer, ImportReport, InvocationStyle, ServerSettings, TileSize, VolumeImportConfig,
    VolumeSource, ZRange,
};

/// Create a datastore from a fixed-size VoxelProof data directory
#[derive(Parser, Debug)]
#[command(name = "voxelproof-fixed-import", version)]
struct Args {
    /// Path to VoxelProof data directory
    voxelproof_dir: PathBuf,

    /// Range of z slices in "zmin,zmax" format, e.g. "0,619"
    z_range: String,

    /// Size of tile in "width,height" format, e.g. "100,100"
    tile_size: String,

    /// Path to output datastore directory to create
    output_dir: PathBuf,
}

async fn run(args: Args) -> anyhow::Result<ImportReport> {
    info!("VoxelProof data directory: {}", args.voxelproof_dir.display());
    let z_range: ZRange = parse_arg("z range", &args.z_range)?;
    info!("Z range {}", z_range);
    let tile_size: TileSize = parse_arg("tile size", &args.tile_size)?;
    info!("Tile size: {} pixels", tile_size);
    info!("Volume extent: {}", FIXED_VOLUME_EXTENT);
    info!("Output datastore: {}", args.output_dir.display());

    let config = VolumeImportConfig {
        source_dir: args.voxelproof_dir,
        z_range,
        tile_size,
        volume: VolumeSource::Fixed(FIXED_VOLUME_EXTENT),
        output_dir: args.output_dir,
        style: InvocationStyle::DatastoreFlag,
        handle_interrupt: true,
    };

    let settings = ServerSettings::from_env()?;
    let server = Arc::new(CliServer::new(settings.clone(), config.style));
    run_volume_import(server, &settings, &config)
        .await
        .with_context(|| format!("building datastore {}", config.output_dir.display()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_from(single_dash_long_flags(
        std::env::args_os(),
        &["help", "version"],
    ));
    voxel_import::logging::init_tracing();
    exit_code(run(args).await)
}
