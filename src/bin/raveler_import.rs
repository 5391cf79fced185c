//! Adds tiles from a Raveler tile directory to a dataset of a running
//! storage server.
//!
//! Run with: raveler-import [options] <uuid> <dataset name> <tiles dir> <offset x,y,z> <size x,y,z>

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use voxel_import::cli::{exit_code, parse_arg, single_dash_long_flags};
use voxel_import::import::run_tile_server_import;
use voxel_import::{
    CliServer, ImportReport, InvocationStyle, Point3d, ServerSettings, TileServerImportConfig,
    VoxelRange,
};

/// Add a data set to a storage server from a directory of Raveler tiles
#[derive(Parser, Debug)]
#[command(name = "raveler-import", version)]
struct Args {
    /// Root version UUID to import into
    uuid: String,

    /// Name of the target dataset
    dataset: String,

    /// Raveler tiles directory
    tiles_dir: PathBuf,

    /// Voxel offset in "x,y,z" format
    #[arg(allow_hyphen_values = true)]
    offset: String,

    /// Volume size in "x,y,z" format
    size: String,

    /// Load superpixel tiles
    #[arg(short = 's', long)]
    superpixels: bool,

    /// Load grayscale tiles
    #[arg(short = 'g', long)]
    grayscale: bool,
}

async fn run(args: Args) -> anyhow::Result<ImportReport> {
    info!("Tiles directory: {}", args.tiles_dir.display());
    let offset: Point3d = parse_arg("offset x,y,z", &args.offset)?;
    info!("Offset: {}", offset);
    let size: Point3d = parse_arg("size x,y,z", &args.size)?;
    info!("Size: {}", size);

    let config = TileServerImportConfig {
        uuid: args.uuid,
        dataset: args.dataset,
        tiles_dir: args.tiles_dir,
        range: VoxelRange::from_size(offset, size)?,
        load_superpixels: args.superpixels,
        load_grayscale: args.grayscale,
    };

    let settings = ServerSettings::from_env()?;
    let server = Arc::new(CliServer::new(settings, InvocationStyle::KeyValue));
    run_tile_server_import(server, &config)
        .await
        .with_context(|| format!("importing into dataset {}", config.dataset))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_from(single_dash_long_flags(
        std::env::args_os(),
        &["superpixels", "grayscale", "help", "version"],
    ));
    voxel_import::logging::init_tracing();
    exit_code(run(args).await)
}
