//! Lumen viewer.
//!
//! Opens a window with a spinning colored cube, the world axes and any OBJ
//! meshes named on the command line.
//!
//! Controls: W/A/S/D to move, mouse to look, wheel to zoom, Escape to quit.
//! Shaders are read from `LUMEN_SHADER_DIR`, or the crate's `shaders/` directory.

mod geometry;
mod overlay;
mod viewer;

use std::path::PathBuf;

use anyhow::Result;
use lumen_engine::device::GpuInit;
use lumen_engine::logging::{init_logging, LoggingConfig};
use lumen_engine::window::{Runtime, RuntimeConfig};

use viewer::Viewer;

const SHADER_DIR_VAR: &str = "LUMEN_SHADER_DIR";

fn shader_dir() -> PathBuf {
    std::env::var_os(SHADER_DIR_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders"))
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig::default();
    let meshes: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    let shaders = shader_dir();
    log::info!("shaders from {}, {} mesh file(s)", shaders.display(), meshes.len());

    let viewer = Viewer::new(config.title.clone(), shaders, meshes);
    Runtime::run(config, GpuInit::default(), viewer)
}
