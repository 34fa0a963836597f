//! Mesh file loading.
//!
//! Only the position subset of Wavefront OBJ is understood: `v` records and
//! `f` records. Output is flat, fan-triangulated, de-indexed triangle data
//! ready for [`DrawableModel::set_vertex_positions`].
//!
//! [`DrawableModel::set_vertex_positions`]: crate::render::DrawableModel::set_vertex_positions

mod obj;

use std::path::PathBuf;

pub use obj::{load_obj, parse_obj, OBJ_EXTENSION};

/// Mesh loading failures.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported mesh format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: face references vertex {index} but only {vertex_count} are defined")]
    FaceIndex {
        line: usize,
        index: i64,
        vertex_count: usize,
    },
}
