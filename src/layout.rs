//! Storage layout detection for simulation outputs.
//!
//! Recognises the accepted on-disk shapes without opening any file: a single
//! HDF5 file, a directory of HDF5 chunks named `prefix.N.hdf5` (concatenated
//! along each dataset's leading axis in `N` order), a Zarr group directory,
//! and a GIZMO run directory holding a whole snapshot series.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

const ZARR_GROUP_MARKER: &str = ".zgroup";
const GIZMO_PARAMETERS_FILE: &str = "gizmo_parameters.txt";
const HDF5_EXTENSION: &str = "hdf5";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum StorageLayout {
    SingleHdf5 {
        path: PathBuf,
    },
    /// Chunk files ordered by their numeric suffix, starting at 0.
    MultiFileHdf5 {
        directory: PathBuf,
        prefix: String,
        files: Vec<PathBuf>,
    },
    Zarr {
        path: PathBuf,
    },
    /// Run directory marked by the GIZMO parameter dump.
    GizmoSeries {
        path: PathBuf,
    },
}

impl StorageLayout {
    pub fn format_name(&self) -> &'static str {
        match self {
            Self::SingleHdf5 { .. } => "single_hdf5",
            Self::MultiFileHdf5 { .. } => "multi_file_hdf5",
            Self::Zarr { .. } => "zarr",
            Self::GizmoSeries { .. } => "gizmo_series",
        }
    }
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("path '{0}' does not exist")]
    NotFound(PathBuf),

    #[error("failed to list '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no '<prefix>.<N>.hdf5' files in '{0}'")]
    NoChunkFiles(PathBuf),

    #[error("more than one file prefix in directory ({}), specify a prefix", .0.join(", "))]
    AmbiguousPrefix(Vec<String>),

    #[error("chunk file '{0}' is not named '<prefix>.<N>.hdf5'")]
    MalformedChunkName(String),

    #[error("chunk numbering has a gap: expected {expected}, found {found}")]
    NonContiguous { expected: u64, found: u64 },
}

/// Classify `path`. `file_prefix` restricts chunk files in a directory to
/// names starting with it.
pub fn detect_layout(
    path: impl AsRef<Path>,
    file_prefix: Option<&str>,
) -> Result<StorageLayout, LayoutError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LayoutError::NotFound(path.to_path_buf()));
    }

    let layout = if path.is_dir() {
        if path.join(ZARR_GROUP_MARKER).is_file() {
            StorageLayout::Zarr {
                path: path.to_path_buf(),
            }
        } else if is_gizmo_series(path) {
            StorageLayout::GizmoSeries {
                path: path.to_path_buf(),
            }
        } else {
            detect_chunked(path, file_prefix.unwrap_or(""))?
        }
    } else {
        StorageLayout::SingleHdf5 {
            path: path.to_path_buf(),
        }
    };

    debug!(path = %path.display(), format = layout.format_name(), "detected storage layout");
    Ok(layout)
}

/// Whether `path` is a directory carrying `gizmo_parameters.txt`.
pub fn is_gizmo_series(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    path.is_dir() && path.join(GIZMO_PARAMETERS_FILE).is_file()
}

struct ChunkFile {
    prefix: String,
    number: u64,
    path: PathBuf,
}

/// Split `snap_099.12.hdf5` into (`snap_099`, 12). Names without the HDF5
/// extension are not chunks at all.
fn parse_chunk_name(name: &str) -> Option<Result<(String, u64), LayoutError>> {
    let stem = name.strip_suffix(HDF5_EXTENSION)?.strip_suffix('.')?;
    let Some((prefix, number)) = stem.rsplit_once('.') else {
        return Some(Err(LayoutError::MalformedChunkName(name.to_string())));
    };
    if prefix.is_empty() {
        return Some(Err(LayoutError::MalformedChunkName(name.to_string())));
    }
    Some(
        number
            .parse::<u64>()
            .map(|n| (prefix.to_string(), n))
            .map_err(|_| LayoutError::MalformedChunkName(name.to_string())),
    )
}

fn detect_chunked(dir: &Path, file_prefix: &str) -> Result<StorageLayout, LayoutError> {
    let listing = fs::read_dir(dir).map_err(|source| LayoutError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut chunks: Vec<ChunkFile> = Vec::new();
    for entry in listing {
        let entry = entry.map_err(|source| LayoutError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        // Subdirectories are ignored.
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') || !name.starts_with(file_prefix) {
            continue;
        }
        let Some(parsed) = parse_chunk_name(name) else {
            continue;
        };
        let (prefix, number) = parsed?;
        chunks.push(ChunkFile {
            prefix,
            number,
            path,
        });
    }

    if chunks.is_empty() {
        return Err(LayoutError::NoChunkFiles(dir.to_path_buf()));
    }

    let prefixes: BTreeSet<&str> = chunks.iter().map(|c| c.prefix.as_str()).collect();
    if prefixes.len() > 1 {
        return Err(LayoutError::AmbiguousPrefix(
            prefixes.into_iter().map(str::to_string).collect(),
        ));
    }

    chunks.sort_by_key(|c| c.number);
    for (expected, chunk) in chunks.iter().enumerate() {
        let expected = expected as u64;
        if chunk.number != expected {
            return Err(LayoutError::NonContiguous {
                expected,
                found: chunk.number,
            });
        }
    }

    let prefix = chunks[0].prefix.clone();
    Ok(StorageLayout::MultiFileHdf5 {
        directory: dir.to_path_buf(),
        prefix,
        files: chunks.into_iter().map(|c| c.path).collect(),
    })
}
