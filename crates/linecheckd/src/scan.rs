//! Filesystem freshness scanning.
//!
//! Two concerns: locating the two most recent blank reference images
//! under the data tree, and resolving last-modified timestamps for the
//! deployed program/model files the report tracks.

use linecheck_common::timefmt;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("fewer than 2 blank reference images under {0}")]
    NotEnoughImages(PathBuf),
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One reference image snapshot at scan time.
#[derive(Debug, Clone)]
pub struct StationImage {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Last-modified time of one watched artifact.
#[derive(Debug, Clone)]
pub struct ArtifactTimestamp {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl ArtifactTimestamp {
    /// One freshness line: `<path> : 2026-08-05 14:03:27`.
    pub fn render(&self) -> String {
        format!("{} : {}", self.path.display(), timefmt::human_local(self.modified))
    }
}

/// Finds the two most recently modified blank reference images under
/// `root`, most recent first.
///
/// Candidates are the direct `.png` children (case-insensitive extension)
/// of any `High` directory that itself sits directly under a directory
/// literally named `blank`. All stations pool into one candidate set;
/// only global recency matters. Equal modification times keep the walk
/// order (stable sort), which is the tie-break policy.
pub fn find_latest_pair(root: &Path) -> Result<(StationImage, StationImage), ScanError> {
    let mut candidates = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_dir() || entry.file_name() != OsStr::new("blank") {
            continue;
        }
        let high = entry.path().join("High");
        if !high.is_dir() {
            continue;
        }
        // Direct children only; nested directories are other captures.
        for child in fs::read_dir(&high)? {
            let child = child?;
            if !child.file_type()?.is_file() {
                continue;
            }
            let path = child.path();
            let is_png = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
            if !is_png {
                continue;
            }
            let modified = child.metadata()?.modified()?;
            candidates.push(StationImage { path, modified });
        }
    }
    debug!(
        "blank image scan of {} found {} candidates",
        root.display(),
        candidates.len()
    );

    candidates.sort_by_key(|image| image.modified);
    let mut newest_first = candidates.into_iter().rev();
    match (newest_first.next(), newest_first.next()) {
        (Some(newest), Some(second)) => Ok((newest, second)),
        _ => Err(ScanError::NotEnoughImages(root.to_path_buf())),
    }
}

/// Resolves last-modified times for the watched files, in list order.
///
/// Any missing file fails the whole batch; the report then shows the
/// freshness section as unavailable rather than a partial list.
pub fn artifact_timestamps(paths: &[PathBuf]) -> Result<Vec<ArtifactTimestamp>, ScanError> {
    paths
        .iter()
        .map(|path| {
            let metadata = fs::metadata(path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ScanError::NotFound(path.clone()),
                _ => ScanError::Io(e),
            })?;
            Ok(ArtifactTimestamp {
                path: path.clone(),
                modified: metadata.modified()?,
            })
        })
        .collect()
}
