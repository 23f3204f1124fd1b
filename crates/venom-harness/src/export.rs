//! Copying a results directory out of the harness scratch area.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{HarnessError, Result};
use crate::runner::TestResults;

/// Copy the results tree into `dest` (created if needed). Returns the
/// number of files copied. A run that produced no results directory
/// exports nothing and is not an error.
pub fn export_results(results: &TestResults, dest: &Path) -> Result<usize> {
    let export_err = |source| HarnessError::Export {
        path: dest.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dest).map_err(export_err)?;
    let source = results.results_dir.path();
    if !source.is_dir() {
        return Ok(0);
    }

    let mut copied = 0;
    copy_tree(source, dest, &mut copied).map_err(export_err)?;
    info!(files = copied, dest = ?dest, "Exported test results");
    Ok(copied)
}

fn copy_tree(src: &Path, dst: &Path, copied: &mut usize) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let target = dst.join(entry.file_name());
        if path.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_tree(&path, &target, copied)?;
        } else {
            std::fs::copy(&path, &target)?;
            *copied += 1;
        }
    }
    Ok(())
}

/// Files under `dir`, relative to it, sorted. Empty if `dir` is absent.
pub fn list_result_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if dir.is_dir() {
        collect(dir, dir, &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn collect(root: &Path, dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect(root, &path, files)?;
        } else {
            files.push(path.strip_prefix(root).unwrap_or(&path).to_path_buf());
        }
    }
    Ok(())
}
