//! Atomic, traversal-safe output writing.
//!
//! One build cycle writes many files: chunks, assets, rewritten documents,
//! and last of all the manifest. Either the whole set lands or none of it
//! does: files are written to `.tmp` siblings first and renamed into place
//! only once every temporary write succeeded, with rollback on failure.
//! Rename is atomic on the filesystems we care about, so a concurrent
//! reader (the browser reloading the unpacked extension) never observes a
//! half-written file.
//!
//! All output names are validated against the output directory before any
//! write: entry names come from the manifest and must not escape via `..`
//! components or absolute paths.

use std::fs;
use std::path::{Path, PathBuf};

use path_clean::PathClean;

use crate::{Error, Result};

/// One pending write: output-root-relative filename plus contents.
pub type WriteOp = (String, Vec<u8>);

/// Write `ops` beneath `dir` atomically.
///
/// Creates `dir` (and any parent directories of individual files) as
/// needed. Existing files are overwritten: within one cycle the orchestrator
/// owns the whole output directory.
pub fn write_files(dir: &Path, ops: &[WriteOp]) -> Result<()> {
    let dir = normalize_dir(dir)?;
    fs::create_dir_all(&dir).map_err(|e| {
        Error::WriteFailure(format!(
            "failed to create output directory '{}': {e}",
            dir.display()
        ))
    })?;

    let mut resolved = Vec::with_capacity(ops.len());
    for (filename, contents) in ops {
        let target = validate_output_path(&dir, filename)?;
        resolved.push((target, contents.as_slice()));
    }

    write_atomic(&resolved)
}

/// Normalize the output directory to an absolute, clean path.
fn normalize_dir(dir: &Path) -> Result<PathBuf> {
    let cleaned = dir.to_path_buf().clean();
    if cleaned.is_absolute() {
        return Ok(cleaned);
    }
    let cwd = std::env::current_dir()
        .map_err(|e| Error::InvalidOutputPath(format!("failed to get current directory: {e}")))?;
    Ok(cwd.join(cleaned).clean())
}

/// Resolve `filename` beneath `base_dir`, rejecting traversal.
pub fn validate_output_path(base_dir: &Path, filename: &str) -> Result<PathBuf> {
    if filename.contains('\0') {
        return Err(Error::InvalidOutputPath(
            "filename contains null byte".to_string(),
        ));
    }

    let full_path = base_dir.join(Path::new(filename).clean()).clean();
    if !full_path.starts_with(base_dir) {
        return Err(Error::InvalidOutputPath(format!(
            "path '{}' escapes output directory '{}'",
            filename,
            base_dir.display()
        )));
    }
    Ok(full_path)
}

/// Two-phase commit: all temp writes, then all renames, rollback on error.
fn write_atomic(ops: &[(PathBuf, &[u8])]) -> Result<()> {
    let mut temp_files: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(ops.len());

    for (target, contents) in ops {
        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                cleanup(&temp_files);
                return Err(Error::WriteFailure(format!(
                    "failed to create directory '{}': {e}",
                    parent.display()
                )));
            }
        }

        let temp = temp_path(target);
        if let Err(e) = fs::write(&temp, contents) {
            cleanup(&temp_files);
            return Err(Error::WriteFailure(format!(
                "failed to write temporary file '{}': {e}",
                temp.display()
            )));
        }
        temp_files.push((temp, target.clone()));
    }

    for (temp, target) in &temp_files {
        if let Err(e) = fs::rename(temp, target) {
            cleanup(&temp_files);
            return Err(Error::WriteFailure(format!(
                "failed to rename '{}' to '{}': {e}",
                temp.display(),
                target.display()
            )));
        }
    }

    Ok(())
}

/// Temp sibling of `target`. Appends to the full filename rather than
/// replacing the extension, so `a.js` and `a.js.map` cannot collide on the
/// same temp name.
fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn cleanup(temp_files: &[(PathBuf, PathBuf)]) {
    for (temp, _) in temp_files {
        if temp.exists() {
            if let Err(e) = fs::remove_file(temp) {
                tracing::warn!("failed to clean up temporary file '{}': {e}", temp.display());
            }
        }
    }
}
