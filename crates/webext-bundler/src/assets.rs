//! Static asset copying.
//!
//! Pre-built assets (icons, fonts, `_locales`) are copied beneath the
//! output root exactly once per cycle, by the orchestrator. Nested builds
//! have this forcibly disabled so N groups do not copy the same tree N
//! times.

use std::path::Path;

use walkdir::WalkDir;

use crate::writer::{self, WriteOp};
use crate::{Error, Result};

/// Copy the tree at `assets_dir` beneath `out_root` (an output-root
/// subdirectory such as `assets`). Returns the copied files as
/// output-relative paths.
///
/// A missing assets directory is not an error: most extensions start
/// without one.
pub fn copy_assets(assets_dir: &Path, out_dir: &Path, out_root: &str) -> Result<Vec<String>> {
    if !assets_dir.exists() {
        return Ok(Vec::new());
    }
    if !assets_dir.is_dir() {
        return Err(Error::InvalidConfig(format!(
            "assets path '{}' is not a directory",
            assets_dir.display()
        )));
    }

    let mut ops: Vec<WriteOp> = Vec::new();
    for entry in WalkDir::new(assets_dir) {
        let entry = entry.map_err(|e| {
            Error::WriteFailure(format!(
                "failed to walk assets directory '{}': {e}",
                assets_dir.display()
            ))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(assets_dir)
            .map_err(|_| {
                Error::InvalidOutputPath(format!(
                    "asset '{}' is outside '{}'",
                    entry.path().display(),
                    assets_dir.display()
                ))
            })?
            .to_string_lossy()
            .replace('\\', "/");
        let contents = std::fs::read(entry.path())?;
        ops.push((format!("{out_root}/{relative}"), contents));
    }

    writer::write_files(out_dir, &ops)?;
    Ok(ops.into_iter().map(|(name, _)| name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copies_tree_preserving_structure() {
        let project = TempDir::new().expect("temp dir");
        let assets = project.path().join("public");
        std::fs::create_dir_all(assets.join("icons")).unwrap();
        std::fs::write(assets.join("icons/16.png"), b"png").unwrap();
        std::fs::write(assets.join("ruleset.json"), b"[]").unwrap();

        let out = project.path().join("dist");
        let mut copied = copy_assets(&assets, &out, "assets").unwrap();
        copied.sort();
        assert_eq!(copied, vec!["assets/icons/16.png", "assets/ruleset.json"]);
        assert_eq!(std::fs::read(out.join("assets/icons/16.png")).unwrap(), b"png");
    }

    #[test]
    fn test_missing_assets_dir_is_fine() {
        let project = TempDir::new().expect("temp dir");
        let copied = copy_assets(
            &project.path().join("nope"),
            &project.path().join("dist"),
            "assets",
        )
        .unwrap();
        assert!(copied.is_empty());
    }

    #[test]
    fn test_file_as_assets_dir_is_config_error() {
        let project = TempDir::new().expect("temp dir");
        let file = project.path().join("public");
        std::fs::write(&file, b"not a dir").unwrap();
        assert!(copy_assets(&file, &project.path().join("dist"), "assets").is_err());
    }
}
