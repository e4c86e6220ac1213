// ABOUTME: Discovery of forward migration scripts in the migrations directory
// ABOUTME: Filters by the up-suffix and orders scripts by filename

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// List the "up" migrations in `dir`, sorted by filename.
///
/// Only regular files whose name ends with `suffix` are returned; the
/// directory is not searched recursively.
pub fn discover_up_migrations(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read migrations directory {}", dir.display()))?;

    let mut migrations = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("Failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let is_up = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(suffix));
        if is_up && path.is_file() {
            migrations.push(path);
        }
    }

    migrations.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(migrations)
}
