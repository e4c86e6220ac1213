// ABOUTME: Serializes grouped table definitions into the normalized schema file
// ABOUTME: Writes atomically so a failed run never leaves a truncated schema.sql

use super::definitions::DefinitionSet;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Render definitions in table-name order: table, primary key, then indexes,
/// each statement followed by a blank line, with one extra newline between
/// tables.
pub fn render(definitions: &DefinitionSet) -> String {
    let mut out = String::new();

    for (idx, (_, definition)) in definitions.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        let statements = definition
            .table
            .iter()
            .chain(definition.primary_key.iter())
            .chain(definition.indexes.iter().map(|(_, text)| text));
        for statement in statements {
            out.push_str(statement);
            out.push_str("\n\n");
        }
    }

    out
}

/// Replace the file at `path` with `contents`.
///
/// The data goes to a temporary file in the same directory first and is
/// renamed over the target, so readers see either the old or the new schema.
/// An existing file keeps its permissions; a new one gets the usual 0644
/// instead of the temporary file's owner-only mode.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    file.write_all(contents.as_bytes())
        .context("Failed to write schema")?;
    file.flush().context("Failed to flush schema")?;

    let permissions = match std::fs::metadata(path) {
        Ok(metadata) => Some(metadata.permissions()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => default_permissions(),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read metadata of {}", path.display()))
        }
    };
    if let Some(permissions) = permissions {
        file.as_file()
            .set_permissions(permissions)
            .with_context(|| format!("Failed to set permissions for {}", path.display()))?;
    }

    file.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

#[cfg(unix)]
fn default_permissions() -> Option<std::fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<std::fs::Permissions> {
    None
}
