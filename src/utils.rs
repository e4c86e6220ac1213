// ABOUTME: Utility functions for tool discovery
// ABOUTME: Verifies the container runtime is installed before shelling out to it

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use which::which;

/// Check that the docker executable is available
///
/// `binary` may be a bare name looked up on `PATH` or a path to the
/// executable.
///
/// # Returns
///
/// The resolved path of the executable.
///
/// # Errors
///
/// Returns an error with installation hints if docker cannot be found.
///
/// # Examples
///
/// ```
/// # use pg_dev_tools::utils::check_docker;
/// # use std::path::Path;
/// assert!(check_docker(Path::new("definitely-not-docker")).is_err());
/// ```
pub fn check_docker(binary: &Path) -> Result<PathBuf> {
    match which(binary) {
        Ok(path) => Ok(path),
        Err(_) => bail!(
            "Docker executable '{}' not found.\n\
             \n\
             Please install Docker or point docker.binary in pg-dev-tools.toml\n\
             at the executable:\n\
             - Ubuntu/Debian: sudo apt-get install docker.io\n\
             - macOS: brew install --cask docker\n\
             - Other: https://docs.docker.com/get-docker/",
            binary.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_docker_missing() {
        let err = check_docker(Path::new("pg-dev-tools-no-such-docker")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[cfg(unix)]
    #[test]
    fn test_check_docker_resolves_existing_executable() {
        // Any executable on PATH stands in for docker here
        let path = check_docker(Path::new("sh")).unwrap();
        assert!(path.is_absolute());
    }
}
