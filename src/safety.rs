//! Safety checks run before anything in the library folder is touched.
//!
//! The sync renames and deletes hidden files inside the library folder, so
//! the folder must exist, be a directory, and be writable.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Validates that `folder` can serve as the library folder.
///
/// Checks:
/// - The path exists and is a directory
/// - A probe file can be created and removed inside it
pub fn validate_library_folder(folder: &Path) -> Result<()> {
    let meta = fs::metadata(folder)
        .with_context(|| format!("Library folder '{}' is not accessible", folder.display()))?;
    if !meta.is_dir() {
        bail!(
            "Safety check failed: library folder '{}' is not a directory",
            folder.display()
        );
    }

    let probe = folder.join(format!(".tracksync-probe-{}", std::process::id()));
    fs::write(&probe, b"").with_context(|| {
        format!(
            "Safety check failed: library folder '{}' is not writable",
            folder.display()
        )
    })?;
    fs::remove_file(&probe)
        .with_context(|| format!("Failed to remove probe file '{}'", probe.display()))?;

    Ok(())
}

/// Verifies an external helper binary can be spawned.
pub fn validate_binary(binary: &Path, version_flag: &str) -> Result<()> {
    let status = std::process::Command::new(binary)
        .arg(version_flag)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .with_context(|| format!("Dependency check failed: '{}' not found", binary.display()))?;
    if !status.success() {
        bail!(
            "Dependency check failed: '{} {}' exited with {}",
            binary.display(),
            version_flag,
            status
        );
    }
    Ok(())
}
