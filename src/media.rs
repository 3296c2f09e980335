// ABOUTME: Images archive handling for wiki media imports
// ABOUTME: Extracts zip archives with traversal protection before container copy

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::copy;
use std::path::Path;

/// Extract an images archive into a staging directory
///
/// Every entry name is resolved through the archive's own sandbox check;
/// entries with absolute paths or `..` components are rejected outright
/// rather than skipped, because an archive crafted that way is not a media
/// export.
///
/// # Returns
///
/// Number of regular files extracted.
pub fn extract_images_archive(archive_path: &Path, dest: &Path) -> Result<usize> {
    if !archive_path.exists() {
        bail!("Images archive not found at {}", archive_path.display());
    }

    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a readable zip archive", archive_path.display()))?;

    std::fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create staging directory {}", dest.display()))?;

    let mut extracted = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read entry {} of {}", i, archive_path.display()))?;

        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => bail!(
                "Archive entry '{}' escapes the extraction directory — refusing to extract",
                crate::utils::sanitize_display(entry.name())
            ),
        };
        let target = dest.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut out = File::create(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", target.display()))?;
        extracted += 1;
    }

    if extracted == 0 {
        tracing::warn!(
            "⚠ Archive {} contained no files",
            archive_path.display()
        );
    } else {
        tracing::info!(
            "✓ Extracted {} file(s) from {}",
            extracted,
            archive_path.display()
        );
    }

    Ok(extracted)
}
