// ABOUTME: Download and extraction of MediaWiki authentication extensions
// ABOUTME: Fetches PluggableAuth and OpenIDConnect release tarballs for install

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Release branch the extension tarballs are pinned to
pub const DEFAULT_BRANCH: &str = "REL1_39";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One downloadable extension bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionBundle {
    /// Directory name MediaWiki expects under `extensions/`
    pub name: &'static str,
    pub url: String,
}

/// The two bundles needed for OpenID Connect login
pub fn oauth_bundles(branch: &str) -> Vec<ExtensionBundle> {
    let source = |repo: &str| {
        format!(
            "https://github.com/wikimedia/mediawiki-extensions-{}/archive/refs/heads/{}.tar.gz",
            repo, branch
        )
    };
    vec![
        ExtensionBundle {
            name: "PluggableAuth",
            url: source("PluggableAuth"),
        },
        ExtensionBundle {
            name: "OpenIDConnect",
            url: source("OpenIDConnect"),
        },
    ]
}

/// Download one bundle tarball into `dest_dir`
///
/// The payload is checked for the gzip magic before it is written; a
/// rate-limit HTML page or a truncated download fails here instead of at
/// extraction time.
pub async fn download_bundle(
    client: &reqwest::Client,
    bundle: &ExtensionBundle,
    dest_dir: &Path,
) -> Result<PathBuf> {
    tracing::info!("Downloading {} from {}", bundle.name, bundle.url);

    let response = client
        .get(&bundle.url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", bundle.url))?
        .error_for_status()
        .with_context(|| format!("Server rejected download of {}", bundle.url))?;

    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read download body for {}", bundle.name))?;

    if bytes.len() < 2 || bytes[..2] != GZIP_MAGIC {
        bail!(
            "Download of {} is not a gzip tarball ({} bytes) — check network access and the release branch",
            bundle.name,
            bytes.len()
        );
    }

    let tarball = dest_dir.join(format!("{}.tar.gz", bundle.name));
    std::fs::write(&tarball, &bytes)
        .with_context(|| format!("Failed to write {}", tarball.display()))?;

    tracing::info!("✓ Downloaded {} ({} bytes)", bundle.name, bytes.len());
    Ok(tarball)
}

/// Extract a bundle tarball and normalize its directory name
///
/// Release tarballs unpack to a single `<repo>-<branch>` directory; the
/// result is renamed to the extension name MediaWiki expects. Entry paths
/// are unpacked relative to `dest`, never absolute.
pub fn extract_bundle(tarball: &Path, dest: &Path, extension_name: &str) -> Result<PathBuf> {
    let file = std::fs::File::open(tarball)
        .with_context(|| format!("Failed to open tarball {}", tarball.display()))?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    std::fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    archive
        .unpack(dest)
        .with_context(|| format!("Failed to extract {}", tarball.display()))?;

    // Find the single top-level directory the tarball produced
    let mut top_dirs = Vec::new();
    for entry in std::fs::read_dir(dest)
        .with_context(|| format!("Failed to list {}", dest.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            top_dirs.push(entry.path());
        }
    }

    let extracted = match top_dirs.as_slice() {
        [single] => single.clone(),
        _ => bail!(
            "Tarball {} did not extract to a single directory ({} found)",
            tarball.display(),
            top_dirs.len()
        ),
    };

    let final_path = dest.join(extension_name);
    if extracted != final_path {
        std::fs::rename(&extracted, &final_path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                extracted.display(),
                final_path.display()
            )
        })?;
    }

    let manifest = final_path.join("extension.json");
    if !manifest.exists() {
        bail!(
            "Extracted {} is missing extension.json — wrong or corrupt tarball",
            extension_name
        );
    }

    Ok(final_path)
}
