// ABOUTME: Image import command for wiki media archives
// ABOUTME: Extracts a zip, stages it in the container, and re-registers files

use crate::config::FarmConfig;
use crate::docker::Engine;
use crate::envfile;
use crate::health::{wait_for_container, ReadinessBudget};
use crate::media;
use crate::utils;
use anyhow::{bail, Context, Result};
use std::path::Path;

const CONTAINER_STAGING_DIR: &str = "/tmp/bluespice-farm-images";

/// Import a zip archive of media files into a wiki
///
/// The archive is extracted on the host (traversal-checked), copied into the
/// wiki container, chowned to the web server user, and registered through
/// `importImages.php` followed by `rebuildImages.php`. A failure after the
/// copy leaves the copied files in place; re-running the command is safe
/// because `importImages.php` skips files it has already registered.
pub async fn import_images(farm: &FarmConfig, wiki_name: &str, archive: &Path) -> Result<()> {
    utils::check_required_tools()?;
    utils::validate_wiki_name(wiki_name)?;

    // Fails before any side effect when the wiki is unknown
    envfile::load_env(&farm.wiki_dir(wiki_name).join(".env")).with_context(|| {
        format!(
            "Wiki '{}' is not initialized — run `bluespice-farm init` first",
            wiki_name
        )
    })?;

    let staging = utils::create_managed_temp_dir()?;
    let result = run_import(farm, wiki_name, archive, &staging).await;

    if let Err(e) = utils::remove_managed_temp_dir(&staging) {
        tracing::warn!("Failed to clean up staging directory: {:#}", e);
    }

    result
}

async fn run_import(
    farm: &FarmConfig,
    wiki_name: &str,
    archive: &Path,
    staging: &Path,
) -> Result<()> {
    let extract_dir = staging.join("images");
    let count = media::extract_images_archive(archive, &extract_dir)?;
    if count == 0 {
        bail!(
            "Archive {} contains no files — nothing to import",
            archive.display()
        );
    }

    let engine = Engine::new();
    let container = farm.wiki_container_name(wiki_name);
    wait_for_container(
        &engine,
        &container,
        Some(&farm.container_marker_file),
        ReadinessBudget::from_config(farm),
    )
    .await?;

    // Stale staging from an interrupted earlier run would double-register
    engine.exec_check(&container, &["rm", "-rf", CONTAINER_STAGING_DIR])?;
    engine.copy_into(&extract_dir, &container, CONTAINER_STAGING_DIR)?;
    engine.exec_streamed(
        &container,
        &["chown", "-R", "www-data:www-data", CONTAINER_STAGING_DIR],
    )?;

    engine.exec_streamed(
        &container,
        &[
            "php",
            "maintenance/importImages.php",
            CONTAINER_STAGING_DIR,
            "--search-recursively",
        ],
    )?;
    engine.exec_streamed(&container, &["php", "maintenance/rebuildImages.php"])?;

    engine.exec_check(&container, &["rm", "-rf", CONTAINER_STAGING_DIR])?;

    tracing::info!("✓ Imported {} media file(s) into '{}'", count, wiki_name);
    Ok(())
}
