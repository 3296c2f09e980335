// ABOUTME: Database import command for legacy SQL dumps
// ABOUTME: Resolves wiki credentials and drives the smart import pipeline

use crate::config::{FarmConfig, WikiSettings};
use crate::docker::Engine;
use crate::dump::{self, ImportOptions};
use crate::envfile;
use crate::utils;
use anyhow::{Context, Result};
use std::path::Path;

/// Import a legacy SQL dump into a wiki's database
pub async fn import_db(
    farm: &FarmConfig,
    wiki_name: &str,
    dump_path: &Path,
    options: ImportOptions,
) -> Result<()> {
    utils::check_required_tools()?;
    utils::validate_wiki_name(wiki_name)?;

    let env = envfile::load_env(&farm.wiki_dir(wiki_name).join(".env")).with_context(|| {
        format!(
            "Wiki '{}' is not initialized — run `bluespice-farm init` first",
            wiki_name
        )
    })?;
    let wiki = WikiSettings::from_env_map(&env)?;

    let engine = Engine::new();
    let report = dump::import_dump(&engine, farm, &wiki, dump_path, options).await?;

    match (&report.detected_prefix, report.prefix_stripped) {
        (Some(prefix), true) => {
            tracing::info!("Summary: stripped table prefix '{}' during import", prefix)
        }
        (Some(prefix), false) => {
            tracing::info!("Summary: kept detected table prefix '{}'", prefix)
        }
        (None, _) => tracing::info!("Summary: no table prefix detected"),
    }
    tracing::info!(
        "Summary: {} bytes of SQL prepared for '{}'",
        report.bytes_prepared,
        wiki.db.database
    );

    Ok(())
}
