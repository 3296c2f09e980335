// ABOUTME: Wiki initializer: wizard, state rendering, and first deploy
// ABOUTME: Writes per-wiki .env, PHP settings, and the initial admin password

use crate::commands::deploy::{deploy_wiki, DeployProfile};
use crate::config::FarmConfig;
use crate::docker::Engine;
use crate::envfile;
use crate::settings_php;
use crate::utils;
use crate::wizard::{collect_wiki_settings, InitPrefill};
use anyhow::{bail, Result};

/// Initialize a new wiki instance
///
/// Collects settings (interactively or from flags), renders the per-wiki
/// state files, and — unless `no_deploy` — runs the first deploy. Nothing is
/// written until the operator confirms the summary.
pub async fn init(farm: &FarmConfig, prefill: InitPrefill, no_deploy: bool) -> Result<()> {
    utils::check_required_tools()?;

    let wiki = collect_wiki_settings(&prefill)?;

    let wiki_dir = farm.wiki_dir(&wiki.name);
    if wiki_dir.join(".env").exists() {
        bail!(
            "Wiki '{}' is already initialized at {} — choose another name or remove its state directory",
            wiki.name,
            wiki_dir.display()
        );
    }

    envfile::write_env(&wiki_dir.join(".env"), &wiki.to_env_pairs())?;

    let admin_password = utils::generate_password(16);
    utils::write_secret_file(
        &wiki_dir.join("initialAdminPassword"),
        &format!("{}\n", admin_password),
    )?;

    utils::write_secret_file(
        &wiki_dir.join("pre-init-settings.php"),
        &settings_php::render_pre_init(&wiki, &farm.database_container),
    )?;
    utils::write_secret_file(
        &wiki_dir.join("post-init-settings.php"),
        &settings_php::render_post_init(&wiki),
    )?;

    tracing::info!("✓ Wiki state written to {}", wiki_dir.display());
    tracing::info!(
        "  Initial admin password stored in {}",
        wiki_dir.join("initialAdminPassword").display()
    );

    if no_deploy {
        tracing::info!(
            "Skipping deploy as requested — run `bluespice-farm deploy --wiki-name={}` when ready",
            wiki.name
        );
        return Ok(());
    }

    let engine = Engine::new();
    deploy_wiki(&engine, farm, &wiki, DeployProfile::Fresh, false).await
}
