// ABOUTME: OAuth extension installer for OpenID Connect login
// ABOUTME: Downloads PluggableAuth/OpenIDConnect, installs them, appends PHP config

use crate::config::FarmConfig;
use crate::docker::Engine;
use crate::envfile;
use crate::extensions::{download_bundle, extract_bundle, oauth_bundles, DEFAULT_BRANCH};
use crate::settings_php::{append_oidc_block, render_oidc_block};
use crate::utils;
use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Input, Password};

const CONTAINER_EXTENSIONS_DIR: &str = "/app/bluespice/w/extensions";

/// OIDC provider credentials, prompted for when not passed by flag
#[derive(Debug, Clone, Default)]
pub struct OauthPrefill {
    pub provider_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub branch: Option<String>,
}

/// Install OpenID Connect login for one wiki
///
/// Downloads the PluggableAuth and OpenIDConnect release tarballs, places
/// them in the container's extensions directory, runs Composer for the OIDC
/// dependencies, and appends the managed PHP block to the wiki's post-init
/// settings. The PHP append is idempotent; re-running the command refreshes
/// the extension files without duplicating configuration.
pub async fn install_oauth(farm: &FarmConfig, wiki_name: &str, prefill: OauthPrefill) -> Result<()> {
    utils::check_required_tools()?;
    utils::validate_wiki_name(wiki_name)?;

    let wiki_dir = farm.wiki_dir(wiki_name);
    envfile::load_env(&wiki_dir.join(".env")).with_context(|| {
        format!(
            "Wiki '{}' is not initialized — run `bluespice-farm init` first",
            wiki_name
        )
    })?;

    let theme = ColorfulTheme::default();
    let provider_url = match prefill.provider_url {
        Some(url) => url,
        None => Input::with_theme(&theme)
            .with_prompt("OIDC provider URL (e.g. 'https://login.example.com/realms/wiki')")
            .interact_text()
            .context("Failed to read provider URL")?,
    };
    let client_id = match prefill.client_id {
        Some(id) => id,
        None => Input::with_theme(&theme)
            .with_prompt("OIDC client ID")
            .interact_text()
            .context("Failed to read client ID")?,
    };
    let client_secret = match prefill.client_secret {
        Some(secret) => secret,
        None => Password::with_theme(&theme)
            .with_prompt("OIDC client secret")
            .interact()
            .context("Failed to read client secret")?,
    };
    let branch = prefill.branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string());

    let engine = Engine::new();
    let container = farm.wiki_container_name(wiki_name);

    let work_dir = utils::create_managed_temp_dir()?;
    let result = run_install(
        &engine,
        farm,
        &container,
        &wiki_dir,
        &branch,
        &provider_url,
        &client_id,
        &client_secret,
        &work_dir,
    )
    .await;

    if let Err(e) = utils::remove_managed_temp_dir(&work_dir) {
        tracing::warn!("Failed to clean up download directory: {:#}", e);
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn run_install(
    engine: &Engine,
    farm: &FarmConfig,
    container: &str,
    wiki_dir: &std::path::Path,
    branch: &str,
    provider_url: &str,
    client_id: &str,
    client_secret: &str,
    work_dir: &std::path::Path,
) -> Result<()> {
    let client = reqwest::Client::new();
    let extract_root = work_dir.join("extensions");

    for bundle in oauth_bundles(branch) {
        let tarball = download_bundle(&client, &bundle, work_dir).await?;
        let extracted = extract_bundle(&tarball, &extract_root.join(bundle.name), bundle.name)?;

        engine.exec_check(
            container,
            &[
                "rm",
                "-rf",
                &format!("{}/{}", CONTAINER_EXTENSIONS_DIR, bundle.name),
            ],
        )?;
        engine.copy_into(&extracted, container, CONTAINER_EXTENSIONS_DIR)?;
        tracing::info!("✓ Installed extension {}", bundle.name);
    }

    tracing::info!("Running composer for OpenIDConnect dependencies");
    engine.exec_streamed(
        container,
        &[
            "composer",
            "install",
            "--no-dev",
            "--working-dir",
            &format!("{}/OpenIDConnect", CONTAINER_EXTENSIONS_DIR),
        ],
    )?;

    let post_init = wiki_dir.join("post-init-settings.php");
    let existing = std::fs::read_to_string(&post_init).with_context(|| {
        format!(
            "Failed to read {} — run a deploy for this wiki first",
            post_init.display()
        )
    })?;

    let block = render_oidc_block(provider_url, client_id, client_secret);
    match append_oidc_block(&existing, &block) {
        Some(updated) => {
            utils::write_secret_file(&post_init, &updated)?;
            engine.copy_into(
                &post_init,
                container,
                &format!("{}/", farm.container_settings_dir),
            )?;
            tracing::info!("✓ OpenID Connect configuration appended");
        }
        None => {
            tracing::info!("OpenID Connect configuration already present; leaving it unchanged");
        }
    }

    tracing::info!("✓ OAuth login installed for container {}", container);
    Ok(())
}
