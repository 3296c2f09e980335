// ABOUTME: Wiki deploy engine: database provisioning, readiness wait, installer runs
// ABOUTME: Tracks progress in a per-wiki checkpoint so failed deploys resume

use crate::checkpoint::{
    checkpoint_path, remove_checkpoint, steps, DeployCheckpoint, DeployCheckpointMetadata,
};
use crate::config::{FarmConfig, WikiSettings};
use crate::docker::{DbSession, Engine};
use crate::envfile;
use crate::health::{wait_for_container, ReadinessBudget};
use crate::settings_php;
use crate::utils;
use anyhow::{Context, Result};
use std::path::Path;

/// Deployment profile selected with `--profile`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DeployProfile {
    /// First-time installation: run install.php, then update.php
    Fresh,
    /// Schema upgrade of an existing wiki: update.php only
    Upgrade,
}

impl DeployProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployProfile::Fresh => "fresh",
            DeployProfile::Upgrade => "upgrade",
        }
    }
}

/// Deploy a previously initialized wiki by name
pub async fn deploy(
    farm: &FarmConfig,
    wiki_name: &str,
    profile: DeployProfile,
    fresh_install: bool,
) -> Result<()> {
    utils::check_required_tools()?;
    utils::validate_wiki_name(wiki_name)?;

    let wiki_dir = farm.wiki_dir(wiki_name);
    let env = envfile::load_env(&wiki_dir.join(".env")).with_context(|| {
        format!(
            "Wiki '{}' is not initialized — run `bluespice-farm init` first",
            wiki_name
        )
    })?;
    let wiki = WikiSettings::from_env_map(&env)?;

    let engine = Engine::new();
    deploy_wiki(&engine, farm, &wiki, profile, fresh_install).await
}

/// Deploy one wiki instance from resolved settings
///
/// Steps are recorded in the wiki's deploy checkpoint as they complete; a
/// re-run after a failure resumes at the first incomplete step.
/// `fresh_install` discards the checkpoint and forces the installer even
/// when a LocalSettings.php already exists in the container.
pub async fn deploy_wiki(
    engine: &Engine,
    farm: &FarmConfig,
    wiki: &WikiSettings,
    profile: DeployProfile,
    fresh_install: bool,
) -> Result<()> {
    tracing::info!(
        "Deploying wiki '{}' (profile: {})",
        wiki.name,
        profile.as_str()
    );

    let wiki_dir = farm.wiki_dir(&wiki.name);
    let cp_path = checkpoint_path(&wiki_dir);
    if fresh_install {
        remove_checkpoint(&cp_path)?;
    }

    let metadata = DeployCheckpointMetadata::new(&wiki.name, &wiki.db.database, profile.as_str());
    let mut checkpoint = match DeployCheckpoint::load(&cp_path)? {
        Some(existing) => {
            existing.validate(&metadata)?;
            tracing::info!(
                "Resuming deploy: {} step(s) already complete",
                existing.completed_count()
            );
            existing
        }
        None => DeployCheckpoint::new(metadata),
    };

    // Database and user
    if checkpoint.is_completed(steps::DATABASE_CREATED) {
        tracing::info!("Skipping database provisioning (already done)");
    } else {
        provision_database(engine, farm, wiki)?;
        checkpoint.mark_completed(steps::DATABASE_CREATED);
        checkpoint.save(&cp_path)?;
    }

    // Wiki container readiness
    let container = farm.wiki_container_name(&wiki.name);
    if checkpoint.is_completed(steps::CONTAINER_READY) {
        tracing::info!("Skipping readiness wait (already done)");
    } else {
        wait_for_container(
            engine,
            &container,
            Some(&farm.container_marker_file),
            ReadinessBudget::from_config(farm),
        )
        .await?;
        checkpoint.mark_completed(steps::CONTAINER_READY);
        checkpoint.save(&cp_path)?;
    }

    // MediaWiki installer
    if profile == DeployProfile::Fresh {
        if checkpoint.is_completed(steps::INSTALLED) {
            tracing::info!("Skipping installer (already done)");
        } else {
            let already_installed =
                engine.file_exists_in_container(&container, "/app/bluespice/w/LocalSettings.php")?;
            if already_installed && !fresh_install {
                tracing::info!("LocalSettings.php already present; skipping install.php");
            } else {
                run_installer(engine, farm, wiki, &container, &wiki_dir)?;
            }
            checkpoint.mark_completed(steps::INSTALLED);
            checkpoint.save(&cp_path)?;
        }
    }

    // Schema update
    if checkpoint.is_completed(steps::UPDATED) {
        tracing::info!("Skipping update.php (already done)");
    } else {
        tracing::info!("Running update.php in {}", container);
        engine.exec_streamed(&container, &["php", "maintenance/update.php", "--quick"])?;
        checkpoint.mark_completed(steps::UPDATED);
        checkpoint.save(&cp_path)?;
    }

    // Settings files
    if checkpoint.is_completed(steps::SETTINGS_COPIED) {
        tracing::info!("Skipping settings copy (already done)");
    } else {
        copy_settings(engine, farm, wiki, &container, &wiki_dir)?;
        checkpoint.mark_completed(steps::SETTINGS_COPIED);
        checkpoint.save(&cp_path)?;
    }

    verify_search_index(engine, farm);

    tracing::info!("✓ Wiki '{}' deployed at {}", wiki.name, wiki.server_url());
    Ok(())
}

/// Create the per-wiki database and user, idempotently
fn provision_database(engine: &Engine, farm: &FarmConfig, wiki: &WikiSettings) -> Result<()> {
    tracing::info!(
        "Provisioning database '{}' and user '{}'",
        wiki.db.database,
        wiki.db.user
    );

    let root_env = envfile::load_env(&farm.farm_env_path()).context(
        "Farm credentials not found — run `bluespice-farm services up` first to bootstrap them",
    )?;
    let root_user = root_env
        .get("DB_ROOT_USER")
        .context("Farm env is missing DB_ROOT_USER")?;
    let root_password = root_env
        .get("DB_ROOT_PASSWORD")
        .context("Farm env is missing DB_ROOT_PASSWORD")?;

    // Identifiers derive from the validated wiki name and passwords are
    // generated alphanumeric, so inlining them here cannot break out of the
    // statement
    let statements = format!(
        "CREATE DATABASE IF NOT EXISTS `{db}` CHARACTER SET utf8mb4 COLLATE utf8mb4_general_ci;\n\
         CREATE USER IF NOT EXISTS '{user}'@'%' IDENTIFIED BY '{password}';\n\
         ALTER USER '{user}'@'%' IDENTIFIED BY '{password}';\n\
         GRANT ALL PRIVILEGES ON `{db}`.* TO '{user}'@'%';\n\
         FLUSH PRIVILEGES;",
        db = wiki.db.database,
        user = wiki.db.user,
        password = wiki.db.password,
    );

    let session = DbSession::open(engine, &farm.database_container, root_user, root_password)?;
    session.run_sql(None, &statements)?;
    session.close()?;

    tracing::info!("✓ Database provisioned");
    Ok(())
}

/// Run MediaWiki's install.php inside the wiki container
///
/// Passwords travel via --dbpassfile/--passfile copied into the container,
/// not on the installer's argv.
fn run_installer(
    engine: &Engine,
    farm: &FarmConfig,
    wiki: &WikiSettings,
    container: &str,
    wiki_dir: &Path,
) -> Result<()> {
    tracing::info!("Running install.php for '{}'", wiki.name);

    let admin_password_path = wiki_dir.join("initialAdminPassword");
    let admin_password = std::fs::read_to_string(&admin_password_path)
        .with_context(|| {
            format!(
                "Failed to read {} — was init run for this wiki?",
                admin_password_path.display()
            )
        })?
        .trim()
        .to_string();

    let remote_dbpass = "/tmp/bluespice-farm-dbpass";
    let remote_adminpass = "/tmp/bluespice-farm-adminpass";

    let staging = utils::create_managed_temp_dir()?;
    let local_dbpass = staging.join("dbpass");
    let local_adminpass = staging.join("adminpass");
    utils::write_secret_file(&local_dbpass, &wiki.db.password)?;
    utils::write_secret_file(&local_adminpass, &admin_password)?;
    engine.copy_into(&local_dbpass, container, remote_dbpass)?;
    engine.copy_into(&local_adminpass, container, remote_adminpass)?;

    let result = engine.exec_streamed(
        container,
        &[
            "php",
            "maintenance/install.php",
            "--dbtype",
            "mysql",
            "--dbserver",
            &farm.database_container,
            "--dbname",
            &wiki.db.database,
            "--dbuser",
            &wiki.db.user,
            "--dbpassfile",
            remote_dbpass,
            "--server",
            &wiki.server_url(),
            "--scriptpath",
            "/w",
            "--lang",
            &wiki.language,
            "--passfile",
            remote_adminpass,
            &wiki.sitename,
            "WikiSysop",
        ],
    );

    // Remove the password files whether or not the installer succeeded
    let _ = engine.exec_check(container, &["rm", "-f", remote_dbpass, remote_adminpass]);
    if let Err(e) = utils::remove_managed_temp_dir(&staging) {
        tracing::warn!("Failed to clean up installer staging: {:#}", e);
    }

    result.context("install.php failed — see the installer output above")?;
    tracing::info!("✓ MediaWiki installed");
    Ok(())
}

/// Render and copy the pre-init/post-init settings files into the container
fn copy_settings(
    engine: &Engine,
    farm: &FarmConfig,
    wiki: &WikiSettings,
    container: &str,
    wiki_dir: &Path,
) -> Result<()> {
    tracing::info!("Copying settings files into {}", container);

    let pre_init = wiki_dir.join("pre-init-settings.php");
    let post_init = wiki_dir.join("post-init-settings.php");

    utils::write_secret_file(
        &pre_init,
        &settings_php::render_pre_init(wiki, &farm.database_container),
    )?;
    // Never clobber a post-init file that may already carry appended blocks
    if !post_init.exists() {
        utils::write_secret_file(&post_init, &settings_php::render_post_init(wiki))?;
    }

    engine.copy_into(&pre_init, container, &format!("{}/", farm.container_settings_dir))?;
    engine.copy_into(&post_init, container, &format!("{}/", farm.container_settings_dir))?;

    tracing::info!("✓ Settings files in place");
    Ok(())
}

/// Soft verification that the shared search backend looks usable
///
/// Inconclusive results are logged and ignored; search health never fails a
/// deploy.
fn verify_search_index(engine: &Engine, farm: &FarmConfig) {
    let search = match farm.services.iter().find(|s| s.contains("search")) {
        Some(search) => search,
        None => {
            tracing::warn!("⚠ Search index verification inconclusive: no search service configured");
            return;
        }
    };

    match engine.container_state(search) {
        Ok(Some(state)) if state.is_ready() => {
            tracing::info!("✓ Search backend {} is ready", search);
        }
        Ok(Some(_)) | Ok(None) => {
            tracing::warn!(
                "⚠ Search index verification inconclusive: {} is not ready; \
                 pages will index once it recovers",
                search
            );
        }
        Err(e) => {
            tracing::warn!("⚠ Search index verification inconclusive: {:#}", e);
        }
    }
}
