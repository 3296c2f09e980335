// ABOUTME: Shared services controller for the farm's common container stack
// ABOUTME: Brings up compose services, waits for health, bootstraps root credentials

use crate::config::FarmConfig;
use crate::docker::Engine;
use crate::envfile;
use crate::health::{wait_for_container, ReadinessBudget};
use crate::utils;
use anyhow::{bail, Context, Result};

/// Bring the shared services stack up and make it usable
///
/// Idempotent: compose reconciles running containers, readiness waits pass
/// immediately for healthy services, and the root-password bootstrap is
/// guarded by a marker file so it runs exactly once per farm.
pub async fn services_up(farm: &FarmConfig) -> Result<()> {
    utils::check_required_tools()?;

    if !farm.compose_file.exists() {
        bail!(
            "Compose file not found at {} — set `compose_file` in farm.toml",
            farm.compose_file.display()
        );
    }

    let engine = Engine::new();
    engine.compose_up(&farm.compose_file, &farm.compose_project)?;

    let budget = ReadinessBudget::from_config(farm);
    for service in &farm.services {
        wait_for_container(&engine, service, None, budget).await?;
    }

    bootstrap_root_password(&engine, farm)?;

    tracing::info!("✓ Shared services are up");
    Ok(())
}

/// Print the state of every shared service container
///
/// Exits non-zero when any service is missing or not ready, so the command
/// doubles as a scriptable health probe.
pub async fn services_status(farm: &FarmConfig) -> Result<()> {
    utils::check_required_tools()?;
    let engine = Engine::new();

    let mut all_ready = true;
    for service in &farm.services {
        match engine.container_state(service)? {
            Some(state) => {
                let health = state.health.as_deref().unwrap_or("no healthcheck");
                let verdict = if state.is_ready() { "ready" } else { "NOT READY" };
                println!(
                    "{:<30} running={:<5} health={:<12} {}",
                    service, state.running, health, verdict
                );
                if !state.is_ready() {
                    all_ready = false;
                }
            }
            None => {
                println!("{:<30} (container not found)", service);
                all_ready = false;
            }
        }
    }

    if !all_ready {
        bail!("One or more shared services are not ready");
    }
    Ok(())
}

/// One-time root password bootstrap for the shared database server
///
/// Fresh MariaDB containers accept the root account without a password over
/// the container-local connection; this sets a generated password, persists
/// it to the farm env file, and drops a marker so the step never re-runs.
fn bootstrap_root_password(engine: &Engine, farm: &FarmConfig) -> Result<()> {
    let marker = farm.root_bootstrap_marker();
    if marker.exists() {
        tracing::info!("Root password bootstrap already done; skipping");
        return Ok(());
    }

    tracing::info!("Bootstrapping database root password (one-time)");

    let password = utils::generate_password(32);
    let statement = format!(
        "ALTER USER '{root}'@'localhost' IDENTIFIED BY '{password}'; FLUSH PRIVILEGES;",
        root = farm.database_root_user,
        password = password
    );

    engine
        .exec_capture(
            &farm.database_container,
            &["mariadb", "-u", &farm.database_root_user, "-e", &statement],
        )
        .context(
            "Failed to set the database root password.\n\
             \n\
             Common causes:\n\
             - Database container still initializing (re-run `services up`)\n\
             - A root password was already set outside this tool",
        )?;

    let pairs = vec![
        ("DB_ROOT_USER".to_string(), farm.database_root_user.clone()),
        ("DB_ROOT_PASSWORD".to_string(), password),
    ];
    envfile::write_env(&farm.farm_env_path(), &pairs)?;

    std::fs::create_dir_all(&farm.state_dir)
        .with_context(|| format!("Failed to create state directory {}", farm.state_dir.display()))?;
    std::fs::write(&marker, "done\n")
        .with_context(|| format!("Failed to write bootstrap marker at {}", marker.display()))?;

    tracing::info!("✓ Root credentials stored in {}", farm.farm_env_path().display());
    Ok(())
}
