// ABOUTME: Wrapper for the container engine CLI (compose, inspect, exec, cp)
// ABOUTME: Provides credentialed MariaDB client sessions inside the database container

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::{Command, Stdio};

/// Handle to the container engine CLI
#[derive(Debug, Clone)]
pub struct Engine {
    binary: String,
}

/// Observed state of one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    pub running: bool,
    /// `Some("healthy")`, `Some("starting")`, etc. — `None` when the image
    /// configures no healthcheck
    pub health: Option<String>,
}

impl ContainerState {
    /// Running and either healthy or without a healthcheck
    pub fn is_ready(&self) -> bool {
        self.running && self.health.as_deref().map_or(true, |h| h == "healthy")
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    /// Bring the shared services stack up in detached mode
    pub fn compose_up(&self, compose_file: &Path, project: &str) -> Result<()> {
        tracing::info!(
            "Starting shared services from {} (project '{}')",
            compose_file.display(),
            project
        );

        let status = self
            .command()
            .arg("compose")
            .arg("-f")
            .arg(compose_file)
            .arg("-p")
            .arg(project)
            .arg("up")
            .arg("-d")
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .context(
                "Failed to execute docker compose. Is the compose plugin installed?\n\
                 Install with:\n\
                 - Ubuntu/Debian: sudo apt-get install docker-compose-plugin\n\
                 - Other: https://docs.docker.com/compose/install/",
            )?;

        if !status.success() {
            bail!(
                "docker compose up failed with {} for {}",
                status,
                compose_file.display()
            );
        }
        Ok(())
    }

    /// Inspect a container's state; `None` when the container does not exist
    pub fn container_state(&self, container: &str) -> Result<Option<ContainerState>> {
        let output = self
            .command()
            .arg("inspect")
            .arg("--format")
            .arg("{{json .State}}")
            .arg(container)
            .output()
            .context("Failed to execute docker inspect")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such object") || stderr.contains("No such container") {
                return Ok(None);
            }
            bail!("docker inspect {} failed: {}", container, stderr.trim());
        }

        let state: serde_json::Value = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("Failed to parse docker inspect output for {}", container))?;

        let running = state
            .get("Running")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let health = state
            .get("Health")
            .and_then(|h| h.get("Status"))
            .and_then(|s| s.as_str())
            .map(|s| s.to_string());

        Ok(Some(ContainerState { running, health }))
    }

    /// Run a command inside a container, streaming output to the operator
    ///
    /// Used for the long-running MediaWiki maintenance scripts whose progress
    /// the operator wants to watch.
    pub fn exec_streamed(&self, container: &str, args: &[&str]) -> Result<()> {
        tracing::debug!("docker exec {} {}", container, args.join(" "));

        let status = self
            .command()
            .arg("exec")
            .arg(container)
            .args(args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("Failed to execute docker exec on {}", container))?;

        if !status.success() {
            bail!(
                "Command '{}' in container {} failed with {}",
                args.join(" "),
                container,
                status
            );
        }
        Ok(())
    }

    /// Run a command inside a container, capturing stdout
    pub fn exec_capture(&self, container: &str, args: &[&str]) -> Result<String> {
        let output = self
            .command()
            .arg("exec")
            .arg(container)
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute docker exec on {}", container))?;

        if !output.status.success() {
            bail!(
                "Command '{}' in container {} failed: {}",
                args.join(" "),
                container,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a command inside a container, reporting only success/failure
    pub fn exec_check(&self, container: &str, args: &[&str]) -> Result<bool> {
        let status = self
            .command()
            .arg("exec")
            .arg(container)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("Failed to execute docker exec on {}", container))?;
        Ok(status.success())
    }

    /// Whether a file is reachable inside a container
    pub fn file_exists_in_container(&self, container: &str, path: &str) -> Result<bool> {
        self.exec_check(container, &["test", "-f", path])
    }

    /// Run a command inside a container with stdin fed from a host file
    pub fn exec_with_stdin_file(&self, container: &str, args: &[&str], input: &Path) -> Result<()> {
        let file = std::fs::File::open(input)
            .with_context(|| format!("Failed to open {} for streaming", input.display()))?;

        let status = self
            .command()
            .arg("exec")
            .arg("-i")
            .arg(container)
            .args(args)
            .stdin(Stdio::from(file))
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("Failed to execute docker exec on {}", container))?;

        if !status.success() {
            bail!(
                "Command '{}' in container {} failed with {} while reading {}",
                args.join(" "),
                container,
                status,
                input.display()
            );
        }
        Ok(())
    }

    /// Copy a host file or directory into a container
    pub fn copy_into(&self, host_path: &Path, container: &str, dest: &str) -> Result<()> {
        tracing::debug!(
            "docker cp {} -> {}:{}",
            host_path.display(),
            container,
            dest
        );

        let status = self
            .command()
            .arg("cp")
            .arg(host_path)
            .arg(format!("{}:{}", container, dest))
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status()
            .context("Failed to execute docker cp")?;

        if !status.success() {
            bail!(
                "docker cp {} into {}:{} failed with {}",
                host_path.display(),
                container,
                dest,
                status
            );
        }
        Ok(())
    }
}

/// Credentialed MariaDB client session inside the database container
///
/// Credentials travel in a defaults-extra-file copied into the container
/// instead of appearing on any argv, then the file is removed on close. The
/// same idea as libpq's `.pgpass`, translated to MariaDB's option files.
pub struct DbSession<'a> {
    engine: &'a Engine,
    container: String,
    remote_defaults: String,
    closed: bool,
}

impl<'a> DbSession<'a> {
    /// Install client credentials into the container and open a session
    pub fn open(engine: &'a Engine, container: &str, user: &str, password: &str) -> Result<Self> {
        if password.contains('\'') || password.contains('\n') {
            bail!("Database passwords must not contain quotes or newlines");
        }

        let mut local = tempfile::NamedTempFile::new()
            .context("Failed to create temp file for client credentials")?;

        use std::io::Write;
        write!(local, "[client]\nuser={}\npassword='{}'\n", user, password)
            .context("Failed to write client credentials")?;
        local
            .flush()
            .context("Failed to flush client credentials")?;

        let remote_defaults = format!("/tmp/bluespice-farm-{:08x}.cnf", rand::random::<u32>());
        engine
            .copy_into(local.path(), container, &remote_defaults)
            .context("Failed to install client credentials into the database container")?;

        Ok(Self {
            engine,
            container: container.to_string(),
            remote_defaults,
            closed: false,
        })
    }

    fn client_args<'b>(&'b self, defaults_flag: &'b str, database: Option<&'b str>) -> Vec<&'b str> {
        let mut args = vec!["mariadb", defaults_flag];
        if let Some(db) = database {
            args.push(db);
        }
        args
    }

    /// Execute one or more SQL statements
    pub fn run_sql(&self, database: Option<&str>, sql: &str) -> Result<()> {
        let defaults_flag = format!("--defaults-extra-file={}", self.remote_defaults);
        let mut args = self.client_args(&defaults_flag, database);
        args.push("-e");
        args.push(sql);

        self.engine
            .exec_capture(&self.container, &args)
            .map(|_| ())
            .with_context(|| {
                format!(
                    "MariaDB statement failed in container {}.\n\
                     \n\
                     Common causes:\n\
                     - Database server still starting up\n\
                     - Credentials rejected (was the root bootstrap run?)\n\
                     - Insufficient privileges for the statement",
                    self.container
                )
            })
    }

    /// Stream a SQL file into the client
    pub fn run_sql_file(&self, database: &str, file: &Path) -> Result<()> {
        let defaults_flag = format!("--defaults-extra-file={}", self.remote_defaults);
        let args = self.client_args(&defaults_flag, Some(database));

        self.engine
            .exec_with_stdin_file(&self.container, &args, file)
            .with_context(|| {
                format!(
                    "MariaDB import into database '{}' failed.\n\
                     \n\
                     The import is NOT rolled back; statements applied before\n\
                     the failure remain in place.",
                    database
                )
            })
    }

    /// Remove the installed credentials from the container
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.engine
            .exec_check(&self.container, &["rm", "-f", &self.remote_defaults])
            .map(|_| ())
    }
}

impl Drop for DbSession<'_> {
    fn drop(&mut self) {
        if !self.closed {
            // Best effort; a leftover file in /tmp of the container is
            // removed by the next session open on the same path prefix
            let _ = self
                .engine
                .exec_check(&self.container, &["rm", "-f", &self.remote_defaults]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_state_readiness() {
        let healthy = ContainerState {
            running: true,
            health: Some("healthy".to_string()),
        };
        assert!(healthy.is_ready());

        let no_healthcheck = ContainerState {
            running: true,
            health: None,
        };
        assert!(no_healthcheck.is_ready());

        let starting = ContainerState {
            running: true,
            health: Some("starting".to_string()),
        };
        assert!(!starting.is_ready());

        let stopped = ContainerState {
            running: false,
            health: Some("healthy".to_string()),
        };
        assert!(!stopped.is_ready());
    }

    #[test]
    fn session_rejects_unsafe_passwords() {
        let engine = Engine::new();
        let result = DbSession::open(&engine, "db", "user", "pa'ss");
        assert!(result.is_err());
        let result = DbSession::open(&engine, "db", "user", "pa\nss");
        assert!(result.is_err());
    }
}
