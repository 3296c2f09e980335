// ABOUTME: Parses farm-level configuration and models per-wiki settings
// ABOUTME: Converts TOML tunables and wizard answers into typed structures

use crate::utils::{validate_domain, validate_wiki_name};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Farm-wide configuration, loaded from `farm.toml`
///
/// Every field has a default so a missing file means "stock layout". The
/// prefix and readiness tunables exist so the import heuristic's thresholds
/// are configuration, not magic numbers.
#[derive(Debug, Clone, Deserialize)]
pub struct FarmConfig {
    /// Directory holding per-wiki state (.env, settings, checkpoints)
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Compose manifest for the shared services stack
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,
    /// Compose project name
    #[serde(default = "default_compose_project")]
    pub compose_project: String,
    /// Container running the shared MariaDB server
    #[serde(default = "default_database_container")]
    pub database_container: String,
    /// Template for per-wiki container names; `{name}` is substituted
    #[serde(default = "default_wiki_container")]
    pub wiki_container: String,
    /// Administrative database account used for bootstrap and provisioning
    #[serde(default = "default_database_root_user")]
    pub database_root_user: String,
    /// Shared service containers checked by `services up` / `services status`
    #[serde(default = "default_services")]
    pub services: Vec<String>,
    /// Directory inside wiki containers receiving rendered settings files
    #[serde(default = "default_settings_dir")]
    pub container_settings_dir: String,
    /// Path inside wiki containers used as the readiness marker
    #[serde(default = "default_marker_file")]
    pub container_marker_file: String,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub prefix: PrefixConfig,
}

/// Bounded-polling tunables for container readiness waits
#[derive(Debug, Clone, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_readiness_attempts")]
    pub attempts: u32,
    #[serde(default = "default_readiness_interval_secs")]
    pub interval_secs: u64,
}

/// Table-prefix heuristic tunables
///
/// The stock values (3, 20, 20) reproduce the legacy import behavior; they
/// are deliberately configuration rather than constants baked into the
/// detector.
#[derive(Debug, Clone, Deserialize)]
pub struct PrefixConfig {
    #[serde(default = "default_prefix_min_length")]
    pub min_length: usize,
    #[serde(default = "default_prefix_max_length")]
    pub max_length: usize,
    #[serde(default = "default_prefix_min_tables")]
    pub min_tables: usize,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/bluespice-farm")
}
fn default_compose_file() -> PathBuf {
    PathBuf::from("docker-compose.yml")
}
fn default_compose_project() -> String {
    "bluespice".to_string()
}
fn default_database_container() -> String {
    "bluespice-database".to_string()
}
fn default_wiki_container() -> String {
    "bluespice-wiki-{name}".to_string()
}
fn default_database_root_user() -> String {
    "root".to_string()
}
fn default_services() -> Vec<String> {
    vec![
        "bluespice-database".to_string(),
        "bluespice-search".to_string(),
        "bluespice-cache".to_string(),
        "bluespice-proxy".to_string(),
    ]
}
fn default_settings_dir() -> String {
    "/data/bluespice".to_string()
}
fn default_marker_file() -> String {
    "/app/bluespice/w/index.php".to_string()
}
fn default_readiness_attempts() -> u32 {
    30
}
fn default_readiness_interval_secs() -> u64 {
    2
}
fn default_prefix_min_length() -> usize {
    3
}
fn default_prefix_max_length() -> usize {
    20
}
fn default_prefix_min_tables() -> usize {
    20
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            compose_file: default_compose_file(),
            compose_project: default_compose_project(),
            database_container: default_database_container(),
            wiki_container: default_wiki_container(),
            database_root_user: default_database_root_user(),
            services: default_services(),
            container_settings_dir: default_settings_dir(),
            container_marker_file: default_marker_file(),
            readiness: ReadinessConfig::default(),
            prefix: PrefixConfig::default(),
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            attempts: default_readiness_attempts(),
            interval_secs: default_readiness_interval_secs(),
        }
    }
}

impl Default for PrefixConfig {
    fn default() -> Self {
        Self {
            min_length: default_prefix_min_length(),
            max_length: default_prefix_max_length(),
            min_tables: default_prefix_min_tables(),
        }
    }
}

impl FarmConfig {
    /// Load configuration from an explicit path, or fall back to defaults
    /// when no path is given and `./farm.toml` does not exist
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let implicit = PathBuf::from("farm.toml");
                if !implicit.exists() {
                    return Ok(Self::default());
                }
                implicit
            }
        };

        let raw = fs::read_to_string(&candidate)
            .with_context(|| format!("Failed to read config file at {}", candidate.display()))?;
        let config: FarmConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse TOML config at {}", candidate.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.prefix.min_length == 0 || self.prefix.min_length > self.prefix.max_length {
            bail!(
                "Invalid [prefix] config: min_length {} must be in 1..=max_length {}",
                self.prefix.min_length,
                self.prefix.max_length
            );
        }
        if self.prefix.min_tables == 0 {
            bail!("Invalid [prefix] config: min_tables must be at least 1");
        }
        if self.readiness.attempts == 0 {
            bail!("Invalid [readiness] config: attempts must be at least 1");
        }
        Ok(())
    }

    /// State directory for one wiki instance
    pub fn wiki_dir(&self, wiki_name: &str) -> PathBuf {
        self.state_dir.join(wiki_name)
    }

    /// Container name for one wiki instance
    pub fn wiki_container_name(&self, wiki_name: &str) -> String {
        self.wiki_container.replace("{name}", wiki_name)
    }

    /// Farm-level env file (shared credentials such as the root password)
    pub fn farm_env_path(&self) -> PathBuf {
        self.state_dir.join("farm.env")
    }

    /// Marker recording that the one-time root-password bootstrap ran
    pub fn root_bootstrap_marker(&self) -> PathBuf {
        self.state_dir.join(".root-bootstrap-done")
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_secs(self.readiness.interval_secs)
    }
}

/// SMTP relay settings for outbound wiki mail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub sender: String,
}

/// Database credentials provisioned for one wiki
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbCredentials {
    pub database: String,
    pub user: String,
    pub password: String,
}

/// Everything needed to deploy one wiki instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiSettings {
    pub name: String,
    pub sitename: String,
    pub domain: String,
    pub language: String,
    pub admin_mail: String,
    pub smtp: Option<SmtpSettings>,
    pub db: DbCredentials,
}

impl WikiSettings {
    /// Build settings from wizard answers, generating database credentials
    pub fn new(
        name: String,
        sitename: String,
        domain: String,
        language: String,
        admin_mail: String,
        smtp: Option<SmtpSettings>,
    ) -> Result<Self> {
        validate_wiki_name(&name)?;
        validate_domain(&domain)?;

        let db = DbCredentials {
            database: name.replace('-', "_"),
            user: name.replace('-', "_"),
            password: crate::utils::generate_password(32),
        };

        Ok(Self {
            name,
            sitename,
            domain,
            language,
            admin_mail,
            smtp,
            db,
        })
    }

    /// Public base URL of the wiki
    pub fn server_url(&self) -> String {
        format!("https://{}", self.domain)
    }

    /// Render the `.env` key/value pairs in their canonical order
    pub fn to_env_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("WIKI_NAME".to_string(), self.name.clone()),
            ("WIKI_SITENAME".to_string(), self.sitename.clone()),
            ("WIKI_DOMAIN".to_string(), self.domain.clone()),
            ("WIKI_LANG".to_string(), self.language.clone()),
            ("ADMIN_MAIL".to_string(), self.admin_mail.clone()),
            ("DB_NAME".to_string(), self.db.database.clone()),
            ("DB_USER".to_string(), self.db.user.clone()),
            ("DB_PASS".to_string(), self.db.password.clone()),
        ];
        if let Some(smtp) = &self.smtp {
            pairs.push(("SMTP_HOST".to_string(), smtp.host.clone()));
            pairs.push(("SMTP_PORT".to_string(), smtp.port.to_string()));
            pairs.push(("SMTP_USER".to_string(), smtp.user.clone()));
            pairs.push(("SMTP_PASS".to_string(), smtp.password.clone()));
            pairs.push(("SMTP_SENDER".to_string(), smtp.sender.clone()));
        }
        pairs
    }

    /// Rebuild settings from a parsed `.env` map
    pub fn from_env_map(map: &std::collections::HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| -> Result<String> {
            map.get(key)
                .cloned()
                .with_context(|| format!("Wiki .env is missing required key {}", key))
        };

        let name = get("WIKI_NAME")?;
        validate_wiki_name(&name)?;
        let domain = get("WIKI_DOMAIN")?;
        validate_domain(&domain)?;

        let smtp = match map.get("SMTP_HOST") {
            Some(host) => {
                let port: u16 = get("SMTP_PORT")?
                    .parse()
                    .context("SMTP_PORT must be a port number")?;
                Some(SmtpSettings {
                    host: host.clone(),
                    port,
                    user: get("SMTP_USER")?,
                    password: get("SMTP_PASS")?,
                    sender: get("SMTP_SENDER")?,
                })
            }
            None => None,
        };

        Ok(Self {
            name,
            sitename: get("WIKI_SITENAME")?,
            domain,
            language: get("WIKI_LANG")?,
            admin_mail: get("ADMIN_MAIL")?,
            smtp,
            db: DbCredentials {
                database: get("DB_NAME")?,
                user: get("DB_USER")?,
                password: get("DB_PASS")?,
            },
        })
    }
}
