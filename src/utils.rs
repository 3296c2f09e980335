// ABOUTME: Utility functions for validation, secrets, and resource cleanup
// ABOUTME: Provides wiki name validation, password generation, tool preflight, and temp dir management

use anyhow::{bail, Context, Result};
use rand::Rng;
use which::which;

/// Validate a wiki instance name
///
/// The wiki name doubles as the per-wiki database name (hyphens mapped to
/// underscores), the database user name, and part of the container name, so
/// it must be safe in all three contexts:
/// - 1-40 characters long
/// - Starts with a lowercase letter
/// - Contains only lowercase letters, digits, hyphens, or underscores
///
/// # Arguments
///
/// * `name` - The wiki name to validate
///
/// # Returns
///
/// Returns `Ok(())` if the name is valid.
///
/// # Errors
///
/// Returns an error if the name is empty, too long, starts with a
/// non-letter, or contains characters outside the allowed set.
///
/// # Security
///
/// This function is the gate that keeps wiki names usable in SQL statements
/// and `docker` argument lists without quoting surprises. Every name coming
/// from a flag or prompt MUST pass through it before any side effect.
///
/// # Examples
///
/// ```
/// # use bluespice_farm::utils::validate_wiki_name;
/// # use anyhow::Result;
/// # fn example() -> Result<()> {
/// validate_wiki_name("engineering")?;
/// validate_wiki_name("hr-wiki")?;
/// validate_wiki_name("team_2024")?;
///
/// assert!(validate_wiki_name("2024team").is_err());
/// assert!(validate_wiki_name("Wiki Name").is_err());
/// assert!(validate_wiki_name("db`; DROP DATABASE mysql; --").is_err());
/// # Ok(())
/// # }
/// ```
pub fn validate_wiki_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Wiki name cannot be empty or whitespace-only");
    }

    if trimmed.len() > 40 {
        bail!(
            "Wiki name '{}' exceeds maximum length of 40 characters (got {})",
            sanitize_display(trimmed),
            trimmed.len()
        );
    }

    let first_char = trimmed.chars().next().unwrap();
    if !first_char.is_ascii_lowercase() {
        bail!(
            "Wiki name '{}' must start with a lowercase letter, not '{}'",
            sanitize_display(trimmed),
            first_char
        );
    }

    for (i, c) in trimmed.chars().enumerate() {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' && c != '_' {
            bail!(
                "Wiki name '{}' contains invalid character '{}' at position {}. \
                 Only lowercase letters, digits, hyphens, and underscores are allowed",
                sanitize_display(trimmed),
                if c.is_control() {
                    format!("\\x{:02x}", c as u32)
                } else {
                    c.to_string()
                },
                i
            );
        }
    }

    Ok(())
}

/// Validate a domain name for use in the wiki's public URL
///
/// Accepts plain DNS names (labels of letters, digits, hyphens separated by
/// dots). Rejects schemes, paths, ports, and anything that could smuggle
/// shell or PHP metacharacters into rendered configuration.
pub fn validate_domain(domain: &str) -> Result<()> {
    let trimmed = domain.trim();
    if trimmed.is_empty() {
        bail!("Domain cannot be empty");
    }
    if trimmed.len() > 253 {
        bail!("Domain '{}' exceeds 253 characters", sanitize_display(trimmed));
    }
    for label in trimmed.split('.') {
        if label.is_empty() || label.len() > 63 {
            bail!("Domain '{}' has an empty or oversized label", sanitize_display(trimmed));
        }
        if label.starts_with('-') || label.ends_with('-') {
            bail!("Domain label '{}' cannot start or end with a hyphen", sanitize_display(label));
        }
        for c in label.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' {
                bail!(
                    "Domain '{}' contains invalid character '{}'",
                    sanitize_display(trimmed),
                    sanitize_display(&c.to_string())
                );
            }
        }
    }
    Ok(())
}

/// Sanitize a value (wiki name, table name, etc.) for display
///
/// Removes control characters and limits length to prevent log injection and
/// keep error messages readable. Display only; never a substitute for
/// validation.
///
/// # Examples
///
/// ```
/// # use bluespice_farm::utils::sanitize_display;
/// assert_eq!(sanitize_display("normal_name"), "normal_name");
/// assert_eq!(sanitize_display("name\x00here"), "namehere");
///
/// let long = "a".repeat(200);
/// assert_eq!(sanitize_display(&long).len(), 100);
/// ```
pub fn sanitize_display(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).take(100).collect()
}

/// Check that required host tools are available
///
/// Verifies that the container engine CLI is installed and in PATH before
/// any deployment step runs. The compose subcommand ships as a plugin of the
/// same binary, so one check covers both.
///
/// # Errors
///
/// Returns an error with installation instructions if the engine is missing.
pub fn check_required_tools() -> Result<()> {
    let tools = ["docker"];
    let mut missing = Vec::new();

    for tool in &tools {
        if which(tool).is_err() {
            missing.push(*tool);
        }
    }

    if !missing.is_empty() {
        bail!(
            "Missing required container engine tools: {}\n\
             \n\
             Please install Docker with the compose plugin:\n\
             - Ubuntu/Debian: sudo apt-get install docker.io docker-compose-plugin\n\
             - macOS: brew install --cask docker\n\
             - Other: https://docs.docker.com/engine/install/",
            missing.join(", ")
        );
    }

    Ok(())
}

/// Generate a random alphanumeric password
///
/// Alphanumeric-only by construction so generated secrets never need
/// escaping in `.env` files, MariaDB option files, or SQL string literals.
///
/// # Arguments
///
/// * `length` - Number of characters to generate (32 is used for database
///   and root credentials, 16 for initial admin passwords)
pub fn generate_password(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Create a managed temporary directory with explicit cleanup support
///
/// Creates a temporary directory with a timestamped name that can be cleaned
/// up even if the process is killed with SIGKILL. Unlike `TempDir::new()`
/// which relies on the Drop trait, these named directories are swept on next
/// process startup by [`cleanup_stale_temp_dirs`].
///
/// Directory naming format: `bluespice-farm-{timestamp}-{random}`
pub fn create_managed_temp_dir() -> Result<std::path::PathBuf> {
    use std::fs;
    use std::time::SystemTime;

    let system_temp = std::env::temp_dir();

    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let random: u32 = rand::random();

    let dir_name = format!("bluespice-farm-{}-{:08x}", timestamp, random);
    let temp_path = system_temp.join(dir_name);

    fs::create_dir_all(&temp_path)
        .with_context(|| format!("Failed to create temp directory at {}", temp_path.display()))?;

    tracing::debug!("Created managed temp directory: {}", temp_path.display());

    Ok(temp_path)
}

/// Clean up stale temporary directories from previous runs
///
/// Removes directories created by [`create_managed_temp_dir`] that are older
/// than `max_age_secs`. Called on startup; individual removal errors are
/// logged but do not fail the sweep.
///
/// Only directories matching the pattern `bluespice-farm-*` are removed.
pub fn cleanup_stale_temp_dirs(max_age_secs: u64) -> Result<usize> {
    use std::fs;
    use std::time::SystemTime;

    let system_temp = std::env::temp_dir();
    let now = SystemTime::now();
    let mut cleaned_count = 0;

    let entries = fs::read_dir(&system_temp).with_context(|| {
        format!(
            "Failed to read system temp directory: {}",
            system_temp.display()
        )
    })?;

    for entry in entries.flatten() {
        let path = entry.path();

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !name.starts_with("bluespice-farm-") {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => {
                    if let Ok(modified) = metadata.modified() {
                        if let Ok(age) = now.duration_since(modified) {
                            if age.as_secs() > max_age_secs {
                                match fs::remove_dir_all(&path) {
                                    Ok(_) => {
                                        tracing::info!(
                                            "Cleaned up stale temp directory: {} (age: {}s)",
                                            path.display(),
                                            age.as_secs()
                                        );
                                        cleaned_count += 1;
                                    }
                                    Err(e) => {
                                        tracing::warn!(
                                            "Failed to remove stale temp directory {}: {}",
                                            path.display(),
                                            e
                                        );
                                    }
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to get metadata for temp directory {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }
    }

    Ok(cleaned_count)
}

/// Remove a managed temporary directory
///
/// Refuses to touch anything outside the `bluespice-farm-*` naming pattern.
pub fn remove_managed_temp_dir(path: &std::path::Path) -> Result<()> {
    use std::fs;

    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if !name.starts_with("bluespice-farm-") {
            bail!(
                "Refusing to remove directory that doesn't match our naming pattern: {}",
                path.display()
            );
        }
    } else {
        bail!("Invalid temp directory path: {}", path.display());
    }

    tracing::debug!("Removing managed temp directory: {}", path.display());

    fs::remove_dir_all(path)
        .with_context(|| format!("Failed to remove temp directory at {}", path.display()))?;

    Ok(())
}

/// Write a file with owner-only permissions (0600 on Unix)
///
/// Used for every file carrying a secret: per-wiki `.env`, the farm `.env`,
/// and `initialAdminPassword`.
pub fn write_secret_file(path: &std::path::Path, contents: &str) -> Result<()> {
    use std::fs;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions on {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_wiki_name_valid() {
        assert!(validate_wiki_name("engineering").is_ok());
        assert!(validate_wiki_name("hr-wiki").is_ok());
        assert!(validate_wiki_name("team_2024").is_ok());
        assert!(validate_wiki_name("a").is_ok());

        let max_length = "a".repeat(40);
        assert!(validate_wiki_name(&max_length).is_ok());
    }

    #[test]
    fn test_validate_wiki_name_invalid() {
        // Injection-shaped names
        assert!(validate_wiki_name("db`; DROP DATABASE mysql; --").is_err());
        assert!(validate_wiki_name("wiki'; DELETE FROM user; --").is_err());

        // Invalid start characters
        assert!(validate_wiki_name("2024team").is_err());
        assert!(validate_wiki_name("_private").is_err());
        assert!(validate_wiki_name("-wiki").is_err());

        // Invalid characters
        assert!(validate_wiki_name("Wiki").is_err());
        assert!(validate_wiki_name("my wiki").is_err());
        assert!(validate_wiki_name("my.wiki").is_err());
        assert!(validate_wiki_name("wiki\nname").is_err());
        assert!(validate_wiki_name("wiki\x00name").is_err());

        // Empty or too long
        assert!(validate_wiki_name("").is_err());
        assert!(validate_wiki_name("   ").is_err());
        let too_long = "a".repeat(41);
        assert!(validate_wiki_name(&too_long).is_err());
    }

    #[test]
    fn test_validate_domain() {
        assert!(validate_domain("wiki.example.com").is_ok());
        assert!(validate_domain("localhost").is_ok());
        assert!(validate_domain("my-wiki.internal").is_ok());

        assert!(validate_domain("").is_err());
        assert!(validate_domain("https://wiki.example.com").is_err());
        assert!(validate_domain("wiki.example.com/path").is_err());
        assert!(validate_domain("wiki..example.com").is_err());
        assert!(validate_domain("-wiki.example.com").is_err());
        assert!(validate_domain("wiki.example.com:8080").is_err());
        assert!(validate_domain("wiki.$(rm -rf /).com").is_err());
    }

    #[test]
    fn test_sanitize_display() {
        assert_eq!(sanitize_display("normal_name"), "normal_name");
        assert_eq!(sanitize_display("name\x00here"), "namehere");
        assert_eq!(sanitize_display("name\nhere"), "namehere");

        let long = "a".repeat(200);
        assert_eq!(sanitize_display(&long).len(), 100);
    }

    #[test]
    fn test_generate_password_charset_and_length() {
        let password = generate_password(32);
        assert_eq!(password.len(), 32);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));

        // Two draws should essentially never collide
        assert_ne!(generate_password(32), generate_password(32));
    }

    #[test]
    fn test_check_required_tools() {
        // Passes on hosts with docker installed; on hosts without it we
        // expect the install-hint error
        if let Err(err) = check_required_tools() {
            let msg = err.to_string();
            assert!(msg.contains("Missing required container engine tools"));
            assert!(msg.contains("docker"));
        }
    }

    #[test]
    fn test_write_secret_file_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("secret");
        write_secret_file(&path, "hunter2").unwrap();

        let read_back = std::fs::read_to_string(&path).unwrap();
        assert_eq!(read_back, "hunter2");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_remove_managed_temp_dir_refuses_foreign_paths() {
        let dir = tempfile::tempdir().unwrap();
        let foreign = dir.path().join("not-ours");
        std::fs::create_dir(&foreign).unwrap();

        assert!(remove_managed_temp_dir(&foreign).is_err());
        assert!(foreign.exists());
    }

    #[test]
    fn test_managed_temp_dir_roundtrip() {
        let path = create_managed_temp_dir().unwrap();
        assert!(path.exists());
        remove_managed_temp_dir(&path).unwrap();
        assert!(!path.exists());
    }
}
