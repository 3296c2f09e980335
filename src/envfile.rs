// ABOUTME: Deterministic .env file rendering and parsing
// ABOUTME: Persists per-wiki and farm-level key/value state atomically

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Render key/value pairs as a `.env` document
///
/// Keys are written in the order given. Values containing characters that
/// are meaningful to dotenv parsers (whitespace, quotes, `#`, `$`) are
/// double-quoted with backslash escaping so the render→parse round trip is
/// lossless.
pub fn render(pairs: &[(String, String)]) -> String {
    let mut out = String::new();
    for (key, value) in pairs {
        out.push_str(key);
        out.push('=');
        if needs_quoting(value) {
            out.push('"');
            for c in value.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    // Literal dollar, not a substitution
                    '$' => out.push_str("\\$"),
                    _ => out.push(c),
                }
            }
            out.push('"');
        } else {
            out.push_str(value);
        }
        out.push('\n');
    }
    out
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '#' | '$' | '\\' | '`'))
}

/// Write a `.env` file atomically with owner-only permissions
///
/// Uses a temp file in the target directory plus rename so a crash mid-write
/// never leaves a truncated credentials file behind.
pub fn write_env(path: &Path, pairs: &[(String, String)]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp env file in {}", parent.display()))?;

    use std::io::Write;
    tmp.write_all(render(pairs).as_bytes())
        .with_context(|| format!("Failed to write env content for {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict permissions on {}", path.display()))?;
    }

    tmp.persist(path)
        .with_context(|| format!("Failed to persist env file at {}", path.display()))?;

    Ok(())
}

/// Parse a `.env` file into a map
pub fn load_env(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        bail!("Env file not found at {}", path.display());
    }

    let mut map = HashMap::new();
    for item in dotenvy::from_path_iter(path)
        .with_context(|| format!("Failed to open env file at {}", path.display()))?
    {
        let (key, value) =
            item.with_context(|| format!("Failed to parse env file at {}", path.display()))?;
        map.insert(key, value);
    }
    Ok(map)
}
