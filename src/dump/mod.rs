// ABOUTME: Smart database import pipeline for legacy SQL dumps
// ABOUTME: Decompresses, validates, rewrites, and streams dumps into MariaDB

pub mod compression;
pub mod prefix;

pub use compression::{decompress_to_file, Compression};
pub use prefix::{detect_prefix, strip_definers, strip_table_prefix, PrefixDetection};

use crate::config::{FarmConfig, PrefixConfig, WikiSettings};
use crate::docker::{DbSession, Engine};
use crate::utils;
use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::path::{Path, PathBuf};

static STATEMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CREATE TABLE|INSERT INTO|DROP TABLE").expect("valid statement pattern"));

/// Flags controlling the import pipeline
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Accept prefix removal without prompting
    pub assume_yes: bool,
    /// Decline prefix removal without prompting
    pub keep_prefix: bool,
    /// Show a byte progress bar during decompression
    pub show_progress: bool,
}

/// What the pipeline did, for the operator summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub bytes_prepared: u64,
    pub detected_prefix: Option<String>,
    pub prefix_stripped: bool,
}

/// Check that a dump looks like SQL at all
///
/// A dump must contain at least one of CREATE TABLE / INSERT INTO /
/// DROP TABLE; a comments-only or empty file is rejected here, before any
/// database client is invoked.
pub fn validate_dump(sql: &[u8]) -> Result<()> {
    if !STATEMENT_RE.is_match(sql) {
        bail!(
            "Dump contains no CREATE TABLE, INSERT INTO, or DROP TABLE statement.\n\
             This does not look like a SQL dump — refusing to import."
        );
    }
    Ok(())
}

/// Decompress, validate, and rewrite a dump into an import-ready working copy
///
/// `decide_strip` is consulted only when a prefix is detected; it receives
/// the prefix and the number of tables it leads and returns whether to strip.
/// Soft detection outcomes (no tables beyond validation, no consistent
/// prefix) log a warning and leave identifiers untouched.
///
/// The original file is never modified; the working copy lives under
/// `work_dir` and is the caller's to stream and clean up.
pub fn prepare_dump<F>(
    dump_path: &Path,
    work_dir: &Path,
    tuning: &PrefixConfig,
    decide_strip: F,
    show_progress: bool,
) -> Result<(PathBuf, ImportReport)>
where
    F: FnOnce(&str, usize) -> Result<bool>,
{
    if !dump_path.exists() {
        bail!("Dump file not found at {}", dump_path.display());
    }

    let working = work_dir.join("dump.sql");
    let bytes_prepared = decompress_to_file(dump_path, &working, show_progress)?;

    let sql = std::fs::read(&working)
        .with_context(|| format!("Failed to read working copy at {}", working.display()))?;

    validate_dump(&sql)?;

    // DEFINER clauses reference accounts from the previous hosting
    // environment and break imports for non-SUPERUSER grants; scrub them
    // on every import, independent of the prefix decision.
    let sql = strip_definers(&sql);

    let mut detected_prefix = None;
    let mut prefix_stripped = false;
    let sql = match detect_prefix(&sql, tuning) {
        PrefixDetection::Found {
            prefix,
            matching_tables,
        } => {
            tracing::info!(
                "Detected table prefix '{}' on {} table(s)",
                prefix,
                matching_tables
            );
            detected_prefix = Some(prefix.clone());
            if decide_strip(&prefix, matching_tables)? {
                prefix_stripped = true;
                tracing::info!("Stripping prefix '{}' from all identifiers", prefix);
                strip_table_prefix(&sql, &prefix)
            } else {
                tracing::info!("Keeping original identifiers as requested");
                sql
            }
        }
        PrefixDetection::NoTables => {
            tracing::warn!("⚠ No CREATE TABLE statements found; skipping prefix detection");
            sql
        }
        PrefixDetection::NoConsistentPrefix => {
            tracing::warn!("⚠ No consistent table prefix detected; importing as-is");
            sql
        }
    };

    std::fs::write(&working, &sql)
        .with_context(|| format!("Failed to rewrite working copy at {}", working.display()))?;

    Ok((
        working,
        ImportReport {
            bytes_prepared,
            detected_prefix,
            prefix_stripped,
        },
    ))
}

/// Import a legacy SQL dump into a wiki's database
///
/// Pipeline: decompress → validate → DEFINER scrub → optional prefix strip
/// (operator-confirmed) → stream into the `mariadb` client inside the
/// database container, authenticated with the wiki's own credentials.
///
/// Any stage failure aborts with a non-zero exit and a diagnostic; a failure
/// mid-import is NOT rolled back.
pub async fn import_dump(
    engine: &Engine,
    farm: &FarmConfig,
    wiki: &WikiSettings,
    dump_path: &Path,
    options: ImportOptions,
) -> Result<ImportReport> {
    let work_dir = utils::create_managed_temp_dir()?;

    let result = run_import(engine, farm, wiki, dump_path, options, &work_dir).await;

    // The working copy holds a full plaintext dump; always try to reclaim it
    if let Err(e) = utils::remove_managed_temp_dir(&work_dir) {
        tracing::warn!("Failed to clean up working directory: {:#}", e);
    }

    result
}

async fn run_import(
    engine: &Engine,
    farm: &FarmConfig,
    wiki: &WikiSettings,
    dump_path: &Path,
    options: ImportOptions,
    work_dir: &Path,
) -> Result<ImportReport> {
    let (working, report) = prepare_dump(
        dump_path,
        work_dir,
        &farm.prefix,
        |detected, matching_tables| confirm_strip(detected, matching_tables, options),
        options.show_progress,
    )?;

    tracing::info!(
        "Importing into database '{}' via container {}",
        wiki.db.database,
        farm.database_container
    );

    let session = DbSession::open(
        engine,
        &farm.database_container,
        &wiki.db.user,
        &wiki.db.password,
    )
    .context("Failed to open database session for import")?;

    session.run_sql_file(&wiki.db.database, &working)?;
    session.close()?;

    tracing::info!("✓ Import into '{}' complete", wiki.db.database);
    Ok(report)
}

fn confirm_strip(prefix: &str, matching_tables: usize, options: ImportOptions) -> Result<bool> {
    if options.keep_prefix {
        return Ok(false);
    }
    if options.assume_yes {
        return Ok(true);
    }

    use dialoguer::{theme::ColorfulTheme, Confirm};
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Remove detected table prefix '{}' ({} tables) before importing?",
            prefix, matching_tables
        ))
        .default(true)
        .interact()
        .context("Failed to get prefix confirmation")
}
