// ABOUTME: Table-prefix detection and removal for legacy SQL dumps
// ABOUTME: Frequency-counts leading substrings of CREATE TABLE identifiers

use crate::config::PrefixConfig;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::collections::{HashMap, HashSet};

static CREATE_TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"CREATE TABLE (?:IF NOT EXISTS )?`([^`]+)`").expect("valid CREATE TABLE pattern")
});

static DEFINER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"DEFINER=(?:`[^`]*`|'[^']*'|[^@\s]+)@(?:`[^`]*`|'[^']*'|[^\s*;]+)")
        .expect("valid DEFINER pattern")
});

/// Outcome of prefix detection over one dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixDetection {
    /// A prefix qualified: it leads at least the configured minimum number
    /// of distinct table names
    Found {
        prefix: String,
        matching_tables: usize,
    },
    /// The dump contains no CREATE TABLE statements at all
    NoTables,
    /// Tables exist but no candidate reached the qualifying threshold
    NoConsistentPrefix,
}

/// Extract the distinct backtick-quoted table names from CREATE TABLE
/// statements, in order of first appearance
pub fn table_names(sql: &[u8]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for caps in CREATE_TABLE_RE.captures_iter(sql) {
        if let Some(m) = caps.get(1) {
            if let Ok(name) = std::str::from_utf8(m.as_bytes()) {
                if seen.insert(name.to_string()) {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}

/// Detect a common table-name prefix in a SQL dump
///
/// For every distinct table name, every leading substring with a length
/// inside the configured window is a candidate. A candidate qualifies when
/// it leads at least `min_tables` distinct names (case-sensitive match at
/// position 0). The winner is the qualifier with the highest count; ties go
/// to the longer prefix string.
///
/// A dump with fewer than `min_tables` tables can therefore never yield a
/// detection, regardless of how consistently its tables are named.
pub fn detect_prefix(sql: &[u8], tuning: &PrefixConfig) -> PrefixDetection {
    let names = table_names(sql);
    if names.is_empty() {
        return PrefixDetection::NoTables;
    }

    // candidate -> number of distinct table names it leads. Generating each
    // name's own prefixes and counting insertions is equivalent to testing
    // every candidate against every name, without the quadratic scan.
    let mut counts: HashMap<String, usize> = HashMap::new();
    for name in &names {
        let upper = tuning.max_length.min(name.len());
        for len in tuning.min_length..=upper {
            if !name.is_char_boundary(len) {
                continue;
            }
            *counts.entry(name[..len].to_string()).or_insert(0) += 1;
        }
    }

    let winner = counts
        .into_iter()
        .filter(|(_, count)| *count >= tuning.min_tables)
        .max_by(|(prefix_a, count_a), (prefix_b, count_b)| {
            count_a
                .cmp(count_b)
                .then(prefix_a.len().cmp(&prefix_b.len()))
                .then(prefix_a.cmp(prefix_b))
        });

    match winner {
        Some((prefix, matching_tables)) => PrefixDetection::Found {
            prefix,
            matching_tables,
        },
        None => PrefixDetection::NoConsistentPrefix,
    }
}

/// Remove `prefix` from every backtick-delimited identifier beginning with it
///
/// The backtick anchor is the whole trick: only an occurrence at position 0
/// of an identifier is preceded by a backtick, so interior repetitions
/// survive (prefix `ab` turns `` `ababfoo` `` into `` `abfoo` ``). Running
/// the pass twice with the same prefix only touches identifiers that still
/// begin with it.
pub fn strip_table_prefix(sql: &[u8], prefix: &str) -> Vec<u8> {
    let mut needle = Vec::with_capacity(prefix.len() + 1);
    needle.push(b'`');
    needle.extend_from_slice(prefix.as_bytes());

    let mut out = Vec::with_capacity(sql.len());
    let mut i = 0;
    while i < sql.len() {
        if sql[i..].starts_with(&needle) {
            out.push(b'`');
            i += needle.len();
        } else {
            out.push(sql[i]);
            i += 1;
        }
    }
    out
}

/// Remove `DEFINER=user@host` clauses
///
/// Dumps taken from a previous hosting environment pin views, triggers, and
/// routines to accounts that do not exist on the target server; the clauses
/// have to go or the import fails for non-SUPERUSER grants. Both quoted
/// (`` DEFINER=`u`@`h` ``) and bare (`DEFINER=u@h`) forms are handled.
pub fn strip_definers(sql: &[u8]) -> Vec<u8> {
    DEFINER_RE.replace_all(sql, &b""[..]).into_owned()
}
