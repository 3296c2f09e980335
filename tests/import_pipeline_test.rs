// ABOUTME: End-to-end tests for the dump import pipeline (short of the database)
// ABOUTME: Covers decompression round-trips, validation gates, and prefix decisions

use bluespice_farm::config::PrefixConfig;
use bluespice_farm::dump::{decompress_to_file, prepare_dump, validate_dump, Compression};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const REFERENCE_DUMP: &[u8] = b"-- MariaDB dump 10.19\n\
CREATE TABLE `wiki_page` (\n  `page_id` int(10) unsigned NOT NULL\n) ENGINE=InnoDB;\n\
INSERT INTO `wiki_page` VALUES (1),(2);\n";

fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn gzip_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut enc = flate2::write::GzEncoder::new(
        std::fs::File::create(&path).unwrap(),
        flate2::Compression::default(),
    );
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap();
    path
}

fn bzip2_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut enc = bzip2::write::BzEncoder::new(
        std::fs::File::create(&path).unwrap(),
        bzip2::Compression::default(),
    );
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap();
    path
}

fn xz_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut enc = xz2::write::XzEncoder::new(std::fs::File::create(&path).unwrap(), 6);
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap();
    path
}

fn prefixed_dump(count: usize) -> Vec<u8> {
    let mut sql = String::new();
    for i in 0..count {
        sql.push_str(&format!("CREATE TABLE `legacy_t{:02}` (`id` int);\n", i));
    }
    sql.into_bytes()
}

// ============================================================================
// Decompression round-trips
// ============================================================================

#[test]
fn all_formats_decompress_to_identical_bytes() {
    let dir = tempdir().unwrap();

    let fixtures = vec![
        write_fixture(dir.path(), "ref.sql", REFERENCE_DUMP),
        gzip_fixture(dir.path(), "ref.sql.gz", REFERENCE_DUMP),
        bzip2_fixture(dir.path(), "ref.sql.bz2", REFERENCE_DUMP),
        xz_fixture(dir.path(), "ref.sql.xz", REFERENCE_DUMP),
    ];

    for (i, fixture) in fixtures.iter().enumerate() {
        let out = dir.path().join(format!("out-{}.sql", i));
        decompress_to_file(fixture, &out, false).unwrap();
        assert_eq!(
            std::fs::read(&out).unwrap(),
            REFERENCE_DUMP,
            "fixture {} did not round-trip",
            fixture.display()
        );
    }
}

#[test]
fn extension_detection_drives_decoder_choice() {
    assert_eq!(
        Compression::from_path(Path::new("dump.sql.gz")),
        Compression::Gzip
    );
    assert_eq!(
        Compression::from_path(Path::new("dump.sql.bz2")),
        Compression::Bzip2
    );
    assert_eq!(
        Compression::from_path(Path::new("dump.sql.xz")),
        Compression::Xz
    );
    assert_eq!(
        Compression::from_path(Path::new("dump.sql")),
        Compression::None
    );
}

#[test]
fn mislabeled_compression_fails_loudly() {
    let dir = tempdir().unwrap();
    // Plain SQL given a .gz name: decoder must error, not import garbage
    let fixture = write_fixture(dir.path(), "dump.sql.gz", REFERENCE_DUMP);
    let out = dir.path().join("out.sql");
    assert!(decompress_to_file(&fixture, &out, false).is_err());
}

// ============================================================================
// Validation gate
// ============================================================================

#[test]
fn comments_only_file_is_rejected() {
    let sql = b"-- dump in progress\n-- no statements yet\n\n   \n";
    assert!(validate_dump(sql).is_err());
}

#[test]
fn each_qualifying_statement_passes_validation() {
    assert!(validate_dump(b"CREATE TABLE `t` (x int);").is_ok());
    assert!(validate_dump(b"INSERT INTO `t` VALUES (1);").is_ok());
    assert!(validate_dump(b"DROP TABLE `t`;").is_ok());
}

#[test]
fn zero_table_dump_never_reaches_the_import_decision() {
    let dir = tempdir().unwrap();
    let dump = write_fixture(dir.path(), "empty.sql", b"-- placeholder only\n");
    let work = tempdir().unwrap();

    let result = prepare_dump(
        &dump,
        work.path(),
        &PrefixConfig::default(),
        |_, _| panic!("no decision may happen for an invalid dump"),
        false,
    );

    let err = result.unwrap_err();
    assert!(err.to_string().contains("refusing to import"));
}

// ============================================================================
// Prefix decision scenarios
// ============================================================================

#[test]
fn operator_decline_keeps_identifiers_verbatim() {
    let dir = tempdir().unwrap();
    let dump = write_fixture(dir.path(), "dump.sql", &prefixed_dump(25));
    let work = tempdir().unwrap();

    let (working, report) = prepare_dump(
        &dump,
        work.path(),
        &PrefixConfig::default(),
        |_, _| Ok(false),
        false,
    )
    .unwrap();

    assert!(!report.prefix_stripped);
    let prepared = std::fs::read(&working).unwrap();
    // Identical to the original: no DEFINERs were present and the prefix stayed
    assert_eq!(prepared, prefixed_dump(25));
}

#[test]
fn operator_accept_strips_every_table() {
    let dir = tempdir().unwrap();
    let dump = write_fixture(dir.path(), "dump.sql", &prefixed_dump(25));
    let work = tempdir().unwrap();

    let (working, report) = prepare_dump(
        &dump,
        work.path(),
        &PrefixConfig::default(),
        |prefix, count| {
            assert_eq!(prefix, "legacy_t");
            assert_eq!(count, 25);
            Ok(true)
        },
        false,
    )
    .unwrap();

    assert!(report.prefix_stripped);
    assert_eq!(report.detected_prefix.as_deref(), Some("legacy_t"));
    let prepared = std::fs::read_to_string(&working).unwrap();
    assert!(!prepared.contains("legacy_t"));
}

#[test]
fn compressed_dump_runs_the_full_pipeline() {
    let dir = tempdir().unwrap();
    let dump = gzip_fixture(dir.path(), "dump.sql.gz", &prefixed_dump(25));
    let work = tempdir().unwrap();

    let (working, report) = prepare_dump(
        &dump,
        work.path(),
        &PrefixConfig::default(),
        |_, _| Ok(true),
        false,
    )
    .unwrap();

    assert!(report.prefix_stripped);
    assert!(report.bytes_prepared > 0);
    let prepared = std::fs::read_to_string(&working).unwrap();
    assert!(prepared.contains("CREATE TABLE `00`"));

    // The compressed original is untouched
    let original = std::fs::read(&dump).unwrap();
    assert_eq!(&original[..2], &[0x1f, 0x8b]);
}

#[test]
fn decision_callback_error_aborts_the_pipeline() {
    let dir = tempdir().unwrap();
    let dump = write_fixture(dir.path(), "dump.sql", &prefixed_dump(25));
    let work = tempdir().unwrap();

    let result = prepare_dump(
        &dump,
        work.path(),
        &PrefixConfig::default(),
        |_, _| anyhow::bail!("terminal closed"),
        false,
    );
    assert!(result.is_err());
}
