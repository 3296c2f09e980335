// ABOUTME: Compression format detection and streaming decompression for dumps
// ABOUTME: Selects a decoder by file extension and writes a plain working copy

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

/// Compression formats recognized by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
    Xz,
    None,
}

impl Compression {
    /// Detect the format from the file extension
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("gz") => Compression::Gzip,
            Some("bz2") => Compression::Bzip2,
            Some("xz") => Compression::Xz,
            _ => Compression::None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
            Compression::Xz => "xz",
            Compression::None => "uncompressed",
        }
    }
}

/// Reader wrapper reporting consumed input bytes to a callback
struct ProgressReader<R, F: FnMut(u64)> {
    inner: R,
    bytes_read: u64,
    callback: F,
}

impl<R: Read, F: FnMut(u64)> ProgressReader<R, F> {
    fn new(inner: R, callback: F) -> Self {
        Self {
            inner,
            bytes_read: 0,
            callback,
        }
    }
}

impl<R: Read, F: FnMut(u64)> Read for ProgressReader<R, F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        (self.callback)(self.bytes_read);
        Ok(n)
    }
}

/// Decompress (or copy) a dump into a plain working file
///
/// The source is never modified; the working copy at `dest` is what the rest
/// of the import pipeline rewrites and streams. Progress is measured on
/// compressed input bytes since that is the size known up front.
///
/// # Returns
///
/// Number of plain-text bytes written to `dest`.
pub fn decompress_to_file(src: &Path, dest: &Path, show_progress: bool) -> Result<u64> {
    let compression = Compression::from_path(src);
    tracing::info!(
        "Preparing working copy of {} ({})",
        src.display(),
        compression.describe()
    );

    let file_size = std::fs::metadata(src)
        .with_context(|| format!("Failed to stat dump file {}", src.display()))?
        .len();

    let file = File::open(src).with_context(|| format!("Failed to open {}", src.display()))?;

    let progress_bar = if show_progress {
        let pb = ProgressBar::new(file_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%)")
                .expect("valid progress template")
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let reader: Box<dyn Read> = if let Some(pb) = progress_bar.clone() {
        Box::new(ProgressReader::new(file, move |bytes| {
            pb.set_position(bytes);
        }))
    } else {
        Box::new(file)
    };

    let mut decoder: Box<dyn Read> = match compression {
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
        Compression::None => Box::new(reader),
    };
    let mut buffered = BufReader::with_capacity(256 * 1024, &mut decoder);

    let out = File::create(dest)
        .with_context(|| format!("Failed to create working copy at {}", dest.display()))?;
    let mut writer = BufWriter::new(out);

    let written = std::io::copy(&mut buffered, &mut writer).with_context(|| {
        format!(
            "Failed to decompress {} ({}) — is the file corrupt or mislabeled?",
            src.display(),
            compression.describe()
        )
    })?;

    use std::io::Write;
    writer
        .flush()
        .with_context(|| format!("Failed to flush working copy at {}", dest.display()))?;

    if let Some(pb) = progress_bar {
        pb.finish_with_message("decompressed");
    }

    tracing::info!("✓ Working copy ready ({} bytes)", written);
    Ok(written)
}
