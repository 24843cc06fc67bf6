//! Archive unpacking and payload relocation.
//!
//! The portal's export is a ZIP with a single well-known `Data.csv`
//! inside. The extractor expands it into a staging directory next to
//! the archive, copies the payload to its canonical raw-data path, then
//! removes both the archive and the staging directory. The staging dir
//! is a `tempfile::TempDir`, so it is removed on the failure path too.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::JobError;

pub const PAYLOAD_NAME: &str = "Data.csv";

pub struct ArchiveExtractor {
    raw_root: PathBuf,
}

impl ArchiveExtractor {
    pub fn new(raw_root: impl Into<PathBuf>) -> Self {
        ArchiveExtractor {
            raw_root: raw_root.into(),
        }
    }

    /// Unpack `archive`, relocate its payload to
    /// `{raw_root}/{alias}/{alias}_{year}.csv` and delete the archive.
    /// Returns the relocated file's path.
    pub fn relocate(&self, archive: &Path, alias: &str, year: &str) -> Result<PathBuf, JobError> {
        let staging_parent = archive.parent().unwrap_or_else(|| Path::new("."));
        let staging = tempfile::Builder::new()
            .prefix("survstat_extract_")
            .tempdir_in(staging_parent)
            .context("creating staging directory")?;

        let file = File::open(archive)
            .with_context(|| format!("opening archive `{}`", archive.display()))?;
        let mut zip = ZipArchive::new(file)
            .with_context(|| format!("reading archive `{}`", archive.display()))?;
        zip.extract(staging.path())
            .with_context(|| format!("extracting archive `{}`", archive.display()))?;

        let payload = staging.path().join(PAYLOAD_NAME);
        if !payload.is_file() {
            // staging TempDir drops here, removing partial extraction
            return Err(JobError::PayloadMissing(PAYLOAD_NAME.to_string()));
        }

        let dest_dir = self.raw_root.join(alias);
        fs::create_dir_all(&dest_dir)
            .with_context(|| format!("creating `{}`", dest_dir.display()))?;
        let dest = dest_dir.join(format!("{alias}_{year}.csv"));
        fs::copy(&payload, &dest)
            .with_context(|| format!("copying payload to `{}`", dest.display()))?;
        debug!(dest = %dest.display(), "payload relocated");

        fs::remove_file(archive)
            .with_context(|| format!("deleting archive `{}`", archive.display()))?;
        info!(archive = %archive.display(), "archive consumed");

        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::{ExtendedFileOptions, FileOptions};
    use zip::CompressionMethod;

    fn write_archive(path: &Path, inner_name: &str, content: &[u8]) -> Result<()> {
        let file = File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options =
            FileOptions::<ExtendedFileOptions>::default().compression_method(CompressionMethod::Stored);
        zip.start_file(inner_name, options)?;
        zip.write_all(content)?;
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn relocates_payload_and_consumes_archive() -> Result<()> {
        let downloads = tempdir()?;
        let raw_root = tempdir()?;
        let archive = downloads.path().join("survstat_abc.zip");
        write_archive(&archive, PAYLOAD_NAME, b"week\tcounty\n1\t2\n")?;

        let extractor = ArchiveExtractor::new(raw_root.path());
        let dest = extractor.relocate(&archive, "mumps", "2023").unwrap();

        assert_eq!(dest, raw_root.path().join("mumps").join("mumps_2023.csv"));
        assert_eq!(fs::read(&dest)?, b"week\tcounty\n1\t2\n");
        assert!(!archive.exists());
        Ok(())
    }

    #[test]
    fn missing_payload_fails_and_leaves_no_staging_dir() -> Result<()> {
        let downloads = tempdir()?;
        let raw_root = tempdir()?;
        let archive = downloads.path().join("survstat_bad.zip");
        write_archive(&archive, "NotData.csv", b"nope")?;

        let extractor = ArchiveExtractor::new(raw_root.path());
        match extractor.relocate(&archive, "mumps", "2023") {
            Err(JobError::PayloadMissing(name)) => assert_eq!(name, PAYLOAD_NAME),
            other => panic!("expected PayloadMissing, got {other:?}"),
        }

        // no staging directory survives the failure path
        let leftovers: Vec<_> = fs::read_dir(downloads.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .collect();
        assert!(leftovers.is_empty(), "staging dir left behind: {leftovers:?}");
        Ok(())
    }
}
