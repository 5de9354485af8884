//! Extraction of downloaded product archives.
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Sibling directory an archive extracts into: its file name up to the first
/// dot, e.g. `data/X.h5.ZIP` -> `data/X`.
pub fn extraction_dir(archive: &Path) -> PathBuf {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let base = name.split('.').next().unwrap_or(name);
    archive.with_file_name(base)
}

pub trait Extractor {
    /// Extracts `archive` into [`extraction_dir`] and returns that directory.
    fn extract(
        self: &Self,
        archive: &Path,
        delete_on_success: bool,
        delete_on_error: bool,
    ) -> Result<PathBuf>;
}

pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn extract(
        self: &Self,
        archive: &Path,
        delete_on_success: bool,
        delete_on_error: bool,
    ) -> Result<PathBuf> {
        let target = extraction_dir(archive);
        debug!("Extracting {} into {}", archive.display(), target.display());

        match unzip(archive, &target) {
            Ok(()) => {
                info!("Extracted {}", target.display());
                if delete_on_success {
                    fs::remove_file(archive)?;
                    debug!("Deleted {}", archive.display());
                }
                Ok(target)
            }
            Err(e) => {
                if target.exists() {
                    if let Err(e) = fs::remove_dir_all(&target) {
                        warn!("Could not remove {}: {}", target.display(), e);
                    }
                }
                if delete_on_error {
                    if let Err(e) = fs::remove_file(archive) {
                        warn!("Could not remove {}: {}", archive.display(), e);
                    }
                }
                Err(Error::Extraction {
                    path: archive.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn unzip(archive: &Path, target: &Path) -> zip::result::ZipResult<()> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    fs::create_dir_all(target)?;
    zip.extract(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const ARCHIVE: &str = "ECA_EXAC_ATL_NOM_1B_20240731T134500Z_20240801T010101Z_01234E.ZIP";

    fn write_zip(path: &Path) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        writer
            .start_file("product.h5", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"HDF5 payload").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_extraction_dir() {
        assert_eq!(
            extraction_dir(Path::new("/data/X.h5.ZIP")),
            PathBuf::from("/data/X")
        );
        assert_eq!(extraction_dir(Path::new("/data/Y.ZIP")), PathBuf::from("/data/Y"));
    }

    #[test]
    fn test_extract_and_delete_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join(ARCHIVE);
        write_zip(&archive);

        let target = ZipExtractor.extract(&archive, true, true).unwrap();
        assert_eq!(target, extraction_dir(&archive));
        assert_eq!(fs::read(target.join("product.h5")).unwrap(), b"HDF5 payload");
        assert!(!archive.exists());
    }

    #[test]
    fn test_keep_archive_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join(ARCHIVE);
        write_zip(&archive);

        ZipExtractor.extract(&archive, false, true).unwrap();
        assert!(archive.exists());
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join(ARCHIVE);
        fs::write(&archive, b"not a zip file").unwrap();

        let err = ZipExtractor.extract(&archive, false, false).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
        assert!(archive.exists());
        assert!(!extraction_dir(&archive).exists());

        let err = ZipExtractor.extract(&archive, false, true).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
        assert!(!archive.exists());
    }
}
