use crate::fetch::{check_url, ArchiveFetcher};
use crate::package::{ModelPackage, PackageMetadata, PackageSource, INDEX_EXT, WEIGHTS_EXT};
use crate::PackageError;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// On-disk store of extracted voice packages, keyed by a content-derived
/// identifier so repeated ingestion of the same archive is idempotent.
///
/// Writers stage into `<id>.part-<pid>` and atomically rename to `<id>`;
/// losing the rename race means another writer finished the same content
/// first, which is the idempotent success case.
#[derive(Debug, Clone)]
pub struct PackageStore {
    root: PathBuf,
}

impl PackageStore {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ingest a package from any supported source and return it validated.
    ///
    /// `fetcher` is only consulted for URL sources.
    pub fn ingest(
        &self,
        source: &PackageSource,
        name: &str,
        fetcher: Option<&dyn ArchiveFetcher>,
    ) -> Result<ModelPackage, PackageError> {
        match source {
            PackageSource::Zip(path) => {
                self.ingest_zip(path, name, path.display().to_string())
            }
            PackageSource::Url(url) => {
                check_url(url)?;
                let fetcher = fetcher
                    .ok_or_else(|| PackageError::Fetch("no archive fetcher supplied".into()))?;
                let tmp = self
                    .root
                    .join(format!(".download-{}-{name}.zip", std::process::id()));
                let result = fetcher
                    .fetch(url, &tmp)
                    .and_then(|()| self.ingest_zip(&tmp, name, url.clone()));
                fs::remove_file(&tmp).ok();
                result
            }
            PackageSource::Pair { weights, index } => {
                self.ingest_pair(weights, index.as_deref(), name)
            }
        }
    }

    fn ingest_zip(
        &self,
        archive_path: &Path,
        name: &str,
        provenance: String,
    ) -> Result<ModelPackage, PackageError> {
        let id = content_id(&[archive_path])?;
        let target = self.root.join(&id);
        let metadata = PackageMetadata {
            name: name.to_string(),
            provenance,
        };

        if target.is_dir() {
            log::debug!("package {id} already extracted, reusing");
            return ModelPackage::load_dir(&target, metadata);
        }

        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| PackageError::Io(format!("cannot open archive: {e}")))?;

        let (weights_entry, index_entry) = select_entries(&mut archive)?;

        let stage = self.root.join(format!("{id}.part-{}", std::process::id()));
        let _ = fs::remove_dir_all(&stage);
        fs::create_dir_all(&stage)?;

        let extracted = extract_entry(&mut archive, weights_entry, &stage).and_then(|_| {
            if let Some(idx) = index_entry {
                extract_entry(&mut archive, idx, &stage)?;
            }
            Ok(())
        });
        if let Err(e) = extracted {
            fs::remove_dir_all(&stage).ok();
            return Err(e);
        }

        match fs::rename(&stage, &target) {
            Ok(()) => {}
            Err(e) if target.is_dir() => {
                // Concurrent writer finished the same content first
                log::debug!("package {id} extracted concurrently ({e}); using existing");
                fs::remove_dir_all(&stage).ok();
            }
            Err(e) => {
                fs::remove_dir_all(&stage).ok();
                return Err(e.into());
            }
        }

        log::info!("package '{name}' stored as {id}");
        ModelPackage::load_dir(&target, metadata)
    }

    fn ingest_pair(
        &self,
        weights: &Path,
        index: Option<&Path>,
        name: &str,
    ) -> Result<ModelPackage, PackageError> {
        check_ext(weights, WEIGHTS_EXT)?;
        if let Some(index) = index {
            check_ext(index, INDEX_EXT)?;
        }

        let id = match index {
            Some(index) => content_id(&[weights, index])?,
            None => content_id(&[weights])?,
        };
        let target = self.root.join(&id);
        let metadata = PackageMetadata {
            name: name.to_string(),
            provenance: "loose files".to_string(),
        };

        if target.is_dir() {
            return ModelPackage::load_dir(&target, metadata);
        }

        let stage = self.root.join(format!("{id}.part-{}", std::process::id()));
        let _ = fs::remove_dir_all(&stage);
        fs::create_dir_all(&stage)?;

        let copy = copy_into(weights, &stage).and_then(|_| {
            if let Some(index) = index {
                copy_into(index, &stage)?;
            }
            Ok(())
        });
        if let Err(e) = copy {
            fs::remove_dir_all(&stage).ok();
            return Err(e);
        }

        match fs::rename(&stage, &target) {
            Ok(()) => {}
            Err(_) if target.is_dir() => {
                fs::remove_dir_all(&stage).ok();
            }
            Err(e) => {
                fs::remove_dir_all(&stage).ok();
                return Err(e.into());
            }
        }

        ModelPackage::load_dir(&target, metadata)
    }
}

fn check_ext(path: &Path, ext: &str) -> Result<(), PackageError> {
    if path.extension().and_then(|e| e.to_str()) == Some(ext) {
        Ok(())
    } else {
        Err(PackageError::Metadata(format!(
            "expected a .{ext} file, got {}",
            path.display()
        )))
    }
}

/// First 16 hex chars of the SHA-256 over the contents of all given files,
/// in order. Every file that ends up in the package contributes, so adding
/// or swapping an index yields a different identifier.
fn content_id(paths: &[&Path]) -> Result<String, PackageError> {
    let mut hasher = Sha256::new();
    for path in paths {
        let mut file = File::open(path)?;
        io::copy(&mut file, &mut hasher)?;
    }
    let digest = hasher.finalize();
    Ok(digest[..8].iter().map(|b| format!("{b:02x}")).collect())
}

/// Scan the archive for exactly one weights entry and at most one index
/// entry. Nested directories are searched; selection is by file extension
/// only, so the outcome does not depend on entry order.
fn select_entries<R: io::Read + io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<(usize, Option<usize>), PackageError> {
    let mut weights = Vec::new();
    let mut indexes = Vec::new();

    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        match Path::new(&name).extension().and_then(|e| e.to_str()) {
            Some(WEIGHTS_EXT) => weights.push((i, name)),
            Some(INDEX_EXT) => indexes.push((i, name)),
            _ => {}
        }
    }

    let weights_entry = match weights.len() {
        0 => {
            return Err(PackageError::MissingWeights(format!(
                "archive has no .{WEIGHTS_EXT} entry"
            )))
        }
        1 => weights[0].0,
        _ => {
            let names: Vec<_> = weights.into_iter().map(|(_, n)| n).collect();
            return Err(PackageError::AmbiguousWeights(names.join(", ")));
        }
    };

    let index_entry = match indexes.len() {
        0 => None,
        1 => Some(indexes[0].0),
        _ => {
            let names: Vec<_> = indexes.into_iter().map(|(_, n)| n).collect();
            return Err(PackageError::AmbiguousIndex(names.join(", ")));
        }
    };

    Ok((weights_entry, index_entry))
}

/// Extract one entry into `dir`, flattened to its base name.
fn extract_entry<R: io::Read + io::Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    dir: &Path,
) -> Result<(), PackageError> {
    let mut entry = archive.by_index(index)?;
    let name = entry.name().to_string();
    let base = Path::new(&name)
        .file_name()
        .ok_or_else(|| PackageError::Io(format!("bad archive entry name: {name}")))?;
    let mut out = File::create(dir.join(base))?;
    io::copy(&mut entry, &mut out)?;
    Ok(())
}

fn copy_into(src: &Path, dir: &Path) -> Result<(), PackageError> {
    let base = src
        .file_name()
        .ok_or_else(|| PackageError::Io(format!("bad file path: {}", src.display())))?;
    fs::copy(src, dir.join(base))?;
    Ok(())
}
