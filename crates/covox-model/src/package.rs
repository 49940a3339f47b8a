use crate::weights::{probe_weights, WeightsInfo};
use crate::PackageError;
use covox_base::FeatureMatrix;
use std::path::{Path, PathBuf};

pub const WEIGHTS_EXT: &str = "safetensors";
pub const INDEX_EXT: &str = "npy";

/// Where a package came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Local ZIP archive containing one weights file and at most one index.
    Zip(PathBuf),
    /// Remote ZIP on an allow-listed host; fetching is delegated.
    Url(String),
    /// Explicit weights file plus optional index file.
    Pair {
        weights: PathBuf,
        index: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    pub name: String,
    /// Human-readable provenance (archive path, URL, or "loose files").
    pub provenance: String,
}

/// A validated, on-disk voice model.
///
/// Immutable once loaded; may be shared across concurrent conversions.
/// The index is an optional accelerant, never a correctness requirement:
/// packages whose index does not match the weights' feature dimensionality
/// are loaded without one.
#[derive(Debug, Clone)]
pub struct ModelPackage {
    weights: PathBuf,
    index: Option<FeatureMatrix>,
    info: WeightsInfo,
    metadata: PackageMetadata,
}

impl ModelPackage {
    /// Load a package from a directory holding exactly the extracted files.
    pub fn load_dir(dir: &Path, metadata: PackageMetadata) -> Result<Self, PackageError> {
        let mut weights = None;
        let mut index = None;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(WEIGHTS_EXT) => weights = Some(path),
                Some(INDEX_EXT) => index = Some(path),
                _ => {}
            }
        }
        let weights = weights.ok_or_else(|| {
            PackageError::MissingWeights(format!("no .{WEIGHTS_EXT} in {}", dir.display()))
        })?;
        Self::load_files(&weights, index.as_deref(), metadata)
    }

    /// Load a package from explicit file paths.
    pub fn load_files(
        weights: &Path,
        index: Option<&Path>,
        metadata: PackageMetadata,
    ) -> Result<Self, PackageError> {
        let info = probe_weights(weights)?;

        let index = match index {
            Some(path) => load_index(path, info.feature_dim, &metadata.name),
            None => None,
        };

        Ok(Self {
            weights: weights.to_path_buf(),
            index,
            info,
            metadata,
        })
    }

    pub fn weights_path(&self) -> &Path {
        &self.weights
    }

    pub fn index(&self) -> Option<&FeatureMatrix> {
        self.index.as_ref()
    }

    pub fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    pub fn feature_dim(&self) -> usize {
        self.info.feature_dim
    }

    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }
}

/// Load the reference-vector index, dropping it with a warning if it is
/// unreadable or its dimensionality does not match the weights.
fn load_index(path: &Path, feature_dim: usize, name: &str) -> Option<FeatureMatrix> {
    let matrix = match read_index(path) {
        Ok(m) => m,
        Err(e) => {
            log::warn!("package '{name}': dropping index ({e})");
            return None;
        }
    };
    if matrix.dim() != feature_dim {
        log::warn!(
            "package '{name}': dropping index (vector dim {} does not match weights feature dim {feature_dim})",
            matrix.dim()
        );
        return None;
    }
    Some(matrix)
}

fn read_index(path: &Path) -> Result<FeatureMatrix, PackageError> {
    let tensor = candle_core::Tensor::read_npy(path)
        .map_err(|e| PackageError::CorruptIndex(format!("{}: {e}", path.display())))?;
    let (rows, dim) = tensor
        .dims2()
        .map_err(|e| PackageError::CorruptIndex(format!("index must be 2-D: {e}")))?;
    if rows == 0 || dim == 0 {
        return Err(PackageError::CorruptIndex("index is empty".to_string()));
    }
    let data = tensor
        .flatten_all()
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(|e| PackageError::CorruptIndex(format!("index read failed: {e}")))?;
    FeatureMatrix::new(dim, data)
        .map_err(|e| PackageError::CorruptIndex(format!("index shape: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::testutil::write_weights;

    fn tmp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("covox-pkg-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn meta(name: &str) -> PackageMetadata {
        PackageMetadata {
            name: name.to_string(),
            provenance: "test".to_string(),
        }
    }

    fn write_index(path: &Path, rows: usize, dim: usize) {
        let t = candle_core::Tensor::zeros(
            (rows, dim),
            candle_core::DType::F32,
            &candle_core::Device::Cpu,
        )
        .unwrap();
        t.write_npy(path).unwrap();
    }

    #[test]
    fn loads_weights_and_matching_index() {
        let dir = tmp_dir("match");
        write_weights(&dir.join("voice.safetensors"), Some(40000), 8);
        write_index(&dir.join("voice.npy"), 16, 8);

        let pkg = ModelPackage::load_dir(&dir, meta("match")).unwrap();
        assert_eq!(pkg.sample_rate(), 40000);
        assert_eq!(pkg.feature_dim(), 8);
        assert_eq!(pkg.index().unwrap().rows(), 16);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn mismatched_index_is_dropped_not_fatal() {
        let dir = tmp_dir("mismatch");
        write_weights(&dir.join("voice.safetensors"), Some(40000), 8);
        write_index(&dir.join("voice.npy"), 16, 12);

        let pkg = ModelPackage::load_dir(&dir, meta("mismatch")).unwrap();
        assert!(pkg.index().is_none());
        assert_eq!(pkg.feature_dim(), 8);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_weights_is_fatal() {
        let dir = tmp_dir("noweights");
        write_index(&dir.join("voice.npy"), 4, 8);
        let err = ModelPackage::load_dir(&dir, meta("noweights")).unwrap_err();
        assert!(matches!(err, PackageError::MissingWeights(_)), "{err}");
        std::fs::remove_dir_all(&dir).ok();
    }
}
