use crate::PackageError;
use std::collections::HashMap;
use std::path::Path;

/// Tensor key probed for the feature dimensionality: the decoder's input
/// projection has shape `[hidden, feature_dim]`.
pub const DECODER_INPUT_KEY: &str = "dec.proj_in.weight";

/// Header-level facts about a weights file, read without loading tensors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightsInfo {
    /// Output sample rate the decoder was trained for.
    pub sample_rate: u32,
    /// Dimensionality of the acoustic feature vectors the decoder consumes.
    pub feature_dim: usize,
}

/// Probe a safetensors weights file for its declared sample rate and feature
/// dimensionality.
///
/// Memory-maps the file so only the header is touched; the subsequent
/// VarBuilder mmap shares the same pages.
pub fn probe_weights(path: &Path) -> Result<WeightsInfo, PackageError> {
    use safetensors::SafeTensors;

    let file = std::fs::File::open(path)
        .map_err(|e| PackageError::CorruptWeights(format!("{}: {e}", path.display())))?;
    let mmap = unsafe { memmap2::Mmap::map(&file) }
        .map_err(|e| PackageError::CorruptWeights(format!("failed to memory-map weights: {e}")))?;

    let (_header_len, metadata) = SafeTensors::read_metadata(&mmap)
        .map_err(|e| PackageError::CorruptWeights(format!("bad safetensors header: {e}")))?;

    let kv: &HashMap<String, String> = metadata
        .metadata()
        .as_ref()
        .ok_or_else(|| PackageError::Metadata("weights carry no metadata map".to_string()))?;

    let sample_rate: u32 = kv
        .get("sample_rate")
        .ok_or_else(|| PackageError::Metadata("weights metadata missing 'sample_rate'".to_string()))?
        .parse()
        .map_err(|e| PackageError::Metadata(format!("bad 'sample_rate' value: {e}")))?;
    if sample_rate == 0 {
        return Err(PackageError::Metadata("'sample_rate' must be non-zero".to_string()));
    }

    let tensors = SafeTensors::deserialize(&mmap)
        .map_err(|e| PackageError::CorruptWeights(format!("failed to deserialize weights: {e}")))?;
    let view = tensors.tensor(DECODER_INPUT_KEY).map_err(|e| {
        PackageError::CorruptWeights(format!("key '{DECODER_INPUT_KEY}' not found: {e}"))
    })?;

    let shape = view.shape();
    if shape.len() != 2 {
        return Err(PackageError::CorruptWeights(format!(
            "unexpected shape for {DECODER_INPUT_KEY}: {shape:?}"
        )));
    }

    Ok(WeightsInfo {
        sample_rate,
        feature_dim: shape[1],
    })
}
