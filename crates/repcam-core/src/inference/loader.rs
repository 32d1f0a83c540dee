//! Checkpoint loading from safetensors files.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use safetensors::SafeTensors;
use tracing::debug;

use crate::domain::LoadError;

/// Layer name → tensor, as stored in a checkpoint.
pub type WeightMap = HashMap<String, Tensor>;

/// Loads every tensor of a safetensors checkpoint onto `device`.
///
/// # Errors
///
/// Returns an error if:
/// - The file does not exist or cannot be read
/// - The safetensors data is invalid
/// - A tensor uses an unsupported dtype
pub fn load_weights(path: impl AsRef<Path>, device: &Device) -> Result<WeightMap, LoadError> {
    let path = path.as_ref();
    debug!("Loading checkpoint from {}", path.display());

    if !path.exists() {
        return Err(LoadError::Missing {
            path: path.to_path_buf(),
        });
    }

    let data = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let checkpoint_error = |reason: String| LoadError::Checkpoint {
        path: path.to_path_buf(),
        reason,
    };

    let tensors = SafeTensors::deserialize(&data).map_err(|e| checkpoint_error(e.to_string()))?;

    let mut weights = WeightMap::new();
    for name in tensors.names() {
        let view = tensors
            .tensor(name)
            .map_err(|e| checkpoint_error(format!("tensor '{name}': {e}")))?;

        let dtype = safetensors_dtype_to_candle(view.dtype())
            .ok_or_else(|| checkpoint_error(format!("tensor '{name}': unsupported dtype {:?}", view.dtype())))?;

        let tensor = Tensor::from_raw_buffer(view.data(), dtype, view.shape(), device)
            .map_err(|e| checkpoint_error(format!("tensor '{name}': {e}")))?;

        weights.insert(name.clone(), tensor);
    }

    debug!("Loaded {} tensors from {}", weights.len(), path.display());
    Ok(weights)
}

/// Converts safetensors dtype to candle dtype.
const fn safetensors_dtype_to_candle(dtype: safetensors::Dtype) -> Option<DType> {
    use safetensors::Dtype as S;
    match dtype {
        S::F32 => Some(DType::F32),
        S::F64 => Some(DType::F64),
        S::F16 => Some(DType::F16),
        S::BF16 => Some(DType::BF16),
        S::I64 => Some(DType::I64),
        S::U8 => Some(DType::U8),
        S::U32 => Some(DType::U32),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[allow(clippy::expect_used)]
    fn write_checkpoint(names: &[&str]) -> NamedTempFile {
        use safetensors::serialize;
        use safetensors::tensor::TensorView;

        let data: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
        let data_bytes: &[u8] = bytemuck::cast_slice(&data);

        let tensors: HashMap<String, TensorView<'_>> = names
            .iter()
            .map(|n| {
                let view = TensorView::new(safetensors::Dtype::F32, vec![2, 2], data_bytes)
                    .expect("valid tensor view");
                ((*n).to_string(), view)
            })
            .collect();
        let serialized = serialize(&tensors, &None).expect("serialize");

        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(&serialized).expect("write");
        file
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_load_weights() {
        let file = write_checkpoint(&["conv1.weight", "proj.bias"]);
        let weights = load_weights(file.path(), &Device::Cpu).unwrap();
        assert_eq!(weights.len(), 2);
        assert_eq!(weights["proj.bias"].dims(), &[2, 2]);
    }

    #[test]
    fn test_load_weights_missing_file() {
        let result = load_weights("/nonexistent/path.safetensors", &Device::Cpu);
        assert!(matches!(result, Err(LoadError::Missing { .. })));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_load_weights_garbage() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"definitely not safetensors").unwrap();
        let result = load_weights(file.path(), &Device::Cpu);
        assert!(matches!(result, Err(LoadError::Checkpoint { .. })));
    }
}
