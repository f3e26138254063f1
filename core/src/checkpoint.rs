//! Checkpoint persistence in safetensors format.
//!
//! The estimator saves its model's named weight matrices after training
//! and restores them on construction when the model directory already
//! holds a checkpoint. Every persisted parameter is a rank-2 `f32`
//! matrix, so shapes survive the round trip without a side table.

use crate::tensor::{Cpu, Result, Tensor, TensorError};
use memmap2::Mmap;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::fs::File;
use std::path::Path;

/// Writes named weight matrices to a safetensors file.
///
/// # Errors
///
/// Returns [`TensorError::Checkpoint`] if serialisation or the filesystem
/// write fails.
pub fn save_checkpoint<P: AsRef<Path>>(
    path: P,
    tensors: &[(String, Tensor<f32, 2, Cpu>)],
) -> Result<()> {
    // The byte buffers must outlive the views handed to the serializer.
    let buffers: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
        .iter()
        .map(|(name, tensor)| {
            let bytes: Vec<u8> = tensor
                .data()
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect();
            (name.clone(), tensor.shape().to_vec(), bytes)
        })
        .collect();

    let mut views = Vec::with_capacity(buffers.len());
    for (name, shape, bytes) in &buffers {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
            .map_err(|e| TensorError::Checkpoint(format!("bad tensor view: {:?}", e)))?;
        views.push((name.clone(), view));
    }

    safetensors::serialize_to_file(views, &None, path.as_ref())
        .map_err(|e| TensorError::Checkpoint(format!("failed to write checkpoint: {:?}", e)))
}

/// Reads named weight matrices from a safetensors file, sorted by name.
///
/// The file is memory-mapped rather than read into an intermediate
/// buffer; deserialisation borrows directly from the mapping.
///
/// # Errors
///
/// Returns [`TensorError::Checkpoint`] for I/O or format failures, and
/// rejects tensors that are not rank-2 `f32`.
pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Vec<(String, Tensor<f32, 2, Cpu>)>> {
    let file = File::open(path.as_ref())
        .map_err(|e| TensorError::Checkpoint(format!("cannot open checkpoint: {}", e)))?;
    // Safety: the mapping is read-only and dropped before the function
    // returns; the file is not truncated concurrently by this process.
    let mmap = unsafe { Mmap::map(&file) }
        .map_err(|e| TensorError::Checkpoint(format!("cannot map checkpoint: {}", e)))?;

    let safetensors = SafeTensors::deserialize(&mmap)
        .map_err(|e| TensorError::Checkpoint(format!("corrupt checkpoint: {:?}", e)))?;

    let mut out = Vec::new();
    for (name, view) in safetensors.tensors() {
        if view.dtype() != Dtype::F32 {
            return Err(TensorError::Checkpoint(format!(
                "tensor '{}' has dtype {:?}, expected F32",
                name,
                view.dtype()
            )));
        }
        let shape = view.shape();
        if shape.len() != 2 {
            return Err(TensorError::Checkpoint(format!(
                "tensor '{}' has rank {}, expected 2",
                name,
                shape.len()
            )));
        }

        let data: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        out.push((name, Tensor::new(data, [shape[0], shape[1]])?));
    }

    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}
