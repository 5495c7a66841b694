//! Weight loading for Llama checkpoints
//!
//! Checkpoints are read as SafeTensors, single file or sharded. Tensors are
//! decoded one at a time so large projections can be quantized as soon as they
//! are read.

mod convert;

use crate::error::{Error, Result};
use safetensors::SafeTensors;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

pub(crate) use convert::tensor_to_f32_vec;

pub const SINGLE_FILE: &str = "model.safetensors";
pub const INDEX_FILE: &str = "model.safetensors.index.json";

#[derive(Deserialize)]
struct ShardIndex {
    weight_map: HashMap<String, String>,
}

/// Shard file names listed in a `model.safetensors.index.json`, sorted
pub fn shard_names(index_json: &str) -> Result<Vec<String>> {
    let index: ShardIndex = serde_json::from_str(index_json)?;
    let shards: BTreeSet<String> = index.weight_map.into_values().collect();
    Ok(shards.into_iter().collect())
}

/// Find the SafeTensors files of a checkpoint directory
///
/// Prefers `model.safetensors`, then the shards listed in
/// `model.safetensors.index.json`, then every `.safetensors` file, sorted.
pub fn find_safetensors_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if dir.is_file() {
        return Ok(vec![dir.to_path_buf()]);
    }

    let single = dir.join(SINGLE_FILE);
    if single.exists() {
        return Ok(vec![single]);
    }

    let index_path = dir.join(INDEX_FILE);
    if index_path.exists() {
        let text = std::fs::read_to_string(&index_path).map_err(|e| Error::io(&index_path, e))?;
        return Ok(shard_names(&text)?.into_iter().map(|s| dir.join(s)).collect());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|e| e == "safetensors"))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(Error::ConfigError(format!(
            "No SafeTensors files found in {}",
            dir.display()
        )));
    }
    Ok(files)
}

/// Raw checkpoint bytes with a name → file index
pub struct WeightStore {
    buffers: Vec<Vec<u8>>,
    index: HashMap<String, usize>,
}

impl WeightStore {
    /// Read every file into memory and index its tensor names
    pub fn open(files: &[PathBuf]) -> Result<Self> {
        let buffers = files
            .iter()
            .map(|path| std::fs::read(path).map_err(|e| Error::io(path, e)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_buffers(buffers)
    }

    /// Index already-loaded SafeTensors buffers
    pub fn from_buffers(buffers: Vec<Vec<u8>>) -> Result<Self> {
        let mut index = HashMap::new();
        for (i, bytes) in buffers.iter().enumerate() {
            let tensors = SafeTensors::deserialize(bytes)
                .map_err(|e| Error::SafeTensors(format!("failed to parse shard {i}: {e}")))?;
            for name in tensors.names() {
                index.insert(name.to_string(), i);
            }
        }
        Ok(Self { buffers, index })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Decode a tensor to f32 and check its shape
    pub fn load(&self, name: &str, expected: &[usize]) -> Result<Vec<f32>> {
        let file = *self.index.get(name).ok_or_else(|| Error::MissingWeight(name.to_string()))?;
        let tensors = SafeTensors::deserialize(&self.buffers[file])
            .map_err(|e| Error::SafeTensors(e.to_string()))?;
        let view = tensors.tensor(name).map_err(|e| Error::SafeTensors(format!("{name}: {e}")))?;

        if view.shape() != expected {
            return Err(Error::ShapeMismatch {
                name: name.to_string(),
                expected: expected.to_vec(),
                actual: view.shape().to_vec(),
            });
        }
        tensor_to_f32_vec(&view).ok_or_else(|| {
            Error::SafeTensors(format!("{name}: unsupported dtype {:?}", view.dtype()))
        })
    }
}

/// Random checkpoint for a small config, used by tests across the crate
#[cfg(test)]
pub(crate) fn tiny_store(config: &super::LlamaConfig, seed: u64) -> WeightStore {
    WeightStore::from_buffers(vec![tiny_checkpoint(config, seed)]).unwrap()
}

/// Serialized SafeTensors bytes of [`tiny_store`]
#[cfg(test)]
pub(crate) fn tiny_checkpoint(config: &super::LlamaConfig, seed: u64) -> Vec<u8> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use safetensors::tensor::{Dtype, TensorView};

    let mut rng = StdRng::seed_from_u64(seed);
    let (h, i, v) = (config.hidden_size, config.intermediate_size, config.vocab_size);
    let (qw, kvw) = (config.q_width(), config.kv_width());

    let mut shapes: Vec<(String, Vec<usize>)> = vec![
        ("model.embed_tokens.weight".into(), vec![v, h]),
        ("model.norm.weight".into(), vec![h]),
    ];
    if !config.tie_word_embeddings {
        shapes.push(("lm_head.weight".into(), vec![v, h]));
    }
    for l in 0..config.num_hidden_layers {
        let p = format!("model.layers.{l}");
        shapes.extend([
            (format!("{p}.input_layernorm.weight"), vec![h]),
            (format!("{p}.post_attention_layernorm.weight"), vec![h]),
            (format!("{p}.self_attn.q_proj.weight"), vec![qw, h]),
            (format!("{p}.self_attn.k_proj.weight"), vec![kvw, h]),
            (format!("{p}.self_attn.v_proj.weight"), vec![kvw, h]),
            (format!("{p}.self_attn.o_proj.weight"), vec![h, qw]),
            (format!("{p}.mlp.gate_proj.weight"), vec![i, h]),
            (format!("{p}.mlp.up_proj.weight"), vec![i, h]),
            (format!("{p}.mlp.down_proj.weight"), vec![h, i]),
        ]);
    }

    let bytes: Vec<(String, Vec<usize>, Vec<u8>)> = shapes
        .into_iter()
        .map(|(name, shape)| {
            let n: usize = shape.iter().product();
            let values: Vec<f32> = if name.ends_with("norm.weight") {
                (0..n).map(|_| 1.0 + rng.random_range(-0.1..0.1)).collect()
            } else {
                (0..n).map(|_| rng.random_range(-0.3..0.3)).collect()
            };
            (name, shape, bytemuck::cast_slice::<f32, u8>(&values).to_vec())
        })
        .collect();
    let views: Vec<(&str, TensorView<'_>)> = bytes
        .iter()
        .map(|(name, shape, data)| {
            (name.as_str(), TensorView::new(Dtype::F32, shape.clone(), data).unwrap())
        })
        .collect();
    safetensors::serialize(views, None).unwrap()
}
