//! PEFT-compatible adapter files (adapter_model.safetensors + adapter_config.json)
//!
//! Produces output compatible with `peft.PeftModel.from_pretrained()` and reads
//! it back.

use super::error::AdapterError;
use super::peft_config::PeftAdapterConfig;
use crate::lora::{LoRAConfig, LoRALayer};
use crate::transformer::tensor_to_f32_vec;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";
pub const ADAPTER_WEIGHTS_FILE: &str = "adapter_model.safetensors";

/// A bundle of LoRA adapters keyed by layer path
///
/// Collects multiple LoRA layer adapters and exports them in PEFT format.
pub struct PeftAdapterBundle {
    /// Adapters keyed by layer path (e.g., "model.layers.0.self_attn.q_proj")
    adapters: Vec<(String, AdapterWeights)>,
    config: LoRAConfig,
    /// Base model name (for adapter_config.json)
    base_model: Option<String>,
}

/// Weights of a single adapted module
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterWeights {
    /// LoRA A matrix [rank, d_in]
    pub lora_a: Vec<f32>,
    /// LoRA B matrix [d_out, rank]
    pub lora_b: Vec<f32>,
    pub rank: usize,
    pub d_in: usize,
    pub d_out: usize,
}

impl AdapterWeights {
    fn from_layer(layer: &LoRALayer) -> Self {
        Self {
            lora_a: layer.lora_a().as_slice().to_vec(),
            lora_b: layer.lora_b().as_slice().to_vec(),
            rank: layer.rank(),
            d_in: layer.d_in(),
            d_out: layer.d_out(),
        }
    }
}

/// An adapter read back from disk
#[derive(Debug, Clone)]
pub struct LoadedPeftAdapter {
    pub config: PeftAdapterConfig,
    /// Weights keyed by layer path
    pub weights: BTreeMap<String, AdapterWeights>,
}

impl PeftAdapterBundle {
    /// Create a new bundle with the given LoRA config
    pub fn new(config: LoRAConfig) -> Self {
        Self { adapters: Vec::new(), config, base_model: None }
    }

    /// Set the base model name
    pub fn with_base_model(mut self, name: impl Into<String>) -> Self {
        self.base_model = Some(name.into());
        self
    }

    /// Add a LoRA layer adapter with its full layer path
    pub fn add_adapter(&mut self, layer_path: impl Into<String>, layer: &LoRALayer) {
        self.adapters.push((layer_path.into(), AdapterWeights::from_layer(layer)));
    }

    /// Save PEFT-compatible adapter to output directory
    ///
    /// Creates:
    /// - `adapter_config.json`: PEFT configuration
    /// - `adapter_model.safetensors`: adapter weights in PEFT naming convention
    pub fn save_peft(&self, output_dir: impl AsRef<Path>) -> Result<(), AdapterError> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)?;

        let peft_config =
            PeftAdapterConfig::from_lora_config(&self.config, self.base_model.as_deref());
        std::fs::write(output_dir.join(ADAPTER_CONFIG_FILE), peft_config.to_json()?)?;

        // PEFT naming convention: "base_model.model.{layer_path}.lora_A.weight" / "lora_B.weight"
        let mut tensor_data: Vec<(String, Vec<u8>, Vec<usize>)> = Vec::new();
        for (layer_path, weights) in &self.adapters {
            tensor_data.push((
                format!("base_model.model.{layer_path}.lora_A.weight"),
                bytemuck::cast_slice(&weights.lora_a).to_vec(),
                vec![weights.rank, weights.d_in],
            ));
            tensor_data.push((
                format!("base_model.model.{layer_path}.lora_B.weight"),
                bytemuck::cast_slice(&weights.lora_b).to_vec(),
                vec![weights.d_out, weights.rank],
            ));
        }

        let views = tensor_data
            .iter()
            .map(|(name, bytes, shape)| {
                TensorView::new(Dtype::F32, shape.clone(), bytes)
                    .map(|view| (name.as_str(), view))
                    .map_err(|e| AdapterError::SafeTensors(format!("{name}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut metadata = HashMap::new();
        metadata.insert("format".to_string(), "pt".to_string());

        let safetensor_bytes = safetensors::serialize(views, Some(metadata)).map_err(|e| {
            AdapterError::SafeTensors(format!("SafeTensors serialization failed: {e}"))
        })?;
        std::fs::write(output_dir.join(ADAPTER_WEIGHTS_FILE), safetensor_bytes)?;

        Ok(())
    }

    /// Number of adapter layers in the bundle
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Check if bundle is empty
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Read a PEFT adapter directory
///
/// Every module must have both `lora_A` and `lora_B` with shapes consistent
/// with the configured rank.
pub fn load_peft(dir: impl AsRef<Path>) -> Result<LoadedPeftAdapter, AdapterError> {
    let dir = dir.as_ref();
    let config_json = std::fs::read_to_string(dir.join(ADAPTER_CONFIG_FILE))?;
    let config = PeftAdapterConfig::from_json(&config_json)?;

    let bytes = std::fs::read(dir.join(ADAPTER_WEIGHTS_FILE))?;
    let tensors = SafeTensors::deserialize(&bytes)
        .map_err(|e| AdapterError::SafeTensors(format!("SafeTensors parse failed: {e}")))?;

    let mut halves: BTreeMap<String, (Option<(Vec<f32>, Vec<usize>)>, Option<(Vec<f32>, Vec<usize>)>)> =
        BTreeMap::new();
    for (name, view) in tensors.tensors() {
        let Some(rest) = name.strip_prefix("base_model.model.") else {
            return Err(AdapterError::PeftFormatError(format!("unexpected tensor name {name}")));
        };
        let (path, is_a) = if let Some(p) = rest.strip_suffix(".lora_A.weight") {
            (p, true)
        } else if let Some(p) = rest.strip_suffix(".lora_B.weight") {
            (p, false)
        } else {
            return Err(AdapterError::PeftFormatError(format!("unexpected tensor name {name}")));
        };
        let values = tensor_to_f32_vec(&view)
            .ok_or_else(|| AdapterError::SafeTensors(format!("{name}: unsupported dtype")))?;
        let entry = halves.entry(path.to_string()).or_default();
        let slot = if is_a { &mut entry.0 } else { &mut entry.1 };
        *slot = Some((values, view.shape().to_vec()));
    }

    let mut weights = BTreeMap::new();
    for (path, (a, b)) in halves {
        let (Some((lora_a, a_shape)), Some((lora_b, b_shape))) = (a, b) else {
            return Err(AdapterError::PeftFormatError(format!(
                "module {path} needs both lora_A and lora_B"
            )));
        };
        if a_shape.len() != 2 || b_shape.len() != 2 || a_shape[0] != b_shape[1] {
            return Err(AdapterError::DimensionMismatch {
                expected: "lora_A [r, in] and lora_B [out, r]".to_string(),
                actual: format!("{a_shape:?} and {b_shape:?} for {path}"),
            });
        }
        if a_shape[0] != config.r {
            return Err(AdapterError::Validation(format!(
                "module {path} has rank {} but adapter_config.json says {}",
                a_shape[0], config.r
            )));
        }
        weights.insert(
            path,
            AdapterWeights { lora_a, lora_b, rank: a_shape[0], d_in: a_shape[1], d_out: b_shape[0] },
        );
    }

    Ok(LoadedPeftAdapter { config, weights })
}
