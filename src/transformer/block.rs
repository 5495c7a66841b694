//! Llama decoder layer
//!
//! Pre-norm residual block: `h = x + attn(norm(x))`, `out = h + mlp(norm(h))`.

use crate::autograd::{add, Context};
use crate::error::Result;
use crate::quant::Nf4Config;
use crate::Tensor;

use super::attention::{AttentionInput, SelfAttention};
use super::cache::LayerCache;
use super::config::LlamaConfig;
use super::feedforward::Mlp;
use super::linear::Linear;
use super::norm::RmsNorm;
use super::weights::WeightStore;

pub struct DecoderLayer {
    pub input_layernorm: RmsNorm,
    pub self_attn: SelfAttention,
    pub post_attention_layernorm: RmsNorm,
    pub mlp: Mlp,
}

impl DecoderLayer {
    /// Load `model.layers.{idx}.*`
    ///
    /// Norms stay dense; the seven projections are quantized when `quant` is set.
    pub fn from_store(
        config: &LlamaConfig,
        store: &WeightStore,
        idx: usize,
        quant: Option<Nf4Config>,
    ) -> Result<Self> {
        let prefix = format!("model.layers.{idx}");
        let h = config.hidden_size;
        let eps = config.rms_norm_eps;
        Ok(Self {
            input_layernorm: RmsNorm::new(
                store.load(&format!("{prefix}.input_layernorm.weight"), &[h])?,
                eps,
            ),
            self_attn: SelfAttention::from_store(
                config,
                store,
                &format!("{prefix}.self_attn"),
                quant,
            )?,
            post_attention_layernorm: RmsNorm::new(
                store.load(&format!("{prefix}.post_attention_layernorm.weight"), &[h])?,
                eps,
            ),
            mlp: Mlp::from_store(config, store, &format!("{prefix}.mlp"), quant)?,
        })
    }

    pub fn forward(
        &self,
        x: &Tensor,
        input: &AttentionInput<'_>,
        cache: Option<&mut LayerCache>,
        ctx: &mut Context,
    ) -> Tensor {
        let rows = input.batch * input.seq;
        let attn = self.self_attn.forward(&self.input_layernorm.forward(x), input, cache, ctx);
        let h = add(x, &attn);
        let mlp = self.mlp.forward(&self.post_attention_layernorm.forward(&h), rows, ctx);
        add(&h, &mlp)
    }

    pub fn linears(&self) -> Vec<&Linear> {
        let mut out: Vec<&Linear> = self.self_attn.linears().into();
        out.extend(self.mlp.linears());
        out
    }

    pub fn linears_mut(&mut self) -> Vec<&mut Linear> {
        let mut out: Vec<&mut Linear> = self.self_attn.linears_mut().into();
        out.extend(self.mlp.linears_mut());
        out
    }
}
