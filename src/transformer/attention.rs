//! Grouped-query self-attention with rotary embeddings

use crate::autograd::{causal_attention, rope, AttentionShape, Context, RotaryTables};
use crate::error::Result;
use crate::quant::Nf4Config;
use crate::Tensor;
use std::rc::Rc;

use super::cache::LayerCache;
use super::config::LlamaConfig;
use super::linear::Linear;
use super::weights::WeightStore;

/// Per-forward inputs shared by every attention layer
pub struct AttentionInput<'a> {
    pub batch: usize,
    /// New positions per sequence
    pub seq: usize,
    /// Rotary tables for the `batch·seq` new rows
    pub rotary: &'a RotaryTables,
    /// `batch × (past + seq)` key mask, `false` for padding
    pub key_mask: Rc<[bool]>,
}

/// `self_attn` block of a Llama decoder layer
pub struct SelfAttention {
    pub q_proj: Linear,
    pub k_proj: Linear,
    pub v_proj: Linear,
    pub o_proj: Linear,
    num_heads: usize,
    num_kv_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    pub fn from_store(
        config: &LlamaConfig,
        store: &WeightStore,
        prefix: &str,
        quant: Option<Nf4Config>,
    ) -> Result<Self> {
        let h = config.hidden_size;
        let (qw, kvw) = (config.q_width(), config.kv_width());
        Ok(Self {
            q_proj: Linear::from_store(store, &format!("{prefix}.q_proj"), qw, h, quant)?,
            k_proj: Linear::from_store(store, &format!("{prefix}.k_proj"), kvw, h, quant)?,
            v_proj: Linear::from_store(store, &format!("{prefix}.v_proj"), kvw, h, quant)?,
            o_proj: Linear::from_store(store, &format!("{prefix}.o_proj"), h, qw, quant)?,
            num_heads: config.num_attention_heads,
            num_kv_heads: config.num_kv_heads(),
            head_dim: config.head_dim(),
        })
    }

    /// Attend from the new rows of `x` (batch·seq × hidden)
    ///
    /// With a cache, the new keys and values are appended first and the
    /// queries see every cached position.
    pub fn forward(
        &self,
        x: &Tensor,
        input: &AttentionInput<'_>,
        cache: Option<&mut LayerCache>,
        ctx: &mut Context,
    ) -> Tensor {
        let rows = input.batch * input.seq;
        let q = self.q_proj.forward(x, rows, ctx);
        let k = self.k_proj.forward(x, rows, ctx);
        let v = self.v_proj.forward(x, rows, ctx);

        let q = rope(&q, input.rotary, self.num_heads);
        let k = rope(&k, input.rotary, self.num_kv_heads);

        let (k, v, kv_len) = match cache {
            Some(cache) => {
                let kv_width = self.num_kv_heads * self.head_dim;
                let (k_all, v_all) =
                    cache.append(k.as_slice(), v.as_slice(), input.batch, input.seq, kv_width);
                let k_all = Tensor::from_vec(k_all, false);
                let v_all = Tensor::from_vec(v_all, false);
                (k_all, v_all, cache.len())
            }
            None => (k, v, input.seq),
        };

        let shape = AttentionShape {
            batch: input.batch,
            q_len: input.seq,
            kv_len,
            num_heads: self.num_heads,
            num_kv_heads: self.num_kv_heads,
            head_dim: self.head_dim,
        };
        let attn = causal_attention(&q, &k, &v, Rc::clone(&input.key_mask), shape);
        self.o_proj.forward(&attn, rows, ctx)
    }

    pub fn linears(&self) -> [&Linear; 4] {
        [&self.q_proj, &self.k_proj, &self.v_proj, &self.o_proj]
    }

    pub fn linears_mut(&mut self) -> [&mut Linear; 4] {
        [&mut self.q_proj, &mut self.k_proj, &mut self.v_proj, &mut self.o_proj]
    }
}
