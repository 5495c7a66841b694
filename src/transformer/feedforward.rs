//! SwiGLU feed-forward network

use crate::autograd::{mul, silu, Context};
use crate::error::Result;
use crate::quant::Nf4Config;
use crate::Tensor;

use super::config::LlamaConfig;
use super::linear::Linear;
use super::weights::WeightStore;

/// `mlp` block: `down(silu(gate(x)) * up(x))`
pub struct Mlp {
    pub gate_proj: Linear,
    pub up_proj: Linear,
    pub down_proj: Linear,
}

impl Mlp {
    pub fn from_store(
        config: &LlamaConfig,
        store: &WeightStore,
        prefix: &str,
        quant: Option<Nf4Config>,
    ) -> Result<Self> {
        let (h, i) = (config.hidden_size, config.intermediate_size);
        Ok(Self {
            gate_proj: Linear::from_store(store, &format!("{prefix}.gate_proj"), i, h, quant)?,
            up_proj: Linear::from_store(store, &format!("{prefix}.up_proj"), i, h, quant)?,
            down_proj: Linear::from_store(store, &format!("{prefix}.down_proj"), h, i, quant)?,
        })
    }

    pub fn forward(&self, x: &Tensor, rows: usize, ctx: &mut Context) -> Tensor {
        let gate = self.gate_proj.forward(x, rows, ctx);
        let up = self.up_proj.forward(x, rows, ctx);
        let hidden = mul(&silu(&gate), &up);
        self.down_proj.forward(&hidden, rows, ctx)
    }

    pub fn linears(&self) -> [&Linear; 3] {
        [&self.gate_proj, &self.up_proj, &self.down_proj]
    }

    pub fn linears_mut(&mut self) -> [&mut Linear; 3] {
        [&mut self.gate_proj, &mut self.up_proj, &mut self.down_proj]
    }
}
