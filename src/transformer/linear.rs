//! Frozen linear projections with optional LoRA adapters

use super::weights::WeightStore;
use crate::autograd::{add, matmul_compute, matmul_nt_compute, BackwardOp, Context, GradCell};
use crate::error::Result;
use crate::lora::LoRALayer;
use crate::quant::{Nf4Config, Nf4Tensor};
use crate::Tensor;
use ndarray::Array1;
use std::borrow::Cow;
use std::rc::Rc;

/// Frozen `[out, in]` weight, dense or NF4
#[derive(Debug)]
pub enum FrozenWeight {
    Dense(Rc<[f32]>),
    Nf4(Nf4Tensor),
}

impl FrozenWeight {
    /// Weight values in f32
    pub fn values(&self) -> Cow<'_, [f32]> {
        match self {
            FrozenWeight::Dense(w) => Cow::Borrowed(w),
            FrozenWeight::Nf4(q) => Cow::Owned(q.dequantize()),
        }
    }

    pub fn memory_bytes(&self) -> usize {
        match self {
            FrozenWeight::Dense(w) => w.len() * 4,
            FrozenWeight::Nf4(q) => q.memory_bytes(),
        }
    }

    pub fn is_quantized(&self) -> bool {
        matches!(self, FrozenWeight::Nf4(_))
    }
}

/// `y = x Wᵀ` with W frozen; gradients flow to `x` only
pub fn frozen_linear(
    x: &Tensor,
    weight: &Rc<FrozenWeight>,
    rows: usize,
    d_in: usize,
    d_out: usize,
) -> Tensor {
    assert_eq!(x.len(), rows * d_in, "frozen_linear: input size");
    let w = weight.values();
    let out = matmul_nt_compute(x.as_slice(), &w, rows, d_in, d_out);

    let requires_grad = x.requires_grad();
    let mut result = Tensor::from_vec(out, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(FrozenLinearBackward {
            x: x.clone(),
            weight: Rc::clone(weight),
            rows,
            d_in,
            d_out,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct FrozenLinearBackward {
    x: Tensor,
    weight: Rc<FrozenWeight>,
    rows: usize,
    d_in: usize,
    d_out: usize,
    result_grad: GradCell,
}

impl BackwardOp for FrozenLinearBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            // ∂L/∂x = ∂L/∂y @ W, dequantizing again instead of keeping a copy
            let w = self.weight.values();
            let g = grad.as_slice().unwrap_or(&[]);
            let grad_x = matmul_compute(g, &w, self.rows, self.d_out, self.d_in);
            self.x.accumulate_grad(Array1::from(grad_x));
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone()]
    }
}

/// A named projection inside the decoder
pub struct Linear {
    path: String,
    weight: Rc<FrozenWeight>,
    d_in: usize,
    d_out: usize,
    lora: Option<LoRALayer>,
}

impl Linear {
    /// Dense frozen projection
    pub fn dense(path: impl Into<String>, weight: Rc<[f32]>, d_out: usize, d_in: usize) -> Self {
        assert_eq!(weight.len(), d_out * d_in, "Linear weight size must match d_out * d_in");
        Self {
            path: path.into(),
            weight: Rc::new(FrozenWeight::Dense(weight)),
            d_in,
            d_out,
            lora: None,
        }
    }

    /// Projection stored as NF4
    pub fn quantized(
        path: impl Into<String>,
        weight: &[f32],
        d_out: usize,
        d_in: usize,
        config: Nf4Config,
    ) -> Self {
        assert_eq!(weight.len(), d_out * d_in, "Linear weight size must match d_out * d_in");
        Self {
            path: path.into(),
            weight: Rc::new(FrozenWeight::Nf4(Nf4Tensor::quantize(weight, config))),
            d_in,
            d_out,
            lora: None,
        }
    }

    /// Read `{path}.weight` from a checkpoint, quantizing it when `quant` is set
    pub fn from_store(
        store: &WeightStore,
        path: &str,
        d_out: usize,
        d_in: usize,
        quant: Option<Nf4Config>,
    ) -> Result<Self> {
        let weight = store.load(&format!("{path}.weight"), &[d_out, d_in])?;
        Ok(match quant {
            Some(config) => Self::quantized(path, &weight, d_out, d_in, config),
            None => Self::dense(path, Rc::from(weight), d_out, d_in),
        })
    }

    /// Frozen output plus the adapter update when one is attached
    pub fn forward(&self, x: &Tensor, rows: usize, ctx: &mut Context) -> Tensor {
        let base = frozen_linear(x, &self.weight, rows, self.d_in, self.d_out);
        match &self.lora {
            Some(lora) => add(&base, &lora.forward(x, rows, ctx)),
            None => base,
        }
    }

    pub fn attach_lora(&mut self, lora: LoRALayer) {
        assert_eq!((lora.d_in(), lora.d_out()), (self.d_in, self.d_out), "LoRA shape");
        self.lora = Some(lora);
    }

    pub fn lora(&self) -> Option<&LoRALayer> {
        self.lora.as_ref()
    }

    pub fn lora_mut(&mut self) -> Option<&mut LoRALayer> {
        self.lora.as_mut()
    }

    /// Module path, e.g. `model.layers.0.self_attn.q_proj`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn weight(&self) -> &FrozenWeight {
        &self.weight
    }

    pub fn d_in(&self) -> usize {
        self.d_in
    }

    pub fn d_out(&self) -> usize {
        self.d_out
    }
}
