//! AdamW optimizer (Adam with decoupled Weight decay)

use super::Optimizer;
use crate::Tensor;
use ndarray::Array1;

/// AdamW optimizer, following `torch.optim.AdamW`
///
/// Weight decay is applied to the parameters before the adaptive update:
///
/// θ ← θ · (1 − lr·λ)
/// θ ← θ − lr / (1 − β1ᵗ) · m / (√v / √(1 − β2ᵗ) + ε)
pub struct AdamW {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    weight_decay: f32,
    t: u64,
    m: Vec<Option<Array1<f32>>>, // First moment
    v: Vec<Option<Array1<f32>>>, // Second moment
}

impl AdamW {
    /// Create a new AdamW optimizer
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32, weight_decay: f32) -> Self {
        Self { lr, beta1, beta2, epsilon, weight_decay, t: 0, m: Vec::new(), v: Vec::new() }
    }

    /// PyTorch defaults: betas (0.9, 0.999), eps 1e-8
    pub fn with_weight_decay(lr: f32, weight_decay: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8, weight_decay)
    }

    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.t
    }

    #[must_use]
    pub fn weight_decay(&self) -> f32 {
        self.weight_decay
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut [&mut Tensor]) {
        if self.m.len() < params.len() {
            self.m.resize(params.len(), None);
            self.v.resize(params.len(), None);
        }
        self.t += 1;

        let bias1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias2_sqrt = (1.0 - self.beta2.powi(self.t as i32)).sqrt();
        let step_size = self.lr / bias1;
        let decay = 1.0 - self.lr * self.weight_decay;
        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.epsilon);

        for (i, param) in params.iter_mut().enumerate() {
            let Some(grad) = param.grad() else {
                continue;
            };
            let m = self.m[i].get_or_insert_with(|| Array1::zeros(grad.len()));
            let v = self.v[i].get_or_insert_with(|| Array1::zeros(grad.len()));

            // m_t = β1 * m_{t-1} + (1 - β1) * g
            m.zip_mut_with(&grad, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
            // v_t = β2 * v_{t-1} + (1 - β2) * g²
            v.zip_mut_with(&grad, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

            let data = param.data_mut();
            for ((p, &m), &v) in data.iter_mut().zip(m.iter()).zip(v.iter()) {
                *p *= decay;
                *p -= step_size * m / (v.sqrt() / bias2_sqrt + eps);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;

    #[test]
    fn test_first_step_moves_by_lr() {
        // Bias correction makes the first update lr·sign(g)
        let mut opt = AdamW::with_weight_decay(0.1, 0.0);
        let mut p = Tensor::from_vec(vec![1.0, -1.0], true);
        p.set_grad(arr1(&[0.5, -2.0]));
        opt.step(&mut [&mut p]);
        assert_abs_diff_eq!(p.as_slice()[0], 0.9, epsilon = 1e-5);
        assert_abs_diff_eq!(p.as_slice()[1], -0.9, epsilon = 1e-5);
        assert_eq!(opt.step_count(), 1);
    }

    #[test]
    fn test_decoupled_weight_decay_without_gradient_signal() {
        let mut opt = AdamW::with_weight_decay(0.1, 0.5);
        let mut p = Tensor::from_vec(vec![2.0], true);
        p.set_grad(arr1(&[0.0]));
        opt.step(&mut [&mut p]);
        // Only the decay term acts: 2 * (1 - 0.1 * 0.5)
        assert_abs_diff_eq!(p.as_slice()[0], 1.9, epsilon = 1e-6);
    }

    #[test]
    fn test_params_without_grad_are_skipped() {
        let mut opt = AdamW::with_weight_decay(0.1, 0.5);
        let mut p = Tensor::from_vec(vec![2.0], true);
        opt.step(&mut [&mut p]);
        assert_eq!(p.as_slice(), &[2.0]);
    }

    #[test]
    fn test_converges_on_quadratic() {
        let mut opt = AdamW::with_weight_decay(0.05, 0.0);
        let mut p = Tensor::from_vec(vec![3.0, -2.0], true);
        for _ in 0..500 {
            let g = p.data().mapv(|x| 2.0 * x);
            p.set_grad(g);
            opt.step(&mut [&mut p]);
        }
        assert!(p.as_slice().iter().all(|x| x.abs() < 0.05));
    }
}
