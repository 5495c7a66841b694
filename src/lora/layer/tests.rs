//! Tests for LoRA layer

use super::*;
use crate::autograd::{backward, matmul_nt_compute, Context};
use crate::lora::AdapterError;
use crate::Tensor;
use approx::assert_abs_diff_eq;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn eval_ctx() -> Context {
    let mut ctx = Context::new(0);
    ctx.eval();
    ctx
}

fn layer_with_weights(d_out: usize, d_in: usize, rank: usize, alpha: f32) -> LoRALayer {
    let mut rng = StdRng::seed_from_u64(3);
    let mut layer = LoRALayer::new(d_out, d_in, rank, alpha, 0.0, &mut rng);
    let a: Vec<f32> = (0..rank * d_in).map(|i| (i as f32 * 0.2).sin() * 0.1).collect();
    let b: Vec<f32> = (0..d_out * rank).map(|i| (i as f32 * 0.3).cos() * 0.1).collect();
    layer.set_weights(a, b).unwrap();
    layer
}

// ========================================================================
// PROPERTY TESTS
// ========================================================================

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(100))]

    #[test]
    fn prop_zero_b_gives_zero_update(
        d_out in 2usize..10,
        d_in in 2usize..10,
        rank in 1usize..5,
        seed in 0u64..100,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let lora = LoRALayer::new(d_out, d_in, rank, 16.0, 0.0, &mut rng);
        let x: Vec<f32> = (0..2 * d_in).map(|i| i as f32 * 0.5 - 1.0).collect();
        let out = lora.forward(&Tensor::from_vec(x, false), 2, &mut eval_ctx());
        prop_assert!(out.as_slice().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn prop_init_within_kaiming_bound(
        d_in in 1usize..64,
        seed in 0u64..100,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let lora = LoRALayer::new(4, d_in, 4, 8.0, 0.0, &mut rng);
        let bound = 1.0 / (d_in as f32).sqrt();
        prop_assert!(lora.lora_a().as_slice().iter().all(|v| v.abs() <= bound));
    }

    #[test]
    fn prop_forward_matches_delta_weight(
        d_out in 2usize..8,
        d_in in 2usize..8,
        rank in 1usize..4,
    ) {
        let lora = layer_with_weights(d_out, d_in, rank, 2.0);
        let x: Vec<f32> = (0..3 * d_in).map(|i| (i as f32 + 1.0) * 0.1).collect();
        let out = lora.forward(&Tensor::from_vec(x.clone(), false), 3, &mut eval_ctx());
        let expected = matmul_nt_compute(&x, &lora.delta_weight(), 3, d_in, d_out);
        for (a, b) in out.as_slice().iter().zip(&expected) {
            prop_assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
        }
    }
}

// ========================================================================
// UNIT TESTS
// ========================================================================

#[test]
fn test_scale_is_alpha_over_rank() {
    let mut rng = StdRng::seed_from_u64(0);
    let lora = LoRALayer::new(8, 8, 16, 32.0, 0.05, &mut rng);
    assert_abs_diff_eq!(lora.scale(), 2.0);
    assert_eq!(lora.num_params(), 16 * 8 + 8 * 16);
}

#[test]
fn test_zero_b_blocks_gradient_to_a() {
    let mut rng = StdRng::seed_from_u64(1);
    let lora = LoRALayer::new(3, 4, 2, 4.0, 0.0, &mut rng);
    let x = Tensor::from_vec(vec![1.0, -1.0, 0.5, 2.0], false);
    let mut out = lora.forward(&x, 1, &mut eval_ctx());
    backward(&mut out, None);

    let grad_a = lora.lora_a().grad().unwrap();
    let grad_b = lora.lora_b().grad().unwrap();
    assert!(grad_a.iter().all(|v| *v == 0.0));
    assert!(grad_b.iter().any(|v| *v != 0.0));
}

#[test]
fn test_both_factors_receive_gradient_once_trained() {
    let lora = layer_with_weights(3, 4, 2, 4.0);
    let x = Tensor::from_vec(vec![1.0, -1.0, 0.5, 2.0], true);
    let mut out = lora.forward(&x, 1, &mut eval_ctx());
    backward(&mut out, None);

    assert!(lora.lora_a().grad().unwrap().iter().any(|v| *v != 0.0));
    assert!(lora.lora_b().grad().unwrap().iter().any(|v| *v != 0.0));
    assert!(x.grad().is_some());
}

#[test]
fn test_set_weights_rejects_wrong_shape() {
    let mut rng = StdRng::seed_from_u64(0);
    let mut lora = LoRALayer::new(4, 6, 2, 4.0, 0.0, &mut rng);
    let err = lora.set_weights(vec![0.0; 11], vec![0.0; 8]).unwrap_err();
    assert!(matches!(err, AdapterError::DimensionMismatch { .. }));
    let err = lora.set_weights(vec![0.0; 12], vec![0.0; 7]).unwrap_err();
    assert!(matches!(err, AdapterError::DimensionMismatch { .. }));
    assert!(lora.set_weights(vec![0.0; 12], vec![0.0; 8]).is_ok());
}

#[test]
fn test_dropout_only_in_training() {
    let mut rng = StdRng::seed_from_u64(0);
    let mut lora = LoRALayer::new(4, 64, 2, 4.0, 0.5, &mut rng);
    lora.set_weights(vec![0.1; 128], vec![0.1; 8]).unwrap();
    let x = Tensor::from_vec(vec![1.0; 64], false);

    let eval_out = lora.forward(&x, 1, &mut eval_ctx());
    let again = lora.forward(&x, 1, &mut eval_ctx());
    assert_eq!(eval_out.as_slice(), again.as_slice());

    let mut train_ctx = Context::new(9);
    let train_out = lora.forward(&x, 1, &mut train_ctx);
    assert_ne!(train_out.as_slice(), eval_out.as_slice());
}
