//! Logits processors and sampling on raw `[f32]` rows

use rand::Rng;

/// HuggingFace repetition penalty
///
/// Each distinct token already in the sequence has its score divided by
/// `penalty` when positive and multiplied when negative.
pub fn apply_repetition_penalty(logits: &mut [f32], past_tokens: &[u32], penalty: f32) {
    if penalty == 1.0 {
        return;
    }
    let mut seen = vec![false; logits.len()];
    for &tok in past_tokens {
        let idx = tok as usize;
        if idx >= logits.len() || seen[idx] {
            continue;
        }
        seen[idx] = true;
        if logits[idx] > 0.0 {
            logits[idx] /= penalty;
        } else {
            logits[idx] *= penalty;
        }
    }
}

/// Mask EOS until `min_new_tokens` tokens have been generated
pub fn apply_min_new_tokens(
    logits: &mut [f32],
    generated: usize,
    min_new_tokens: usize,
    eos_ids: &[u32],
) {
    if generated >= min_new_tokens {
        return;
    }
    for &eos in eos_ids {
        if let Some(v) = logits.get_mut(eos as usize) {
            *v = f32::NEG_INFINITY;
        }
    }
}

pub fn apply_temperature(logits: &mut [f32], temperature: f32) {
    if temperature != 1.0 {
        logits.iter_mut().for_each(|v| *v /= temperature);
    }
}

/// Keep the `k` largest logits (ties with the k-th included)
pub fn apply_top_k(logits: &mut [f32], k: usize) {
    if k >= logits.len() {
        return;
    }
    let mut vals = logits.to_vec();
    let pivot = vals.len() - k;
    vals.select_nth_unstable_by(pivot, f32::total_cmp);
    let threshold = vals[pivot];
    for v in logits.iter_mut() {
        if *v < threshold {
            *v = f32::NEG_INFINITY;
        }
    }
}

/// Nucleus filtering: keep the smallest set whose probability mass reaches `p`
pub fn apply_top_p(logits: &mut [f32], p: f32) {
    if p >= 1.0 {
        return;
    }
    let probs = softmax(logits);
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_unstable_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    let mut keep = vec![false; logits.len()];
    let mut cumsum = 0.0f32;
    for &idx in &order {
        keep[idx] = true;
        cumsum += probs[idx];
        if cumsum >= p {
            break;
        }
    }
    for (v, keep) in logits.iter_mut().zip(keep) {
        if !keep {
            *v = f32::NEG_INFINITY;
        }
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let log_sum_exp = logits.iter().map(|&v| (v - max).exp()).sum::<f32>().ln() + max;
    logits.iter().map(|&v| v - log_sum_exp).collect()
}

/// Index of the largest logit, the first one on ties
pub fn argmax(logits: &[f32]) -> u32 {
    let mut best = 0;
    let mut max = f32::NEG_INFINITY;
    for (i, &v) in logits.iter().enumerate() {
        if v > max {
            max = v;
            best = i;
        }
    }
    best as u32
}

/// Draw one token from the distribution `softmax(logits)`
pub fn sample_categorical<R: Rng>(logits: &[f32], rng: &mut R) -> u32 {
    let probs = softmax(logits);
    let r: f32 = rng.random();
    let mut cumsum = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumsum += p;
        if r < cumsum {
            return i as u32;
        }
    }
    // Rounding left the draw past the last bucket
    probs.iter().rposition(|&p| p > 0.0).unwrap_or(0) as u32
}
