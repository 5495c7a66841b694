//! Autoregressive decoding: greedy, multinomial sampling and beam search

use super::config::{DecodingMode, GenerationConfig, StopTokens};
use super::processors::{
    apply_min_new_tokens, apply_repetition_penalty, apply_temperature, apply_top_k, apply_top_p,
    argmax, log_softmax, sample_categorical,
};
use crate::autograd::Context;
use crate::error::{Error, Result};
use crate::tokenizer::EncodedBatch;
use crate::transformer::{KvCache, LlamaForCausalLM};
use rand::Rng;

/// A model that can be decoded step by step with a cache
pub trait CausalLm {
    type Cache;

    fn vocab_size(&self) -> usize;

    fn new_cache(&self) -> Self::Cache;

    /// Logits of the last new position of every row, `batch × vocab`
    ///
    /// `input_ids` holds only the `batch × seq` new tokens; `attention_mask`
    /// covers the cached positions as well.
    fn last_token_logits(
        &self,
        input_ids: &[u32],
        attention_mask: &[u32],
        batch: usize,
        seq: usize,
        cache: &mut Self::Cache,
    ) -> Result<Vec<f32>>;

    /// Make cache row `i` a copy of row `order[i]`
    fn reorder_cache(&self, cache: &mut Self::Cache, order: &[usize]);
}

impl CausalLm for LlamaForCausalLM {
    type Cache = KvCache;

    fn vocab_size(&self) -> usize {
        self.config().vocab_size
    }

    fn new_cache(&self) -> KvCache {
        KvCache::new(self.num_layers())
    }

    fn last_token_logits(
        &self,
        input_ids: &[u32],
        attention_mask: &[u32],
        batch: usize,
        seq: usize,
        cache: &mut KvCache,
    ) -> Result<Vec<f32>> {
        let mut ctx = Context::default();
        ctx.eval();
        let hidden = self.forward_hidden(input_ids, attention_mask, batch, seq, Some(cache), &mut ctx)?;
        let rows: Vec<usize> = (0..batch).map(|b| b * seq + seq - 1).collect();
        Ok(self.logits_for_rows(&hidden, &rows, &mut ctx).as_slice().to_vec())
    }

    fn reorder_cache(&self, cache: &mut KvCache, order: &[usize]) {
        cache.reorder(order);
    }
}

/// Generate continuations for left-padded prompts
///
/// Returns full sequences (prompt followed by new tokens), all padded to the
/// same length with the pad id. Greedy decoding returns one row per prompt;
/// sampling and beam search return `num_return_sequences` consecutive rows
/// per prompt.
pub fn generate<M: CausalLm, R: Rng>(
    model: &M,
    prompts: &EncodedBatch,
    config: &GenerationConfig,
    stop: &StopTokens,
    rng: &mut R,
) -> Result<Vec<Vec<u32>>> {
    config.validate()?;
    if prompts.batch == 0 {
        return Ok(Vec::new());
    }
    match config.mode() {
        DecodingMode::Greedy => decode(model, prompts, config, stop, None::<&mut R>),
        DecodingMode::Sample => decode(model, prompts, config, stop, Some(rng)),
        DecodingMode::BeamSearch => beam_search(model, prompts, config, stop),
    }
}

/// Repeat each prompt row `n` times, keeping copies adjacent
fn expand(prompts: &EncodedBatch, n: usize) -> (Vec<Vec<u32>>, Vec<Vec<u32>>) {
    let seq = prompts.seq;
    let mut ids = Vec::with_capacity(prompts.batch * n);
    let mut masks = Vec::with_capacity(prompts.batch * n);
    for (row, mask) in prompts.input_ids.chunks(seq).zip(prompts.attention_mask.chunks(seq)) {
        for _ in 0..n {
            ids.push(row.to_vec());
            masks.push(mask.to_vec());
        }
    }
    (ids, masks)
}

fn checked_logits(logits: Vec<f32>, rows: usize, vocab: usize) -> Result<Vec<f32>> {
    if logits.len() != rows * vocab {
        return Err(Error::Generation(format!(
            "model returned {} logits for {rows} rows of vocabulary {vocab}",
            logits.len()
        )));
    }
    Ok(logits)
}

/// Greedy or multinomial decoding, one token per row per step
fn decode<M: CausalLm, R: Rng>(
    model: &M,
    prompts: &EncodedBatch,
    config: &GenerationConfig,
    stop: &StopTokens,
    mut rng: Option<&mut R>,
) -> Result<Vec<Vec<u32>>> {
    let copies = if rng.is_some() { config.num_return_sequences } else { 1 };
    let (mut sequences, mut masks) = expand(prompts, copies);
    let rows = sequences.len();
    let vocab = model.vocab_size();

    let mut cache = model.new_cache();
    let mut logits = checked_logits(
        model.last_token_logits(&sequences.concat(), &masks.concat(), rows, prompts.seq, &mut cache)?,
        rows,
        vocab,
    )?;
    let mut finished = vec![false; rows];

    for step in 0..config.max_new_tokens {
        let mut next = Vec::with_capacity(rows);
        for (r, row_logits) in logits.chunks_mut(vocab).enumerate() {
            if finished[r] {
                next.push(stop.pad_id);
                continue;
            }
            apply_repetition_penalty(row_logits, &sequences[r], config.repetition_penalty);
            apply_min_new_tokens(row_logits, step, config.min_new_tokens, &stop.eos_ids);
            let token = match rng.as_deref_mut() {
                Some(rng) => {
                    apply_temperature(row_logits, config.temperature);
                    if let Some(k) = config.top_k {
                        apply_top_k(row_logits, k);
                    }
                    if let Some(p) = config.top_p {
                        apply_top_p(row_logits, p);
                    }
                    sample_categorical(row_logits, rng)
                }
                None => argmax(row_logits),
            };
            finished[r] = stop.is_eos(token);
            next.push(token);
        }

        for ((seq, mask), &token) in sequences.iter_mut().zip(masks.iter_mut()).zip(&next) {
            seq.push(token);
            mask.push(1);
        }
        if finished.iter().all(|f| *f) || step + 1 == config.max_new_tokens {
            break;
        }
        logits = checked_logits(
            model.last_token_logits(&next, &masks.concat(), rows, 1, &mut cache)?,
            rows,
            vocab,
        )?;
    }
    Ok(sequences)
}

/// Finished hypotheses of one prompt, best `num_beams` kept
struct BeamHypotheses {
    beams: Vec<(f32, Vec<u32>)>,
    num_beams: usize,
    length_penalty: f32,
}

impl BeamHypotheses {
    fn new(num_beams: usize, length_penalty: f32) -> Self {
        Self { beams: Vec::with_capacity(num_beams + 1), num_beams, length_penalty }
    }

    fn normalized(&self, sum_logprobs: f32, generated_len: usize) -> f32 {
        sum_logprobs / (generated_len.max(1) as f32).powf(self.length_penalty)
    }

    fn worst_score(&self) -> f32 {
        self.beams.iter().map(|(s, _)| *s).fold(f32::INFINITY, f32::min)
    }

    fn add(&mut self, tokens: Vec<u32>, sum_logprobs: f32, generated_len: usize) {
        let score = self.normalized(sum_logprobs, generated_len);
        if self.beams.len() < self.num_beams || score > self.worst_score() {
            self.beams.push((score, tokens));
            if self.beams.len() > self.num_beams {
                let worst = self
                    .beams
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| a.0.total_cmp(&b.0))
                    .map_or(0, |(i, _)| i);
                self.beams.remove(worst);
            }
        }
    }

    /// No running beam can beat the worst kept hypothesis any more
    fn is_done(&self, best_sum_logprobs: f32, generated_len: usize) -> bool {
        self.beams.len() >= self.num_beams
            && self.worst_score() >= self.normalized(best_sum_logprobs, generated_len)
    }

    fn into_best(mut self, n: usize) -> Vec<Vec<u32>> {
        self.beams.sort_by(|a, b| b.0.total_cmp(&a.0));
        self.beams.into_iter().take(n).map(|(_, tokens)| tokens).collect()
    }
}

/// Indices of the `n` largest values, descending
fn top_n_indices(values: &[f32], n: usize) -> Vec<usize> {
    let mut indexed: Vec<(usize, f32)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.into_iter().take(n).map(|(i, _)| i).collect()
}

fn beam_search<M: CausalLm>(
    model: &M,
    prompts: &EncodedBatch,
    config: &GenerationConfig,
    stop: &StopTokens,
) -> Result<Vec<Vec<u32>>> {
    let k = config.num_beams;
    let batch = prompts.batch;
    let rows = batch * k;
    let vocab = model.vocab_size();
    let candidates = (1 + stop.eos_ids.len().max(1)) * k;

    let (mut sequences, mut masks) = expand(prompts, k);
    // Only the first copy of each prompt is live at the start
    let mut beam_scores: Vec<f32> =
        (0..rows).map(|r| if r % k == 0 { 0.0 } else { -1e9 }).collect();
    let mut hypotheses: Vec<BeamHypotheses> =
        (0..batch).map(|_| BeamHypotheses::new(k, config.length_penalty)).collect();
    let mut done = vec![false; batch];

    let mut cache = model.new_cache();
    let mut logits = checked_logits(
        model.last_token_logits(&sequences.concat(), &masks.concat(), rows, prompts.seq, &mut cache)?,
        rows,
        vocab,
    )?;

    for step in 0..config.max_new_tokens {
        let generated = step + 1;
        let mut scores = Vec::with_capacity(rows * vocab);
        for (r, row_logits) in logits.chunks(vocab).enumerate() {
            let mut logprobs = log_softmax(row_logits);
            apply_repetition_penalty(&mut logprobs, &sequences[r], config.repetition_penalty);
            apply_min_new_tokens(&mut logprobs, step, config.min_new_tokens, &stop.eos_ids);
            scores.extend(logprobs.into_iter().map(|v| v + beam_scores[r]));
        }

        let mut next_tokens = vec![stop.pad_id; rows];
        let mut next_scores = vec![0.0f32; rows];
        let mut source: Vec<usize> = (0..rows).collect();

        for b in 0..batch {
            if done[b] {
                continue;
            }
            let block = &scores[b * k * vocab..(b + 1) * k * vocab];
            let mut filled = 0;
            for (rank, flat) in top_n_indices(block, candidates).into_iter().enumerate() {
                let src = b * k + flat / vocab;
                let token = (flat % vocab) as u32;
                if stop.is_eos(token) {
                    if rank < k {
                        let mut tokens = sequences[src].clone();
                        tokens.push(token);
                        hypotheses[b].add(tokens, block[flat], generated);
                    }
                    continue;
                }
                let dst = b * k + filled;
                next_tokens[dst] = token;
                next_scores[dst] = block[flat];
                source[dst] = src;
                filled += 1;
                if filled == k {
                    break;
                }
            }
            if filled < k {
                return Err(Error::Generation(format!(
                    "beam search found only {filled} live candidates for {k} beams"
                )));
            }
            let best = next_scores[b * k..(b + 1) * k].iter().copied().fold(f32::NEG_INFINITY, f32::max);
            done[b] = hypotheses[b].is_done(best, generated);
        }

        sequences = source.iter().map(|&s| sequences[s].clone()).collect();
        masks = source.iter().map(|&s| masks[s].clone()).collect();
        for ((seq, mask), &token) in sequences.iter_mut().zip(masks.iter_mut()).zip(&next_tokens) {
            seq.push(token);
            mask.push(1);
        }
        beam_scores = next_scores;
        model.reorder_cache(&mut cache, &source);

        if done.iter().all(|d| *d) || step + 1 == config.max_new_tokens {
            break;
        }
        logits = checked_logits(
            model.last_token_logits(&next_tokens, &masks.concat(), rows, 1, &mut cache)?,
            rows,
            vocab,
        )?;
    }

    let generated = sequences.first().map_or(0, |s| s.len() - prompts.seq);
    let mut out = Vec::with_capacity(batch * config.num_return_sequences);
    for (b, mut hyps) in hypotheses.into_iter().enumerate() {
        if !done[b] {
            for r in b * k..(b + 1) * k {
                hyps.add(sequences[r].clone(), beam_scores[r], generated);
            }
        }
        out.extend(hyps.into_best(config.num_return_sequences));
    }

    let width = out.iter().map(Vec::len).max().unwrap_or(0);
    for seq in &mut out {
        seq.resize(width, stop.pad_id);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::{tiny_store, LlamaConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const PAD: u32 = 0;
    const EOS: u32 = 1;

    /// Logits depend only on the last token seen by each cache row
    struct ChainLm {
        transitions: Vec<Vec<f32>>,
    }

    impl ChainLm {
        /// `next[t]` is the preferred successor of `t`; other tokens get `0.1·i`
        fn preferring(next: &[u32]) -> Self {
            let vocab = next.len();
            let transitions = next
                .iter()
                .map(|&n| {
                    let mut row: Vec<f32> = (0..vocab).map(|i| 0.1 * i as f32).collect();
                    row[n as usize] = 5.0;
                    row
                })
                .collect();
            Self { transitions }
        }

        fn from_probs(probs: Vec<Vec<f32>>) -> Self {
            Self { transitions: probs.into_iter().map(|p| p.into_iter().map(f32::ln).collect()).collect() }
        }
    }

    impl CausalLm for ChainLm {
        type Cache = Vec<Vec<u32>>;

        fn vocab_size(&self) -> usize {
            self.transitions.len()
        }

        fn new_cache(&self) -> Self::Cache {
            Vec::new()
        }

        fn last_token_logits(
            &self,
            input_ids: &[u32],
            _attention_mask: &[u32],
            batch: usize,
            seq: usize,
            cache: &mut Self::Cache,
        ) -> Result<Vec<f32>> {
            if cache.is_empty() {
                *cache = vec![Vec::new(); batch];
            }
            let mut out = Vec::new();
            for (history, chunk) in cache.iter_mut().zip(input_ids.chunks(seq)) {
                history.extend_from_slice(chunk);
                out.extend_from_slice(&self.transitions[*history.last().unwrap() as usize]);
            }
            Ok(out)
        }

        fn reorder_cache(&self, cache: &mut Self::Cache, order: &[usize]) {
            *cache = order.iter().map(|&i| cache[i].clone()).collect();
        }
    }

    fn prompts(rows: &[&[u32]]) -> EncodedBatch {
        let seq = rows[0].len();
        EncodedBatch {
            input_ids: rows.concat(),
            attention_mask: rows.iter().flat_map(|r| r.iter().map(|&t| u32::from(t != PAD))).collect(),
            token_type_ids: vec![0; rows.len() * seq],
            batch: rows.len(),
            seq,
        }
    }

    fn stop() -> StopTokens {
        StopTokens { eos_ids: vec![EOS], pad_id: PAD }
    }

    fn run(model: &ChainLm, batch: &EncodedBatch, config: GenerationConfig) -> Vec<Vec<u32>> {
        generate(model, batch, &config, &stop(), &mut StdRng::seed_from_u64(0)).unwrap()
    }

    #[test]
    fn test_greedy_stops_at_eos_and_pads_finished_rows() {
        let model = ChainLm::preferring(&[2, 1, 3, 4, 1, 4]);
        let out = run(&model, &prompts(&[&[0, 2], &[2, 5]]), GenerationConfig::default().with_max_new_tokens(5));
        assert_eq!(out, vec![vec![0, 2, 3, 4, 1], vec![2, 5, 4, 1, 0]]);
    }

    #[test]
    fn test_min_new_tokens_delays_eos() {
        let model = ChainLm::preferring(&[2, 1, 3, 4, 1, 4]);
        let config = GenerationConfig { min_new_tokens: 2, ..GenerationConfig::default().with_max_new_tokens(4) };
        let out = run(&model, &prompts(&[&[0, 4]]), config);
        assert_eq!(out, vec![vec![0, 4, 5, 4, 1]]);
    }

    #[test]
    fn test_max_new_tokens_bounds_length() {
        let model = ChainLm::preferring(&[2, 1, 3, 2, 1, 4]);
        let out = run(&model, &prompts(&[&[2]]), GenerationConfig::default().with_max_new_tokens(3));
        assert_eq!(out, vec![vec![2, 3, 2, 3]]);
    }

    #[test]
    fn test_beam_search_finds_higher_likelihood_path() {
        let uniform = vec![1.0 / 6.0; 6];
        let model = ChainLm::from_probs(vec![
            uniform.clone(),
            uniform.clone(),
            vec![0.1 / 3.0, 0.1 / 3.0, 1e-6, 0.5, 0.4, 0.1 / 3.0],
            uniform.clone(),
            vec![0.02, 0.9, 0.02, 0.02, 0.02, 0.02],
            uniform,
        ]);
        let batch = prompts(&[&[2]]);

        let greedy = run(&model, &batch, GenerationConfig::default().with_max_new_tokens(1));
        assert_eq!(greedy, vec![vec![2, 3]]);

        let config = GenerationConfig { num_beams: 2, ..GenerationConfig::default().with_max_new_tokens(3) };
        assert_eq!(run(&model, &batch, config), vec![vec![2, 4, 1]]);
    }

    #[test]
    fn test_beam_search_returns_requested_sequences_per_prompt() {
        let model = ChainLm::preferring(&[2, 1, 3, 4, 1, 4]);
        let config = GenerationConfig {
            num_beams: 3,
            num_return_sequences: 2,
            ..GenerationConfig::default().with_max_new_tokens(4)
        };
        let out = run(&model, &prompts(&[&[0, 2], &[2, 5]]), config);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|s| s.len() == out[0].len()));
        assert_eq!(&out[0][..5], &[0, 2, 3, 4, 1]);
        assert_eq!(&out[2][..4], &[2, 5, 4, 1]);
    }

    #[test]
    fn test_sampling_with_top_k_one_is_greedy() {
        let model = ChainLm::preferring(&[2, 1, 3, 4, 1, 4]);
        let config = GenerationConfig {
            do_sample: true,
            temperature: 0.8,
            top_k: Some(1),
            num_return_sequences: 3,
            ..GenerationConfig::default().with_max_new_tokens(5)
        };
        let out = run(&model, &prompts(&[&[0, 2]]), config);
        assert_eq!(out, vec![vec![0, 2, 3, 4, 1]; 3]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let model = ChainLm::preferring(&[2, 1, 3, 4, 1, 4]);
        let config = GenerationConfig { do_sample: true, ..Default::default() };
        let err = generate(&model, &prompts(&[&[2]]), &config, &stop(), &mut StdRng::seed_from_u64(0));
        assert!(matches!(err, Err(Error::Generation(_))));
    }

    #[test]
    fn test_llama_greedy_matches_full_forward_argmax() {
        let config = LlamaConfig::tiny();
        let store = tiny_store(&config, 11);
        let model = LlamaForCausalLM::from_weights(config, &store, None).unwrap();
        let batch = prompts(&[&[0, 5, 6, 7], &[9, 10, 11, 12]]);
        let stop = StopTokens { eos_ids: vec![], pad_id: PAD };
        let config = GenerationConfig::default().with_max_new_tokens(3);
        let out = generate(&model, &batch, &config, &stop, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(&out[1][..4], &[9, 10, 11, 12]);

        // Second generated token of row 1 from a cache-free forward over its prefix
        let mut ctx = Context::default();
        ctx.eval();
        let prefix: Vec<u32> = out[1][..5].to_vec();
        let hidden = model.forward_hidden(&prefix, &[1; 5], 1, 5, None, &mut ctx).unwrap();
        let logits = model.logits_for_rows(&hidden, &[4], &mut ctx);
        assert_eq!(argmax(logits.as_slice()), out[1][5]);
    }
}
