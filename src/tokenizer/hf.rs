//! HuggingFace tokenizer integration via the `tokenizers` crate.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tokenizers::{EncodeInput, Tokenizer, TruncationParams, TruncationStrategy};

const TOKENIZER_FILE: &str = "tokenizer.json";
const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";

/// Fallback names tried when `tokenizer_config.json` does not name a token
const EOS_CANDIDATES: [&str; 4] = ["</s>", "<|end_of_text|>", "<|endoftext|>", "<|eot_id|>"];
const BOS_CANDIDATES: [&str; 3] = ["<s>", "<|begin_of_text|>", "<|startoftext|>"];
const PAD_CANDIDATES: [&str; 2] = ["<pad>", "<|pad|>"];

/// A special token entry: a bare string or an `AddedToken` object
#[derive(Deserialize)]
#[serde(untagged)]
enum SpecialToken {
    Plain(String),
    Added { content: String },
}

impl SpecialToken {
    fn content(&self) -> &str {
        match self {
            SpecialToken::Plain(s) => s,
            SpecialToken::Added { content } => content,
        }
    }
}

#[derive(Deserialize)]
struct TokenizerConfigFile {
    #[serde(default)]
    bos_token: Option<SpecialToken>,
    #[serde(default)]
    eos_token: Option<SpecialToken>,
    #[serde(default)]
    pad_token: Option<SpecialToken>,
}

/// Left-padded batch of encodings, row-major `batch × seq`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
    pub batch: usize,
    pub seq: usize,
}

/// HuggingFace-compatible tokenizer wrapper
///
/// Padding is always on the left and a missing pad token falls back to EOS.
#[derive(Clone)]
pub struct HfTokenizer {
    inner: Tokenizer,
    pad_id: u32,
    eos_id: Option<u32>,
    bos_id: Option<u32>,
}

impl HfTokenizer {
    /// Load `tokenizer.json` and, when present, `tokenizer_config.json` from a directory
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let config = dir.join(TOKENIZER_CONFIG_FILE);
        Self::from_file(dir.join(TOKENIZER_FILE), config.exists().then_some(config.as_path()))
    }

    /// Load a tokenizer file with an optional `tokenizer_config.json`
    pub fn from_file(path: impl AsRef<Path>, tokenizer_config: Option<&Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = Tokenizer::from_file(path)
            .map_err(|e| Error::Tokenizer(format!("failed to load {}: {e}", path.display())))?;
        let config: Option<TokenizerConfigFile> = match tokenizer_config {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| Error::io(p, e))?;
                Some(serde_json::from_str(&text)?)
            }
            None => None,
        };
        Self::from_parts(inner, config.as_ref())
    }

    /// Without a `tokenizer_config.json` special tokens are guessed from the vocab.
    /// With one, an absent or null `pad_token` means the pad id is the EOS id.
    fn from_parts(inner: Tokenizer, config: Option<&TokenizerConfigFile>) -> Result<Self> {
        let resolve = |named: Option<&SpecialToken>, candidates: &[&str]| -> Option<u32> {
            match named {
                Some(token) => inner.token_to_id(token.content()),
                None => candidates.iter().find_map(|c| inner.token_to_id(c)),
            }
        };

        let eos_id = resolve(config.and_then(|c| c.eos_token.as_ref()), &EOS_CANDIDATES);
        let bos_id = resolve(config.and_then(|c| c.bos_token.as_ref()), &BOS_CANDIDATES);
        let pad_id = match config {
            Some(c) => c.pad_token.as_ref().and_then(|t| inner.token_to_id(t.content())),
            None => resolve(None, &PAD_CANDIDATES),
        }
        .or(eos_id)
        .ok_or_else(|| Error::Tokenizer("tokenizer has neither a pad nor an EOS token".into()))?;

        Ok(Self { inner, pad_id, eos_id, bos_id })
    }

    /// Vocabulary size including added tokens
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    #[must_use]
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }

    #[must_use]
    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    #[must_use]
    pub fn eos_id(&self) -> Option<u32> {
        self.eos_id
    }

    #[must_use]
    pub fn bos_id(&self) -> Option<u32> {
        self.bos_id
    }

    /// Encode `(prompt, answer)` pairs: prompt tokens get type id 0, answer tokens 1
    pub fn encode_pairs(&self, pairs: &[(&str, &str)], max_length: usize) -> Result<EncodedBatch> {
        let inputs = pairs.iter().map(|&(a, b)| EncodeInput::from((a, b))).collect();
        self.encode_padded(inputs, max_length)
    }

    /// Encode prompts alone
    pub fn encode_prompts(&self, prompts: &[&str], max_length: usize) -> Result<EncodedBatch> {
        let inputs = prompts.iter().map(|&p| EncodeInput::from(p)).collect();
        self.encode_padded(inputs, max_length)
    }

    /// Truncate longest-first to `max_length` (special tokens included) and
    /// left-pad every row to exactly `max_length`
    fn encode_padded(&self, inputs: Vec<EncodeInput<'_>>, max_length: usize) -> Result<EncodedBatch> {
        if max_length == 0 {
            return Err(Error::ConfigError("max_input_length must be positive".into()));
        }
        let mut tokenizer = self.inner.clone();
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                strategy: TruncationStrategy::LongestFirst,
                ..Default::default()
            }))
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        tokenizer.with_padding(None);

        let batch = inputs.len();
        let mut out = EncodedBatch {
            input_ids: Vec::with_capacity(batch * max_length),
            attention_mask: Vec::with_capacity(batch * max_length),
            token_type_ids: Vec::with_capacity(batch * max_length),
            batch,
            seq: max_length,
        };
        for input in inputs {
            let encoding =
                tokenizer.encode(input, true).map_err(|e| Error::Tokenizer(e.to_string()))?;
            let ids = encoding.get_ids();
            let pad = max_length.saturating_sub(ids.len());
            let keep = ids.len().min(max_length);

            out.input_ids.extend(std::iter::repeat_n(self.pad_id, pad));
            out.input_ids.extend_from_slice(&ids[..keep]);
            out.attention_mask.extend(std::iter::repeat_n(0, pad));
            out.attention_mask.extend_from_slice(&encoding.get_attention_mask()[..keep]);
            out.token_type_ids.extend(std::iter::repeat_n(0, pad));
            out.token_type_ids.extend_from_slice(&encoding.get_type_ids()[..keep]);
        }
        Ok(out)
    }

    /// Decode token ids to text
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.inner.decode(ids, skip_special_tokens).map_err(|e| Error::Tokenizer(e.to_string()))
    }

    /// Decode each sequence, skipping special tokens
    pub fn batch_decode(&self, sequences: &[Vec<u32>]) -> Result<Vec<String>> {
        sequences.iter().map(|ids| self.decode(ids, true)).collect()
    }
}

/// Word-level `tokenizer.json` with a `<s> A B` pair template, for tests
#[cfg(test)]
pub(crate) fn word_level_json(words: &[&str]) -> String {
    let mut vocab = serde_json::Map::new();
    for (i, w) in ["<pad>", "<s>", "</s>", "<unk>"].iter().chain(words).enumerate() {
        vocab.insert((*w).to_string(), serde_json::json!(i));
    }
    let added = |id: u32, content: &str| {
        serde_json::json!({"id": id, "content": content, "single_word": false, "lstrip": false,
                           "rstrip": false, "normalized": false, "special": true})
    };
    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [added(0, "<pad>"), added(1, "<s>"), added(2, "</s>")],
        "normalizer": null,
        "pre_tokenizer": {"type": "WhitespaceSplit"},
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [{"SpecialToken": {"id": "<s>", "type_id": 0}},
                       {"Sequence": {"id": "A", "type_id": 0}}],
            "pair": [{"SpecialToken": {"id": "<s>", "type_id": 0}},
                     {"Sequence": {"id": "A", "type_id": 0}},
                     {"Sequence": {"id": "B", "type_id": 1}}],
            "special_tokens": {"<s>": {"id": "<s>", "ids": [1], "tokens": ["<s>"]}}
        },
        "decoder": null,
        "model": {"type": "WordLevel", "vocab": vocab, "unk_token": "<unk>"}
    })
    .to_string()
}
