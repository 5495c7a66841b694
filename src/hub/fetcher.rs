//! HuggingFace model fetcher implementation.

use crate::error::{Error, Result};
use crate::transformer::{find_safetensors_files, shard_names, INDEX_FILE, SINGLE_FILE};
use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use std::path::{Path, PathBuf};

use super::options::FetchOptions;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";
const GENERATION_CONFIG_FILE: &str = "generation_config.json";

/// Local paths of a resolved model
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: Vec<PathBuf>,
    pub tokenizer_config: Option<PathBuf>,
    pub generation_config: Option<PathBuf>,
}

impl ModelArtifact {
    /// Collect the files of a model already on disk
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let required = |name: &str| {
            let path = dir.join(name);
            if path.exists() {
                Ok(path)
            } else {
                Err(Error::ConfigError(format!("{} has no {name}", dir.display())))
            }
        };
        let optional = |name: &str| Some(dir.join(name)).filter(|p| p.exists());

        Ok(Self {
            config: required(CONFIG_FILE)?,
            tokenizer: required(TOKENIZER_FILE)?,
            weights: find_safetensors_files(dir)?,
            tokenizer_config: optional(TOKENIZER_CONFIG_FILE),
            generation_config: optional(GENERATION_CONFIG_FILE),
        })
    }
}

/// HuggingFace model fetcher
pub struct HfModelFetcher {
    token: Option<String>,
    cache_dir: PathBuf,
}

impl HfModelFetcher {
    /// Fetcher using the token from `HF_TOKEN` or `~/.huggingface/token`
    pub fn new() -> Self {
        Self { token: Self::resolve_token(), cache_dir: Self::default_cache_dir() }
    }

    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: Some(token.into()), cache_dir: Self::default_cache_dir() }
    }

    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Resolve token from the environment
    ///
    /// Priority:
    /// 1. HF_TOKEN environment variable
    /// 2. ~/.huggingface/token file
    #[must_use]
    pub fn resolve_token() -> Option<String> {
        Self::token_from(std::env::var("HF_TOKEN").ok(), dirs::home_dir().as_deref())
    }

    /// Token from an `HF_TOKEN` value, else from `home/.huggingface/token`
    pub(crate) fn token_from(env_token: Option<String>, home: Option<&Path>) -> Option<String> {
        if let Some(token) = env_token.filter(|t| !t.is_empty()) {
            return Some(token);
        }
        let token_path = home?.join(".huggingface").join("token");
        let token = std::fs::read_to_string(token_path).ok()?.trim().to_string();
        (!token.is_empty()).then_some(token)
    }

    /// A per-request token overrides the fetcher's own
    fn effective_token(&self, explicit: Option<String>) -> Option<String> {
        explicit.or_else(|| self.token.clone())
    }

    pub(crate) fn default_cache_dir() -> PathBuf {
        dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache")).join("huggingface").join("hub")
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Validate an `org/name` repository id
    pub(crate) fn parse_repo_id(repo_id: &str) -> Result<(&str, &str)> {
        match repo_id.split_once('/') {
            Some((org, name)) if !org.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok((org, name))
            }
            _ => Err(Error::ConfigError(format!(
                "invalid repository id (expected 'org/name'): {repo_id}"
            ))),
        }
    }

    fn build_api(&self, cache_dir: &Path, token: Option<String>) -> Result<Api> {
        ApiBuilder::new()
            .with_cache_dir(cache_dir.to_path_buf())
            .with_token(self.effective_token(token))
            .with_progress(false)
            .build()
            .map_err(|e| Error::Hub(format!("failed to initialize HF API: {e}")))
    }

    fn get(repo: &ApiRepo, repo_id: &str, file: &str) -> Result<PathBuf> {
        repo.get(file).map_err(|e| Error::Hub(format!("{repo_id}/{file}: {e}")))
    }

    /// Download config, tokenizer and weights of a model repository
    ///
    /// Files already in the cache are not downloaded again.
    pub fn download_model(&self, repo_id: &str, options: FetchOptions) -> Result<ModelArtifact> {
        Self::parse_repo_id(repo_id)?;
        let cache_dir = options.cache_dir.clone().unwrap_or_else(|| self.cache_dir.clone());
        let api = self.build_api(&cache_dir, options.token.clone())?;
        let repo = api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            options.revision.clone(),
        ));

        let config = Self::get(&repo, repo_id, CONFIG_FILE)?;
        let tokenizer = Self::get(&repo, repo_id, TOKENIZER_FILE)?;
        let weights = match repo.get(SINGLE_FILE) {
            Ok(path) => vec![path],
            Err(_) => {
                let index_path = Self::get(&repo, repo_id, INDEX_FILE)?;
                let text = std::fs::read_to_string(&index_path)
                    .map_err(|e| Error::io(&index_path, e))?;
                shard_names(&text)?
                    .iter()
                    .map(|shard| Self::get(&repo, repo_id, shard))
                    .collect::<Result<Vec<_>>>()?
            }
        };

        Ok(ModelArtifact {
            config,
            tokenizer,
            weights,
            tokenizer_config: repo.get(TOKENIZER_CONFIG_FILE).ok(),
            generation_config: repo.get(GENERATION_CONFIG_FILE).ok(),
        })
    }
}

impl Default for HfModelFetcher {
    fn default() -> Self {
        Self::new()
    }
}
