//! Fetch options for HuggingFace model downloads.

use std::path::PathBuf;

/// Options for model fetching
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Git revision (branch, tag, or commit)
    pub revision: String,
    /// Cache directory; the platform cache when unset
    pub cache_dir: Option<PathBuf>,
    /// Access token; overrides `HF_TOKEN` and the token file
    pub token: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self { revision: "main".into(), cache_dir: None, token: None }
    }
}

impl FetchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn revision(mut self, rev: impl Into<String>) -> Self {
        self.revision = rev.into();
        self
    }

    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}
