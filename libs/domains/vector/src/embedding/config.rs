use core_config::{ConfigError, FromEnv, env_optional, env_or_default, env_parse};
use fastembed::EmbeddingModel;
use std::path::PathBuf;

pub const DEFAULT_MODEL_NAME: &str = "multilingual-e5-large";
pub const DEFAULT_VECTOR_DIMENSION: usize = 1024;

/// Local embedding model configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub model_name: String,
    pub dimension: usize,
    pub cache_dir: Option<PathBuf>,
}

impl EmbeddingConfig {
    pub fn new(model_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_name: model_name.into(),
            dimension,
            cache_dir: None,
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Resolve the configured name to a fastembed model.
    ///
    /// Accepts the short name or the Hugging Face repo id.
    pub fn model(&self) -> Result<EmbeddingModel, ConfigError> {
        let name = self.model_name.to_ascii_lowercase();
        let name = name.rsplit('/').next().unwrap_or(&name);
        match name {
            "multilingual-e5-large" => Ok(EmbeddingModel::MultilingualE5Large),
            "multilingual-e5-base" => Ok(EmbeddingModel::MultilingualE5Base),
            "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
            "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            other => Err(ConfigError::invalid(
                "MODEL_NAME",
                format!("unsupported embedding model '{}'", other),
            )),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_NAME, DEFAULT_VECTOR_DIMENSION)
    }
}

impl FromEnv for EmbeddingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            model_name: env_or_default("MODEL_NAME", DEFAULT_MODEL_NAME),
            dimension: env_parse("VECTOR_DIMENSION", DEFAULT_VECTOR_DIMENSION)?,
            cache_dir: env_optional("MODEL_CACHE_DIR").map(PathBuf::from),
        };
        if config.dimension == 0 {
            return Err(ConfigError::invalid("VECTOR_DIMENSION", "must be positive"));
        }
        config.model()?;
        Ok(config)
    }
}
