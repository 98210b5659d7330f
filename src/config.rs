use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty Index pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root directory holding per-document artifacts.
    pub data_root: PathBuf,
    /// Location of the registry snapshot file.
    pub registry_path: PathBuf,
    /// Base URL of the Ollama runtime used for generation and embeddings.
    pub ollama_url: String,
    /// Text model used for structure, summary, refactor, and abstract calls.
    ///
    /// Only `index` talks to the model, so this is checked by [`Config::models`] instead of at load.
    pub generation_model: Option<String>,
    /// Model used for page content extraction; falls back to the generation model.
    pub vision_model: Option<String>,
    /// Embedding provider used to vectorize index records.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Width of the page extraction fan-out.
    pub page_concurrency: usize,
    /// Width of the chapter processing fan-out.
    pub chapter_concurrency: usize,
    /// Number of document pipelines run at once by `index`.
    pub batch_concurrency: usize,
    /// Number of leading pages inspected for a table of contents.
    pub toc_page_limit: usize,
    /// Pages per batch in fallback chapter detection.
    pub structure_batch_size: usize,
    /// Rasterization resolution in dots per inch.
    pub raster_dpi: u32,
    /// Optional deadline applied to each external call.
    pub call_timeout: Option<Duration>,
    /// Log file override; the default lives under `data_root`.
    pub log_file: Option<PathBuf>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic in-process hashing embedder.
    Hash,
    /// Local Ollama runtime.
    Ollama,
}

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_root = PathBuf::from(load_env_optional("DATA_ROOT").unwrap_or_else(|| "data".into()));
        let registry_path = load_env_optional("REGISTRY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_root.join("registry.json"));
        Ok(Self {
            data_root,
            registry_path,
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            generation_model: load_env_optional("GENERATION_MODEL"),
            vision_model: load_env_optional("VISION_MODEL"),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::Hash),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "nomic-embed-text".into()),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?.unwrap_or(768),
            page_concurrency: parse_optional("PAGE_CONCURRENCY")?.unwrap_or(5),
            chapter_concurrency: parse_optional("CHAPTER_CONCURRENCY")?.unwrap_or(10),
            batch_concurrency: parse_optional("BATCH_CONCURRENCY")?.unwrap_or(2),
            toc_page_limit: parse_optional("TOC_PAGE_LIMIT")?.unwrap_or(10),
            structure_batch_size: parse_optional("STRUCTURE_BATCH_SIZE")?.unwrap_or(10),
            raster_dpi: parse_optional("RASTER_DPI")?.unwrap_or(150),
            call_timeout: parse_optional::<u64>("CALL_TIMEOUT_SECS")?.map(Duration::from_secs),
            log_file: load_env_optional("RUSTY_INDEX_LOG_FILE").map(PathBuf::from),
        })
    }

    /// Generation and vision model names, failing when no generation model is configured.
    pub fn models(&self) -> Result<(&str, &str), ConfigError> {
        let generation = self
            .generation_model
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVariable("GENERATION_MODEL".into()))?;
        Ok((generation, self.vision_model.as_deref().unwrap_or(generation)))
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<(), ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    // A second call keeps the first configuration.
    let _ = CONFIG.set(config);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config() -> Config {
        Config {
            data_root: PathBuf::from("data"),
            registry_path: PathBuf::from("data/registry.json"),
            ollama_url: DEFAULT_OLLAMA_URL.into(),
            generation_model: None,
            vision_model: None,
            embedding_provider: EmbeddingProvider::Hash,
            embedding_model: "nomic-embed-text".into(),
            embedding_dimension: 768,
            page_concurrency: 5,
            chapter_concurrency: 10,
            batch_concurrency: 2,
            toc_page_limit: 10,
            structure_batch_size: 10,
            raster_dpi: 150,
            call_timeout: None,
            log_file: None,
        }
    }

    #[test]
    fn models_are_required_only_when_requested() {
        let mut config = bare_config();
        assert!(matches!(
            config.models(),
            Err(ConfigError::MissingVariable(key)) if key == "GENERATION_MODEL"
        ));

        config.generation_model = Some("qwen2.5".into());
        assert_eq!(config.models().expect("models"), ("qwen2.5", "qwen2.5"));

        config.vision_model = Some("llava".into());
        assert_eq!(config.models().expect("models"), ("qwen2.5", "llava"));
    }

    #[test]
    fn embedding_provider_parses_case_insensitively() {
        assert_eq!("HASH".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Hash));
        assert_eq!("ollama".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Ollama));
        assert!("openai".parse::<EmbeddingProvider>().is_err());
    }
}
