use std::env;
use std::path::PathBuf;
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

const DEFAULT_SOURCE_SUFFIX: &str = ".pdf";
const DEFAULT_CHUNK_SIZE: usize = 500;
const DEFAULT_CHUNK_OVERLAP: usize = 100;
const DEFAULT_INGEST_CONCURRENCY: usize = 4;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 64;
const DEFAULT_UPLOAD_BATCH_SIZE: usize = 100;
const DEFAULT_DELETE_BATCH_SIZE: usize = 32;
const DEFAULT_READY_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration for the indexer process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Name of the collection kept in sync with the source directory.
    pub index_name: String,
    /// Directory acting as the blob container holding source documents.
    pub source_dir: PathBuf,
    /// Case-insensitive suffix a source object must carry to be indexed.
    pub source_suffix: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Optional Ollama base URL.
    pub ollama_url: Option<String>,
    /// Token budget per segment.
    pub chunk_size: usize,
    /// Token overlap between adjacent segments.
    pub chunk_overlap: usize,
    /// Optional tiktoken encoding used to count units; whitespace words otherwise.
    pub chunk_tokenizer: Option<String>,
    /// Number of files ingested concurrently.
    pub ingest_concurrency: usize,
    /// Maximum segments sent per embedding request.
    pub embedding_batch_size: usize,
    /// Maximum records written per upload request.
    pub upload_batch_size: usize,
    /// Maximum filenames resolved per delete request.
    pub delete_batch_size: usize,
    /// Upper bound on the wait for a freshly created index to become queryable.
    pub index_ready_timeout_secs: u64,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline hashing encoder.
    Hash,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

/// Engine-facing subset of [`Config`] passed explicitly into the reconciler.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Target collection name.
    pub index_name: String,
    /// Vector dimension asserted by the schema and checked on every embedding.
    pub embedding_dimension: usize,
    /// Suffix filter for source objects.
    pub source_suffix: String,
    /// Token budget per segment.
    pub chunk_size: usize,
    /// Token overlap between segments.
    pub chunk_overlap: usize,
    /// Optional `tiktoken` encoding or model name used to count tokens.
    pub chunk_tokenizer: Option<String>,
    /// Concurrent per-file ingests.
    pub ingest_concurrency: usize,
    /// Segments per embedding call.
    pub embedding_batch_size: usize,
    /// Records per upload call.
    pub upload_batch_size: usize,
    /// Filenames per delete call.
    pub delete_batch_size: usize,
    /// Readiness wait bound after index creation.
    pub index_ready_timeout: Duration,
}

impl SyncSettings {
    /// Settings with the stock chunking and batching values for the given index.
    pub fn new(index_name: impl Into<String>, embedding_dimension: usize) -> Self {
        Self {
            index_name: index_name.into(),
            embedding_dimension,
            source_suffix: DEFAULT_SOURCE_SUFFIX.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            chunk_tokenizer: None,
            ingest_concurrency: DEFAULT_INGEST_CONCURRENCY,
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            upload_batch_size: DEFAULT_UPLOAD_BATCH_SIZE,
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
            index_ready_timeout: Duration::from_secs(DEFAULT_READY_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
        };
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let embedding_dimension: usize = parse_value(
            "EMBEDDING_DIMENSION",
            Some(required("EMBEDDING_DIMENSION")?),
        )?
        .unwrap_or_default();
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }

        let chunk_size = parse_value("CHUNK_SIZE", optional("CHUNK_SIZE"))?
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }

        Ok(Self {
            qdrant_url: required("QDRANT_URL")?,
            qdrant_api_key: optional("QDRANT_API_KEY"),
            index_name: required("INDEX_NAME")?,
            source_dir: PathBuf::from(required("SOURCE_DIR")?),
            source_suffix: optional("SOURCE_SUFFIX")
                .unwrap_or_else(|| DEFAULT_SOURCE_SUFFIX.to_string()),
            embedding_provider: required("EMBEDDING_PROVIDER")?
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?,
            embedding_model: required("EMBEDDING_MODEL")?,
            embedding_dimension,
            ollama_url: optional("OLLAMA_URL"),
            chunk_size,
            chunk_overlap: parse_value("CHUNK_OVERLAP", optional("CHUNK_OVERLAP"))?
                .unwrap_or(DEFAULT_CHUNK_OVERLAP),
            chunk_tokenizer: optional("CHUNK_TOKENIZER"),
            ingest_concurrency: positive("INGEST_CONCURRENCY", optional("INGEST_CONCURRENCY"))?
                .unwrap_or(DEFAULT_INGEST_CONCURRENCY),
            embedding_batch_size: positive(
                "EMBEDDING_BATCH_SIZE",
                optional("EMBEDDING_BATCH_SIZE"),
            )?
            .unwrap_or(DEFAULT_EMBEDDING_BATCH_SIZE),
            upload_batch_size: positive("UPLOAD_BATCH_SIZE", optional("UPLOAD_BATCH_SIZE"))?
                .unwrap_or(DEFAULT_UPLOAD_BATCH_SIZE),
            delete_batch_size: positive("DELETE_BATCH_SIZE", optional("DELETE_BATCH_SIZE"))?
                .unwrap_or(DEFAULT_DELETE_BATCH_SIZE),
            index_ready_timeout_secs: parse_value(
                "INDEX_READY_TIMEOUT_SECS",
                optional("INDEX_READY_TIMEOUT_SECS"),
            )?
            .unwrap_or(DEFAULT_READY_TIMEOUT_SECS),
        })
    }

    /// Load `.env` (when present) and then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            qdrant_url = %config.qdrant_url,
            index = %config.index_name,
            source_dir = %config.source_dir.display(),
            embedding_provider = ?config.embedding_provider,
            dimension = config.embedding_dimension,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Project the engine settings out of the process configuration.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            index_name: self.index_name.clone(),
            embedding_dimension: self.embedding_dimension,
            source_suffix: self.source_suffix.clone(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            chunk_tokenizer: self.chunk_tokenizer.clone(),
            ingest_concurrency: self.ingest_concurrency,
            embedding_batch_size: self.embedding_batch_size,
            upload_batch_size: self.upload_batch_size,
            delete_batch_size: self.delete_batch_size,
            index_ready_timeout: Duration::from_secs(self.index_ready_timeout_secs),
        }
    }
}

fn parse_value<T: std::str::FromStr>(
    key: &str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn positive(key: &str, value: Option<String>) -> Result<Option<usize>, ConfigError> {
    match parse_value::<usize>(key, value)? {
        Some(0) => Err(ConfigError::InvalidValue(key.to_string())),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("QDRANT_URL", "http://127.0.0.1:6333"),
            ("INDEX_NAME", "documents"),
            ("SOURCE_DIR", "/data/container"),
            ("EMBEDDING_PROVIDER", "ollama"),
            ("EMBEDDING_MODEL", "nomic-embed-text"),
            ("EMBEDDING_DIMENSION", "768"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| env.get(key).map(|value| value.to_string()))
    }

    #[test]
    fn applies_defaults_for_optional_values() {
        let config = load(&base_env()).expect("config");
        assert_eq!(config.source_suffix, ".pdf");
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.ingest_concurrency, 4);
        assert_eq!(config.embedding_provider, EmbeddingProvider::Ollama);
        assert!(config.qdrant_api_key.is_none());

        let settings = config.sync_settings();
        assert_eq!(settings.index_name, "documents");
        assert_eq!(settings.embedding_dimension, 768);
        assert_eq!(settings.index_ready_timeout, Duration::from_secs(30));
    }

    #[test]
    fn reports_missing_required_variable() {
        let mut env = base_env();
        env.remove("INDEX_NAME");
        let error = load(&env).unwrap_err();
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "INDEX_NAME"));
    }

    #[test]
    fn rejects_zero_dimension_and_bad_numbers() {
        let mut env = base_env();
        env.insert("EMBEDDING_DIMENSION", "0");
        assert!(matches!(
            load(&env).unwrap_err(),
            ConfigError::InvalidValue(key) if key == "EMBEDDING_DIMENSION"
        ));

        let mut env = base_env();
        env.insert("INGEST_CONCURRENCY", "many");
        assert!(matches!(
            load(&env).unwrap_err(),
            ConfigError::InvalidValue(key) if key == "INGEST_CONCURRENCY"
        ));
    }

    #[test]
    fn parses_provider_case_insensitively() {
        let mut env = base_env();
        env.insert("EMBEDDING_PROVIDER", "HASH");
        env.insert("SOURCE_SUFFIX", ".txt");
        let config = load(&env).expect("config");
        assert_eq!(config.embedding_provider, EmbeddingProvider::Hash);
        assert_eq!(config.source_suffix, ".txt");
    }
}
