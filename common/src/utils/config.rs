use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "GRAPHRAG_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "settings.yaml";

/// Prefix for generic `GRAPHRAG__SECTION__KEY` overrides.
const ENV_PREFIX: &str = "GRAPHRAG";

/// Environment variables that override a single configuration key.
const RECOGNIZED_OVERRIDES: [(&str, &str); 4] = [
    ("LLM_API_KEY", "llm.api_key"),
    ("LLM_MODEL", "llm.model"),
    ("EMBEDDING_MODEL", "embeddings.model"),
    ("EMBEDDING_API_KEY", "embeddings.api_key"),
];

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub api_base: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_llm_model(),
            api_base: default_base_url(),
            max_tokens: None,
            temperature: default_temperature(),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub api_base: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_embedding_model(),
            api_base: default_base_url(),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

/// Limits applied while assembling search contexts.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct SearchSettings {
    pub local_max_relationships: usize,
    pub local_max_reports: usize,
    pub local_max_text_units: usize,
    pub local_max_claims: usize,
    pub global_max_reports: usize,
    /// Minimum relevance a community report needs during dynamic selection.
    pub dynamic_threshold: f32,
    pub drift_primer_reports: usize,
    pub basic_k: usize,
    pub max_context_tokens: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            local_max_relationships: 20,
            local_max_reports: 5,
            local_max_text_units: 10,
            local_max_claims: 10,
            global_max_reports: 20,
            dynamic_threshold: 0.1,
            drift_primer_reports: 5,
            basic_k: 10,
            max_context_tokens: 12_000,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct IndexingConfig {
    /// Program and arguments; `{root}` is replaced by the dataset root.
    #[serde(default = "default_index_command")]
    pub command: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            command: default_index_command(),
            timeout_secs: None,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct AppConfig {
    pub dataset_root: PathBuf,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub chunks: ChunkingConfig,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub dataset_cache: bool,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Fields that may be replaced when deriving a configuration.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub dataset_root: Option<PathBuf>,
    pub llm_model: Option<String>,
    pub embedding_model: Option<String>,
}

impl AppConfig {
    /// Returns a copy with only the named fields replaced. `self` is untouched.
    #[must_use]
    pub fn derive(&self, overrides: ConfigOverrides) -> Self {
        let mut derived = self.clone();
        if let Some(root) = overrides.dataset_root {
            derived.dataset_root = root;
        }
        if let Some(model) = overrides.llm_model {
            derived.llm.model = model;
        }
        if let Some(model) = overrides.embedding_model {
            derived.embeddings.model = model;
        }
        derived
    }

    #[must_use]
    pub fn with_dataset_root(&self, root: impl Into<PathBuf>) -> Self {
        self.derive(ConfigOverrides {
            dataset_root: Some(root.into()),
            ..ConfigOverrides::default()
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dataset_root.as_os_str().is_empty() {
            return Err(invalid("dataset_root must not be empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(invalid("llm.model must not be empty"));
        }
        if self.embeddings.model.trim().is_empty() {
            return Err(invalid("embeddings.model must not be empty"));
        }
        if self.chunks.size == 0 {
            return Err(invalid("chunks.size must be greater than zero"));
        }
        if self.chunks.overlap >= self.chunks.size {
            return Err(invalid("chunks.overlap must be smaller than chunks.size"));
        }
        if self.indexing.command.is_empty() {
            return Err(invalid("indexing.command must name a program"));
        }
        let search = &self.search;
        if search.global_max_reports == 0 || search.basic_k == 0 || search.max_context_tokens == 0
        {
            return Err(invalid("search limits must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Message(format!("invalid configuration: {message}"))
}

/// Snapshot of the process environment used while assembling configuration.
#[derive(Clone, Debug, Default)]
pub struct EnvOverrides {
    vars: HashMap<String, String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    }

    fn snapshot(&self) -> config::Map<String, String> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn default_llm_model() -> String {
    "deepseek-chat".to_string()
}

fn default_embedding_model() -> String {
    "zhipu-embedding".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

const fn default_temperature() -> f32 {
    0.0
}

const fn default_chunk_size() -> usize {
    1200
}

const fn default_chunk_overlap() -> usize {
    100
}

fn default_index_command() -> Vec<String> {
    ["graphrag", "index", "--root", "{root}"]
        .into_iter()
        .map(String::from)
        .collect()
}

const fn default_http_port() -> u16 {
    8000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Reads the configuration file at `path` and layers environment overrides on top.
pub fn load_config(path: &Path, env: &EnvOverrides) -> Result<AppConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::Message(format!(
            "configuration file {} not found",
            path.display()
        )));
    }

    let mut builder = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(Some(env.snapshot())),
        );

    for (var, key) in RECOGNIZED_OVERRIDES {
        builder = builder.set_override_option(key, env.get(var))?;
    }

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;

    Ok(config)
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config(Path::new(&path), &EnvOverrides::from_env())
}

/// A configuration with every default applied, pointing at `dataset_root`.
#[cfg(any(test, feature = "test-utils"))]
pub fn test_config(dataset_root: &Path) -> AppConfig {
    AppConfig {
        dataset_root: dataset_root.to_path_buf(),
        llm: LlmConfig::default(),
        embeddings: EmbeddingConfig::default(),
        chunks: ChunkingConfig::default(),
        search: SearchSettings::default(),
        indexing: IndexingConfig::default(),
        dataset_cache: false,
        http_port: default_http_port(),
        bind_address: "127.0.0.1".to_string(),
        api_key: None,
        max_body_bytes: default_max_body_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_settings(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("settings.yaml");
        fs::write(&path, contents).expect("failed to write settings");
        path
    }

    const BASIC_SETTINGS: &str = "dataset_root: ./output\nllm:\n  model: file-model\n  api_key: file-key\n";

    #[test]
    fn loads_file_values_and_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, BASIC_SETTINGS);

        let config = load_config(&path, &EnvOverrides::default()).expect("config should load");

        assert_eq!(config.dataset_root, PathBuf::from("./output"));
        assert_eq!(config.llm.model, "file-model");
        assert_eq!(config.llm.api_key, "file-key");
        assert_eq!(config.embeddings.model, "zhipu-embedding");
        assert_eq!(config.chunks, ChunkingConfig::default());
        assert_eq!(config.http_port, 8000);
        assert!(!config.dataset_cache);
        assert_eq!(config.indexing.command[0], "graphrag");
    }

    #[test]
    fn recognized_environment_values_take_precedence() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, BASIC_SETTINGS);
        let env = EnvOverrides::from_pairs([
            ("LLM_MODEL", "env-model"),
            ("LLM_API_KEY", "env-key"),
            ("EMBEDDING_MODEL", "env-embedding"),
            ("EMBEDDING_API_KEY", ""),
        ]);

        let config = load_config(&path, &env).expect("config should load");

        assert_eq!(config.llm.model, "env-model");
        assert_eq!(config.llm.api_key, "env-key");
        assert_eq!(config.embeddings.model, "env-embedding");
        // empty values count as unset
        assert_eq!(config.embeddings.api_key, "");
    }

    #[test]
    fn prefixed_environment_overrides_nested_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, BASIC_SETTINGS);
        let env = EnvOverrides::from_pairs([("GRAPHRAG__SEARCH__BASIC_K", "3")]);

        let config = load_config(&path, &env).expect("config should load");

        assert_eq!(config.search.basic_k, 3);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_config(&dir.path().join("absent.yaml"), &EnvOverrides::default())
            .expect_err("missing file must fail");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn missing_dataset_root_fails_validation() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, "llm:\n  model: m\n");
        assert!(load_config(&path, &EnvOverrides::default()).is_err());
    }

    #[test]
    fn wrong_types_fail() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, "dataset_root: ./out\nhttp_port: not-a-port\n");
        assert!(load_config(&path, &EnvOverrides::default()).is_err());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(
            &dir,
            "dataset_root: ./out\nchunks:\n  size: 100\n  overlap: 100\n",
        );
        let err = load_config(&path, &EnvOverrides::default()).expect_err("invalid chunking");
        assert!(err.to_string().contains("chunks.overlap"));
    }

    #[test]
    fn derive_replaces_only_named_fields() {
        let dir = TempDir::new().unwrap();
        let path = write_settings(&dir, BASIC_SETTINGS);
        let base = load_config(&path, &EnvOverrides::default()).unwrap();
        let snapshot = base.clone();

        let derived = base.with_dataset_root("/data/other");

        assert_eq!(derived.dataset_root, PathBuf::from("/data/other"));
        assert_eq!(base, snapshot);
        assert_eq!(derived.llm, base.llm);
        assert_eq!(derived.search, base.search);

        let remodeled = base.derive(ConfigOverrides {
            llm_model: Some("other-model".into()),
            ..ConfigOverrides::default()
        });
        assert_eq!(remodeled.llm.model, "other-model");
        assert_eq!(remodeled.dataset_root, base.dataset_root);
    }
}
