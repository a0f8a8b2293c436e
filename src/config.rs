use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Directory holding `{id}.json` conversation documents and `index.json`.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_min_assistant_chars")]
    pub min_assistant_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_assistant_chars: default_min_assistant_chars(),
        }
    }
}

fn default_min_assistant_chars() -> usize {
    crate::chunk::DEFAULT_MIN_ASSISTANT_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
    #[serde(default = "default_related_limit")]
    pub related_limit: usize,
    /// How many conversations `related` scans, newest first.
    #[serde(default = "default_scan_limit")]
    pub related_scan_limit: usize,
    #[serde(default = "default_threshold")]
    pub similar_threshold: f32,
    #[serde(default = "default_similar_limit")]
    pub similar_limit: usize,
    /// Upper bound on source chunks examined by `similar`.
    #[serde(default = "default_source_chunk_limit")]
    pub source_chunk_limit: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_decisions_limit")]
    pub decisions_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
            recall_limit: default_recall_limit(),
            related_limit: default_related_limit(),
            related_scan_limit: default_scan_limit(),
            similar_threshold: default_threshold(),
            similar_limit: default_similar_limit(),
            source_chunk_limit: default_source_chunk_limit(),
            snippet_chars: default_snippet_chars(),
            decisions_limit: default_decisions_limit(),
        }
    }
}

fn default_search_limit() -> usize {
    5
}
fn default_recall_limit() -> usize {
    3
}
fn default_related_limit() -> usize {
    5
}
fn default_scan_limit() -> usize {
    500
}
fn default_threshold() -> f32 {
    0.8
}
fn default_similar_limit() -> usize {
    10
}
fn default_source_chunk_limit() -> usize {
    100
}
fn default_snippet_chars() -> usize {
    100
}
fn default_decisions_limit() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_links_per_conversation")]
    pub links_per_conversation: usize,
    /// How many conversations `graph build` visits, newest first.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            links_per_conversation: default_links_per_conversation(),
            scan_limit: default_scan_limit(),
        }
    }
}

fn default_links_per_conversation() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Prefix for search queries. Defaults to the BGE instruction for BGE v1.5 models.
    #[serde(default)]
    pub query_instruction: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            query_instruction: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.store.path = expand_home(&config.store.path);
    config.db.path = expand_home(&config.db.path);

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let retrieval = &config.retrieval;
    let limits = [
        ("retrieval.search_limit", retrieval.search_limit),
        ("retrieval.recall_limit", retrieval.recall_limit),
        ("retrieval.related_limit", retrieval.related_limit),
        ("retrieval.related_scan_limit", retrieval.related_scan_limit),
        ("retrieval.similar_limit", retrieval.similar_limit),
        ("retrieval.source_chunk_limit", retrieval.source_chunk_limit),
        ("retrieval.snippet_chars", retrieval.snippet_chars),
        ("retrieval.decisions_limit", retrieval.decisions_limit),
        ("graph.links_per_conversation", config.graph.links_per_conversation),
        ("graph.scan_limit", config.graph.scan_limit),
        ("embedding.batch_size", config.embedding.batch_size),
    ];
    for (name, value) in limits {
        if value < 1 {
            bail!("{} must be >= 1", name);
        }
    }

    for (name, value) in [
        ("retrieval.similar_threshold", retrieval.similar_threshold),
        ("graph.threshold", config.graph.threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            bail!("{} must be in [0.0, 1.0]", name);
        }
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "hash" | "local" => {}
        "openai" | "ollama" => {
            if embedding.dims.is_none() || embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }
    if embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    Ok(())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[store]
path = "./data/conversations"

[db]
path = "./data/index.sqlite"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chunking.min_assistant_chars, 50);
        assert_eq!(config.retrieval.search_limit, 5);
        assert_eq!(config.retrieval.related_scan_limit, 500);
        assert!((config.retrieval.similar_threshold - 0.8).abs() < 1e-6);
        assert_eq!(config.graph.links_per_conversation, 5);
        assert_eq!(config.embedding.provider, "disabled");
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let file = write_config(&format!("{}\n[graph]\nthreshold = 1.5\n", MINIMAL));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("graph.threshold"));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let file = write_config(&format!("{}\n[retrieval]\nsimilar_limit = 0\n", MINIMAL));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("retrieval.similar_limit"));
    }

    #[test]
    fn test_openai_requires_model_and_dims() {
        let file = write_config(&format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL));
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let file = write_config(&format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_missing_store_section_rejected() {
        let file = write_config("[db]\npath = \"x.sqlite\"\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_expand_home() {
        let plain = Path::new("/var/lib/recall");
        assert_eq!(expand_home(plain), plain.to_path_buf());
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/recall")), home.join("recall"));
        }
    }
}
