//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/trs.sqlite"
//!
//! [embedding]
//! provider = "hashed"   # disabled | hashed | openai
//! dims = 256
//!
//! [readiness]
//! readiness_minimum = 70.0
//!
//! [learning]
//! max_iterations = 3
//!
//! [connectors.pubmed]
//! email = "me@example.org"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use topic_readiness_core::readiness::ReadinessParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

impl Config {
    /// Defaults everywhere except the database path.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            readiness: ReadinessConfig::default(),
            learning: LearningConfig::default(),
            connectors: ConnectorsConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
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

#[derive(Debug, Deserialize, Clone)]
pub struct ReadinessConfig {
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f32,
    #[serde(default = "default_recency_window_years")]
    pub recency_window_years: i32,
    #[serde(default = "default_readiness_minimum")]
    pub readiness_minimum: f64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            relevance_threshold: default_relevance_threshold(),
            duplicate_threshold: default_duplicate_threshold(),
            recency_window_years: default_recency_window_years(),
            readiness_minimum: default_readiness_minimum(),
        }
    }
}

fn default_candidate_limit() -> usize {
    200
}
fn default_relevance_threshold() -> f32 {
    0.30
}
fn default_duplicate_threshold() -> f32 {
    0.90
}
fn default_recency_window_years() -> i32 {
    3
}
fn default_readiness_minimum() -> f64 {
    70.0
}

impl ReadinessConfig {
    pub fn params(&self) -> ReadinessParams {
        ReadinessParams {
            candidate_limit: self.candidate_limit,
            relevance_threshold: self.relevance_threshold,
            duplicate_threshold: self.duplicate_threshold,
            recency_window_years: self.recency_window_years,
            readiness_minimum: self.readiness_minimum,
            reference_year: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LearningConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_stagnation_threshold")]
    pub stagnation_threshold: f64,
    /// Bound on the whole ingestion phase of one iteration.
    #[serde(default = "default_ingestion_timeout_secs")]
    pub ingestion_timeout_secs: u64,
    /// Bound on a single connector call.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_gap_fill_queries")]
    pub gap_fill_queries_per_dimension: usize,
    #[serde(default = "default_true")]
    pub prune_stale_state: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            stagnation_threshold: default_stagnation_threshold(),
            ingestion_timeout_secs: default_ingestion_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            gap_fill_queries_per_dimension: default_gap_fill_queries(),
            prune_stale_state: true,
        }
    }
}

fn default_max_iterations() -> u32 {
    3
}
fn default_stagnation_threshold() -> f64 {
    3.0
}
fn default_ingestion_timeout_secs() -> u64 {
    120
}
fn default_query_timeout_secs() -> u64 {
    30
}
fn default_gap_fill_queries() -> usize {
    2
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    pub pubmed: Option<PubMedConnectorConfig>,
    pub semantic_scholar: Option<SemanticScholarConnectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PubMedConnectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub email: Option<String>,
    /// Restrict to articles published within this many days.
    #[serde(default)]
    pub days_back: Option<u32>,
    #[serde(default = "default_pubmed_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_pubmed_base_url() -> String {
    "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SemanticScholarConnectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Falls back to the `SEMANTIC_SCHOLAR_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_s2_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Only query with the topic title, not with every base query.
    #[serde(default = "default_true")]
    pub title_only: bool,
}

fn default_s2_base_url() -> String {
    "https://api.semanticscholar.org/graph/v1".to_string()
}

fn default_max_results() -> usize {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }

    let r = &config.readiness;
    if r.candidate_limit == 0 {
        bail!("readiness.candidate_limit must be >= 1");
    }
    if !(0.0..=1.0).contains(&r.relevance_threshold) {
        bail!("readiness.relevance_threshold must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&r.duplicate_threshold) {
        bail!("readiness.duplicate_threshold must be in [0.0, 1.0]");
    }
    if r.duplicate_threshold <= r.relevance_threshold {
        bail!("readiness.duplicate_threshold must be greater than readiness.relevance_threshold");
    }
    if r.recency_window_years < 0 {
        bail!("readiness.recency_window_years must be >= 0");
    }
    if !(r.readiness_minimum > 0.0 && r.readiness_minimum <= 100.0) {
        bail!("readiness.readiness_minimum must be in (0, 100]");
    }

    let l = &config.learning;
    if l.max_iterations == 0 {
        bail!("learning.max_iterations must be >= 1");
    }
    if l.stagnation_threshold < 0.0 {
        bail!("learning.stagnation_threshold must be >= 0");
    }
    if l.ingestion_timeout_secs == 0 || l.query_timeout_secs == 0 {
        bail!("learning timeouts must be > 0");
    }
    if !(1..=2).contains(&l.gap_fill_queries_per_dimension) {
        bail!("learning.gap_fill_queries_per_dimension must be 1 or 2");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "hashed" | "openai" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hashed, or openai.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.provider == "openai" && config.embedding.model.is_none() {
            bail!("embedding.model must be specified when provider is 'openai'");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(cfg.learning.max_iterations, 3);
        assert_eq!(cfg.learning.stagnation_threshold, 3.0);
        assert_eq!(cfg.readiness.candidate_limit, 200);
        assert_eq!(cfg.readiness.readiness_minimum, 70.0);
        assert!(!cfg.embedding.is_enabled());
        assert!(cfg.connectors.pubmed.is_none());
    }

    #[test]
    fn test_connector_defaults() {
        let cfg = parse(
            "[db]\npath = \"x\"\n[connectors.pubmed]\nemail = \"a@b.c\"\n[connectors.semantic_scholar]\n",
        )
        .unwrap();
        let pubmed = cfg.connectors.pubmed.unwrap();
        assert!(pubmed.enabled);
        assert_eq!(pubmed.max_results, 10);
        assert!(cfg.connectors.semantic_scholar.unwrap().title_only);
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let err = parse(
            "[db]\npath = \"x\"\n[readiness]\nrelevance_threshold = 0.9\nduplicate_threshold = 0.5\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate_threshold"));
    }

    #[test]
    fn test_rejects_zero_iterations() {
        assert!(parse("[db]\npath = \"x\"\n[learning]\nmax_iterations = 0\n").is_err());
    }

    #[test]
    fn test_hashed_requires_dims() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"hashed\"\n").unwrap_err();
        assert!(err.to_string().contains("dims"));
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"hashed\"\ndims = 64\n").is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        let err = parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }
}
