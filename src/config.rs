//! Configuration parsing and validation.
//!
//! Nancy Brain is configured via a TOML file (default `config/nancy.toml`).
//! Only `[corpus]` is required; every other section has defaults.
//!
//! ```toml
//! [corpus]
//! root = "./knowledge_base/raw"
//! include_globs = ["**/*.py", "**/*.md", "**/*.txt"]
//!
//! [corpus.repos."tools/astropy"]
//! url_template = "https://github.com/astropy/astropy/blob/main/{path}#L{start}-L{end}"
//!
//! [chunking]
//! max_lines = 80
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [weights.extensions]
//! ".py" = 1.2
//!
//! [weights.path_includes]
//! "tests/" = 0.6
//! ```

use anyhow::{bail, Context, Result};
use nancy_brain_core::chunk::ChunkingPolicy;
use nancy_brain_core::weights::{WeightRegistry, WeightTables};
use nancy_brain_core::RagSettings;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Directory laid out as `<category>/<repo>/<path>`.
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Extensions embedded into the code index when `[embedding.code]` is set.
    #[serde(default = "default_code_extensions")]
    pub code_extensions: Vec<String>,
    /// Per-repo settings keyed by `<category>/<repo>`.
    #[serde(default)]
    pub repos: BTreeMap<String, RepoConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RepoConfig {
    #[serde(default)]
    pub url_template: Option<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_code_extensions() -> Vec<String> {
    [
        ".py", ".js", ".ts", ".tsx", ".jsx", ".java", ".c", ".cpp", ".cc", ".h", ".hpp", ".go",
        ".rs", ".swift", ".kt", ".m", ".cs",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Lines per chunk; `0` indexes whole documents.
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
        }
    }
}

fn default_max_lines() -> usize {
    80
}

impl ChunkingConfig {
    pub fn policy(&self) -> ChunkingPolicy {
        ChunkingPolicy::from_max_lines(self.max_lines)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_window")]
    pub default_window: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_calibration")]
    pub general_calibration: f64,
    #[serde(default = "default_calibration")]
    pub code_calibration: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_window: default_window(),
            snippet_chars: default_snippet_chars(),
            general_calibration: default_calibration(),
            code_calibration: default_calibration(),
        }
    }
}

fn default_limit() -> usize {
    6
}
fn default_window() -> usize {
    1
}
fn default_snippet_chars() -> usize {
    240
}
fn default_calibration() -> f64 {
    1.0
}

impl RetrievalConfig {
    pub fn settings(&self) -> RagSettings {
        RagSettings {
            general_calibration: self.general_calibration,
            code_calibration: self.code_calibration,
            snippet_chars: self.snippet_chars,
            default_window: self.default_window,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for `ollama` (default `http://localhost:11434`) or an
    /// OpenAI-compatible endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Second model for the code index; enables dual-index search.
    #[serde(default)]
    pub code: Option<Box<EmbeddingConfig>>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            code: None,
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

    fn validate(&self, section: &str) -> Result<()> {
        match self.provider.as_str() {
            "disabled" | "hashed" | "ollama" | "openai" => {}
            other => bail!(
                "Unknown {}.provider: '{}'. Must be disabled, hashed, ollama, or openai.",
                section,
                other
            ),
        }
        if self.is_enabled() {
            if self.dims.is_none() || self.dims == Some(0) {
                bail!(
                    "{}.dims must be > 0 when provider is '{}'",
                    section,
                    self.provider
                );
            }
            if self.provider != "hashed" && self.model.is_none() {
                bail!(
                    "{}.model must be specified when provider is '{}'",
                    section,
                    self.provider
                );
            }
        }
        if self.batch_size == 0 {
            bail!("{}.batch_size must be >= 1", section);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WeightsConfig {
    #[serde(flatten)]
    pub tables: WeightTables,
    /// TOML file holding runtime doc weights; written on every change.
    #[serde(default)]
    pub doc_weights_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7777".to_string()
}
fn default_request_timeout() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Resolve relative paths against the config file's directory
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    if config.corpus.root.is_relative() {
        config.corpus.root = base.join(&config.corpus.root);
    }
    if let Some(p) = &config.weights.doc_weights_path {
        if p.is_relative() {
            config.weights.doc_weights_path = Some(base.join(p));
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.default_limit < 1 {
        bail!("retrieval.default_limit must be >= 1");
    }
    for (name, value) in [
        ("general_calibration", config.retrieval.general_calibration),
        ("code_calibration", config.retrieval.code_calibration),
    ] {
        if !value.is_finite() || value <= 0.0 {
            bail!("retrieval.{} must be a positive number, got {}", name, value);
        }
    }

    config.embedding.validate("embedding")?;
    if let Some(code) = &config.embedding.code {
        if !config.embedding.is_enabled() {
            bail!("embedding.code requires a general embedding provider");
        }
        code.validate("embedding.code")?;
    }

    // Surface bad weights at startup rather than at first query
    WeightRegistry::load(&config.weights.tables).context("Invalid [weights] section")?;

    for key in config.corpus.repos.keys() {
        if key.split('/').filter(|s| !s.is_empty()).count() != 2 {
            bail!(
                "corpus.repos key '{}' must have the form <category>/<repo>",
                key
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nancy.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_minimal_config_defaults() {
        let (dir, path) = write_config("[corpus]\nroot = \"kb\"\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.corpus.root, dir.path().join("kb"));
        assert_eq!(config.chunking.max_lines, 80);
        assert_eq!(config.retrieval.default_limit, 6);
        assert_eq!(config.retrieval.snippet_chars, 240);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.server.request_timeout_secs, 30);
        assert!(config.corpus.code_extensions.contains(&".rs".to_string()));
    }

    #[test]
    fn test_weights_and_repos_parse() {
        let (_dir, path) = write_config(
            r#"
[corpus]
root = "/data/kb"

[corpus.repos."tools/astropy"]
url_template = "https://github.com/astropy/astropy/blob/main/{path}#L{start}-L{end}"

[weights]
doc_weights_path = "weights.toml"

[weights.extensions]
".py" = 1.2

[weights.path_includes]
"tests/" = 0.5
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.weights.tables.extensions.get(".py"), Some(&1.2));
        assert_eq!(config.weights.tables.path_includes.get("tests/"), Some(&0.5));
        assert!(config.weights.doc_weights_path.unwrap().ends_with("weights.toml"));
        assert!(config.corpus.repos["tools/astropy"]
            .url_template
            .as_deref()
            .unwrap()
            .contains("{start}"));
    }

    #[test]
    fn test_rejects_non_positive_weight() {
        let (_dir, path) = write_config(
            "[corpus]\nroot = \"kb\"\n[weights.extensions]\n\".py\" = -1.0\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("weights"));
    }

    #[test]
    fn test_rejects_unknown_provider_and_missing_dims() {
        let (_dir, path) = write_config(
            "[corpus]\nroot = \"kb\"\n[embedding]\nprovider = \"magic\"\n",
        );
        assert!(load_config(&path).is_err());

        let (_dir, path) = write_config(
            "[corpus]\nroot = \"kb\"\n[embedding]\nprovider = \"hashed\"\n",
        );
        assert!(load_config(&path).unwrap_err().to_string().contains("dims"));
    }

    #[test]
    fn test_code_section_requires_general() {
        let (_dir, path) = write_config(
            "[corpus]\nroot = \"kb\"\n[embedding.code]\nprovider = \"hashed\"\ndims = 64\n",
        );
        assert!(load_config(&path).is_err());

        let (_dir, path) = write_config(
            "[corpus]\nroot = \"kb\"\n[embedding]\nprovider = \"hashed\"\ndims = 64\n[embedding.code]\nprovider = \"hashed\"\ndims = 32\n",
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.embedding.code.unwrap().dims, Some(32));
    }

    #[test]
    fn test_bad_repo_key() {
        let (_dir, path) = write_config(
            "[corpus]\nroot = \"kb\"\n[corpus.repos.astropy]\nurl_template = \"x\"\n",
        );
        assert!(load_config(&path).is_err());
    }
}
