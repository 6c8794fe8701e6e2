use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QaError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub timeout_secs: u64,
    pub memory_path: PathBuf,
    pub python: String,
    pub report_tail_lines: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            memory_path: PathBuf::from("data/memory_bank.json"),
            python: "python3".into(),
            report_tail_lines: 20,
        }
    }
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(alias = "open_ai")]
    OpenAI,
    Anthropic,
    #[serde(alias = "gemini")]
    Vertex,
}

impl Provider {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Provider::OpenAI),
            "anthropic" => Some(Provider::Anthropic),
            "vertex" | "gemini" => Some(Provider::Vertex),
            _ => None,
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-5.2",
            Provider::Anthropic => "claude-sonnet-4-5",
            Provider::Vertex => "gemini-1.5-flash",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub project: Option<String>,
    pub region: String,
}

impl LlmConfig {
    /// Configured model, or the provider's default when left blank.
    pub fn effective_model(&self) -> &str {
        if self.model.trim().is_empty() {
            self.provider.default_model()
        } else {
            &self.model
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAI,
            model: String::new(),
            api_key: String::new(),
            base_url: None,
            project: None,
            region: "us-central1".into(),
        }
    }
}

pub fn config_path() -> PathBuf {
    let mut dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.push("codeqa");
    dir.push("config.toml");
    dir
}

/// Read the config file (missing file means defaults) and apply environment
/// overrides.
pub fn load(path: Option<&Path>) -> Result<Config, QaError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let cfg = read_file(&path)?;
    Ok(apply_env(cfg, |k| std::env::var(k).ok()))
}

fn read_file(path: &Path) -> Result<Config, QaError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => {
            return Err(QaError::Config {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })
        }
    };

    toml::from_str(&raw).map_err(|e| QaError::Config {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

pub fn apply_env(mut cfg: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    let var = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

    if let Some(t) = var("CODEQA_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
        cfg.pipeline.timeout_secs = t;
    }
    if let Some(m) = var("CODEQA_MEMORY") {
        cfg.pipeline.memory_path = PathBuf::from(m);
    }
    if let Some(p) = var("CODEQA_PYTHON") {
        cfg.pipeline.python = p;
    }

    let llm = &mut cfg.llm;
    if let Some(p) = var("CODEQA_PROVIDER").and_then(|v| Provider::parse(&v)) {
        if p != llm.provider {
            llm.model.clear();
        }
        llm.provider = p;
    }

    let key_var = match llm.provider {
        Provider::OpenAI => "OPENAI_API_KEY",
        Provider::Anthropic => "ANTHROPIC_API_KEY",
        Provider::Vertex => "GEMINI_API_KEY",
    };
    if let Some(k) = var(key_var) {
        llm.api_key = k;
    }

    if llm.provider == Provider::Vertex {
        if let Some(m) = var("GEMINI_MODEL") {
            llm.model = m;
        }
        if let Some(p) = var("GCP_PROJECT") {
            llm.project = Some(p);
        }
        if let Some(r) = var("GCP_REGION") {
            llm.region = r;
        }
    }

    if let Some(m) = var("CODEQA_MODEL") {
        llm.model = m;
    }

    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.pipeline.timeout_secs, 30);
        assert_eq!(cfg.pipeline.memory_path, PathBuf::from("data/memory_bank.json"));
        assert_eq!(cfg.pipeline.report_tail_lines, 20);
        assert!(cfg.llm.api_key.is_empty());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: Config = toml::from_str(
            "[pipeline]\ntimeout_secs = 5\n\n[llm]\nprovider = \"anthropic\"\nmodel = \"x\"\n",
        )
        .unwrap();

        assert_eq!(cfg.pipeline.timeout_secs, 5);
        assert_eq!(cfg.pipeline.python, "python3");
        assert_eq!(cfg.llm.provider, Provider::Anthropic);
        assert_eq!(cfg.llm.model, "x");
    }

    #[test]
    fn blank_model_uses_provider_default() {
        let cfg: Config = toml::from_str("[llm]\nprovider = \"anthropic\"\n").unwrap();
        assert_eq!(cfg.llm.effective_model(), "claude-sonnet-4-5");
    }

    #[test]
    fn env_selects_vertex_with_gemini_settings() {
        let cfg = apply_env(
            Config::default(),
            env(&[
                ("CODEQA_PROVIDER", "gemini"),
                ("GEMINI_API_KEY", "g-key"),
                ("GCP_PROJECT", "proj"),
                ("GCP_REGION", "europe-west4"),
            ]),
        );

        assert_eq!(cfg.llm.provider, Provider::Vertex);
        assert_eq!(cfg.llm.api_key, "g-key");
        assert_eq!(cfg.llm.effective_model(), "gemini-1.5-flash");
        assert_eq!(cfg.llm.project.as_deref(), Some("proj"));
        assert_eq!(cfg.llm.region, "europe-west4");
    }

    #[test]
    fn env_overrides_pipeline_and_ignores_blank_values() {
        let cfg = apply_env(
            Config::default(),
            env(&[
                ("CODEQA_TIMEOUT", "7"),
                ("CODEQA_PYTHON", "python"),
                ("OPENAI_API_KEY", "   "),
            ]),
        );

        assert_eq!(cfg.pipeline.timeout_secs, 7);
        assert_eq!(cfg.pipeline.python, "python");
        assert!(cfg.llm.api_key.is_empty());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = read_file(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.pipeline, PipelineConfig::default());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "pipeline = [").unwrap();

        assert!(matches!(read_file(&path), Err(QaError::Config { .. })));
    }
}
