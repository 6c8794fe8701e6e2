// src/llm/client.rs

use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::{LlmConfig, Provider};
use crate::llm::backend::{ProviderError, ReasoningProvider};
use crate::llm::prompt::LlmPrompt;

const PROMPT_ABI_VERSION: &str = "v1-codeqa-analysis";
const MAX_OUTPUT_TOKENS: u32 = 1024;
const TEMPERATURE: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct LlmClient {
    cfg: LlmConfig,
}

impl LlmClient {
    pub fn new(cfg: LlmConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.cfg
    }

    pub fn is_configured(&self) -> bool {
        !self.cfg.api_key.trim().is_empty()
    }

    /// Vertex with a project but no API key: application-default credentials
    /// would be required, which this client does not support.
    pub fn wants_default_credentials(&self) -> bool {
        self.cfg.provider == Provider::Vertex
            && self.cfg.project.is_some()
            && !self.is_configured()
    }

    /// Execute LLM request
    pub fn run(&self, prompt: &LlmPrompt) -> Result<String, ProviderError> {
        if !self.is_configured() {
            return Err(ProviderError::Unconfigured(format!(
                "no API key for {:?}",
                self.cfg.provider
            )));
        }

        let prompt_hash = hash_prompt(prompt);
        let (url, headers, body) = build_request(&self.cfg, prompt, &prompt_hash)?;
        debug!(provider = ?self.cfg.provider, model = %self.cfg.effective_model(), %prompt_hash, "calling reasoning provider");

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let mut req = client.post(url).json(&body);
        for (k, v) in headers {
            req = req.header(k, v);
        }

        let resp = req
            .send()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = resp.status();
        let json: Value = resp
            .json()
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: json.to_string(),
            });
        }

        extract_text(&self.cfg.provider, &json)
    }
}

impl ReasoningProvider for LlmClient {
    fn name(&self) -> &str {
        match self.cfg.provider {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Vertex => "vertex",
        }
    }

    fn generate(&self, prompt: &LlmPrompt) -> Result<String, ProviderError> {
        self.run(prompt)
    }
}

fn hash_prompt(prompt: &LlmPrompt) -> String {
    let mut h = Sha256::new();
    h.update(PROMPT_ABI_VERSION.as_bytes());
    h.update(prompt.system.as_bytes());
    h.update(prompt.user.as_bytes());
    hex::encode(h.finalize())
}

fn build_request(
    cfg: &LlmConfig,
    prompt: &LlmPrompt,
    prompt_hash: &str,
) -> Result<(String, Vec<(&'static str, String)>, Value), ProviderError> {
    match cfg.provider {
        Provider::OpenAI => {
            let url = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/responses".into());

            let body = serde_json::json!({
                "model": cfg.effective_model(),
                "instructions": prompt.system,
                "input": prompt.user,
                "prompt_cache_key": prompt_hash,
            });

            Ok((
                url,
                vec![("Authorization", format!("Bearer {}", cfg.api_key))],
                body,
            ))
        }

        Provider::Anthropic => {
            let url = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com/v1/messages".into());

            let body = serde_json::json!({
                "model": cfg.effective_model(),
                "max_tokens": MAX_OUTPUT_TOKENS,
                "temperature": TEMPERATURE,
                "system": prompt.system,
                "messages": [
                    { "role": "user", "content": prompt.user }
                ]
            });

            Ok((
                url,
                vec![
                    ("x-api-key", cfg.api_key.clone()),
                    ("anthropic-version", "2023-06-01".into()),
                ],
                body,
            ))
        }

        Provider::Vertex => {
            let url = match &cfg.base_url {
                Some(u) => u.clone(),
                None => {
                    let project = cfg.project.as_deref().ok_or_else(|| {
                        ProviderError::Unconfigured("vertex provider needs a project".into())
                    })?;
                    format!(
                        "https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/publishers/google/models/{model}:predict",
                        region = cfg.region,
                        model = cfg.effective_model(),
                    )
                }
            };

            let body = serde_json::json!({
                "instances": [
                    { "content": format!("{}\n\n{}", prompt.system, prompt.user) }
                ],
                "parameters": {
                    "maxOutputTokens": MAX_OUTPUT_TOKENS,
                    "temperature": TEMPERATURE,
                }
            });

            Ok((
                url,
                vec![("Authorization", format!("Bearer {}", cfg.api_key))],
                body,
            ))
        }
    }
}

fn extract_text(provider: &Provider, v: &Value) -> Result<String, ProviderError> {
    let text = match provider {
        Provider::OpenAI => v
            .get("output")
            .and_then(|o| o.as_array())
            .and_then(|arr| {
                arr.iter().find_map(|item| {
                    item.get("content")?
                        .as_array()?
                        .iter()
                        .find_map(|c| c.get("text")?.as_str())
                })
            })
            .map(str::to_owned),

        Provider::Anthropic => v
            .pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(str::to_owned),

        Provider::Vertex => {
            let first = v
                .pointer("/predictions/0")
                .or_else(|| v.pointer("/outputs/0"));

            first.map(|p| match p {
                Value::String(s) => s.clone(),
                Value::Object(_) => ["content", "output", "text"]
                    .iter()
                    .find_map(|k| p.get(*k).and_then(|t| t.as_str()))
                    .filter(|t| !t.is_empty())
                    .map(str::to_owned)
                    .unwrap_or_else(|| p.to_string()),
                other => other.to_string(),
            })
        }
    };

    text.ok_or_else(|| {
        ProviderError::Malformed(format!("{:?} response had no text", provider))
    })
}
