use serde::Deserialize;
use thiserror::Error;

use crate::llm::prompt::LlmPrompt;
use crate::state::FunctionNote;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    Unconfigured(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Anything that can turn a prompt into text.
pub trait ReasoningProvider: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, prompt: &LlmPrompt) -> Result<String, ProviderError>;
}

/// Provider that always declines, forcing the offline heuristics.
#[derive(Debug, Clone, Default)]
pub struct OfflineProvider;

impl ReasoningProvider for OfflineProvider {
    fn name(&self) -> &str {
        "offline"
    }

    fn generate(&self, _prompt: &LlmPrompt) -> Result<String, ProviderError> {
        Err(ProviderError::Unconfigured("offline mode".into()))
    }
}

/// Structured description returned by a reasoning provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderNotes {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub functions: Vec<FunctionNote>,
}

/// Outcome of asking the provider. Synthesis only ever sees notes, so
/// both arms must be handled before that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reasoning {
    Provider(ProviderNotes),
    Fallback(String),
}

pub fn request_reasoning(provider: &dyn ReasoningProvider, prompt: &LlmPrompt) -> Reasoning {
    match provider.generate(prompt).and_then(|text| parse_notes(&text)) {
        Ok(notes) => Reasoning::Provider(notes),
        Err(e) => Reasoning::Fallback(e.to_string()),
    }
}

/// Pull the JSON object out of a model reply.
///
/// Replies are often fenced or wrapped in prose; the first `{` through the
/// last `}` is taken as the document.
pub fn parse_notes(text: &str) -> Result<ProviderNotes, ProviderError> {
    let start = text
        .find('{')
        .ok_or_else(|| ProviderError::Malformed("no JSON object in response".into()))?;
    let end = text
        .rfind('}')
        .filter(|e| *e > start)
        .ok_or_else(|| ProviderError::Malformed("unterminated JSON object".into()))?;

    serde_json::from_str::<ProviderNotes>(&text[start..=end])
        .map_err(|e| ProviderError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    impl ReasoningProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn generate(&self, _prompt: &LlmPrompt) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    fn prompt() -> LlmPrompt {
        LlmPrompt {
            system: String::new(),
            user: String::new(),
        }
    }

    #[test]
    fn parses_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"summary\": \"math\", \"functions\": [{\"name\": \"add\", \"desc\": \"adds\", \"edge_cases\": [\"zero\"]}]}\n```";
        let notes = parse_notes(reply).unwrap();

        assert_eq!(notes.summary, "math");
        assert_eq!(notes.functions[0].name, "add");
        assert_eq!(notes.functions[0].edge_cases, vec!["zero"]);
    }

    #[test]
    fn missing_fields_default() {
        let notes = parse_notes("{\"functions\": [{\"name\": \"f\"}]}").unwrap();
        assert_eq!(notes.summary, "");
        assert!(notes.functions[0].edge_cases.is_empty());
    }

    #[test]
    fn prose_reply_falls_back() {
        let r = request_reasoning(&Canned("I cannot help with that."), &prompt());
        assert!(matches!(r, Reasoning::Fallback(reason) if reason.contains("malformed")));
    }

    #[test]
    fn offline_provider_falls_back() {
        let r = request_reasoning(&OfflineProvider, &prompt());
        assert_eq!(
            r,
            Reasoning::Fallback("provider not configured: offline mode".into())
        );
    }

    #[test]
    fn well_formed_reply_is_used() {
        let r = request_reasoning(&Canned("{\"summary\": \"s\", \"functions\": []}"), &prompt());
        assert!(matches!(r, Reasoning::Provider(n) if n.summary == "s"));
    }
}
