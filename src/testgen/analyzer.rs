//! analyzer.rs
//!
//! Source analysis: function table from the parser, behavioral notes from
//! the reasoning provider or the offline heuristics.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::detectors::ast::extract_functions;
use crate::error::QaError;
use crate::llm::backend::{request_reasoning, Reasoning, ReasoningProvider};
use crate::llm::prompt::build_analysis_prompt;
use crate::logger::timed;
use crate::state::{NotesOrigin, SourceAnalysis};
use crate::testgen::heuristics::{offline_notes, offline_summary};

pub struct SourceAnalyzer<'a> {
    provider: &'a dyn ReasoningProvider,
}

impl<'a> SourceAnalyzer<'a> {
    pub fn new(provider: &'a dyn ReasoningProvider) -> Self {
        Self { provider }
    }

    pub fn analyze(&self, path: &Path) -> Result<SourceAnalysis, QaError> {
        timed("analyze", || self.analyze_inner(path))
    }

    fn analyze_inner(&self, path: &Path) -> Result<SourceAnalysis, QaError> {
        if !path.exists() {
            return Err(QaError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let bytes = fs::read(path).map_err(|e| QaError::parse(path, e.to_string()))?;
        let source = String::from_utf8(bytes)
            .map_err(|_| QaError::parse(path, "source is not valid UTF-8"))?;

        let functions =
            extract_functions(&source).map_err(|issue| QaError::parse(path, issue.to_string()))?;

        let file = path.display().to_string();
        debug!("analyze -> found {} functions in {}", functions.len(), file);

        let prompt = build_analysis_prompt(&file, &source);
        let (summary, function_notes, origin) = match request_reasoning(self.provider, &prompt) {
            Reasoning::Provider(notes) => (
                notes.summary,
                notes.functions,
                NotesOrigin::Provider {
                    name: self.provider.name().to_string(),
                },
            ),
            Reasoning::Fallback(reason) => {
                warn!(provider = self.provider.name(), %reason, "reasoning provider unavailable, using offline heuristics");
                (
                    offline_summary(&file, &functions),
                    offline_notes(&functions),
                    NotesOrigin::Offline { reason },
                )
            }
        };

        Ok(SourceAnalysis {
            path: file,
            functions,
            summary,
            function_notes,
            origin,
        })
    }
}
