pub mod analyzer;
pub mod heuristics;
pub mod synthesizer;

pub use analyzer::SourceAnalyzer;
pub use synthesizer::{synthesize, GeneratedTestSuite};
