pub mod classifier;
pub mod config;
pub mod detectors;
pub mod error;
pub mod executor;
pub mod llm;
pub mod logger;
pub mod persistence;
pub mod pipeline;
pub mod state;
pub mod testgen;

pub use error::QaError;
pub use pipeline::Pipeline;
pub use state::{Metrics, PipelineResult};
