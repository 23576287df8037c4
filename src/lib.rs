pub mod config;
pub mod error;
pub mod io;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod stages;

#[cfg(test)]
mod testing;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use io::{ArtifactStore, read_flat_output, read_transcript};
pub use llm::{
    CompletionRequest, CompletionService, ExtractionStrategy, ProbabilityPolicy, ProviderKind,
};
pub use models::{AnnotatedSentence, EventNode, Segment, TaskNode, WindowConfig};
pub use pipeline::{
    OutputPaths, PipelineContext, RunReport, run_annotation, run_organization, run_pipeline,
};
pub use stages::{OverlapPolicy, plan_ranges, segment_transcript};
