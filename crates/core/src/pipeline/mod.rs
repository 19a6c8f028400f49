//! # Pipeline
//!
//! Orchestration of the three passes: extract, transform, validate. The
//! stage machine tracks where a build is; the stage log collects the
//! human-readable trail returned with every report.

use serde::{Deserialize, Serialize};

use crate::llm::GenerateError;

pub mod log;
pub mod orchestrator;

pub use log::{LogEntry, StageLog};
pub use orchestrator::{BuildRequest, Orchestrator, PipelineConfig, PipelineReport};

/// Stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Pass 1: structural extraction
    Extracting,
    /// Scoring protocol applicability
    SelectingProtocol,
    /// Pass 2: constrained generation
    Transforming,
    /// Pass 3: validation and repair
    Validating,
    /// Complete
    Complete,
    /// Failed
    Failed,
}

/// The pipeline state machine
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Current stage
    pub stage: PipelineStage,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            stage: PipelineStage::Extracting,
        }
    }
}

impl Pipeline {
    /// Create a new pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to the next stage
    pub fn advance(&mut self) {
        self.stage = match self.stage {
            PipelineStage::Extracting => PipelineStage::SelectingProtocol,
            PipelineStage::SelectingProtocol => PipelineStage::Transforming,
            PipelineStage::Transforming => PipelineStage::Validating,
            PipelineStage::Validating => PipelineStage::Complete,
            PipelineStage::Complete => PipelineStage::Complete,
            PipelineStage::Failed => PipelineStage::Failed,
        };
    }

    /// Fail the pipeline
    pub fn fail(&mut self) {
        self.stage = PipelineStage::Failed;
    }

    /// Check if the pipeline is finished, successfully or not
    pub fn is_complete(&self) -> bool {
        matches!(self.stage, PipelineStage::Complete | PipelineStage::Failed)
    }

    /// Check if the pipeline succeeded
    pub fn is_success(&self) -> bool {
        self.stage == PipelineStage::Complete
    }
}

/// Failure taxonomy of a pipeline invocation. Validation findings are not
/// errors; they travel in the structured result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// A caller forced a protocol id that is not registered.
    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),
    /// Ground Truth failed its validity gate; generation is never attempted.
    #[error("source material insufficient: {0}")]
    InsufficientInput(String),
    /// The external generation capability failed, including the distinct
    /// no-provider-configured case.
    #[error(transparent)]
    Generation(#[from] GenerateError),
    /// Every rung of the recovery ladder failed to produce usable output.
    #[error("generation produced no usable structured output; last raw output: {snippet}")]
    MalformedOutput { snippet: String },
}
