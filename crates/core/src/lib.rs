//! # Didact Core
//!
//! The "Pipeline" of the Didact system - a three-pass grounded content
//! transformation that turns raw instructional text into a structured
//! teaching Kit while keeping every grounded claim traceable to a specific
//! span of the source.
//!
//! ## Architecture
//!
//! - `ground_truth/` - Pass 1: deterministic structural extraction
//! - `protocols/` - Content protocols (strategy per content class) and selection
//! - `transform/` - Pass 2: constrained generation with the recovery ladder
//! - `validate/` - Pass 3: checks, scoring, hallucination heuristic, repair
//! - `pipeline/` - Orchestration, stage log, cache contract
//! - `llm/` - The consumed external generation capability
//! - `models/` - Centralized LLM provider configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use didact_core::pipeline::{BuildRequest, Orchestrator};
//!
//! let orchestrator = Orchestrator::from_env()?;
//! let report = orchestrator.run(&BuildRequest::new("module-7", raw_text)).await;
//! if report.success {
//!     let kit = report.kit.expect("kit on success");
//! }
//! ```

pub mod ground_truth;
pub mod kit;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod protocols;
pub mod transform;
pub mod validate;

pub use ground_truth::GroundTruth;
pub use kit::{should_rebuild, Kit};
pub use pipeline::{BuildRequest, Orchestrator, PipelineConfig, PipelineReport};
pub use protocols::ProtocolRegistry;
