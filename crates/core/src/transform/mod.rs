//! # Constrained Transformer
//!
//! Pass 2: builds a prompt from the Ground Truth and the selected protocol,
//! invokes the external generation capability through the recovery ladder,
//! parses the result into a candidate Kit, and applies the protocol's
//! deterministic post-processing.
//!
//! The deterministic scaffold path exists only for callers that explicitly
//! opt out of generation; it is never silently substituted for a failed
//! generation.

use std::sync::Arc;

use crate::ground_truth::GroundTruth;
use crate::kit::{Kit, KitContent};
use crate::llm::{GenerateOptions, LlmClient};
use crate::pipeline::{PipelineError, PipelineStage, StageLog};
use crate::protocols::{prompts, ContentProtocol};

pub mod parse;
pub mod retry;
pub mod scaffold;

pub use retry::{AttemptKind, RetryPolicy};

/// Pass 2 of the pipeline.
pub struct Transformer {
    pub client: Arc<dyn LlmClient>,
    pub generation: GenerateOptions,
    pub retry: RetryPolicy,
}

impl Transformer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            generation: GenerateOptions::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Produce a candidate Kit for the resolved protocol.
    ///
    /// With `skip_generation` the deterministic scaffold is built instead
    /// and flagged `needs_review` with an explicit reason.
    pub async fn transform(
        &self,
        gt: &GroundTruth,
        protocol: &dyn ContentProtocol,
        skip_generation: bool,
        log: &mut StageLog,
    ) -> Result<Kit, PipelineError> {
        if skip_generation {
            log.push(
                PipelineStage::Transforming,
                "generation skipped by caller: building deterministic scaffold",
            );
            return Ok(scaffold::scaffold_kit(gt, protocol));
        }

        let system = build_system_prompt(protocol);
        let prompt = build_user_prompt(gt, protocol);
        log.push(
            PipelineStage::Transforming,
            format!(
                "pass 2: generating via {} ({})",
                self.client.provider_name(),
                self.client.model_name()
            ),
        );

        let content = retry::run_ladder(
            self.client.as_ref(),
            &system,
            &prompt,
            &self.generation,
            &self.retry,
            log,
        )
        .await?;

        let content = protocol.post_process(content, gt);
        Ok(Kit::from_content(content, protocol.id(), &gt.source_hash))
    }
}

// ============================================================================
// Prompt assembly
// ============================================================================

/// Protocol system instruction plus the shared grounding rules.
pub fn build_system_prompt(protocol: &dyn ContentProtocol) -> String {
    format!("{}\n\n{}", protocol.system_prompt(), prompts::GROUNDING_RULES)
}

/// Ground-Truth collections (indices included, so the model can emit
/// matching source refs), protocol requirements, and the payload schema.
pub fn build_user_prompt(gt: &GroundTruth, protocol: &dyn ContentProtocol) -> String {
    let schema = serde_json::to_string_pretty(&schemars::schema_for!(KitContent))
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "{}\n{}\n## Output schema\n```json\n{}\n```\nReturn a single JSON object matching this schema.",
        serialize_ground_truth(gt),
        protocol.prompt_requirements(gt),
        schema
    )
}

/// Serialize the Ground Truth for the prompt. Only non-empty collections
/// are included; every item is numbered with the index a source ref must
/// use.
pub fn serialize_ground_truth(gt: &GroundTruth) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "## Ground Truth: {}\n{} words of source material\n\n",
        gt.title.as_deref().unwrap_or("(untitled)"),
        gt.word_count
    ));

    if !gt.key_concepts.is_empty() {
        out.push_str("### key_concepts\n");
        for (i, concept) in gt.key_concepts.iter().enumerate() {
            out.push_str(&format!("[{}] {}\n", i, concept.text));
        }
        out.push('\n');
    }
    if !gt.procedures.is_empty() {
        out.push_str("### procedures\n");
        for (i, step) in gt.procedures.iter().enumerate() {
            out.push_str(&format!(
                "[{}] (stap {}) {}\n",
                i, step.step_number, step.instruction
            ));
        }
        out.push('\n');
    }
    if !gt.warnings.is_empty() {
        out.push_str("### warnings\n");
        for (i, warning) in gt.warnings.iter().enumerate() {
            out.push_str(&format!("[{}] ({:?}) {}\n", i, warning.kind, warning.text));
        }
        out.push('\n');
    }
    if !gt.pairs.is_empty() {
        out.push_str("### pairs\n");
        for (i, pair) in gt.pairs.iter().enumerate() {
            out.push_str(&format!("[{}] fout: {} | goed: {}", i, pair.wrong, pair.right));
            if let Some(explanation) = &pair.explanation {
                out.push_str(&format!(" | uitleg: {}", explanation));
            }
            out.push('\n');
        }
        out.push('\n');
    }
    if !gt.media.is_empty() {
        out.push_str("### media\n");
        for (i, asset) in gt.media.iter().enumerate() {
            out.push_str(&format!("[{}] ({:?}) {}", i, asset.kind, asset.url));
            if let Some(caption) = &asset.caption {
                out.push_str(&format!(" - {}", caption));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    out
}
