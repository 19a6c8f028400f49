//! # Generation Recovery Ladder
//!
//! Malformed model output is recovered through an explicit ordered list of
//! strategies, not nested conditionals: stricter instructions, zero
//! temperature, model-repairs-its-own-output, and finally a reduced-size
//! re-ask to dodge output-length truncation. Every rung still produces
//! model-authored content; there is no canned fallback.
//!
//! Transient transport failures are retried with backoff inside each rung,
//! bounded by the shared policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::kit::KitContent;
use crate::llm::{GenerateError, GenerateOptions, LlmClient};
use crate::pipeline::{PipelineError, PipelineStage, StageLog};
use crate::protocols::prompts;

use super::parse;

/// Max characters of raw output echoed back in a failure diagnostic.
const SNIPPET_LEN: usize = 280;

const STRICT_SUFFIX: &str =
    "IMPORTANT: return ONLY a single valid JSON object matching the schema. \
     No markdown fences, no commentary, nothing before or after the JSON.";

const REDUCED_SUFFIX: &str =
    "IMPORTANT: return ONLY a single valid JSON object matching the schema, and keep it \
     compact: at most 8 teacher script items, at most 3 discussion questions, at most \
     4 slides, and short strings throughout.";

/// Shared retry budget for one transform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Transient-transport retries per ladder rung.
    pub max_transport_retries: u32,
    /// Base backoff between transport retries; grows linearly.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_transport_retries: 2,
            backoff_ms: 500,
        }
    }
}

/// One rung of the recovery ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    Initial,
    /// Same prompt with a stricter "JSON only" suffix.
    StrictJson,
    /// Strict prompt at temperature zero.
    ZeroTemperature,
    /// Ask the model to repair its own invalid output.
    SelfRepair,
    /// Re-ask for a deliberately smaller kit.
    Reduced,
}

impl AttemptKind {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptKind::Initial => "initial",
            AttemptKind::StrictJson => "strict-json",
            AttemptKind::ZeroTemperature => "zero-temperature",
            AttemptKind::SelfRepair => "self-repair",
            AttemptKind::Reduced => "reduced-size",
        }
    }
}

/// The ladder, in the order rungs are tried.
pub const LADDER: [AttemptKind; 5] = [
    AttemptKind::Initial,
    AttemptKind::StrictJson,
    AttemptKind::ZeroTemperature,
    AttemptKind::SelfRepair,
    AttemptKind::Reduced,
];

/// Run the ladder until one rung yields a parseable payload. Fails loud
/// with a diagnostic snippet of the last raw output when every rung fails.
pub(crate) async fn run_ladder(
    client: &dyn LlmClient,
    system: &str,
    prompt: &str,
    generation: &GenerateOptions,
    policy: &RetryPolicy,
    log: &mut StageLog,
) -> Result<KitContent, PipelineError> {
    let mut last_raw: Option<String> = None;
    let mut last_error = String::new();

    for kind in LADDER {
        let (rung_system, rung_prompt, rung_opts) = match kind {
            AttemptKind::Initial => (system.to_string(), prompt.to_string(), *generation),
            AttemptKind::StrictJson => (
                system.to_string(),
                format!("{}\n\n{}", prompt, STRICT_SUFFIX),
                *generation,
            ),
            AttemptKind::ZeroTemperature => (
                system.to_string(),
                format!("{}\n\n{}", prompt, STRICT_SUFFIX),
                generation.with_zero_temperature(),
            ),
            AttemptKind::SelfRepair => {
                // Nothing to repair if no rung produced output yet
                let Some(raw) = &last_raw else { continue };
                (
                    prompts::JSON_REPAIR.to_string(),
                    format!("Repair this document into valid JSON:\n\n{}", raw),
                    generation.with_zero_temperature(),
                )
            }
            AttemptKind::Reduced => (
                system.to_string(),
                format!("{}\n\n{}", prompt, REDUCED_SUFFIX),
                generation.with_zero_temperature(),
            ),
        };

        log.push(
            PipelineStage::Transforming,
            format!("generation attempt: {}", kind.label()),
        );

        match call_with_transport_retries(client, &rung_system, &rung_prompt, &rung_opts, policy, log)
            .await
        {
            Ok(text) => match parse::parse_kit(&text) {
                Ok(content) => {
                    log.push(
                        PipelineStage::Transforming,
                        format!("attempt {} produced a parseable kit payload", kind.label()),
                    );
                    return Ok(content);
                }
                Err(parse_error) => {
                    tracing::warn!(attempt = kind.label(), %parse_error, "unparseable output");
                    log.push(
                        PipelineStage::Transforming,
                        format!("attempt {} output unparseable: {}", kind.label(), parse_error),
                    );
                    last_raw = Some(text);
                }
            },
            // Fails loud immediately: retrying cannot conjure a provider
            Err(e @ GenerateError::NotConfigured(_)) => {
                return Err(PipelineError::Generation(e))
            }
            Err(e) => {
                log.push(
                    PipelineStage::Transforming,
                    format!("attempt {} failed: {}", kind.label(), e),
                );
                last_error = e.to_string();
            }
        }
    }

    let snippet = match last_raw {
        Some(raw) => raw.chars().take(SNIPPET_LEN).collect(),
        None => last_error,
    };
    Err(PipelineError::MalformedOutput { snippet })
}

/// Retry transient transport failures with linear backoff, bounded by the
/// policy. Non-transient errors surface immediately.
async fn call_with_transport_retries(
    client: &dyn LlmClient,
    system: &str,
    prompt: &str,
    opts: &GenerateOptions,
    policy: &RetryPolicy,
    log: &mut StageLog,
) -> Result<String, GenerateError> {
    let mut attempt = 0u32;
    loop {
        match client.generate(system, prompt, opts).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < policy.max_transport_retries => {
                attempt += 1;
                log.push(
                    PipelineStage::Transforming,
                    format!(
                        "transient failure ({}), retry {} of {}",
                        e, attempt, policy.max_transport_retries
                    ),
                );
                tokio::time::sleep(Duration::from_millis(policy.backoff_ms * attempt as u64)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
