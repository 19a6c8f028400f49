//! # Ground Truth
//!
//! The deterministic fact base extracted from raw instructional text in
//! Pass 1. A Ground Truth is immutable once built: it is the only object
//! any groundedness claim is ever checked against, and it is superseded
//! (never updated) when the source text changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kit::{Collection, SourceRef};

pub mod extractor;
pub mod rules;

pub use extractor::{extract, extract_at, source_hash};
pub use rules::ExtractionRules;

/// Minimum words of source text needed to build a Kit.
pub const MIN_WORD_COUNT: usize = 100;
/// Minimum extracted key concepts needed to build a Kit.
pub const MIN_KEY_CONCEPTS: usize = 2;

// ============================================================================
// Provenance
// ============================================================================

/// A provenance pointer into the original text: character offsets plus a
/// short literal excerpt for human auditing. Produced only by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_offset: usize,
    pub end_offset: usize,
    pub source_quote: String,
}

// ============================================================================
// Extracted Collections
// ============================================================================

/// A key concept surfaced by emphasis markup or headings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConcept {
    pub text: String,
    pub source: SourceSpan,
}

/// One numbered step of a procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureStep {
    pub step_number: u32,
    pub instruction: String,
    pub source: SourceSpan,
}

/// Category of a warning call-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Tip,
    /// The Dutch "let op" cue maps here.
    Caution,
    Important,
    Danger,
    AttentionPoint,
}

/// A warning call-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub text: String,
    pub kind: WarningKind,
    pub source: SourceSpan,
}

/// A wrong/right contrast pair ("fout: ... / goed: ...").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectIncorrectPair {
    pub wrong: String,
    pub right: String,
    #[serde(default)]
    pub explanation: Option<String>,
    pub source: SourceSpan,
}

/// Kind of embedded media reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Animation,
    Embed,
}

/// An embedded media reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub kind: MediaKind,
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
    pub source: SourceSpan,
}

// ============================================================================
// Ground Truth
// ============================================================================

/// The sole artifact of Pass 1. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    /// Opaque external identifier of the source module.
    pub module_id: String,
    /// SHA-256 fingerprint of the raw text, for change detection.
    pub source_hash: String,
    pub extracted_at: DateTime<Utc>,
    /// Best-effort heading extraction.
    pub title: Option<String>,
    pub key_concepts: Vec<KeyConcept>,
    pub procedures: Vec<ProcedureStep>,
    pub warnings: Vec<Warning>,
    pub pairs: Vec<CorrectIncorrectPair>,
    pub media: Vec<MediaAsset>,
    /// Markup-stripped source text.
    pub plain_text: String,
    pub word_count: usize,
    /// At least 3 procedure steps were found.
    pub has_step_by_step: bool,
    /// At least 2 contrast pairs were found.
    pub has_pairs: bool,
}

impl GroundTruth {
    /// Number of items in one collection.
    pub fn collection_len(&self, collection: Collection) -> usize {
        match collection {
            Collection::KeyConcepts => self.key_concepts.len(),
            Collection::Procedures => self.procedures.len(),
            Collection::Warnings => self.warnings.len(),
            Collection::Pairs => self.pairs.len(),
            Collection::Media => self.media.len(),
        }
    }

    /// Total items across all collections, the coverage denominator.
    pub fn total_items(&self) -> usize {
        Collection::all()
            .iter()
            .map(|c| self.collection_len(*c))
            .sum()
    }

    /// Whether a source reference points at a real, in-range item.
    pub fn resolves(&self, source_ref: &SourceRef) -> bool {
        source_ref.index < self.collection_len(source_ref.collection)
    }
}

// ============================================================================
// Validity
// ============================================================================

/// Outcome of the Ground Truth validity gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruthValidity {
    pub is_valid: bool,
    pub reasons: Vec<String>,
    /// Protocol id suggested by simple structural cues.
    pub proposed_protocol: &'static str,
}

/// Reject Ground Truth too thin to build a Kit from, and propose a protocol
/// from structural cues. Fails loud: reasons are reported upward, never
/// silently patched.
pub fn validate_ground_truth(gt: &GroundTruth) -> GroundTruthValidity {
    let mut reasons = Vec::new();

    if gt.word_count < MIN_WORD_COUNT {
        reasons.push(format!(
            "source text too thin: {} words (minimum {})",
            gt.word_count, MIN_WORD_COUNT
        ));
    }
    if gt.key_concepts.len() < MIN_KEY_CONCEPTS {
        reasons.push(format!(
            "too few key concepts: {} (minimum {})",
            gt.key_concepts.len(),
            MIN_KEY_CONCEPTS
        ));
    }

    let proposed_protocol = if gt.procedures.len() >= 3 {
        crate::protocols::PROCEDURAL_ID
    } else if gt.pairs.len() >= 2 {
        crate::protocols::COMMUNICATION_ID
    } else {
        crate::protocols::THEORY_ID
    };

    GroundTruthValidity {
        is_valid: reasons.is_empty(),
        reasons,
        proposed_protocol,
    }
}
