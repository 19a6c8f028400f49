//! # Content Protocols
//!
//! A protocol is a named strategy for one class of instructional content.
//! Each bundles its extraction-rule variant, applicability scorer, prompt
//! pieces, post-processor, validator, and coverage requirements. Exactly one
//! protocol is bound to a Kit build and recorded on the Kit for
//! reproducibility.
//!
//! The set is closed: procedural-skill, interpersonal-communication, and
//! conceptual-theory (the default). Selection resolves the active protocol
//! once per build; it is then threaded explicitly through the passes.

use std::sync::Arc;

use crate::ground_truth::rules::{self, ExtractionRules};
use crate::ground_truth::{GroundTruth, MediaKind};
use crate::kit::{Collection, DiscussionQuestion, KitContent, SlideAsset, SourceRef};
use crate::pipeline::PipelineError;
use crate::validate::Finding;

pub mod communication;
pub mod procedural;
pub mod prompts;
pub mod theory;

pub use communication::CommunicationProtocol;
pub use procedural::ProceduralProtocol;
pub use theory::TheoryProtocol;

pub const PROCEDURAL_ID: &str = "procedural-skill";
pub const COMMUNICATION_ID: &str = "interpersonal-communication";
pub const THEORY_ID: &str = "conceptual-theory";

/// Coverage floor a protocol demands over its primary collection.
#[derive(Debug, Clone, Copy)]
pub struct CoverageRequirements {
    pub collection: Collection,
    /// Minimum fraction of the collection that must be referenced.
    pub min_fraction: f64,
}

/// One content strategy. All operations are deterministic except the prompt
/// text they contribute to the (external) generation call.
pub trait ContentProtocol: Send + Sync + std::fmt::Debug {
    fn id(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    /// This protocol's extraction-rule variant (base set plus extras).
    fn extraction_rules(&self) -> ExtractionRules;

    /// Applicability of this protocol to a Ground Truth, in [0, 1].
    /// Deterministic: structural counts plus a keyword-density bonus.
    fn detect_applicability(&self, gt: &GroundTruth) -> f64;

    /// The protocol's system instruction (pedagogical rules).
    fn system_prompt(&self) -> &'static str;

    /// Protocol-specific requirement block appended to the user prompt.
    fn prompt_requirements(&self, gt: &GroundTruth) -> String;

    /// Deterministic cleanup of a parsed candidate. May add or reorder
    /// content but must not invent grounded claims without a valid ref.
    fn post_process(&self, content: KitContent, gt: &GroundTruth) -> KitContent;

    /// Protocol-specific minimum-coverage findings.
    fn validate(&self, content: &KitContent, gt: &GroundTruth) -> Vec<Finding>;

    fn coverage_requirements(&self) -> CoverageRequirements;
}

// ============================================================================
// Registry
// ============================================================================

/// Registry of the known protocols, in registration order.
pub struct ProtocolRegistry {
    protocols: Vec<Arc<dyn ContentProtocol>>,
}

impl ProtocolRegistry {
    /// The standard registry: procedural, communication, theory.
    pub fn with_defaults() -> Self {
        Self {
            protocols: vec![
                Arc::new(ProceduralProtocol),
                Arc::new(CommunicationProtocol),
                Arc::new(TheoryProtocol),
            ],
        }
    }

    pub fn register(&mut self, protocol: Arc<dyn ContentProtocol>) {
        self.protocols.push(protocol);
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.protocols.iter().map(|p| p.id()).collect()
    }

    /// Look up a protocol by id. Callers forcing an id must handle the
    /// unknown-protocol error.
    pub fn get(&self, id: &str) -> Result<Arc<dyn ContentProtocol>, PipelineError> {
        self.protocols
            .iter()
            .find(|p| p.id() == id)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownProtocol(id.to_string()))
    }

    /// Pick the protocol with the highest applicability score. Ties favor
    /// registration order; an all-zero board falls back to the default, so
    /// selection never fails.
    pub fn select(&self, gt: &GroundTruth) -> Arc<dyn ContentProtocol> {
        let mut best: Option<(f64, &Arc<dyn ContentProtocol>)> = None;
        for protocol in &self.protocols {
            let score = protocol.detect_applicability(gt);
            match best {
                Some((top, _)) if score <= top => {}
                _ => best = Some((score, protocol)),
            }
        }
        match best {
            Some((score, protocol)) if score > 0.0 => protocol.clone(),
            _ => self.default_protocol(),
        }
    }

    /// The designated fallback: conceptual-theory, or the first registered
    /// protocol if theory was replaced.
    pub fn default_protocol(&self) -> Arc<dyn ContentProtocol> {
        self.protocols
            .iter()
            .find(|p| p.id() == THEORY_ID)
            .or_else(|| self.protocols.first())
            .cloned()
            .expect("registry is never empty")
    }

    /// Union of all registered rule sets, for protocol-agnostic extraction.
    pub fn pooled_rules(&self) -> ExtractionRules {
        let mut pooled = rules::base_rules();
        for protocol in &self.protocols {
            pooled.merge(&protocol.extraction_rules());
        }
        pooled
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Shared scoring & post-processing helpers
// ============================================================================

/// Fraction of the term list present in the plain text, used as a small
/// applicability bonus on top of structural counts.
pub(crate) fn keyword_density(gt: &GroundTruth, terms: &[&str]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let text = gt.plain_text.to_lowercase();
    let hits = terms.iter().filter(|t| text.contains(*t)).count();
    hits as f64 / terms.len() as f64
}

/// Recompute script-item timestamps from phase order and the declared time
/// allocation. Items keep their in-phase order; each phase's items are
/// spread evenly over its allocation.
pub(crate) fn recompute_script_times(content: &mut KitContent) {
    if content.quick_start.time_allocation.total() == 0 {
        content.quick_start.time_allocation = crate::kit::TimeAllocation {
            start: 5,
            core: 15,
            closing: 5,
        };
    }
    let alloc = content.quick_start.time_allocation;

    content.teacher_script.sort_by_key(|i| i.phase.rank());

    let phase_start = |rank: u8| match rank {
        0 => 0,
        1 => alloc.start,
        _ => alloc.start + alloc.core,
    };
    let phase_len = |rank: u8| match rank {
        0 => alloc.start,
        1 => alloc.core,
        _ => alloc.closing,
    };

    for rank in 0..3u8 {
        let indices: Vec<usize> = content
            .teacher_script
            .iter()
            .enumerate()
            .filter(|(_, i)| i.phase.rank() == rank)
            .map(|(idx, _)| idx)
            .collect();
        let count = indices.len() as u32;
        for (j, idx) in indices.into_iter().enumerate() {
            let offset = phase_start(rank) + (j as u32 * phase_len(rank)) / count.max(1);
            content.teacher_script[idx].time = crate::kit::format_minutes(offset);
        }
    }
}

/// Append slides for Ground-Truth media not yet surfaced in the slide
/// assets. Backfilled slides carry a valid `media[i]` ref.
pub(crate) fn backfill_media_slides(content: &mut KitContent, gt: &GroundTruth) {
    for (i, asset) in gt.media.iter().enumerate() {
        let source_ref = SourceRef::new(Collection::Media, i);
        let already_surfaced = content.slide_assets.iter().any(|s| {
            s.source_ref == Some(source_ref)
                || s.image_url.as_deref() == Some(asset.url.as_str())
                || s.animation_url.as_deref() == Some(asset.url.as_str())
        });
        if already_surfaced {
            continue;
        }
        let slide = content
            .slide_assets
            .iter()
            .map(|s| s.slide)
            .max()
            .unwrap_or(content.teacher_script.len() as u32)
            + 1;
        let (image_url, animation_url) = match asset.kind {
            MediaKind::Animation | MediaKind::Video => (None, Some(asset.url.clone())),
            _ => (Some(asset.url.clone()), None),
        };
        content.slide_assets.push(SlideAsset {
            slide,
            title: asset
                .caption
                .clone()
                .unwrap_or_else(|| "Beeldmateriaal".to_string()),
            bullets: Vec::new(),
            image_url,
            animation_url,
            source_ref: Some(source_ref),
        });
    }
}

/// Synthesize discussion questions from contrast pairs the model left
/// unused, until `min_count` is reached (or pairs run out). Synthesized
/// questions carry a valid `pairs[i]` ref.
pub(crate) fn synthesize_discussion_from_pairs(
    content: &mut KitContent,
    gt: &GroundTruth,
    min_count: usize,
) {
    for (i, pair) in gt.pairs.iter().enumerate() {
        if content.discussion_questions.len() >= min_count {
            break;
        }
        let source_ref = SourceRef::new(Collection::Pairs, i);
        if content
            .discussion_questions
            .iter()
            .any(|q| q.source_ref == Some(source_ref))
        {
            continue;
        }
        content.discussion_questions.push(DiscussionQuestion {
            question: format!("Waarom is \"{}\" niet de juiste aanpak?", pair.wrong),
            source_ref: Some(source_ref),
            expected_answers: Some(vec![pair.right.clone()]),
        });
    }
}

/// Make sure the group-work section has a minimal role-play structure.
pub(crate) fn ensure_role_play(content: &mut KitContent) {
    let group_work = &mut content.group_work;
    if group_work.title.is_empty() {
        group_work.title = "Rollenspel".to_string();
    }
    if group_work.duration_minutes == 0 {
        group_work.duration_minutes = 10;
    }
    if group_work.group_size == 0 {
        group_work.group_size = 3;
    }
    if group_work.roles.is_empty() {
        group_work.roles = vec![
            "zorgverlener".to_string(),
            "patiënt".to_string(),
            "observator".to_string(),
        ];
    }
    if group_work.steps.is_empty() {
        group_work.steps = vec![
            "Verdeel de rollen binnen de groep".to_string(),
            "Speel de situatie na".to_string(),
            "De observator noteert wat goed en fout ging".to_string(),
            "Wissel van rol en herhaal".to_string(),
        ];
    }
    if group_work.rubric.is_empty() {
        group_work.rubric = vec![
            "Gebruikt de juiste formulering".to_string(),
            "Reageert op de ander".to_string(),
        ];
    }
}

/// Fraction of one Ground-Truth collection referenced by resolvable refs.
pub(crate) fn used_fraction(content: &KitContent, gt: &GroundTruth, collection: Collection) -> f64 {
    let total = gt.collection_len(collection);
    if total == 0 {
        return 1.0;
    }
    let used: std::collections::HashSet<usize> = content
        .all_source_refs()
        .into_iter()
        .filter(|r| r.collection == collection && gt.resolves(r))
        .map(|r| r.index)
        .collect();
    used.len() as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground_truth::extractor::extract;
    use crate::ground_truth::rules::base_rules;

    const PROCEDURAL_TEXT: &str = "# Wondverzorging\n\n\
        De **steriele techniek** en het **wondgaas** staan centraal.\n\n\
        stap 1: was je handen\nstap 2: verwijder het oude verband\n\
        stap 3: breng het nieuwe gaas aan\n\n\
        let op: raak de wond niet aan\n";

    const PAIRS_TEXT: &str = "# Slecht nieuws gesprek\n\n\
        Over **empathie** en **luisteren** in het gesprek.\n\n\
        fout: direct doorpraten / goed: eerst stilte laten vallen\n\
        fout: medisch jargon gebruiken / goed: begrijpelijke woorden kiezen\n";

    #[test]
    fn test_selection_prefers_procedural_for_steps() {
        let registry = ProtocolRegistry::with_defaults();
        let gt = extract("m", PROCEDURAL_TEXT, &registry.pooled_rules());
        assert_eq!(registry.select(&gt).id(), PROCEDURAL_ID);
    }

    #[test]
    fn test_selection_prefers_communication_for_pairs() {
        let registry = ProtocolRegistry::with_defaults();
        let gt = extract("m", PAIRS_TEXT, &registry.pooled_rules());
        assert_eq!(registry.select(&gt).id(), COMMUNICATION_ID);
    }

    #[test]
    fn test_selection_is_pure() {
        let registry = ProtocolRegistry::with_defaults();
        let gt = extract("m", PAIRS_TEXT, &registry.pooled_rules());
        let first = registry.select(&gt).id();
        for _ in 0..5 {
            assert_eq!(registry.select(&gt).id(), first);
        }
    }

    #[test]
    fn test_selection_falls_back_to_theory() {
        let registry = ProtocolRegistry::with_defaults();
        // No structure at all: every scorer sits at (or near) zero
        let gt = extract("m", "los zand zonder enige structuur", &base_rules());
        assert_eq!(registry.select(&gt).id(), THEORY_ID);
    }

    #[test]
    fn test_get_unknown_protocol_fails() {
        let registry = ProtocolRegistry::with_defaults();
        let err = registry.get("bogus").unwrap_err();
        assert!(err.to_string().contains("unknown protocol"));
    }

    #[test]
    fn test_pooled_rules_include_protocol_extras() {
        let registry = ProtocolRegistry::with_defaults();
        let pooled = registry.pooled_rules();
        assert!(pooled.procedures.len() > base_rules().procedures.len());
    }

    #[test]
    fn test_recompute_times_spreads_phases() {
        use crate::kit::{ActionKind, Phase, ScriptItem};
        let mut content = KitContent::default();
        content.quick_start.time_allocation = crate::kit::TimeAllocation {
            start: 4,
            core: 10,
            closing: 4,
        };
        for (phase, action) in [
            (Phase::Closing, ActionKind::Summary),
            (Phase::Start, ActionKind::Open),
            (Phase::Core, ActionKind::Demo),
            (Phase::Core, ActionKind::Check),
        ] {
            content.teacher_script.push(ScriptItem {
                time: String::new(),
                phase,
                action,
                content: "x".into(),
                source_ref: None,
                is_grounded: false,
                expected_answers: None,
                if_no_answer: None,
                slide: None,
            });
        }
        recompute_script_times(&mut content);

        let times: Vec<&str> = content
            .teacher_script
            .iter()
            .map(|i| i.time.as_str())
            .collect();
        // Start at 0:00, core spread over [4, 14), closing at 14:00
        assert_eq!(times, vec!["0:00", "4:00", "9:00", "14:00"]);
        assert_eq!(content.teacher_script[0].phase, Phase::Start);
    }

    #[test]
    fn test_backfill_media_slides_adds_valid_ref() {
        let registry = ProtocolRegistry::with_defaults();
        let text = format!(
            "{}\n![doorsnede van de huid](https://cdn.example.test/huid.png)\n",
            PROCEDURAL_TEXT
        );
        let gt = extract("m", &text, &registry.pooled_rules());
        assert_eq!(gt.media.len(), 1);

        let mut content = KitContent::default();
        backfill_media_slides(&mut content, &gt);
        assert_eq!(content.slide_assets.len(), 1);
        let slide = &content.slide_assets[0];
        assert_eq!(slide.source_ref, Some(SourceRef::new(Collection::Media, 0)));
        assert!(gt.resolves(&slide.source_ref.unwrap()));
        assert_eq!(slide.title, "doorsnede van de huid");

        // Idempotent: a second pass adds nothing
        backfill_media_slides(&mut content, &gt);
        assert_eq!(content.slide_assets.len(), 1);
    }

    #[test]
    fn test_synthesize_discussion_uses_unused_pairs() {
        let registry = ProtocolRegistry::with_defaults();
        let gt = extract("m", PAIRS_TEXT, &registry.pooled_rules());
        assert_eq!(gt.pairs.len(), 2);

        let mut content = KitContent::default();
        synthesize_discussion_from_pairs(&mut content, &gt, 2);
        assert_eq!(content.discussion_questions.len(), 2);
        assert!(content
            .discussion_questions
            .iter()
            .all(|q| q.source_ref.is_some()));
    }
}
