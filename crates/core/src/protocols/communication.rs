//! # Interpersonal Communication Protocol
//!
//! For content teaching conversation skills through wrong/right contrast
//! pairs. The script follows the wrong → question → discuss → right pattern
//! per pair, and group work must contain role-play structure.

use crate::ground_truth::rules::{self, ExtractionRules};
use crate::ground_truth::GroundTruth;
use crate::kit::{Collection, KitContent};
use crate::validate::{CheckKind, Finding};

use super::{
    backfill_media_slides, ensure_role_play, keyword_density, prompts, recompute_script_times,
    synthesize_discussion_from_pairs, used_fraction, ContentProtocol, CoverageRequirements,
    COMMUNICATION_ID,
};

const TERMS: &[&str] = &[
    "gesprek", "communicatie", "zeg", "vraag", "reactie", "empathie", "luister",
];

/// Minimum fraction of contrast pairs that must be used.
const MIN_PAIR_FRACTION: f64 = 0.5;

#[derive(Debug)]
pub struct CommunicationProtocol;

impl ContentProtocol for CommunicationProtocol {
    fn id(&self) -> &'static str {
        COMMUNICATION_ID
    }

    fn display_name(&self) -> &'static str {
        "Interpersonal Communication"
    }

    fn extraction_rules(&self) -> ExtractionRules {
        let mut rules = rules::base_rules();
        rules.merge(&rules::communication_extras());
        rules
    }

    fn detect_applicability(&self, gt: &GroundTruth) -> f64 {
        let base: f64 = if gt.pairs.len() >= 2 {
            0.85
        } else if gt.pairs.len() == 1 {
            0.5
        } else {
            0.0
        };
        (base + 0.15 * keyword_density(gt, TERMS)).min(1.0)
    }

    fn system_prompt(&self) -> &'static str {
        prompts::COMMUNICATION
    }

    fn prompt_requirements(&self, gt: &GroundTruth) -> String {
        format!(
            "Protocol requirements (interpersonal communication):\n\
             - For each contrast pair pairs[0] through pairs[{}], follow this script pattern: \
             present the wrong phrasing (grounded, with source_ref), ask the class a `question` \
             about it, discuss, then present the right phrasing.\n\
             - Add a discussion question per pair, each with its pairs[i] source_ref.\n\
             - Group work is a role-play: include roles, steps, and a rubric.\n",
            gt.pairs.len().saturating_sub(1)
        )
    }

    fn post_process(&self, mut content: KitContent, gt: &GroundTruth) -> KitContent {
        ensure_role_play(&mut content);
        synthesize_discussion_from_pairs(&mut content, gt, gt.pairs.len().min(3).max(1));
        recompute_script_times(&mut content);
        backfill_media_slides(&mut content, gt);
        content
    }

    fn validate(&self, content: &KitContent, gt: &GroundTruth) -> Vec<Finding> {
        let mut findings = Vec::new();

        if !gt.pairs.is_empty() {
            let used = used_fraction(content, gt, Collection::Pairs);
            if used < MIN_PAIR_FRACTION {
                findings.push(Finding::error(
                    CheckKind::Protocol,
                    format!(
                        "only {:.0}% of contrast pairs are used (minimum {:.0}%)",
                        used * 100.0,
                        MIN_PAIR_FRACTION * 100.0
                    ),
                ));
            }
        }

        if content.group_work.roles.is_empty() {
            findings.push(Finding::error(
                CheckKind::Protocol,
                "group work lacks role-play structure (no roles defined)",
            ));
        }

        findings
    }

    fn coverage_requirements(&self) -> CoverageRequirements {
        CoverageRequirements {
            collection: Collection::Pairs,
            min_fraction: MIN_PAIR_FRACTION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground_truth::extract;
    use crate::kit::{DiscussionQuestion, SourceRef};

    const TEXT: &str = "# Feedback geven\n\n\
        Over **feedbackregels** en **gespreksvoering** in het team.\n\n\
        fout: je doet het altijd verkeerd / goed: ik zag dat dit onderdeel anders liep\n\
        fout: meteen je oordeel geven / goed: eerst een open vraag stellen\n";

    fn gt() -> GroundTruth {
        extract("m", TEXT, &CommunicationProtocol.extraction_rules())
    }

    #[test]
    fn test_applicability_high_for_two_pairs() {
        let score = CommunicationProtocol.detect_applicability(&gt());
        assert!(score >= 0.85, "score was {}", score);
    }

    #[test]
    fn test_post_process_synthesizes_role_play_and_questions() {
        let gt = gt();
        let content = CommunicationProtocol.post_process(KitContent::default(), &gt);

        assert!(!content.group_work.roles.is_empty());
        assert!(!content.group_work.steps.is_empty());
        assert!(!content.discussion_questions.is_empty());
        assert!(content
            .discussion_questions
            .iter()
            .all(|q| q.source_ref.is_some()));
    }

    #[test]
    fn test_validate_requires_pair_usage() {
        let gt = gt();
        let content = KitContent::default();

        let findings = CommunicationProtocol.validate(&content, &gt);
        assert!(findings
            .iter()
            .any(|f| f.message.contains("contrast pairs")));
    }

    #[test]
    fn test_validate_passes_with_pairs_used_and_roles() {
        let gt = gt();
        let mut content = KitContent::default();
        content.group_work.roles = vec!["gever".into(), "ontvanger".into()];
        for i in 0..2 {
            content.discussion_questions.push(DiscussionQuestion {
                question: format!("Wat ging er mis in situatie {}?", i),
                source_ref: Some(SourceRef::new(Collection::Pairs, i)),
                expected_answers: None,
            });
        }
        assert!(CommunicationProtocol.validate(&content, &gt).is_empty());
    }
}
