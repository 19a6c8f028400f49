//! # Procedural Skill Protocol
//!
//! For content teaching a physical or administrative procedure: numbered
//! steps, warnings at the moments they matter. The coverage rule is strict:
//! every extracted procedure step must appear as a demo action, in source
//! order.

use crate::ground_truth::rules::{self, ExtractionRules};
use crate::ground_truth::GroundTruth;
use crate::kit::{ActionKind, Collection, KitContent};
use crate::validate::{CheckKind, Finding};

use super::{
    backfill_media_slides, keyword_density, prompts, recompute_script_times,
    synthesize_discussion_from_pairs, ContentProtocol, CoverageRequirements, PROCEDURAL_ID,
};

/// Keyword bonus terms for applicability scoring.
const TERMS: &[&str] = &[
    "stap", "step", "handeling", "procedure", "techniek", "uitvoeren", "oefenen",
];

#[derive(Debug)]
pub struct ProceduralProtocol;

impl ContentProtocol for ProceduralProtocol {
    fn id(&self) -> &'static str {
        PROCEDURAL_ID
    }

    fn display_name(&self) -> &'static str {
        "Procedural Skill"
    }

    fn extraction_rules(&self) -> ExtractionRules {
        let mut rules = rules::base_rules();
        rules.merge(&rules::procedural_extras());
        rules
    }

    fn detect_applicability(&self, gt: &GroundTruth) -> f64 {
        let base: f64 = if gt.procedures.len() >= 3 && !gt.warnings.is_empty() {
            0.9
        } else if gt.procedures.len() >= 3 {
            0.75
        } else if !gt.procedures.is_empty() {
            0.35
        } else {
            0.0
        };
        (base + 0.1 * keyword_density(gt, TERMS)).min(1.0)
    }

    fn system_prompt(&self) -> &'static str {
        prompts::PROCEDURAL
    }

    fn prompt_requirements(&self, gt: &GroundTruth) -> String {
        let mut requirements = format!(
            "Protocol requirements (procedural skill):\n\
             - Create exactly one `demo` action per procedure step, in source order: \
             procedures[0] through procedures[{}]. Each demo is grounded and carries its source_ref.\n\
             - Let students practice: add at least one `exercise` action after the demos.\n",
            gt.procedures.len().saturating_sub(1)
        );
        if !gt.warnings.is_empty() {
            requirements.push_str(
                "- Weave every warning into the script at the moment it matters, each with its warnings[i] source_ref.\n",
            );
        }
        requirements
    }

    fn post_process(&self, mut content: KitContent, gt: &GroundTruth) -> KitContent {
        recompute_script_times(&mut content);
        backfill_media_slides(&mut content, gt);
        synthesize_discussion_from_pairs(&mut content, gt, gt.pairs.len().min(2));
        content
    }

    fn validate(&self, content: &KitContent, gt: &GroundTruth) -> Vec<Finding> {
        let mut findings = Vec::new();

        // Demo indices in script order, for completeness and ordering
        let demo_indices: Vec<usize> = content
            .teacher_script
            .iter()
            .filter(|item| item.action == ActionKind::Demo)
            .filter_map(|item| item.source_ref)
            .filter(|r| r.collection == Collection::Procedures && gt.resolves(r))
            .map(|r| r.index)
            .collect();

        for (i, step) in gt.procedures.iter().enumerate() {
            if !demo_indices.contains(&i) {
                findings.push(Finding::error(
                    CheckKind::Protocol,
                    format!(
                        "procedure step {} ('{}') has no demo action",
                        step.step_number, step.instruction
                    ),
                ));
            }
        }

        if demo_indices.windows(2).any(|w| w[0] > w[1]) {
            findings.push(Finding::error(
                CheckKind::Protocol,
                "demo actions appear out of source order",
            ));
        }

        findings
    }

    fn coverage_requirements(&self) -> CoverageRequirements {
        CoverageRequirements {
            collection: Collection::Procedures,
            min_fraction: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground_truth::extract;
    use crate::kit::{Phase, ScriptItem, SourceRef};

    const TEXT: &str = "# Verband aanleggen\n\n\
        Over **zwachteltechniek** en **drukverdeling**.\n\n\
        stap 1: ondersteun het gewricht\nstap 2: rol de zwachtel af\nstap 3: fixeer het uiteinde\n\n\
        let op: niet te strak aantrekken\n";

    fn gt() -> GroundTruth {
        extract("m", TEXT, &ProceduralProtocol.extraction_rules())
    }

    fn demo(index: usize) -> ScriptItem {
        ScriptItem {
            time: "5:00".into(),
            phase: Phase::Core,
            action: ActionKind::Demo,
            content: format!("Demonstreer stap {}", index + 1),
            source_ref: Some(SourceRef::new(Collection::Procedures, index)),
            is_grounded: true,
            expected_answers: None,
            if_no_answer: None,
            slide: None,
        }
    }

    #[test]
    fn test_applicability_high_for_steps_with_warning() {
        let score = ProceduralProtocol.detect_applicability(&gt());
        assert!(score >= 0.9, "score was {}", score);
    }

    #[test]
    fn test_validate_passes_when_all_steps_demoed_in_order() {
        let gt = gt();
        let mut content = KitContent::default();
        for i in 0..3 {
            content.teacher_script.push(demo(i));
        }
        assert!(ProceduralProtocol.validate(&content, &gt).is_empty());
    }

    #[test]
    fn test_validate_reports_missing_step_as_error() {
        let gt = gt();
        let mut content = KitContent::default();
        content.teacher_script.push(demo(0));
        content.teacher_script.push(demo(2));

        let findings = ProceduralProtocol.validate(&content, &gt);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("step 2"));
        assert_eq!(findings[0].severity, crate::validate::Severity::Error);
    }

    #[test]
    fn test_validate_reports_out_of_order_demos() {
        let gt = gt();
        let mut content = KitContent::default();
        content.teacher_script.push(demo(1));
        content.teacher_script.push(demo(0));
        content.teacher_script.push(demo(2));

        let findings = ProceduralProtocol.validate(&content, &gt);
        assert!(findings
            .iter()
            .any(|f| f.message.contains("out of source order")));
    }
}
