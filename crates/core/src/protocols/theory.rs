//! # Conceptual Theory Protocol
//!
//! The default protocol: concept-driven content without procedures or
//! contrast pairs. One introduce action per key concept, media surfaced on
//! slides where it exists.

use crate::ground_truth::rules::{self, ExtractionRules};
use crate::ground_truth::GroundTruth;
use crate::kit::{Collection, KitContent};
use crate::validate::{CheckKind, Finding};

use super::{
    backfill_media_slides, keyword_density, prompts, recompute_script_times,
    synthesize_discussion_from_pairs, ContentProtocol, CoverageRequirements, THEORY_ID,
};

const TERMS: &[&str] = &[
    "begrip", "theorie", "definitie", "model", "concept", "principe",
];

#[derive(Debug)]
pub struct TheoryProtocol;

impl TheoryProtocol {
    /// Minimum concepts that must be referenced: three, or all of them for
    /// thinner material.
    fn min_concepts_used(gt: &GroundTruth) -> usize {
        gt.key_concepts.len().min(3)
    }
}

impl ContentProtocol for TheoryProtocol {
    fn id(&self) -> &'static str {
        THEORY_ID
    }

    fn display_name(&self) -> &'static str {
        "Conceptual Theory"
    }

    fn extraction_rules(&self) -> ExtractionRules {
        let mut rules = rules::base_rules();
        rules.merge(&rules::theory_extras());
        rules
    }

    fn detect_applicability(&self, gt: &GroundTruth) -> f64 {
        let base: f64 = if gt.key_concepts.len() >= 4 {
            0.55
        } else if gt.key_concepts.len() >= 2 {
            0.35
        } else {
            0.0
        };
        (base + 0.15 * keyword_density(gt, TERMS)).min(1.0)
    }

    fn system_prompt(&self) -> &'static str {
        prompts::THEORY
    }

    fn prompt_requirements(&self, gt: &GroundTruth) -> String {
        let mut requirements = format!(
            "Protocol requirements (conceptual theory):\n\
             - Create one `introduce` action per key concept, in order: key_concepts[0] \
             through key_concepts[{}], each grounded with its source_ref.\n\
             - After every two concepts, add a `check` action probing understanding.\n",
            gt.key_concepts.len().saturating_sub(1)
        );
        if !gt.media.is_empty() {
            requirements.push_str(
                "- Reference the available media on slides, each with its media[i] source_ref.\n",
            );
        }
        requirements
    }

    fn post_process(&self, mut content: KitContent, gt: &GroundTruth) -> KitContent {
        recompute_script_times(&mut content);
        backfill_media_slides(&mut content, gt);
        if !gt.pairs.is_empty() {
            synthesize_discussion_from_pairs(&mut content, gt, 1);
        }
        content
    }

    fn validate(&self, content: &KitContent, gt: &GroundTruth) -> Vec<Finding> {
        let mut findings = Vec::new();

        let used_concepts: std::collections::HashSet<usize> = content
            .all_source_refs()
            .into_iter()
            .filter(|r| r.collection == Collection::KeyConcepts && gt.resolves(r))
            .map(|r| r.index)
            .collect();
        let minimum = Self::min_concepts_used(gt);
        if used_concepts.len() < minimum {
            findings.push(Finding::error(
                CheckKind::Protocol,
                format!(
                    "only {} of {} key concepts are used (minimum {})",
                    used_concepts.len(),
                    gt.key_concepts.len(),
                    minimum
                ),
            ));
        }

        if !gt.media.is_empty() {
            let surfaced = gt.media.iter().enumerate().any(|(i, asset)| {
                content.slide_assets.iter().any(|s| {
                    s.source_ref
                        .map_or(false, |r| r.collection == Collection::Media && r.index == i)
                        || s.image_url.as_deref() == Some(asset.url.as_str())
                        || s.animation_url.as_deref() == Some(asset.url.as_str())
                })
            });
            if !surfaced {
                findings.push(Finding::warning(
                    CheckKind::Protocol,
                    "media assets exist but none are surfaced in the slides",
                ));
            }
        }

        findings
    }

    fn coverage_requirements(&self) -> CoverageRequirements {
        CoverageRequirements {
            collection: Collection::KeyConcepts,
            min_fraction: 0.6,
        }
    }
}
