//! # Rule-Based Repair
//!
//! Bounded repair of specific defect classes in a candidate Kit. Repair is
//! deterministic, never re-invokes generation, and does not guarantee
//! success - the validator re-counts errors afterwards and reports an
//! incomplete repair when the count did not drop.

use std::collections::HashSet;

use crate::ground_truth::GroundTruth;
use crate::kit::{ActionKind, Collection, KitContent, Phase, ScriptItem, SourceRef};

/// Minimum word-overlap ratio for backfilling a concept ref.
const FUZZY_MATCH_RATIO: f64 = 0.6;

/// Apply every repair rule that fires. Returns the repaired content and a
/// description of each action taken.
pub fn repair(mut content: KitContent, gt: &GroundTruth) -> (KitContent, Vec<String>) {
    let mut applied = Vec::new();

    if content.quick_start.one_liner.trim().is_empty() {
        fill_quick_start(&mut content, gt);
        applied.push("filled missing quick start from key concepts".to_string());
    }

    if content.teacher_script.is_empty() {
        synthesize_minimal_script(&mut content, gt);
        applied.push("synthesized minimal open/introduce/summary script".to_string());
    }

    let backfilled = backfill_source_refs(&mut content, gt);
    if backfilled > 0 {
        applied.push(format!(
            "backfilled {} missing source refs by fuzzy concept match",
            backfilled
        ));
    }

    (content, applied)
}

/// Fill the quick-start section from the first few key concepts.
fn fill_quick_start(content: &mut KitContent, gt: &GroundTruth) {
    let quick_start = &mut content.quick_start;
    quick_start.one_liner = match &gt.title {
        Some(title) => format!("Les over {}", title),
        None => "Les op basis van het bronmateriaal".to_string(),
    };
    if quick_start.key_concepts.is_empty() {
        quick_start.key_concepts = gt
            .key_concepts
            .iter()
            .take(3)
            .map(|c| c.text.clone())
            .collect();
    }
    if quick_start.check.trim().is_empty() {
        quick_start.check = match gt.key_concepts.first() {
            Some(concept) => format!("Wie kan uitleggen wat {} betekent?", concept.text),
            None => "Wat is je bijgebleven van deze les?".to_string(),
        };
    }
}

/// A minimal three-item script when the model returned none at all.
/// Only the introduce item is grounded, and it carries a valid ref.
fn synthesize_minimal_script(content: &mut KitContent, gt: &GroundTruth) {
    let topic = gt.title.clone().unwrap_or_else(|| "het onderwerp".to_string());

    let mut push = |phase: Phase, action: ActionKind, text: String, source_ref: Option<SourceRef>| {
        content.teacher_script.push(ScriptItem {
            time: String::new(),
            phase,
            action,
            content: text,
            source_ref,
            is_grounded: source_ref.is_some(),
            expected_answers: None,
            if_no_answer: None,
            slide: None,
        });
    };

    push(
        Phase::Start,
        ActionKind::Open,
        format!("Introduceer {} en peil de voorkennis", topic),
        None,
    );
    if let Some(concept) = gt.key_concepts.first() {
        push(
            Phase::Core,
            ActionKind::Introduce,
            format!("Behandel het begrip {}", concept.text),
            Some(SourceRef::new(Collection::KeyConcepts, 0)),
        );
    }
    push(
        Phase::Closing,
        ActionKind::Summary,
        "Vat de kernpunten samen en blik vooruit".to_string(),
        None,
    );

    crate::protocols::recompute_script_times(content);
}

/// Backfill a missing ref on grounded items by fuzzy-matching their content
/// against key-concept text. Items with no good match are left alone.
fn backfill_source_refs(content: &mut KitContent, gt: &GroundTruth) -> usize {
    let mut backfilled = 0;
    for item in &mut content.teacher_script {
        if !item.is_grounded || item.source_ref.is_some() {
            continue;
        }
        let item_words = word_set(&item.content);
        let best = gt
            .key_concepts
            .iter()
            .enumerate()
            .filter_map(|(i, concept)| {
                let concept_words = word_set(&concept.text);
                if concept_words.is_empty() {
                    return None;
                }
                let shared = concept_words.intersection(&item_words).count();
                let ratio = shared as f64 / concept_words.len() as f64;
                (ratio >= FUZZY_MATCH_RATIO).then_some((i, ratio))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((index, _)) = best {
            item.source_ref = Some(SourceRef::new(Collection::KeyConcepts, index));
            backfilled += 1;
        }
    }
    backfilled
}

fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|t| t.chars().count() >= 3)
        .map(|t| t.to_lowercase())
        .collect()
}
