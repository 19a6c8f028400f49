//! # Deterministic Scaffold
//!
//! A minimal Kit built only from the first few Ground-Truth concepts, for
//! offline and debugging use when the caller explicitly opts out of
//! generation. Always flagged for review.

use crate::ground_truth::GroundTruth;
use crate::kit::{
    ActionKind, Collection, Exercise, Kit, KitContent, Phase, ScriptItem, SourceRef,
    TimeAllocation,
};
use crate::protocols::ContentProtocol;

/// Concepts the scaffold covers.
const SCAFFOLD_CONCEPTS: usize = 3;

/// Build the scaffold Kit. Grounded scaffold items always carry valid
/// refs, so the scaffold scores full grounding by construction.
pub fn scaffold_kit(gt: &GroundTruth, protocol: &dyn ContentProtocol) -> Kit {
    let topic = gt
        .title
        .clone()
        .unwrap_or_else(|| "het onderwerp".to_string());

    let mut content = KitContent::default();
    content.quick_start.one_liner = format!("Les over {}", topic);
    content.quick_start.key_concepts = gt
        .key_concepts
        .iter()
        .take(SCAFFOLD_CONCEPTS)
        .map(|c| c.text.clone())
        .collect();
    content.quick_start.check = match gt.key_concepts.first() {
        Some(concept) => format!("Wie kan uitleggen wat {} betekent?", concept.text),
        None => "Wat is je bijgebleven van deze les?".to_string(),
    };
    content.quick_start.time_allocation = TimeAllocation {
        start: 5,
        core: 15,
        closing: 5,
    };

    let mut push = |phase, action, text: String, source_ref: Option<SourceRef>| {
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
    for (i, concept) in gt.key_concepts.iter().take(SCAFFOLD_CONCEPTS).enumerate() {
        push(
            Phase::Core,
            ActionKind::Introduce,
            format!("Behandel het begrip {}", concept.text),
            Some(SourceRef::new(Collection::KeyConcepts, i)),
        );
    }
    push(
        Phase::Closing,
        ActionKind::Check,
        "Stel de controlevraag uit de quick start".to_string(),
        None,
    );
    push(
        Phase::Closing,
        ActionKind::Summary,
        "Vat de kernpunten samen".to_string(),
        None,
    );

    content.student_handout.title = format!("Werkblad: {}", topic);
    content.student_handout.exercises = gt
        .key_concepts
        .iter()
        .take(2)
        .enumerate()
        .map(|(i, concept)| Exercise {
            prompt: format!("Omschrijf in je eigen woorden: {}", concept.text),
            source_ref: Some(SourceRef::new(Collection::KeyConcepts, i)),
        })
        .collect();

    // The protocol's deterministic post-processing applies here too
    let content = protocol.post_process(content, gt);

    let mut kit = Kit::from_content(content, protocol.id(), &gt.source_hash);
    kit.needs_review = true;
    kit.review_reasons
        .push("deterministic scaffold: generation was skipped by caller request".to_string());
    kit
}
