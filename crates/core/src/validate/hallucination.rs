//! # Hallucination Heuristic
//!
//! Builds a vocabulary of significant terms from everything in the Ground
//! Truth, then scans grounded script content for technical-looking words
//! (by jargon suffix) that have no presence or substring overlap in that
//! vocabulary. Tuned to catch fabricated technical vocabulary, not
//! paraphrase drift.
//!
//! The suffix set is configuration, not a universal rule: the default
//! covers Dutch/Latin medical-technical word endings and should be swapped
//! per deployment language.

use std::collections::HashSet;

use crate::ground_truth::GroundTruth;
use crate::kit::KitContent;

/// Minimum length for vocabulary terms.
const VOCAB_TOKEN_LEN: usize = 4;

/// Configuration for the jargon heuristic.
#[derive(Debug, Clone)]
pub struct HallucinationConfig {
    /// Minimum candidate length, in characters.
    pub min_token_len: usize,
    /// Word endings that mark a token as technical-looking.
    pub jargon_suffixes: Vec<String>,
}

impl Default for HallucinationConfig {
    fn default() -> Self {
        Self {
            min_token_len: 6,
            jargon_suffixes: [
                "atie", "itie", "logie", "isme", "iteit", "ose", "itis", "ase", "yse",
                "scopie", "grafie", "emie", "pathie", "ectomie", "ology", "osis",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Every significant term appearing anywhere in the Ground Truth: plain
/// text plus all extracted fields.
pub fn build_vocabulary(gt: &GroundTruth) -> HashSet<String> {
    let mut vocabulary = HashSet::new();
    let mut add = |text: &str| {
        for token in tokenize(text) {
            if token.chars().count() >= VOCAB_TOKEN_LEN {
                vocabulary.insert(token);
            }
        }
    };

    add(&gt.plain_text);
    if let Some(title) = &gt.title {
        add(title);
    }
    for concept in &gt.key_concepts {
        add(&concept.text);
    }
    for step in &gt.procedures {
        add(&step.instruction);
    }
    for warning in &gt.warnings {
        add(&warning.text);
    }
    for pair in &gt.pairs {
        add(&pair.wrong);
        add(&pair.right);
        if let Some(explanation) = &pair.explanation {
            add(explanation);
        }
    }
    for asset in &gt.media {
        if let Some(caption) = &asset.caption {
            add(caption);
        }
    }

    vocabulary
}

/// Scan grounded script content for jargon-suffixed terms absent from the
/// vocabulary. Each survivor is a candidate hallucination - a heuristic,
/// not a proof.
pub fn detect(content: &KitContent, gt: &GroundTruth, config: &HallucinationConfig) -> Vec<String> {
    let vocabulary = build_vocabulary(gt);
    let mut reported = HashSet::new();
    let mut survivors = Vec::new();

    for item in content.grounded_items() {
        for token in tokenize(&item.content) {
            if token.chars().count() < config.min_token_len {
                continue;
            }
            if !config.jargon_suffixes.iter().any(|s| token.ends_with(s.as_str())) {
                continue;
            }
            if vocabulary.contains(&token) {
                continue;
            }
            // Substring overlap with any vocabulary term exonerates:
            // inflections and compounds are not fabrications
            let overlaps = vocabulary
                .iter()
                .any(|word| word.contains(&token) || token.contains(word.as_str()));
            if overlaps {
                continue;
            }
            if reported.insert(token.clone()) {
                survivors.push(token);
            }
        }
    }

    survivors
}

/// Lowercased alphabetic tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}
