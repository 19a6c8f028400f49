//! # Structural Extractor
//!
//! Pass 1: pattern-matches a fixed vocabulary of structural cues out of raw
//! marked-up text and emits an immutable Ground Truth. No generative model
//! is involved; given identical rule sets the output is a pure function of
//! the input. Malformed input never fails extraction - absent cues simply
//! yield empty collections.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};

use super::rules::{media_kind_from_url, ExtractionRules, MediaKindHint};
use super::{
    CorrectIncorrectPair, GroundTruth, KeyConcept, MediaAsset, ProcedureStep, SourceSpan, Warning,
    WarningKind,
};

/// Character-length bounds per collection; matches outside are rejected.
const CONCEPT_LEN: (usize, usize) = (3, 120);
const INSTRUCTION_LEN: (usize, usize) = (3, 300);
const WARNING_LEN: (usize, usize) = (3, 300);
const PAIR_SIDE_LEN: (usize, usize) = (2, 300);

/// Max characters kept in a `SourceSpan` excerpt.
const QUOTE_LEN: usize = 120;

/// SHA-256 fingerprint of raw source text, hex encoded.
pub fn source_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract a Ground Truth from raw text. See [`extract_at`].
pub fn extract(module_id: &str, raw_text: &str, rules: &ExtractionRules) -> GroundTruth {
    extract_at(module_id, raw_text, rules, Utc::now())
}

/// Extract a Ground Truth with an explicit timestamp, so re-runs over the
/// same input produce identical values.
pub fn extract_at(
    module_id: &str,
    raw_text: &str,
    rules: &ExtractionRules,
    at: DateTime<Utc>,
) -> GroundTruth {
    let plain_text = strip_markup(raw_text);
    let word_count = plain_text.split_whitespace().count();

    let key_concepts = extract_concepts(raw_text, rules);
    let procedures = extract_procedures(raw_text, rules);
    let warnings = extract_warnings(raw_text, rules);
    let pairs = extract_pairs(raw_text, rules);
    let media = extract_media(raw_text, rules);

    let has_step_by_step = procedures.len() >= 3;
    let has_pairs = pairs.len() >= 2;

    GroundTruth {
        module_id: module_id.to_string(),
        source_hash: source_hash(raw_text),
        extracted_at: at,
        title: extract_title(raw_text, rules),
        key_concepts,
        procedures,
        warnings,
        pairs,
        media,
        plain_text,
        word_count,
        has_step_by_step,
        has_pairs,
    }
}

// ============================================================================
// Per-collection extraction
// ============================================================================

fn extract_title(raw: &str, rules: &ExtractionRules) -> Option<String> {
    for re in &rules.titles {
        if let Some(caps) = re.captures(raw) {
            let title = normalize(&caps[1]);
            if !title.is_empty() && title.chars().count() <= 120 {
                return Some(title);
            }
        }
    }
    // Fallback: first non-empty line, truncated
    raw.lines()
        .map(|l| normalize(l.trim_start_matches('#')))
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(80).collect())
}

fn extract_concepts(raw: &str, rules: &ExtractionRules) -> Vec<KeyConcept> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for re in &rules.concepts {
        for caps in re.captures_iter(raw) {
            let m = caps.get(0).expect("full match");
            let text = normalize(&caps[1]);
            if !within(&text, CONCEPT_LEN) {
                continue;
            }
            if seen.insert(text.to_lowercase()) {
                out.push(KeyConcept {
                    text,
                    source: span(raw, m.start(), m.end()),
                });
            }
        }
    }
    out
}

fn extract_procedures(raw: &str, rules: &ExtractionRules) -> Vec<ProcedureStep> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for re in &rules.procedures {
        for caps in re.captures_iter(raw) {
            let m = caps.get(0).expect("full match");
            let step_number: u32 = match caps[1].parse() {
                Ok(n) => n,
                Err(_) => continue,
            };
            let instruction = normalize(&caps[2]);
            if !within(&instruction, INSTRUCTION_LEN) {
                continue;
            }
            if seen.insert(instruction.to_lowercase()) {
                out.push(ProcedureStep {
                    step_number,
                    instruction,
                    source: span(raw, m.start(), m.end()),
                });
            }
        }
    }
    // Declared step order, stable for equal numbers
    out.sort_by_key(|p| p.step_number);
    out
}

fn extract_warnings(raw: &str, rules: &ExtractionRules) -> Vec<Warning> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for re in &rules.warnings {
        for caps in re.captures_iter(raw) {
            let m = caps.get(0).expect("full match");
            let text = normalize(&caps[2]);
            if !within(&text, WARNING_LEN) {
                continue;
            }
            if seen.insert(text.to_lowercase()) {
                out.push(Warning {
                    text,
                    kind: warning_kind(&caps[1]),
                    source: span(raw, m.start(), m.end()),
                });
            }
        }
    }
    out
}

fn warning_kind(cue: &str) -> WarningKind {
    match cue.to_lowercase().as_str() {
        "tip" => WarningKind::Tip,
        "belangrijk" | "important" => WarningKind::Important,
        "gevaar" | "danger" => WarningKind::Danger,
        "aandachtspunt" | "attention" => WarningKind::AttentionPoint,
        // "let op", "pas op", "waarschuwing", "caution", "warning"
        _ => WarningKind::Caution,
    }
}

fn extract_pairs(raw: &str, rules: &ExtractionRules) -> Vec<CorrectIncorrectPair> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    let collect = |patterns: &[Regex], wrong_first: bool, out: &mut Vec<CorrectIncorrectPair>, seen: &mut HashSet<(String, String)>| {
        for re in patterns {
            for caps in re.captures_iter(raw) {
                let m = caps.get(0).expect("full match");
                let (wrong, right) = if wrong_first {
                    (normalize(&caps[1]), normalize(&caps[2]))
                } else {
                    (normalize(&caps[2]), normalize(&caps[1]))
                };
                if !within(&wrong, PAIR_SIDE_LEN) || !within(&right, PAIR_SIDE_LEN) {
                    continue;
                }
                // Unordered key: the same pair phrased right-first in the
                // source must not appear twice
                let (a, b) = (wrong.to_lowercase(), right.to_lowercase());
                let key = if a <= b { (a, b) } else { (b, a) };
                if seen.insert(key) {
                    out.push(CorrectIncorrectPair {
                        wrong,
                        right,
                        explanation: explanation_after(raw, m.end()),
                        source: span(raw, m.start(), m.end()),
                    });
                }
            }
        }
    };

    collect(&rules.pairs_wrong_first, true, &mut out, &mut seen);
    collect(&rules.pairs_right_first, false, &mut out, &mut seen);
    out
}

/// An explanation line directly after a pair match ("waarom: ...").
fn explanation_after(raw: &str, end: usize) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\A\s*(?:uitleg|waarom|toelichting|why|because)\s*:\s*([^\r\n]+)")
            .expect("static pattern")
    });
    let text = normalize(&re.captures(&raw[end..])?[1]);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn extract_media(raw: &str, rules: &ExtractionRules) -> Vec<MediaAsset> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for rule in &rules.media {
        for caps in rule.pattern.captures_iter(raw) {
            let m = caps.get(0).expect("full match");
            let url = match caps.get(rule.url_group) {
                Some(u) => u.as_str().trim().to_string(),
                None => continue,
            };
            if url.is_empty() || !seen.insert(url.to_lowercase()) {
                continue;
            }
            let caption = rule
                .caption_group
                .and_then(|g| caps.get(g))
                .map(|c| normalize(c.as_str()))
                .filter(|c| !c.is_empty());
            let kind = match rule.kind {
                MediaKindHint::FromUrl => media_kind_from_url(&url),
                MediaKindHint::Fixed(kind) => kind,
            };
            out.push(MediaAsset {
                kind,
                url,
                caption,
                source: span(raw, m.start(), m.end()),
            });
        }
    }
    out
}

// ============================================================================
// Text helpers
// ============================================================================

fn within(text: &str, bounds: (usize, usize)) -> bool {
    let len = text.chars().count();
    len >= bounds.0 && len <= bounds.1
}

fn span(raw: &str, start: usize, end: usize) -> SourceSpan {
    SourceSpan {
        start_offset: start,
        end_offset: end,
        source_quote: raw[start..end].chars().take(QUOTE_LEN).collect(),
    }
}

/// Strip markup from matched text and collapse whitespace.
fn normalize(text: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]+>").expect("static pattern"));
    let without_tags = tags.replace_all(text, " ");
    let cleaned: String = without_tags
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '`'))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(':').trim().to_string()
}

/// Reduce the whole document to plain prose for word counting and the
/// hallucination vocabulary.
fn strip_markup(raw: &str) -> String {
    static IMAGES: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let images = IMAGES.get_or_init(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("static pattern"));
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]+>").expect("static pattern"));

    let no_images = images.replace_all(raw, "$1");
    let no_tags = tags.replace_all(&no_images, " ");
    let cleaned: String = no_tags
        .chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '#'))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
