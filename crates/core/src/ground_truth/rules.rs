//! # Extraction Rules
//!
//! Regex rule sets for Pass 1. Each content protocol contributes its own
//! variant on top of the base set; when no protocol is forced, the rule
//! sets of all registered protocols are pooled so extraction stays
//! protocol-agnostic.
//!
//! The cue vocabulary is bilingual (Dutch/English) because the source
//! material mixes both.

use regex::Regex;

use super::MediaKind;

/// How a media rule decides the asset kind.
#[derive(Debug, Clone, Copy)]
pub enum MediaKindHint {
    /// Derive from the URL's file extension.
    FromUrl,
    Fixed(MediaKind),
}

/// One media-matching rule: where the URL and caption live in the captures.
#[derive(Debug, Clone)]
pub struct MediaRule {
    pub pattern: Regex,
    pub url_group: usize,
    pub caption_group: Option<usize>,
    pub kind: MediaKindHint,
}

/// A compiled set of extraction patterns.
///
/// Capture conventions: procedures capture (step number, instruction);
/// warnings capture (cue word, text); pair patterns capture the two sides
/// in the order named by the field.
#[derive(Debug, Clone, Default)]
pub struct ExtractionRules {
    pub titles: Vec<Regex>,
    pub concepts: Vec<Regex>,
    pub procedures: Vec<Regex>,
    pub warnings: Vec<Regex>,
    pub pairs_wrong_first: Vec<Regex>,
    pub pairs_right_first: Vec<Regex>,
    pub media: Vec<MediaRule>,
}

impl ExtractionRules {
    /// Merge another rule set in, skipping patterns already present.
    /// Used to pool the rule sets of all registered protocols.
    pub fn merge(&mut self, other: &ExtractionRules) {
        merge_regexes(&mut self.titles, &other.titles);
        merge_regexes(&mut self.concepts, &other.concepts);
        merge_regexes(&mut self.procedures, &other.procedures);
        merge_regexes(&mut self.warnings, &other.warnings);
        merge_regexes(&mut self.pairs_wrong_first, &other.pairs_wrong_first);
        merge_regexes(&mut self.pairs_right_first, &other.pairs_right_first);
        for rule in &other.media {
            if !self
                .media
                .iter()
                .any(|m| m.pattern.as_str() == rule.pattern.as_str())
            {
                self.media.push(rule.clone());
            }
        }
    }
}

fn merge_regexes(into: &mut Vec<Regex>, from: &[Regex]) {
    for re in from {
        if !into.iter().any(|r| r.as_str() == re.as_str()) {
            into.push(re.clone());
        }
    }
}

/// Compile a hardcoded pattern. All patterns in this module are static and
/// covered by the compile-all test below.
fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static extraction pattern")
}

/// The base rule set shared by every protocol.
pub fn base_rules() -> ExtractionRules {
    ExtractionRules {
        titles: vec![
            rx(r"(?m)^#\s+(.+)$"),
            rx(r"(?is)<h1[^>]*>(.*?)</h1>"),
        ],
        concepts: vec![
            rx(r"\*\*([^*\n]+)\*\*"),
            rx(r"__([^_\n]+)__"),
            rx(r"(?is)<strong[^>]*>(.*?)</strong>"),
            rx(r"(?is)<b[^>]*>(.*?)</b>"),
            rx(r"(?m)^#{2,3}\s+(.+)$"),
        ],
        procedures: vec![
            rx(r"(?mi)^\s*(?:stap|step)\s*(\d{1,3})\s*[:.)\-]\s*(.+)$"),
            rx(r"(?m)^\s*(\d{1,3})[.)]\s+(.+)$"),
        ],
        warnings: vec![rx(
            r"(?mi)^\s*(?:>\s*)?(let op|pas op|waarschuwing|caution|warning|tip|belangrijk|important|gevaar|danger|aandachtspunt|attention)\s*[:!]\s*(.+)$",
        )],
        // The two-line variants exclude '/' and ';' from their captures so a
        // single-line "fout: x / goed: y" never also matches as two-line
        pairs_wrong_first: vec![
            rx(r"(?mi)(?:fout|verkeerd|wrong|incorrect)\s*:\s*([^/;\r\n]+?)\s*[/;]\s*(?:goed|juist|right|correct)\s*:\s*([^\r\n]+)"),
            rx(r"(?mi)^[ \t]*(?:fout|verkeerd|wrong|incorrect)\s*:\s*([^/;\r\n]+)\r?\n[ \t]*(?:goed|juist|right|correct)\s*:\s*([^/;\r\n]+)$"),
        ],
        pairs_right_first: vec![
            rx(r"(?mi)(?:goed|juist|right|correct)\s*:\s*([^/;\r\n]+?)\s*[/;]\s*(?:fout|verkeerd|wrong|incorrect)\s*:\s*([^\r\n]+)"),
            rx(r"(?mi)^[ \t]*(?:goed|juist|right|correct)\s*:\s*([^/;\r\n]+)\r?\n[ \t]*(?:fout|verkeerd|wrong|incorrect)\s*:\s*([^/;\r\n]+)$"),
        ],
        media: vec![
            MediaRule {
                pattern: rx(r"!\[([^\]]*)\]\(([^)\s]+)\)"),
                url_group: 2,
                caption_group: Some(1),
                kind: MediaKindHint::FromUrl,
            },
            MediaRule {
                pattern: rx(r#"(?i)<img[^>]*src\s*=\s*["']([^"']+)["'][^>]*>"#),
                url_group: 1,
                caption_group: None,
                kind: MediaKindHint::FromUrl,
            },
            MediaRule {
                pattern: rx(r#"(?i)<video[^>]*src\s*=\s*["']([^"']+)["'][^>]*>"#),
                url_group: 1,
                caption_group: None,
                kind: MediaKindHint::Fixed(MediaKind::Video),
            },
            MediaRule {
                pattern: rx(r#"(?i)<iframe[^>]*src\s*=\s*["']([^"']+)["'][^>]*>"#),
                url_group: 1,
                caption_group: None,
                kind: MediaKindHint::Fixed(MediaKind::Embed),
            },
        ],
    }
}

/// Extra patterns the procedural protocol contributes: Dutch action verbs
/// used for numbered manual handling steps.
pub fn procedural_extras() -> ExtractionRules {
    ExtractionRules {
        procedures: vec![rx(
            r"(?mi)^\s*(?:handeling|actie)\s*(\d{1,3})\s*[:.)\-]\s*(.+)$",
        )],
        ..Default::default()
    }
}

/// Extra patterns the communication protocol contributes: say/don't-say
/// phrasing pairs.
pub fn communication_extras() -> ExtractionRules {
    ExtractionRules {
        pairs_wrong_first: vec![rx(
            r"(?mi)^[ \t]*(?:zeg niet|don'?t say)\s*:\s*([^/;\r\n]+)\r?\n[ \t]*(?:zeg wel|zeg|say)\s*:\s*([^/;\r\n]+)$",
        )],
        ..Default::default()
    }
}

/// Extra patterns the theory protocol contributes: explicit definition
/// call-outs become key concepts.
pub fn theory_extras() -> ExtractionRules {
    ExtractionRules {
        concepts: vec![rx(r"(?mi)^\s*(?:definitie|definition)\s*:\s*(.+)$")],
        ..Default::default()
    }
}

/// Map a media URL to an asset kind by file extension.
pub fn media_kind_from_url(url: &str) -> MediaKind {
    let lower = url.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    if path.ends_with(".gif") {
        MediaKind::Animation
    } else if [".mp4", ".webm", ".mov", ".avi"].iter().any(|e| path.ends_with(e)) {
        MediaKind::Video
    } else if [".png", ".jpg", ".jpeg", ".svg", ".webp", ".bmp"]
        .iter()
        .any(|e| path.ends_with(e))
    {
        MediaKind::Image
    } else {
        MediaKind::Embed
    }
}
