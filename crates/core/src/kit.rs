//! # Kit Data Model
//!
//! The Kit is the generated teaching artifact: quick start, timed teacher
//! script, discussion questions, group work, student handout, and slide
//! assets, plus the quality metadata stamped by validation.
//!
//! Cross-references from Kit items into Ground Truth collections are typed
//! (`SourceRef` = collection + index) and only take the `"procedures[2]"`
//! string form at the serialization boundary.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Source References
// ============================================================================

/// A Ground Truth collection that Kit items can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    KeyConcepts,
    Procedures,
    Warnings,
    Pairs,
    Media,
}

impl Collection {
    /// Wire name used inside `SourceRef` strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::KeyConcepts => "key_concepts",
            Collection::Procedures => "procedures",
            Collection::Warnings => "warnings",
            Collection::Pairs => "pairs",
            Collection::Media => "media",
        }
    }

    /// All collections, in the order used for coverage accounting.
    pub fn all() -> [Collection; 5] {
        [
            Collection::KeyConcepts,
            Collection::Procedures,
            Collection::Warnings,
            Collection::Pairs,
            Collection::Media,
        ]
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed pointer from a Kit item into a Ground Truth collection.
///
/// Serialized as `"<collection>[<index>]"`, e.g. `"procedures[2]"` - the
/// form the generation model is instructed to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub collection: Collection,
    pub index: usize,
}

impl SourceRef {
    pub fn new(collection: Collection, index: usize) -> Self {
        Self { collection, index }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.collection, self.index)
    }
}

/// Error type for parsing a `SourceRef` wire string.
#[derive(Debug)]
pub struct ParseSourceRefError(String);

impl fmt::Display for ParseSourceRefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseSourceRefError {}

impl FromStr for SourceRef {
    type Err = ParseSourceRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let open = s.find('[').ok_or_else(|| {
            ParseSourceRefError(format!("invalid source ref '{}': missing '['", s))
        })?;
        if !s.ends_with(']') {
            return Err(ParseSourceRefError(format!(
                "invalid source ref '{}': missing closing ']'",
                s
            )));
        }
        let collection = match &s[..open] {
            "key_concepts" | "keyConcepts" => Collection::KeyConcepts,
            "procedures" => Collection::Procedures,
            "warnings" => Collection::Warnings,
            "pairs" | "correct_incorrect_pairs" | "correctIncorrectPairs" => Collection::Pairs,
            "media" | "media_assets" | "mediaAssets" => Collection::Media,
            other => {
                return Err(ParseSourceRefError(format!(
                    "invalid source ref collection '{}'",
                    other
                )))
            }
        };
        let index: usize = s[open + 1..s.len() - 1].trim().parse().map_err(|_| {
            ParseSourceRefError(format!("invalid source ref index in '{}'", s))
        })?;
        Ok(SourceRef { collection, index })
    }
}

impl Serialize for SourceRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SourceRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for SourceRef {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "SourceRef".into()
    }

    fn json_schema(_generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        schemars::json_schema!({
            "type": "string",
            "description": "Reference into a Ground Truth collection, e.g. \"procedures[2]\"",
            "pattern": "^(key_concepts|procedures|warnings|pairs|media)\\[[0-9]+\\]$"
        })
    }
}

// ============================================================================
// Script Items
// ============================================================================

/// Lesson phase a script item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Core,
    Closing,
}

impl Phase {
    /// Ordering rank used when recomputing timestamps.
    pub fn rank(&self) -> u8 {
        match self {
            Phase::Start => 0,
            Phase::Core => 1,
            Phase::Closing => 2,
        }
    }
}

/// What the teacher does at a script item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Open,
    Question,
    Demo,
    Exercise,
    Check,
    Summary,
    Link,
    Introduce,
}

/// One timed entry in the teacher script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScriptItem {
    /// Whole-minute offset into the lesson, `"M:00"` form.
    #[serde(default)]
    pub time: String,
    pub phase: Phase,
    pub action: ActionKind,
    #[serde(default)]
    pub content: String,
    /// Required in spirit when `is_grounded`; absence is a validation warning.
    #[serde(default)]
    pub source_ref: Option<SourceRef>,
    #[serde(default)]
    pub is_grounded: bool,
    #[serde(default)]
    pub expected_answers: Option<Vec<String>>,
    #[serde(default)]
    pub if_no_answer: Option<String>,
    #[serde(default)]
    pub slide: Option<u32>,
}

// ============================================================================
// Kit Sections
// ============================================================================

/// Minutes allocated per lesson phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct TimeAllocation {
    pub start: u32,
    pub core: u32,
    pub closing: u32,
}

impl TimeAllocation {
    /// Total declared lesson duration in minutes.
    pub fn total(&self) -> u32 {
        self.start + self.core + self.closing
    }
}

/// At-a-glance lesson summary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct QuickStart {
    #[serde(default)]
    pub one_liner: String,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    /// The single check question a teacher can use to probe understanding.
    #[serde(default)]
    pub check: String,
    #[serde(default)]
    pub time_allocation: TimeAllocation,
}

/// A class discussion question, ideally tied to a contrast pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DiscussionQuestion {
    pub question: String,
    #[serde(default)]
    pub source_ref: Option<SourceRef>,
    #[serde(default)]
    pub expected_answers: Option<Vec<String>>,
}

/// Structured group assignment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct GroupWork {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub group_size: u32,
    /// Role-play roles; required by the communication protocol.
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub rubric: Vec<String>,
}

/// One handout exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Exercise {
    pub prompt: String,
    #[serde(default)]
    pub source_ref: Option<SourceRef>,
}

/// The student-facing handout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct StudentHandout {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

/// One presentation slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SlideAsset {
    pub slide: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub animation_url: Option<String>,
    #[serde(default)]
    pub source_ref: Option<SourceRef>,
}

// ============================================================================
// Kit
// ============================================================================

/// The model-authored payload: every content section, no metadata.
///
/// This is the exact shape the generation model is asked to return; its
/// JSON schema is embedded in the prompt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct KitContent {
    #[serde(default)]
    pub quick_start: QuickStart,
    #[serde(default)]
    pub teacher_script: Vec<ScriptItem>,
    #[serde(default)]
    pub discussion_questions: Vec<DiscussionQuestion>,
    #[serde(default)]
    pub group_work: GroupWork,
    #[serde(default)]
    pub student_handout: StudentHandout,
    #[serde(default)]
    pub slide_assets: Vec<SlideAsset>,
}

impl KitContent {
    /// Every source reference anywhere in the Kit, for coverage accounting.
    pub fn all_source_refs(&self) -> Vec<SourceRef> {
        let mut refs = Vec::new();
        refs.extend(self.teacher_script.iter().filter_map(|i| i.source_ref));
        refs.extend(self.discussion_questions.iter().filter_map(|q| q.source_ref));
        refs.extend(self.student_handout.exercises.iter().filter_map(|e| e.source_ref));
        refs.extend(self.slide_assets.iter().filter_map(|s| s.source_ref));
        refs
    }

    /// Script items claiming to be grounded in the source.
    pub fn grounded_items(&self) -> impl Iterator<Item = &ScriptItem> {
        self.teacher_script.iter().filter(|i| i.is_grounded)
    }
}

/// The finalized teaching artifact: content plus quality metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kit {
    #[serde(flatten)]
    pub content: KitContent,
    /// Protocol bound to this build, recorded for reproducibility.
    pub protocol_used: String,
    pub grounding_score: f64,
    pub coverage_score: f64,
    pub needs_review: bool,
    pub review_reasons: Vec<String>,
    pub built_at: DateTime<Utc>,
    /// Hash of the Ground Truth this Kit was built from - the cache key.
    pub ground_truth_hash: String,
}

impl Kit {
    /// Wrap a freshly parsed payload with build metadata. Scores are
    /// stamped later by validation.
    pub fn from_content(content: KitContent, protocol_used: &str, ground_truth_hash: &str) -> Self {
        Self {
            content,
            protocol_used: protocol_used.to_string(),
            grounding_score: 0.0,
            coverage_score: 0.0,
            needs_review: false,
            review_reasons: Vec::new(),
            built_at: Utc::now(),
            ground_truth_hash: ground_truth_hash.to_string(),
        }
    }
}

/// Cache contract exposed to callers: should this module's Kit be rebuilt?
///
/// True if there is no Kit yet, the source changed out from under it, it is
/// flagged for review, or its grounding fell below the configured minimum.
pub fn should_rebuild(existing: Option<&Kit>, current_source_hash: &str, min_grounding: f64) -> bool {
    match existing {
        None => true,
        Some(kit) => {
            kit.ground_truth_hash != current_source_hash
                || kit.needs_review
                || kit.grounding_score < min_grounding
        }
    }
}

// ============================================================================
// Time parsing
// ============================================================================

/// Parse a script-item time as a whole-minute offset.
///
/// Accepts `"12"`, `"12:00"`, and `"12 min"`. Anything else is a timing
/// finding, not a panic.
pub fn parse_time_minutes(s: &str) -> Option<u32> {
    let s = s.trim();
    let head = s
        .split(|c| c == ':' || c == ' ')
        .next()
        .unwrap_or_default();
    if head.is_empty() || !head.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // "12:30" is not a whole-minute offset
    if let Some(rest) = s.strip_prefix(head) {
        let rest = rest.trim();
        if let Some(secs) = rest.strip_prefix(':') {
            if secs.trim() != "00" {
                return None;
            }
        } else if !rest.is_empty() && rest != "min" {
            return None;
        }
    }
    head.parse().ok()
}

/// Format a whole-minute offset in the `"M:00"` wire form.
pub fn format_minutes(minutes: u32) -> String {
    format!("{}:00", minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kit_with(grounding: f64, needs_review: bool, hash: &str) -> Kit {
        let mut kit = Kit::from_content(KitContent::default(), "conceptual-theory", hash);
        kit.grounding_score = grounding;
        kit.coverage_score = 1.0;
        kit.needs_review = needs_review;
        kit
    }

    #[test]
    fn test_source_ref_round_trip() {
        let r = SourceRef::new(Collection::Procedures, 2);
        assert_eq!(r.to_string(), "procedures[2]");
        let parsed: SourceRef = "procedures[2]".parse().unwrap();
        assert_eq!(parsed, r);

        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"procedures[2]\"");
        let back: SourceRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_source_ref_parse_errors() {
        assert!("procedures".parse::<SourceRef>().is_err());
        assert!("procedures[".parse::<SourceRef>().is_err());
        assert!("procedures[x]".parse::<SourceRef>().is_err());
        assert!("bogus[0]".parse::<SourceRef>().is_err());
    }

    #[test]
    fn test_source_ref_accepts_camel_case_aliases() {
        let r: SourceRef = "correctIncorrectPairs[1]".parse().unwrap();
        assert_eq!(r.collection, Collection::Pairs);
        // Canonical form on the way back out
        assert_eq!(r.to_string(), "pairs[1]");
    }

    #[test]
    fn test_should_rebuild_when_no_kit() {
        assert!(should_rebuild(None, "abc", 0.8));
    }

    #[test]
    fn test_should_rebuild_on_hash_mismatch_regardless_of_scores() {
        // Staleness law: hash mismatch wins even for a perfect kit
        let kit = kit_with(1.0, false, "old");
        assert!(should_rebuild(Some(&kit), "new", 0.8));
    }

    #[test]
    fn test_should_rebuild_on_review_flag_or_low_grounding() {
        let flagged = kit_with(1.0, true, "abc");
        assert!(should_rebuild(Some(&flagged), "abc", 0.8));

        let weak = kit_with(0.5, false, "abc");
        assert!(should_rebuild(Some(&weak), "abc", 0.8));

        let good = kit_with(0.9, false, "abc");
        assert!(!should_rebuild(Some(&good), "abc", 0.8));
    }

    #[test]
    fn test_parse_time_minutes() {
        assert_eq!(parse_time_minutes("12"), Some(12));
        assert_eq!(parse_time_minutes("12:00"), Some(12));
        assert_eq!(parse_time_minutes("12 min"), Some(12));
        assert_eq!(parse_time_minutes("0:00"), Some(0));
        assert_eq!(parse_time_minutes("12:30"), None);
        assert_eq!(parse_time_minutes("soon"), None);
        assert_eq!(parse_time_minutes(""), None);
    }

    #[test]
    fn test_kit_content_collects_refs_from_every_section() {
        let mut content = KitContent::default();
        content.teacher_script.push(ScriptItem {
            time: "0:00".into(),
            phase: Phase::Start,
            action: ActionKind::Open,
            content: "welcome".into(),
            source_ref: Some(SourceRef::new(Collection::KeyConcepts, 0)),
            is_grounded: true,
            expected_answers: None,
            if_no_answer: None,
            slide: None,
        });
        content.discussion_questions.push(DiscussionQuestion {
            question: "why?".into(),
            source_ref: Some(SourceRef::new(Collection::Pairs, 1)),
            expected_answers: None,
        });
        content.slide_assets.push(SlideAsset {
            slide: 1,
            title: "figure".into(),
            bullets: vec![],
            image_url: Some("https://example.test/a.png".into()),
            animation_url: None,
            source_ref: Some(SourceRef::new(Collection::Media, 0)),
        });

        let refs = content.all_source_refs();
        assert_eq!(refs.len(), 3);
        assert!(refs.contains(&SourceRef::new(Collection::Pairs, 1)));
    }
}
