//! Default prompt templates bundled at compile time.
//!
//! Each protocol ships its own system instruction; the shared grounding
//! rules are appended to every build prompt.

/// Procedural Skill - step-by-step demo lessons
pub const PROCEDURAL: &str = include_str!("defaults/procedural.md");

/// Interpersonal Communication - contrast-pair conversation lessons
pub const COMMUNICATION: &str = include_str!("defaults/communication.md");

/// Conceptual Theory - concept-driven lessons (default protocol)
pub const THEORY: &str = include_str!("defaults/theory.md");

/// Shared grounding rules appended to every protocol's system prompt
pub const GROUNDING_RULES: &str = include_str!("defaults/grounding_rules.md");

/// JSON repair - asks the model to fix its own invalid output
pub const JSON_REPAIR: &str = include_str!("defaults/json_repair.md");

/// All default prompts with their slugs
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("procedural", PROCEDURAL),
        ("communication", COMMUNICATION),
        ("theory", THEORY),
        ("grounding_rules", GROUNDING_RULES),
        ("json_repair", JSON_REPAIR),
    ]
}
