//! # Payload Parsing
//!
//! Turns raw model output into a [`KitContent`]. Models wrap JSON in
//! markdown fences or prose often enough that a bare `from_str` is not
//! sufficient; the fallback slices the outermost brace pair.

use crate::kit::KitContent;

/// Parse raw model output into a Kit payload. The error is a message for
/// the retry ladder, not an exception.
pub fn parse_kit(raw: &str) -> Result<KitContent, String> {
    let trimmed = raw.trim();

    let direct_error = match serde_json::from_str::<KitContent>(trimmed) {
        Ok(content) => return Ok(content),
        Err(e) => e,
    };

    // Fenced or prose-wrapped output: slice the outermost object
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Ok(content) = serde_json::from_str::<KitContent>(&raw[start..=end]) {
                return Ok(content);
            }
        }
    }

    Err(format!("not a valid kit payload: {}", direct_error))
}
