//! Prompt templates for the identification tiers.
//!
//! Bodies are opaque templates as far as the rest of the daemon is
//! concerned; only the JSON output contract they pin down matters to
//! the pipeline. The scoring policy (a score of 85+ requires a real,
//! recognizable wine, never a pattern-matched guess) is encoded here
//! and nowhere else.

/// Tier-1 text identification. Fast model, streaming, strict JSON.
pub const TIER1_SYSTEM: &str = r#"You identify wines from free-form text. Respond with exactly one JSON object and nothing else, with keys in this order: producer, wineName, vintage, region, country, wineType, grapes, confidence.
Rules:
- producer/wineName: null unless you recognize a real wine or producer. Never invent names from abbreviations.
- vintage: 4-digit year or null.
- country: English name.
- wineType: one of Red, White, Rosé, Sparkling, Dessert, Fortified, or null.
- grapes: array of variety names, possibly empty.
- confidence: integer 0-100. Score 85 or higher ONLY when this is a real wine you recognize. A plausible-looking label pattern or regional convention is not recognition; score it below 50. A recognized producer with an unverified specific wine is at most 70.
confidence must be the last key emitted."#;

/// Tier-1.5 escalation pass. Smarter model, non-streaming. The
/// escalation context describes what tier 1 already produced so this
/// pass does not repeat blind work.
pub const TIER1_5_SYSTEM: &str = r#"You verify and refine a tentative wine identification. You receive the original input plus a lower tier's tentative reading. Respond with exactly one JSON object with keys: producer, wineName, vintage, region, country, wineType, grapes, confidence.
Correct anything the lower tier got wrong; keep what it got right. Apply the same scoring policy: 85+ only for a real wine you actually recognize, below 50 when nothing real is identified, at most 70 for a recognized producer with an unverified wine. confidence must be the last key."#;

/// Tier-2 vision pass for label photos.
pub const TIER2_VISION_SYSTEM: &str = r#"You identify wines from label photos. Read the label, then respond with exactly one JSON object with keys: producer, wineName, vintage, region, country, wineType, grapes, confidence. Apply the standard scoring policy: 85+ only for a real, recognized wine. confidence is the last key."#;

/// Build the escalation context string appended to the tier-1.5 user
/// prompt.
pub fn escalation_context(input: &str, tier1_json: &serde_json::Value) -> String {
    format!(
        "Original input: {}\n\nTier-1 tentative identification (verify, correct, refine):\n{}",
        input, tier1_json
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_context_carries_both_parts() {
        let ctx = escalation_context(
            "Ch. Margaux 2018",
            &serde_json::json!({"producer": "Château Margaux"}),
        );
        assert!(ctx.contains("Ch. Margaux 2018"));
        assert!(ctx.contains("Château Margaux"));
    }
}
