//! Model completion → canonical `ParsedWine`.
//!
//! Models return almost-right JSON: localized country names, wine
//! types in the label's language, vintages buried in prose ("2018er",
//! "NV (2019 base)"), grapes as a bare string instead of an array.
//! Normalization is lenient field-by-field pulls over a
//! `serde_json::Value`, never a strict deserialize.

use crate::wine::{ParsedWine, WineType};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn vintage_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(19|20)\d{2}").unwrap())
}

/// Canonical English country name for common synonyms and local
/// spellings. Unknown countries pass through trimmed.
fn canonical_country(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let canonical = match lower.as_str() {
        "france" | "francia" | "frankreich" | "fr" => "France",
        "italy" | "italia" | "italie" | "italien" | "it" => "Italy",
        "spain" | "españa" | "espana" | "espagne" | "spanien" | "es" => "Spain",
        "portugal" | "pt" => "Portugal",
        "germany" | "deutschland" | "allemagne" | "germania" | "de" => "Germany",
        "austria" | "österreich" | "osterreich" | "autriche" | "at" => "Austria",
        "united states" | "usa" | "us" | "u.s.a." | "america" | "estados unidos"
        | "états-unis" | "etats-unis" => "United States",
        "argentina" | "argentine" | "ar" => "Argentina",
        "chile" | "chili" | "cl" => "Chile",
        "australia" | "australie" | "au" => "Australia",
        "new zealand" | "nouvelle-zélande" | "nouvelle-zelande" | "nz" => "New Zealand",
        "south africa" | "afrique du sud" | "südafrika" | "sudafrika" | "za" => "South Africa",
        "greece" | "grèce" | "grece" | "griechenland" | "gr" => "Greece",
        "hungary" | "hongrie" | "ungarn" | "hu" => "Hungary",
        _ => return raw.trim().to_string(),
    };
    canonical.to_string()
}

/// Extract a plausible 4-digit year from any vintage-like value.
pub fn extract_vintage(value: &Value) -> Option<u16> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    vintage_re()
        .find(&text)
        .and_then(|m| m.as_str().parse::<u16>().ok())
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Grapes may arrive as an array, a single string, or a
/// comma-joined string. Coerce to a filtered, re-indexed list.
fn coerce_grapes(value: Option<&Value>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    let items: Vec<String> = match value {
        Value::Array(arr) => arr
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        Value::String(s) => s.split(',').map(|p| p.to_string()).collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect()
}

/// Normalize a raw completion (or the accumulated parse of a
/// streaming call) into a canonical `ParsedWine`. Confidence is
/// clamped to 0..=100 as the final step regardless of upstream value.
pub fn normalize_response(raw: &Value) -> ParsedWine {
    normalize_with_inferences(raw).0
}

/// Normalize and also report which inferences were applied, for the
/// result payload's `inferences_applied` audit list.
pub fn normalize_with_inferences(raw: &Value) -> (ParsedWine, Vec<String>) {
    let confidence = raw
        .get("confidence")
        .and_then(|c| match c {
            Value::Number(n) => n.as_f64().map(|f| f.round() as i64),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
        .unwrap_or(0);

    let mut inferences = Vec::new();

    let vintage = raw.get("vintage").and_then(extract_vintage);
    if vintage.is_some() && raw.get("vintage").and_then(|v| v.as_u64()).is_none() {
        inferences.push("vintage_extracted_from_text".to_string());
    }

    let country_raw = non_empty_string(raw.get("country"));
    let country = country_raw.as_deref().map(canonical_country);
    if let (Some(raw_c), Some(canon)) = (country_raw.as_deref(), country.as_deref()) {
        if raw_c.trim() != canon {
            inferences.push("country_canonicalized".to_string());
        }
    }

    if matches!(raw.get("grapes"), Some(Value::String(_))) {
        inferences.push("grapes_coerced_to_list".to_string());
    }

    let wine = ParsedWine {
        producer: non_empty_string(raw.get("producer")),
        wine_name: non_empty_string(raw.get("wineName").or_else(|| raw.get("wine_name"))),
        vintage,
        region: non_empty_string(raw.get("region")),
        country,
        wine_type: non_empty_string(raw.get("wineType").or_else(|| raw.get("wine_type")))
            .and_then(|t| WineType::from_synonym(&t)),
        grapes: coerce_grapes(raw.get("grapes")),
        confidence: ParsedWine::clamp_confidence(confidence),
    };
    (wine, inferences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_normalization() {
        let raw = json!({
            "producer": "  Château Margaux ",
            "wineName": "Château Margaux",
            "vintage": "2018er Jahrgang",
            "region": "Margaux",
            "country": "francia",
            "wineType": "rouge",
            "grapes": ["Cabernet Sauvignon", " Merlot ", ""],
            "confidence": 92
        });
        let wine = normalize_response(&raw);
        assert_eq!(wine.producer.as_deref(), Some("Château Margaux"));
        assert_eq!(wine.vintage, Some(2018));
        assert_eq!(wine.country.as_deref(), Some("France"));
        assert_eq!(wine.wine_type, Some(WineType::Red));
        assert_eq!(wine.grapes, vec!["Cabernet Sauvignon", "Merlot"]);
        assert_eq!(wine.confidence, 92);
    }

    #[test]
    fn test_confidence_clamped_both_ends() {
        let over = normalize_response(&json!({"confidence": 140}));
        assert_eq!(over.confidence, 100);
        let under = normalize_response(&json!({"confidence": -12}));
        assert_eq!(under.confidence, 0);
        let string = normalize_response(&json!({"confidence": "88"}));
        assert_eq!(string.confidence, 88);
        let missing = normalize_response(&json!({}));
        assert_eq!(missing.confidence, 0);
    }

    #[test]
    fn test_vintage_extraction_variants() {
        assert_eq!(extract_vintage(&json!(2015)), Some(2015));
        assert_eq!(extract_vintage(&json!("NV (2019 base)")), Some(2019));
        assert_eq!(extract_vintage(&json!("1855 classification")), None);
        assert_eq!(extract_vintage(&json!("no year")), None);
        assert_eq!(extract_vintage(&json!(null)), None);
    }

    #[test]
    fn test_grapes_coercion_from_string() {
        let single = normalize_response(&json!({"grapes": "Riesling"}));
        assert_eq!(single.grapes, vec!["Riesling"]);
        let joined = normalize_response(&json!({"grapes": "Grenache, Syrah, Mourvèdre"}));
        assert_eq!(joined.grapes, vec!["Grenache", "Syrah", "Mourvèdre"]);
        let absent = normalize_response(&json!({}));
        assert!(absent.grapes.is_empty());
    }

    #[test]
    fn test_empty_strings_become_none() {
        let wine = normalize_response(&json!({
            "producer": "  ",
            "wineName": "",
            "country": "Italia"
        }));
        assert!(wine.producer.is_none());
        assert!(wine.wine_name.is_none());
        assert_eq!(wine.country.as_deref(), Some("Italy"));
    }

    #[test]
    fn test_inferences_reported() {
        let (wine, inferences) = normalize_with_inferences(&json!({
            "vintage": "bottled 2012",
            "country": "italia",
            "grapes": "Sangiovese"
        }));
        assert_eq!(wine.vintage, Some(2012));
        assert!(inferences.contains(&"vintage_extracted_from_text".to_string()));
        assert!(inferences.contains(&"country_canonicalized".to_string()));
        assert!(inferences.contains(&"grapes_coerced_to_list".to_string()));

        let (_, none) = normalize_with_inferences(&json!({
            "vintage": 2012,
            "country": "France"
        }));
        assert!(none.is_empty());
    }

    #[test]
    fn test_unknown_country_passes_through() {
        let wine = normalize_response(&json!({"country": " Georgia "}));
        assert_eq!(wine.country.as_deref(), Some("Georgia"));
    }

    #[test]
    fn test_ambiguous_abbreviation_scenario() {
        // "Ch. something red 2018" style completion from a low tier
        let raw = json!({
            "producer": null,
            "wineName": null,
            "vintage": 2018,
            "wineType": "red",
            "confidence": 35
        });
        let wine = normalize_response(&raw);
        assert!(wine.producer.is_none());
        assert!(wine.wine_name.is_none());
        assert_eq!(wine.wine_type, Some(WineType::Red));
        assert!(wine.confidence < 50);
    }
}
