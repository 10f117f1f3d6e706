//! Canonical wine record produced by an identification pass.
//!
//! A `ParsedWine` is immutable once emitted as a result: later tiers
//! build new instances instead of mutating an earlier one.

use serde::{Deserialize, Serialize};

/// Wine style classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WineType {
    Red,
    White,
    #[serde(rename = "Rosé")]
    Rose,
    Sparkling,
    Dessert,
    Fortified,
}

impl WineType {
    /// Map free-form wine-type text (any language the models emit) to
    /// the canonical variant. Case-insensitive.
    pub fn from_synonym(raw: &str) -> Option<Self> {
        let s = raw.trim().to_lowercase();
        match s.as_str() {
            "red" | "rouge" | "rosso" | "tinto" | "rotwein" => Some(Self::Red),
            "white" | "blanc" | "bianco" | "blanco" | "weiss" | "weisswein" => Some(Self::White),
            "rosé" | "rose" | "rosado" | "rosato" => Some(Self::Rose),
            "sparkling" | "champagne" | "cava" | "prosecco" | "spumante" | "cremant"
            | "crémant" | "sekt" => Some(Self::Sparkling),
            "dessert" | "sweet" | "moelleux" | "late harvest" | "ice wine" | "icewine"
            | "eiswein" | "sauternes" => Some(Self::Dessert),
            "fortified" | "port" | "porto" | "sherry" | "jerez" | "madeira" | "marsala"
            | "vermouth" => Some(Self::Fortified),
            _ => None,
        }
    }
}

impl std::fmt::Display for WineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Red => write!(f, "Red"),
            Self::White => write!(f, "White"),
            Self::Rose => write!(f, "Rosé"),
            Self::Sparkling => write!(f, "Sparkling"),
            Self::Dessert => write!(f, "Dessert"),
            Self::Fortified => write!(f, "Fortified"),
        }
    }
}

/// Canonical identification record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParsedWine {
    pub producer: Option<String>,
    pub wine_name: Option<String>,
    /// 4-digit year, already validated against `(19|20)\d{2}`
    pub vintage: Option<u16>,
    pub region: Option<String>,
    /// English canonical country name
    pub country: Option<String>,
    pub wine_type: Option<WineType>,
    /// Ordered grape varieties, may be empty
    #[serde(default)]
    pub grapes: Vec<String>,
    /// Always clamped to 0..=100
    pub confidence: u8,
}

impl ParsedWine {
    /// Clamp a raw model-reported score into the valid confidence range.
    pub fn clamp_confidence(raw: i64) -> u8 {
        raw.clamp(0, 100) as u8
    }

    /// A result is usable when the model committed to at least a name
    /// or a producer. Used by the orchestrator's fallback decision.
    pub fn is_usable(&self) -> bool {
        self.wine_name.is_some() || self.producer.is_some()
    }

    /// Field names in the order tiers emit them. Confidence is last by
    /// contract and stays last wherever this list is consumed.
    pub fn field_order() -> &'static [&'static str] {
        &[
            "producer",
            "wineName",
            "vintage",
            "region",
            "country",
            "wineType",
            "grapes",
            "confidence",
        ]
    }

    /// Look up a field by its wire name, as a JSON value, skipping
    /// nulls. Used to replay an escalated result field by field.
    pub fn field_value(&self, field: &str) -> Option<serde_json::Value> {
        use serde_json::json;
        match field {
            "producer" => self.producer.as_ref().map(|v| json!(v)),
            "wineName" => self.wine_name.as_ref().map(|v| json!(v)),
            "vintage" => self.vintage.map(|v| json!(v)),
            "region" => self.region.as_ref().map(|v| json!(v)),
            "country" => self.country.as_ref().map(|v| json!(v)),
            "wineType" => self.wine_type.map(|v| json!(v.to_string())),
            "grapes" => {
                if self.grapes.is_empty() {
                    None
                } else {
                    Some(json!(self.grapes))
                }
            }
            "confidence" => Some(json!(self.confidence)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wine_type_synonyms() {
        assert_eq!(WineType::from_synonym("rouge"), Some(WineType::Red));
        assert_eq!(WineType::from_synonym("ROSSO"), Some(WineType::Red));
        assert_eq!(WineType::from_synonym("blanc"), Some(WineType::White));
        assert_eq!(WineType::from_synonym("rosado"), Some(WineType::Rose));
        assert_eq!(WineType::from_synonym("Prosecco"), Some(WineType::Sparkling));
        assert_eq!(WineType::from_synonym("port"), Some(WineType::Fortified));
        assert_eq!(WineType::from_synonym("orange"), None);
    }

    #[test]
    fn test_confidence_clamp() {
        assert_eq!(ParsedWine::clamp_confidence(-5), 0);
        assert_eq!(ParsedWine::clamp_confidence(0), 0);
        assert_eq!(ParsedWine::clamp_confidence(87), 87);
        assert_eq!(ParsedWine::clamp_confidence(250), 100);
    }

    #[test]
    fn test_confidence_is_last_field() {
        assert_eq!(ParsedWine::field_order().last(), Some(&"confidence"));
    }

    #[test]
    fn test_field_value_skips_nulls() {
        let wine = ParsedWine {
            producer: Some("Château Margaux".to_string()),
            confidence: 90,
            ..Default::default()
        };
        assert!(wine.field_value("producer").is_some());
        assert!(wine.field_value("region").is_none());
        assert!(wine.field_value("grapes").is_none());
        assert_eq!(
            wine.field_value("confidence"),
            Some(serde_json::json!(90))
        );
    }
}
