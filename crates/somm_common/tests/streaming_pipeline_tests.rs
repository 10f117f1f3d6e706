//! End-to-end checks over detector + normalizer for realistic model
//! output, including chunk-boundary torture cases.

use serde_json::{json, Value};
use somm_common::{normalize_response, ParsedWine, StreamFieldDetector, WineType};

const MARGAUX_RESPONSE: &str = r#"{
  "producer": "Château Margaux",
  "wineName": "Château Margaux",
  "vintage": 2018,
  "region": "Margaux",
  "country": "France",
  "wineType": "Red",
  "grapes": ["Cabernet Sauvignon", "Merlot", "Petit Verdot", "Cabernet Franc"],
  "confidence": 94
}"#;

fn run_chunked(input: &str, chunk_size: usize) -> Vec<(String, Value)> {
    let mut detector = StreamFieldDetector::new(ParsedWine::field_order());
    let mut fields = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    for chunk in chars.chunks(chunk_size) {
        let chunk: String = chunk.iter().collect();
        detector.process_chunk(&chunk, &mut |f, v| fields.push((f.to_string(), v)), None);
    }
    fields
}

#[test]
fn test_margaux_fields_in_order_confidence_last() {
    for chunk_size in [1, 3, 7, 64, 4096] {
        let fields = run_chunked(MARGAUX_RESPONSE, chunk_size);
        let names: Vec<&str> = fields.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "producer",
                "wineName",
                "vintage",
                "region",
                "country",
                "wineType",
                "grapes",
                "confidence"
            ],
            "chunk size {}",
            chunk_size
        );
        assert_eq!(names.last(), Some(&"confidence"));
    }
}

#[test]
fn test_chunking_never_duplicates_or_drops_fields() {
    let whole = run_chunked(MARGAUX_RESPONSE, usize::MAX);
    for chunk_size in [1, 2, 5, 13] {
        assert_eq!(run_chunked(MARGAUX_RESPONSE, chunk_size), whole);
    }
}

#[test]
fn test_accumulated_fields_normalize_to_parsed_wine() {
    let fields = run_chunked(MARGAUX_RESPONSE, 8);
    let mut obj = serde_json::Map::new();
    for (field, value) in fields {
        obj.insert(field, value);
    }
    let wine = normalize_response(&Value::Object(obj));
    assert_eq!(wine.producer.as_deref(), Some("Château Margaux"));
    assert_eq!(wine.vintage, Some(2018));
    assert_eq!(wine.wine_type, Some(WineType::Red));
    assert_eq!(wine.grapes.len(), 4);
    assert_eq!(wine.confidence, 94);
    assert!(wine.confidence >= 85, "recognized wine auto-populates");
}

#[test]
fn test_partial_then_final_ordering_for_text_field() {
    let input = r#"{"wineName": "Tignanello Toscana IGT", "confidence": 71}"#;
    let mut detector =
        StreamFieldDetector::new(&["wineName", "confidence"]).with_text_stream(&["wineName"]);

    let mut deltas: Vec<String> = Vec::new();
    let mut field_events: Vec<String> = Vec::new();
    let mut deltas_after_completion = 0usize;

    let chars: Vec<char> = input.chars().collect();
    for chunk in chars.chunks(4) {
        let chunk: String = chunk.iter().collect();
        let completed_before = field_events.contains(&"wineName".to_string());
        let mut chunk_deltas: Vec<String> = Vec::new();
        detector.process_chunk(
            &chunk,
            &mut |f, _| field_events.push(f.to_string()),
            Some(&mut |_: &str, t: &str| chunk_deltas.push(t.to_string())),
        );
        if completed_before {
            deltas_after_completion += chunk_deltas.len();
        }
        deltas.extend(chunk_deltas);
    }

    assert!(!deltas.is_empty());
    for pair in deltas.windows(2) {
        assert!(
            pair[1].len() > pair[0].len(),
            "delta text length strictly increases"
        );
    }
    assert_eq!(deltas_after_completion, 0, "no delta after completion");
    assert_eq!(field_events, vec!["wineName", "confidence"]);
}

#[test]
fn test_normalizer_clamps_any_score() {
    for raw in [-40i64, 0, 50, 100, 130, 100_000] {
        let wine = normalize_response(&json!({ "confidence": raw }));
        assert!(wine.confidence <= 100);
    }
}
