//! Wine catalog lookup for disambiguation.
//!
//! The catalog itself (CRUD, ownership, sync) belongs to the caller's
//! application; the daemon only consumes a lookup capability that
//! returns near-duplicate candidates for a parsed identification. The
//! SQLite implementation covers deployments where the daemon shares
//! the app's database file.

use async_trait::async_trait;
use rusqlite::Connection;
use somm_common::{DuplicateMatch, IdentifyError, ParsedWine};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Maximum candidates returned to the caller
pub const MAX_CANDIDATES: usize = 5;

/// Candidates below this similarity are noise, not near-duplicates
const MIN_SIMILARITY: f64 = 0.35;

#[async_trait]
pub trait WineCatalog: Send + Sync {
    /// Ranked near-duplicate candidates for a parsed identification.
    async fn find_candidates(
        &self,
        parsed: &ParsedWine,
    ) -> Result<Vec<DuplicateMatch>, IdentifyError>;
}

/// Catalog that never matches; used when no database is configured.
pub struct EmptyCatalog;

#[async_trait]
impl WineCatalog for EmptyCatalog {
    async fn find_candidates(
        &self,
        _parsed: &ParsedWine,
    ) -> Result<Vec<DuplicateMatch>, IdentifyError> {
        Ok(Vec::new())
    }
}

/// Row pulled from the wines table before ranking
#[derive(Debug, Clone)]
struct CatalogRow {
    wine_id: i64,
    producer: Option<String>,
    wine_name: String,
    vintage: Option<u16>,
}

/// SQLite-backed catalog
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    pub fn open(path: &Path) -> Result<Self, IdentifyError> {
        let conn = Connection::open(path)
            .map_err(|e| IdentifyError::Processing(format!("catalog open failed: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory catalog for tests and demos.
    pub fn open_in_memory() -> Result<Self, IdentifyError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| IdentifyError::Processing(format!("catalog open failed: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn init_schema(&self) -> Result<(), IdentifyError> {
        let conn = self.conn.lock().expect("catalog lock poisoned");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS wines (
                id INTEGER PRIMARY KEY,
                producer TEXT,
                wine_name TEXT NOT NULL,
                vintage INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_wines_name ON wines(wine_name);",
        )
        .map_err(|e| IdentifyError::Processing(format!("catalog schema failed: {}", e)))?;
        Ok(())
    }

    pub fn insert_wine(
        &self,
        producer: Option<&str>,
        wine_name: &str,
        vintage: Option<u16>,
    ) -> Result<i64, IdentifyError> {
        let conn = self.conn.lock().expect("catalog lock poisoned");
        conn.execute(
            "INSERT INTO wines (producer, wine_name, vintage) VALUES (?1, ?2, ?3)",
            rusqlite::params![producer, wine_name, vintage],
        )
        .map_err(|e| IdentifyError::Processing(format!("catalog insert failed: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    fn candidate_rows(&self, parsed: &ParsedWine) -> Result<Vec<CatalogRow>, IdentifyError> {
        let needle = match (&parsed.wine_name, &parsed.producer) {
            (Some(name), _) => name.clone(),
            (None, Some(producer)) => producer.clone(),
            (None, None) => return Ok(Vec::new()),
        };
        // Pre-filter on any shared word, rank in Rust afterwards.
        let words: Vec<String> = needle
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .map(|w| format!("%{}%", w.to_lowercase()))
            .collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().expect("catalog lock poisoned");
        let clause = words
            .iter()
            .map(|_| "LOWER(wine_name) LIKE ? OR LOWER(COALESCE(producer, '')) LIKE ?")
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "SELECT id, producer, wine_name, vintage FROM wines WHERE {} LIMIT 200",
            clause
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| IdentifyError::Processing(format!("catalog query failed: {}", e)))?;
        let params: Vec<&dyn rusqlite::ToSql> = words
            .iter()
            .flat_map(|w| [w as &dyn rusqlite::ToSql, w as &dyn rusqlite::ToSql])
            .collect();
        let rows = stmt
            .query_map(&params[..], |row| {
                Ok(CatalogRow {
                    wine_id: row.get(0)?,
                    producer: row.get(1)?,
                    wine_name: row.get(2)?,
                    vintage: row.get(3)?,
                })
            })
            .map_err(|e| IdentifyError::Processing(format!("catalog query failed: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| IdentifyError::Processing(format!("catalog read failed: {}", e)))?;
        Ok(rows)
    }
}

/// Word-overlap similarity with a vintage bonus. Cheap, symmetric,
/// good enough to rank near-duplicates; no identification logic.
fn similarity(parsed: &ParsedWine, row: &CatalogRow) -> f64 {
    fn word_set(s: &str) -> HashSet<String> {
        s.split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect()
    }

    let parsed_words: HashSet<String> = word_set(
        &format!(
            "{} {}",
            parsed.producer.as_deref().unwrap_or(""),
            parsed.wine_name.as_deref().unwrap_or("")
        ),
    );
    let row_words: HashSet<String> = word_set(&format!(
        "{} {}",
        row.producer.as_deref().unwrap_or(""),
        &row.wine_name
    ));
    if parsed_words.is_empty() || row_words.is_empty() {
        return 0.0;
    }

    let shared = parsed_words.intersection(&row_words).count() as f64;
    let union = parsed_words.union(&row_words).count() as f64;
    let jaccard = shared / union;

    match (parsed.vintage, row.vintage) {
        (Some(a), Some(b)) if a == b => (jaccard + 0.2).min(1.0),
        (Some(a), Some(b)) if a.abs_diff(b) <= 1 => (jaccard + 0.1).min(1.0),
        _ => jaccard,
    }
}

#[async_trait]
impl WineCatalog for SqliteCatalog {
    async fn find_candidates(
        &self,
        parsed: &ParsedWine,
    ) -> Result<Vec<DuplicateMatch>, IdentifyError> {
        let rows = self.candidate_rows(parsed)?;
        let mut matches: Vec<DuplicateMatch> = rows
            .into_iter()
            .filter_map(|row| {
                let score = similarity(parsed, &row);
                if score < MIN_SIMILARITY {
                    return None;
                }
                Some(DuplicateMatch {
                    wine_id: row.wine_id,
                    producer: row.producer,
                    wine_name: row.wine_name,
                    vintage: row.vintage,
                    similarity: score,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(MAX_CANDIDATES);
        info!("Catalog lookup: {} candidate(s)", matches.len());
        Ok(matches)
    }
}
