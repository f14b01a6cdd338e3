//! SQLite persistence of asked questions and delivered answers.

use std::fs;
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::embedding::{EmbedBackend, DEFAULT_EMBED_CONCURRENCY};
use crate::Result;

/// One stored question/answer exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub user_query: String,
    pub assistant_response: String,
    /// Which path produced the answer (`search`, `gemini`, `offline`)
    pub tool_used: Option<String>,
    pub context_data: Option<serde_json::Value>,
    /// RFC 3339
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: i64,
    timestamp: &'a str,
    user_query: &'a str,
    assistant_response: &'a str,
    tool_used: &'a str,
    context_data: String,
}

const SELECT_COLUMNS: &str =
    "SELECT id, user_query, assistant_response, tool_used, context_data, timestamp FROM chat_history";

pub struct ChatHistory {
    conn: Connection,
}

impl ChatHistory {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path.as_ref())?;
        Self::setup_db(&conn)?;
        debug!(path = %db_path.as_ref().display(), "opened chat history");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::setup_db(&conn)?;
        Ok(Self { conn })
    }

    fn setup_db(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_query TEXT NOT NULL,
                assistant_response TEXT NOT NULL,
                tool_used TEXT,
                context_data TEXT,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_user_query ON chat_history(user_query);
        ",
        )
    }

    /// Store an exchange and return its row id.
    pub fn save(
        &self,
        user_query: &str,
        assistant_response: &str,
        tool_used: Option<&str>,
        context_data: Option<&serde_json::Value>,
    ) -> Result<i64> {
        let timestamp = Utc::now().to_rfc3339();
        let context_json = context_data.map(serde_json::to_string).transpose()?;

        self.conn.execute(
            "INSERT INTO chat_history (user_query, assistant_response, tool_used, context_data, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_query, assistant_response, tool_used, context_json, timestamp],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Newest first; `None` returns everything.
    pub fn all(&self, limit: Option<usize>) -> Result<Vec<HistoryEntry>> {
        let limit = limit.map_or(-1, |l| l as i64);
        let sql = format!("{} ORDER BY timestamp DESC, id DESC LIMIT ?1", SELECT_COLUMNS);
        self.query_entries(&sql, params![limit])
    }

    pub fn recent(&self, count: usize) -> Result<Vec<HistoryEntry>> {
        self.all(Some(count))
    }

    /// Substring match on the stored question; `%` and `_` match literally.
    pub fn search(&self, text: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let pattern = format!("%{}%", escape_like(text));
        let sql = format!(
            "{} WHERE user_query LIKE ?1 ESCAPE '\\' ORDER BY timestamp DESC, id DESC LIMIT ?2",
            SELECT_COLUMNS
        );
        self.query_entries(&sql, params![pattern, limit as i64])
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chat_history", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete every entry; returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.conn.execute("DELETE FROM chat_history", [])?;
        info!(removed, "chat history cleared");
        Ok(removed)
    }

    /// Write all entries (newest first) as CSV.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<usize> {
        let entries = self.all(None)?;
        let mut writer = csv::Writer::from_path(path.as_ref())?;

        for entry in &entries {
            writer.serialize(CsvRow {
                id: entry.id,
                timestamp: &entry.timestamp,
                user_query: &entry.user_query,
                assistant_response: &entry.assistant_response,
                tool_used: entry.tool_used.as_deref().unwrap_or(""),
                context_data: entry
                    .context_data
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            })?;
        }
        writer.flush()?;

        info!(rows = entries.len(), path = %path.as_ref().display(), "exported chat history");
        Ok(entries.len())
    }

    fn query_entries(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// A past exchange whose question resembles the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarExchange {
    pub entry: HistoryEntry,
    /// Cosine similarity, or the share of query words found when the
    /// encoder was unavailable
    pub score: f32,
}

/// Rank `entries` by how closely their question matches `query`.
///
/// Questions are compared by cosine similarity of their embeddings; only
/// matches scoring at least `threshold` are kept, best first, at most
/// `top_k` of them. If the encoder fails, a keyword overlap score is used
/// instead and the threshold does not apply.
pub async fn find_similar(
    entries: Vec<HistoryEntry>,
    query: &str,
    embedder: &EmbedBackend,
    top_k: usize,
    threshold: f32,
) -> Vec<SimilarExchange> {
    if entries.is_empty() || top_k == 0 {
        return Vec::new();
    }

    match rank_by_embedding(&entries, query, embedder).await {
        Ok(scores) => {
            let mut ranked: Vec<SimilarExchange> = entries
                .into_iter()
                .zip(scores)
                .map(|(entry, score)| SimilarExchange { entry, score })
                .collect();
            ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
            ranked.truncate(top_k);
            ranked.retain(|m| m.score >= threshold);
            debug!(matches = ranked.len(), "history similarity lookup");
            ranked
        }
        Err(e) => {
            warn!(error = %e, "encoder unavailable, matching history by keywords");
            keyword_matches(entries, query, top_k)
        }
    }
}

async fn rank_by_embedding(
    entries: &[HistoryEntry],
    query: &str,
    embedder: &EmbedBackend,
) -> Result<Vec<f32>> {
    let query_vec = embedder.embed(query).await?;
    let questions: Vec<String> = entries.iter().map(|e| e.user_query.clone()).collect();
    let stored = embedder
        .embed_batch(&questions, DEFAULT_EMBED_CONCURRENCY)
        .await?;

    Ok(stored.iter().map(|v| cosine(&query_vec, v)).collect())
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b + 1e-8)
}

/// Score is the fraction of query words that appear in the stored question.
fn keyword_matches(entries: Vec<HistoryEntry>, query: &str, top_k: usize) -> Vec<SimilarExchange> {
    let lowered = query.to_lowercase();
    let terms: Vec<&str> = lowered.split_whitespace().collect();
    if terms.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<SimilarExchange> = entries
        .into_iter()
        .filter_map(|entry| {
            let question = entry.user_query.to_lowercase();
            let found = terms.iter().filter(|t| question.contains(*t)).count();
            (found > 0).then(|| SimilarExchange {
                score: found as f32 / terms.len() as f32,
                entry,
            })
        })
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(top_k);
    matches
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let context_raw: Option<String> = row.get(4)?;
    Ok(HistoryEntry {
        id: row.get(0)?,
        user_query: row.get(1)?,
        assistant_response: row.get(2)?,
        tool_used: row.get(3)?,
        // Unparseable context is dropped rather than failing the whole listing
        context_data: context_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
        timestamp: row.get(5)?,
    })
}
