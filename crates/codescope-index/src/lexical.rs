//! BM25 lexical index over chunk text, backed by SQLite FTS5.

use codescope_core::CodescopeError;
use rusqlite::{params, Connection};

use crate::store::{db_error, IndexStore};

/// Ranked keyword lookup by chunk id.
pub trait LexicalIndex: Send + Sync {
    /// Replace the indexed text of a chunk.
    fn index(&self, chunk_id: &str, text: &str) -> Result<(), CodescopeError>;

    fn remove(&self, chunk_id: &str) -> Result<(), CodescopeError>;

    /// Chunk ids ranked best-first with a positive relevance score.
    fn query(&self, text: &str, limit: usize) -> Result<Vec<(String, f64)>, CodescopeError>;
}

impl LexicalIndex for IndexStore {
    fn index(&self, chunk_id: &str, text: &str) -> Result<(), CodescopeError> {
        let conn = self.conn()?;
        index_with(&conn, chunk_id, text)
    }

    fn remove(&self, chunk_id: &str) -> Result<(), CodescopeError> {
        let conn = self.conn()?;
        remove_with(&conn, chunk_id)
    }

    /// FTS5's `bm25()` is lower-is-better and negative; scores are negated.
    fn query(&self, text: &str, limit: usize) -> Result<Vec<(String, f64)>, CodescopeError> {
        let fts_query = sanitize_fts_query(text);
        if fts_query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT d.chunk_id, bm25(lexical_fts) AS score
                 FROM lexical_fts f
                 JOIN lexical_docs d ON d.seq = f.rowid
                 WHERE lexical_fts MATCH ?1
                 ORDER BY score, d.chunk_id
                 LIMIT ?2",
            )
            .map_err(|e| db_error("failed to prepare keyword query", e))?;
        let rows = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(|e| db_error("keyword search failed", e))?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, score) = row.map_err(|e| db_error("failed to read row", e))?;
            hits.push((id, -score));
        }
        Ok(hits)
    }
}

/// Upsert by chunk id; the `lexical_docs` triggers keep the FTS rows in step.
pub(crate) fn index_with(conn: &Connection, chunk_id: &str, text: &str) -> Result<(), CodescopeError> {
    conn.execute(
        "INSERT INTO lexical_docs (chunk_id, text) VALUES (?1, ?2)
         ON CONFLICT(chunk_id) DO UPDATE SET text = excluded.text
         WHERE lexical_docs.text <> excluded.text",
        params![chunk_id, text],
    )
    .map_err(|e| db_error("failed to index chunk text", e))?;
    Ok(())
}

pub(crate) fn remove_with(conn: &Connection, chunk_id: &str) -> Result<(), CodescopeError> {
    conn.execute("DELETE FROM lexical_docs WHERE chunk_id = ?1", params![chunk_id])
        .map_err(|e| db_error("failed to remove chunk text", e))?;
    Ok(())
}

/// Turn free text into an FTS5 query: each word quoted, joined with `OR`.
///
/// # Examples
///
/// ```
/// use codescope_index::lexical::sanitize_fts_query;
///
/// assert_eq!(sanitize_fts_query("parse config!"), "\"parse\" OR \"config\"");
/// assert_eq!(sanitize_fts_query("***"), "");
/// ```
pub fn sanitize_fts_query(query: &str) -> String {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|w| {
            let clean: String = w
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            format!("\"{clean}\"")
        })
        .filter(|w| w != "\"\"")
        .collect();
    words.join(" OR ")
}
