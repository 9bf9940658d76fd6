//! SQLite persistence for conversation history and quick answers.
//!
//! Every operation opens its own connection, runs, and closes it again; no
//! handle or row outlives a single call.

use crate::fingerprint::hash_question;
use crate::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use quickframe_types::{
    CachedAnswer, ConversationEntry, Fingerprint, MemoryStats, PopularQuestion, QuickAnswer,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File-backed store for the two memory tables.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self {
            path: path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    /// Initialize database schema. Safe to run against an existing file.
    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                question_hash TEXT NOT NULL,
                data_hash TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                response_time REAL NOT NULL DEFAULT 0.0
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_session
                ON conversations(session_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_conversations_data_hash
                ON conversations(data_hash);

            CREATE TABLE IF NOT EXISTS quick_answers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question_hash TEXT NOT NULL,
                data_hash TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 1,
                last_used TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (question_hash, data_hash)
            );

            CREATE INDEX IF NOT EXISTS idx_quick_answers_popularity
                ON quick_answers(data_hash, hit_count);
            "#,
        )?;
        Ok(())
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// Append one conversation row stamped with the current time.
    pub fn insert_conversation(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
        data_hash: &Fingerprint,
        response_time: f64,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO conversations (
                session_id, question, answer, question_hash, data_hash, timestamp, response_time
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                session_id,
                question,
                answer,
                hash_question(question).as_str(),
                data_hash.as_str(),
                now_string(),
                response_time,
            ],
        )?;
        debug!(target: "quickframe::store", "Logged conversation for session {}", session_id);
        Ok(())
    }

    /// The most recent `limit` conversations for a session, oldest first.
    pub fn recent_conversations(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM conversations
            WHERE session_id = ?1
            ORDER BY timestamp DESC, id DESC
            LIMIT ?2
            "#,
        )?;
        let mut entries = stmt
            .query_map(params![session_id, sql_limit(limit)], |row| {
                Self::row_to_conversation(row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    }

    /// Delete every conversation of a session. Quick answers are dataset-scoped and stay.
    pub fn delete_session(&self, session_id: &str) -> Result<u32> {
        let conn = self.connect()?;
        let count = conn.execute(
            "DELETE FROM conversations WHERE session_id = ?1",
            params![session_id],
        )?;
        info!(target: "quickframe::store", "Cleared {} conversations for session {}", count, session_id);
        Ok(count as u32)
    }

    // =========================================================================
    // Quick answers
    // =========================================================================

    /// Look up a cached answer, counting the hit.
    ///
    /// On a hit the row's `hit_count` is incremented and `last_used`
    /// refreshed; the returned count is the one after the increment. The read
    /// and the update are separate statements, so concurrent writers from
    /// other processes may lose increments.
    pub fn lookup_quick_answer(
        &self,
        question_hash: &Fingerprint,
        data_hash: &Fingerprint,
    ) -> Result<Option<CachedAnswer>> {
        let conn = self.connect()?;
        let found: Option<(String, i64)> = conn
            .query_row(
                "SELECT answer, hit_count FROM quick_answers WHERE question_hash = ?1 AND data_hash = ?2",
                params![question_hash.as_str(), data_hash.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((answer, hit_count)) = found else {
            return Ok(None);
        };

        conn.execute(
            r#"
            UPDATE quick_answers SET hit_count = hit_count + 1, last_used = ?1
            WHERE question_hash = ?2 AND data_hash = ?3
            "#,
            params![now_string(), question_hash.as_str(), data_hash.as_str()],
        )?;

        Ok(Some(CachedAnswer {
            answer,
            hit_count: (hit_count + 1) as u32,
        }))
    }

    /// Insert or replace the quick answer for a key.
    ///
    /// Replacing resets `hit_count` to 1 and both timestamps to now; the
    /// latest answer wins over accumulated popularity.
    pub fn upsert_quick_answer(
        &self,
        question_hash: &Fingerprint,
        data_hash: &Fingerprint,
        question: &str,
        answer: &str,
    ) -> Result<()> {
        let conn = self.connect()?;
        let now = now_string();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO quick_answers (
                question_hash, data_hash, question, answer, hit_count, last_used, created_at
            ) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)
            "#,
            params![
                question_hash.as_str(),
                data_hash.as_str(),
                question,
                answer,
                now,
                now,
            ],
        )?;
        debug!(target: "quickframe::store", "Stored quick answer {}/{}", question_hash, data_hash);
        Ok(())
    }

    /// Read a quick-answer row without counting a hit.
    pub fn quick_answer(
        &self,
        question_hash: &Fingerprint,
        data_hash: &Fingerprint,
    ) -> Result<Option<QuickAnswer>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT * FROM quick_answers WHERE question_hash = ?1 AND data_hash = ?2",
                params![question_hash.as_str(), data_hash.as_str()],
                |row| Self::row_to_quick_answer(row),
            )
            .optional()?;
        Ok(row)
    }

    /// Top `limit` questions for a dataset fingerprint, most hits first.
    pub fn popular_questions(
        &self,
        data_hash: &Fingerprint,
        limit: usize,
    ) -> Result<Vec<PopularQuestion>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT question, hit_count, last_used FROM quick_answers
            WHERE data_hash = ?1
            ORDER BY hit_count DESC, last_used DESC
            LIMIT ?2
            "#,
        )?;
        let popular = stmt
            .query_map(params![data_hash.as_str(), sql_limit(limit)], |row| {
                let hit_count: i64 = row.get("hit_count")?;
                let last_used: String = row.get("last_used")?;
                Ok(PopularQuestion {
                    question: row.get("question")?,
                    hit_count: hit_count as u32,
                    last_used: parse_time(&last_used),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(popular)
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    pub fn count_conversations(&self, session_id: &str) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM conversations WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn count_quick_answers(&self, data_hash: &Fingerprint) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM quick_answers WHERE data_hash = ?1",
            params![data_hash.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn total_conversations(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Mean response time in seconds for a dataset; 0 when nothing matches.
    pub fn average_response_time(&self, data_hash: &Fingerprint) -> Result<f64> {
        let conn = self.connect()?;
        let avg: f64 = conn.query_row(
            "SELECT COALESCE(AVG(response_time), 0.0) FROM conversations WHERE data_hash = ?1",
            params![data_hash.as_str()],
            |row| row.get(0),
        )?;
        Ok(avg)
    }

    /// Usage summary for a session working on a dataset.
    pub fn stats(&self, session_id: &str, data_hash: &Fingerprint) -> Result<MemoryStats> {
        Ok(MemoryStats {
            session_count: self.count_conversations(session_id)?,
            quick_answers_count: self.count_quick_answers(data_hash)?,
            total_conversations: self.total_conversations()?,
            avg_response_time: self.average_response_time(data_hash)?,
        })
    }

    /// Wipe both tables. Irreversible.
    pub fn delete_all(&self) -> Result<bool> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            DELETE FROM conversations;
            DELETE FROM quick_answers;
            "#,
        )?;
        info!(target: "quickframe::store", "Wiped all conversations and quick answers");
        Ok(true)
    }

    // =========================================================================
    // Row conversion helpers
    // =========================================================================

    fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<ConversationEntry> {
        let question_hash: String = row.get("question_hash")?;
        let data_hash: String = row.get("data_hash")?;
        let timestamp: String = row.get("timestamp")?;

        Ok(ConversationEntry {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            question: row.get("question")?,
            answer: row.get("answer")?,
            question_hash: question_hash.into(),
            data_hash: data_hash.into(),
            timestamp: parse_time(&timestamp),
            response_time: row.get("response_time")?,
        })
    }

    fn row_to_quick_answer(row: &rusqlite::Row) -> rusqlite::Result<QuickAnswer> {
        let question_hash: String = row.get("question_hash")?;
        let data_hash: String = row.get("data_hash")?;
        let hit_count: i64 = row.get("hit_count")?;
        let last_used: String = row.get("last_used")?;
        let created_at: String = row.get("created_at")?;

        Ok(QuickAnswer {
            id: row.get("id")?,
            question_hash: question_hash.into(),
            data_hash: data_hash.into(),
            question: row.get("question")?,
            answer: row.get("answer")?,
            hit_count: hit_count as u32,
            last_used: parse_time(&last_used),
            created_at: parse_time(&created_at),
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite reads a negative LIMIT as unbounded, so saturate instead of wrapping.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_store() -> (MemoryStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryStore::open(&temp_dir.path().join("memory.db")).unwrap();
        (store, temp_dir)
    }

    fn keys(question: &str) -> (Fingerprint, Fingerprint) {
        (hash_question(question), Fingerprint::new("data-1"))
    }

    #[test]
    fn test_open_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("memory.db");

        let store = MemoryStore::open(&path).unwrap();
        store
            .insert_conversation("s1", "q", "{}", &Fingerprint::new("d"), 0.1)
            .unwrap();

        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.total_conversations().unwrap(), 1);
    }

    #[test]
    fn test_lookup_miss() {
        let (store, _dir) = create_test_store();
        let (q, d) = keys("nothing here");
        assert!(store.lookup_quick_answer(&q, &d).unwrap().is_none());
    }

    #[test]
    fn test_hit_count_monotonic() {
        let (store, _dir) = create_test_store();
        let (q, d) = keys("Top 5 regions by sales");
        store
            .upsert_quick_answer(&q, &d, "Top 5 regions by sales", r#"{"answer":"East"}"#)
            .unwrap();

        for expected in 2..=6 {
            let hit = store.lookup_quick_answer(&q, &d).unwrap().unwrap();
            assert_eq!(hit.hit_count, expected);
            assert_eq!(hit.answer, r#"{"answer":"East"}"#);
        }

        let row = store.quick_answer(&q, &d).unwrap().unwrap();
        assert_eq!(row.hit_count, 6);
        assert!(row.last_used >= row.created_at);
    }

    #[test]
    fn test_lookup_refreshes_last_used() {
        let (store, _dir) = create_test_store();
        let (q, d) = keys("median price");
        store.upsert_quick_answer(&q, &d, "median price", "{}").unwrap();
        let before = store.quick_answer(&q, &d).unwrap().unwrap();

        std::thread::sleep(Duration::from_millis(5));
        store.lookup_quick_answer(&q, &d).unwrap().unwrap();

        let after = store.quick_answer(&q, &d).unwrap().unwrap();
        assert!(after.last_used > before.last_used);
        assert_eq!(after.created_at, before.created_at);
    }

    #[test]
    fn test_upsert_replaces_and_resets_hits() {
        let (store, _dir) = create_test_store();
        let (q, d) = keys("average sales");
        store.upsert_quick_answer(&q, &d, "average sales", "old").unwrap();
        store.lookup_quick_answer(&q, &d).unwrap();
        store.lookup_quick_answer(&q, &d).unwrap();
        assert_eq!(store.quick_answer(&q, &d).unwrap().unwrap().hit_count, 3);

        store.upsert_quick_answer(&q, &d, "Average sales", "new").unwrap();

        let row = store.quick_answer(&q, &d).unwrap().unwrap();
        assert_eq!(row.hit_count, 1);
        assert_eq!(row.answer, "new");
        assert_eq!(row.question, "Average sales");
        assert_eq!(store.count_quick_answers(&d).unwrap(), 1);
    }

    #[test]
    fn test_upsert_updates_timestamps() {
        let (store, _dir) = create_test_store();
        let (q, d) = keys("max discount");
        store.upsert_quick_answer(&q, &d, "max discount", "old").unwrap();
        let first = store.quick_answer(&q, &d).unwrap().unwrap();

        std::thread::sleep(Duration::from_millis(5));
        store.upsert_quick_answer(&q, &d, "max discount", "new").unwrap();

        let second = store.quick_answer(&q, &d).unwrap().unwrap();
        assert!(second.created_at > first.created_at);
        assert!(second.last_used > first.last_used);
    }

    #[test]
    fn test_same_question_different_datasets() {
        let (store, _dir) = create_test_store();
        let q = hash_question("row count");
        let d1 = Fingerprint::new("d1");
        let d2 = Fingerprint::new("d2");

        store.upsert_quick_answer(&q, &d1, "row count", "one").unwrap();
        store.upsert_quick_answer(&q, &d2, "row count", "two").unwrap();

        assert_eq!(store.lookup_quick_answer(&q, &d1).unwrap().unwrap().answer, "one");
        assert_eq!(store.lookup_quick_answer(&q, &d2).unwrap().unwrap().answer, "two");
    }

    #[test]
    fn test_recent_conversations_order_and_limit() {
        let (store, _dir) = create_test_store();
        let d = Fingerprint::new("d");
        for i in 0..5 {
            store
                .insert_conversation("s1", &format!("question {}", i), "{}", &d, 0.2)
                .unwrap();
        }

        let recent = store.recent_conversations("s1", 3).unwrap();
        let questions: Vec<_> = recent.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions, vec!["question 2", "question 3", "question 4"]);
        assert_eq!(recent[0].question_hash, hash_question("question 2"));

        // Limits past i64::MAX saturate rather than wrapping negative
        assert_eq!(store.recent_conversations("s1", usize::MAX).unwrap().len(), 5);
        assert_eq!(store.recent_conversations("s1", 0).unwrap().len(), 0);
    }

    #[test]
    fn test_session_isolation() {
        let (store, _dir) = create_test_store();
        let d = Fingerprint::new("d");
        store.insert_conversation("A", "from a", "{}", &d, 0.1).unwrap();
        store.insert_conversation("B", "from b", "{}", &d, 0.1).unwrap();

        let a = store.recent_conversations("A", 10).unwrap();
        assert_eq!(a.len(), 1);
        assert!(a.iter().all(|e| e.session_id == "A"));
    }

    #[test]
    fn test_popular_questions_ranked_by_hits() {
        let (store, _dir) = create_test_store();
        let d = Fingerprint::new("d");
        for (question, lookups) in [("rare", 0), ("common", 3), ("medium", 1)] {
            let q = hash_question(question);
            store.upsert_quick_answer(&q, &d, question, "{}").unwrap();
            for _ in 0..lookups {
                store.lookup_quick_answer(&q, &d).unwrap();
            }
        }
        store
            .upsert_quick_answer(&hash_question("elsewhere"), &Fingerprint::new("other"), "elsewhere", "{}")
            .unwrap();

        let popular = store.popular_questions(&d, 2).unwrap();
        let ranked: Vec<_> = popular.iter().map(|p| (p.question.as_str(), p.hit_count)).collect();
        assert_eq!(ranked, vec![("common", 4), ("medium", 2)]);
        assert_eq!(store.popular_questions(&d, usize::MAX).unwrap().len(), 3);
    }

    #[test]
    fn test_sql_limit_saturates() {
        assert_eq!(sql_limit(7), 7);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
    }

    #[test]
    fn test_aggregates() {
        let (store, _dir) = create_test_store();
        let d = Fingerprint::new("d");
        let other = Fingerprint::new("other");

        assert_eq!(store.average_response_time(&d).unwrap(), 0.0);

        store.insert_conversation("s1", "a", "{}", &d, 1.0).unwrap();
        store.insert_conversation("s1", "b", "{}", &d, 3.0).unwrap();
        store.insert_conversation("s2", "c", "{}", &other, 10.0).unwrap();
        store.upsert_quick_answer(&hash_question("a"), &d, "a", "{}").unwrap();

        let stats = store.stats("s1", &d).unwrap();
        assert_eq!(
            stats,
            MemoryStats {
                session_count: 2,
                quick_answers_count: 1,
                total_conversations: 3,
                avg_response_time: 2.0,
            }
        );
    }

    #[test]
    fn test_delete_session_keeps_quick_answers() {
        let (store, _dir) = create_test_store();
        let d = Fingerprint::new("d");
        store.insert_conversation("s1", "a", "{}", &d, 0.1).unwrap();
        store.insert_conversation("s1", "b", "{}", &d, 0.1).unwrap();
        store.insert_conversation("s2", "c", "{}", &d, 0.1).unwrap();
        store.upsert_quick_answer(&hash_question("a"), &d, "a", "{}").unwrap();

        assert_eq!(store.delete_session("s1").unwrap(), 2);
        assert_eq!(store.count_conversations("s1").unwrap(), 0);
        assert_eq!(store.count_conversations("s2").unwrap(), 1);
        assert_eq!(store.count_quick_answers(&d).unwrap(), 1);
    }

    #[test]
    fn test_delete_all() {
        let (store, _dir) = create_test_store();
        let d = Fingerprint::new("d");
        store.insert_conversation("s1", "a", "{}", &d, 0.1).unwrap();
        store.upsert_quick_answer(&hash_question("a"), &d, "a", "{}").unwrap();

        assert!(store.delete_all().unwrap());
        assert_eq!(store.total_conversations().unwrap(), 0);
        assert_eq!(store.count_quick_answers(&d).unwrap(), 0);
    }
}
