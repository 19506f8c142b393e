//! SQLite persistence backend.
//!
//! One connection behind a mutex. Queries run on the blocking pool so a slow
//! disk never stalls the async workers.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use super::traits::{PersistedState, Persistence};
use crate::sessions::{ChatMessage, Role};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT NOT NULL,
    role        TEXT NOT NULL,
    content     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_username ON messages(username, id);
CREATE TABLE IF NOT EXISTS chat_state (
    username          TEXT PRIMARY KEY,
    active_agent      TEXT NOT NULL,
    last_interaction  TEXT NOT NULL
);
";

pub struct SqlitePersistence {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePersistence {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize database schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await
        .context("SQLite task failed")?
    }
}

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {raw}"))
}

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn load_history(&self, username: &str, limit: usize) -> anyhow::Result<Vec<ChatMessage>> {
        let username = username.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content FROM (
                     SELECT id, role, content FROM messages
                     WHERE username = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![username, limit], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut messages = Vec::new();
            for row in rows {
                let (role, content) = row?;
                match Role::parse(&role) {
                    Some(role) => messages.push(ChatMessage { role, content }),
                    None => tracing::warn!(role = %role, "skipping message with unknown role"),
                }
            }
            Ok(messages)
        })
        .await
    }

    async fn append_turn(
        &self,
        username: &str,
        user_text: Option<&str>,
        assistant_text: Option<&str>,
    ) -> anyhow::Result<()> {
        let username = username.to_string();
        let entries: Vec<(Role, String)> = [
            user_text.map(|t| (Role::User, t.to_string())),
            assistant_text.map(|t| (Role::Assistant, t.to_string())),
        ]
        .into_iter()
        .flatten()
        .collect();
        if entries.is_empty() {
            return Ok(());
        }

        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction()?;
            for (role, content) in &entries {
                tx.execute(
                    "INSERT INTO messages (username, role, content, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![username, role.as_str(), content, now],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn load_state(&self, username: &str) -> anyhow::Result<Option<PersistedState>> {
        let username = username.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT active_agent, last_interaction FROM chat_state WHERE username = ?1",
                    params![username],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            row.map(|(active_agent, raw)| -> anyhow::Result<PersistedState> {
                Ok(PersistedState {
                    active_agent,
                    last_interaction: parse_timestamp(&raw)?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn save_state(&self, username: &str, state: &PersistedState) -> anyhow::Result<()> {
        let username = username.to_string();
        let state = state.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO chat_state (username, active_agent, last_interaction)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(username) DO UPDATE SET
                     active_agent = excluded.active_agent,
                     last_interaction = excluded.last_interaction",
                params![username, state.active_agent, state.last_interaction.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear_state(&self, username: &str) -> anyhow::Result<()> {
        let username = username.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM chat_state WHERE username = ?1", params![username])?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn history_round_trip_keeps_order_and_roles() {
        let store = SqlitePersistence::open_in_memory().unwrap();
        store.append_turn("alice", None, Some("greeting")).await.unwrap();
        store.append_turn("alice", Some("q1"), Some("a1")).await.unwrap();
        store.append_turn("bob", Some("other"), None).await.unwrap();
        store.append_turn("alice", Some("q2"), None).await.unwrap();

        let history = store.load_history("alice", 100).await.unwrap();
        assert_eq!(
            history,
            vec![
                ChatMessage::assistant("greeting"),
                ChatMessage::user("q1"),
                ChatMessage::assistant("a1"),
                ChatMessage::user("q2"),
            ]
        );
    }

    #[tokio::test]
    async fn history_limit_returns_latest_oldest_first() {
        let store = SqlitePersistence::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .append_turn("alice", Some(&format!("q{i}")), None)
                .await
                .unwrap();
        }
        let history = store.load_history("alice", 2).await.unwrap();
        assert_eq!(history, vec![ChatMessage::user("q3"), ChatMessage::user("q4")]);
    }

    #[tokio::test]
    async fn empty_turn_writes_nothing() {
        let store = SqlitePersistence::open_in_memory().unwrap();
        store.append_turn("alice", None, None).await.unwrap();
        assert!(store.load_history("alice", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn state_upsert_and_clear() {
        let store = SqlitePersistence::open_in_memory().unwrap();
        assert!(store.load_state("alice").await.unwrap().is_none());

        let first = PersistedState {
            active_agent: "Moderator".into(),
            last_interaction: Utc::now(),
        };
        store.save_state("alice", &first).await.unwrap();
        let second = PersistedState {
            active_agent: "H. L. Mencken".into(),
            last_interaction: Utc::now(),
        };
        store.save_state("alice", &second).await.unwrap();

        let loaded = store.load_state("alice").await.unwrap().unwrap();
        assert_eq!(loaded.active_agent, "H. L. Mencken");
        assert_eq!(
            loaded.last_interaction.timestamp_micros(),
            second.last_interaction.timestamp_micros()
        );

        store.clear_state("alice").await.unwrap();
        assert!(store.load_state("alice").await.unwrap().is_none());
        assert_eq!(store.load_history("alice", 1).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("history.db");
        {
            let store = SqlitePersistence::open(&path).unwrap();
            store.append_turn("alice", Some("remember me"), Some("ok")).await.unwrap();
        }
        let store = SqlitePersistence::open(&path).unwrap();
        let history = store.load_history("alice", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "remember me");
        assert_eq!(store.name(), "sqlite");
    }
}
