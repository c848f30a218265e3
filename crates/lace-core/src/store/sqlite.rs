//! Durable `ThreadStore` backed by `rusqlite`, rooted at `$LACE_DIR`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{LaceError, LaceResult};
use crate::event::{Event, EventId, EventKind, ThreadId};
use crate::thread::Thread;
use crate::thread_store::ThreadStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS threads (
    id TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    clock INTEGER NOT NULL DEFAULT 0,
    root_order INTEGER
);
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    thread_id TEXT NOT NULL REFERENCES threads(id),
    seq INTEGER NOT NULL,
    kind_json TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_thread ON events(thread_id, seq);
CREATE TABLE IF NOT EXISTS canonical_ids (
    canonical_id TEXT PRIMARY KEY,
    shadow_id TEXT NOT NULL
);
";

#[derive(Clone)]
pub struct SqliteThreadStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteThreadStore {
    pub async fn connect(path: impl AsRef<Path>) -> LaceResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| LaceError::PersistenceUnavailable(e.to_string()))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// An in-memory sqlite connection, useful for tests that want to
    /// exercise the real SQL path without touching disk.
    pub async fn connect_in_memory() -> LaceResult<Self> {
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| LaceError::PersistenceUnavailable(e.to_string()))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run_blocking<F, R>(&self, f: F) -> LaceResult<R>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn_arc = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn_arc.lock().expect("sqlite connection mutex poisoned");
            f(&mut conn)
        })
        .await
        .map_err(|e| LaceError::PersistenceUnavailable(e.to_string()))?
        .map_err(LaceError::from)
    }
}

/// Escapes `%`, `_` and the escape character itself so a `ThreadId` can be
/// used as a literal prefix in a `LIKE ... ESCAPE '\'` pattern (thread ids
/// routinely contain `_`, which is otherwise a single-character wildcard).
fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn row_to_event(thread_id: ThreadId, id: String, seq: i64, kind_json: String) -> LaceResult<Event> {
    let kind: EventKind = serde_json::from_str(&kind_json)?;
    Ok(Event {
        id: EventId(id.parse().map_err(|_| {
            LaceError::Internal(format!("stored event id is not a uuid: {id}"))
        })?),
        thread_id,
        timestamp: seq as u64,
        kind,
    })
}

#[async_trait]
impl ThreadStore for SqliteThreadStore {
    async fn create_thread(&self, id: &ThreadId) -> LaceResult<()> {
        let id = id.clone();
        self.run_blocking(move |conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM threads WHERE id = ?",
                    params![id.as_str()],
                    |r| r.get(0),
                )
                .optional()?;
            if exists.is_some() {
                // Surfaced as DuplicateThread by the caller below; rusqlite
                // gives us no typed signal here, so we use a constraint
                // violation as the marker and translate it.
                return Err(rusqlite::Error::QueryReturnedNoRows);
            }
            let next_root_order: i64 = conn.query_row(
                "SELECT COALESCE(MAX(root_order), -1) + 1 FROM threads",
                [],
                |r| r.get(0),
            )?;
            let root_order = if id.is_root() {
                Some(next_root_order)
            } else {
                None
            };
            conn.execute(
                "INSERT INTO threads (id, created_at, updated_at, clock, root_order) VALUES (?, 0, 0, 0, ?)",
                params![id.as_str(), root_order],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            LaceError::Sqlite(rusqlite::Error::QueryReturnedNoRows) => {
                LaceError::DuplicateThread(id.clone())
            }
            other => other,
        })
    }

    async fn append_event(&self, thread_id: &ThreadId, kind: EventKind) -> LaceResult<Event> {
        let thread_id_owned = thread_id.clone();
        let kind_json = serde_json::to_string(&kind)?;
        let (event_id, seq) = self
            .run_blocking(move |conn| {
                let tx = conn.transaction()?;
                let seq: i64 = tx
                    .query_row(
                        "SELECT clock FROM threads WHERE id = ?",
                        params![thread_id_owned.as_str()],
                        |r| r.get(0),
                    )
                    .optional()?
                    .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                let seq = seq + 1;
                let event_id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO events (id, thread_id, seq, kind_json) VALUES (?, ?, ?, ?)",
                    params![event_id, thread_id_owned.as_str(), seq, kind_json],
                )?;
                tx.execute(
                    "UPDATE threads SET clock = ?, updated_at = ? WHERE id = ?",
                    params![seq, seq, thread_id_owned.as_str()],
                )?;
                tx.commit()?;
                Ok((event_id, seq))
            })
            .await
            .map_err(|e| match e {
                LaceError::Sqlite(rusqlite::Error::QueryReturnedNoRows) => {
                    LaceError::ThreadNotFound(thread_id.clone())
                }
                other => other,
            })?;
        Ok(Event {
            id: EventId(event_id.parse().expect("uuid we just generated")),
            thread_id: thread_id.clone(),
            timestamp: seq as u64,
            kind,
        })
    }

    async fn get_events(&self, thread_id: &ThreadId) -> LaceResult<Vec<Event>> {
        let tid = thread_id.clone();
        let rows: Vec<(String, i64, String)> = self
            .run_blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, seq, kind_json FROM events WHERE thread_id = ? ORDER BY seq ASC",
                )?;
                let rows = stmt
                    .query_map(params![tid.as_str()], |r| {
                        Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?, r.get::<_, String>(2)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter()
            .map(|(id, seq, kind_json)| row_to_event(thread_id.clone(), id, seq, kind_json))
            .collect()
    }

    async fn get_main_and_delegate_events(&self, root_id: &ThreadId) -> LaceResult<Vec<Event>> {
        let prefix = format!("{}.%", escape_like(root_id.as_str()));
        let root_str = root_id.as_str().to_string();
        let rows: Vec<(String, String, i64, String)> = self
            .run_blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT thread_id, id, seq, kind_json FROM events \
                     WHERE thread_id = ?1 OR thread_id LIKE ?2 ESCAPE '\\' \
                     ORDER BY seq ASC",
                )?;
                let rows = stmt
                    .query_map(params![root_str, prefix], |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, i64>(2)?,
                            r.get::<_, String>(3)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter()
            .map(|(tid, id, seq, kind_json)| {
                row_to_event(ThreadId::from_raw(tid), id, seq, kind_json)
            })
            .collect()
    }

    async fn get_latest_thread_id(&self) -> LaceResult<Option<ThreadId>> {
        let id: Option<String> = self
            .run_blocking(|conn| {
                conn.query_row(
                    "SELECT id FROM threads WHERE root_order IS NOT NULL ORDER BY root_order DESC LIMIT 1",
                    [],
                    |r| r.get(0),
                )
                .optional()
            })
            .await?;
        Ok(id.map(ThreadId::from_raw))
    }

    async fn has_thread(&self, id: &ThreadId) -> LaceResult<bool> {
        let id = id.clone();
        self.run_blocking(move |conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM threads WHERE id = ?",
                    params![id.as_str()],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(exists.is_some())
        })
        .await
    }

    async fn get_thread(&self, id: &ThreadId) -> LaceResult<Option<Thread>> {
        let tid = id.clone();
        self.run_blocking(move |conn| {
            conn.query_row(
                "SELECT created_at, updated_at FROM threads WHERE id = ?",
                params![tid.as_str()],
                |r| {
                    Ok(Thread {
                        id: tid.clone(),
                        created_at: r.get::<_, i64>(0)? as u64,
                        updated_at: r.get::<_, i64>(1)? as u64,
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn canonical_id(&self, id: &ThreadId) -> LaceResult<ThreadId> {
        let mut current = id.clone();
        loop {
            let next: Option<String> = self
                .run_blocking({
                    let current = current.clone();
                    move |conn| {
                        conn.query_row(
                            "SELECT shadow_id FROM canonical_ids WHERE canonical_id = ?",
                            params![current.as_str()],
                            |r| r.get(0),
                        )
                        .optional()
                    }
                })
                .await?;
            match next {
                Some(next) if next != current.as_str() => current = ThreadId::from_raw(next),
                _ => break,
            }
        }
        Ok(current)
    }

    async fn rebind_canonical(&self, canonical: &ThreadId, shadow: &ThreadId) -> LaceResult<()> {
        let canonical = canonical.clone();
        let shadow = shadow.clone();
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO canonical_ids (canonical_id, shadow_id) VALUES (?, ?) \
                 ON CONFLICT(canonical_id) DO UPDATE SET shadow_id = excluded.shadow_id",
                params![canonical.as_str(), shadow.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    async fn direct_children(&self, parent: &ThreadId) -> LaceResult<Vec<ThreadId>> {
        let prefix = format!("{parent}.");
        let ids: Vec<String> = self
            .run_blocking(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id FROM threads WHERE id LIKE ? || '%'",
                )?;
                let rows = stmt
                    .query_map(params![prefix], |r| r.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(ids
            .into_iter()
            .filter(|id| {
                id.strip_prefix(prefix.as_str())
                    .map(|rest| !rest.contains('.'))
                    .unwrap_or(false)
            })
            .map(ThreadId::from_raw)
            .collect())
    }
}
