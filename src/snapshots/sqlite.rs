//! SQLite-backed snapshot store

use super::{
    ErrorId, ErrorSnapshot, FailureKind, FailureOrigin, SnapshotError, SnapshotQuery,
    SnapshotResult, SnapshotStore,
};
use crate::state_machine::{ClientId, Context, WorkflowState};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS error_snapshots (
    error_id TEXT PRIMARY KEY,
    recorded_at TEXT NOT NULL,
    client_id TEXT NOT NULL,
    state TEXT NOT NULL,
    kind TEXT NOT NULL,
    origin TEXT NOT NULL,
    message TEXT NOT NULL,
    context TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_error_snapshots_recorded_at ON error_snapshots(recorded_at);
CREATE INDEX IF NOT EXISTS idx_error_snapshots_client ON error_snapshots(client_id, recorded_at);
";

const COLUMNS: &str = "error_id, recorded_at, client_id, state, kind, origin, message, context";

/// How long a statement waits on a locked database before giving up
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(500);

/// Thread-safe snapshot database handle.
///
/// Every statement runs on the blocking pool so a slow or locked database
/// never stalls the async workers that drive conversations.
#[derive(Clone)]
pub struct SqliteSnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

/// Raw row before the JSON and enum columns are decoded
type Row = (String, String, String, String, String, String, String, String);

impl SqliteSnapshotStore {
    /// Open or create the database at `path`, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> SnapshotResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SnapshotError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> SnapshotResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SnapshotResult<Self> {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Change how long statements wait on a locked database.
    /// Keep it below the recorder's write timeout.
    pub fn set_busy_timeout(&self, timeout: Duration) -> SnapshotResult<()> {
        lock(&self.conn)?.busy_timeout(timeout)?;
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> SnapshotResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> SnapshotResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&*lock(&conn)?))
            .await
            .map_err(|e| SnapshotError::Unavailable(format!("snapshot task failed: {e}")))?
    }
}

fn lock(conn: &Mutex<Connection>) -> SnapshotResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| SnapshotError::Unavailable("connection lock poisoned".into()))
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn insert(&self, snapshot: &ErrorSnapshot) -> SnapshotResult<()> {
        let context = serde_json::to_string(&snapshot.context)?;
        let snapshot = snapshot.clone();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO error_snapshots (error_id, recorded_at, client_id, state, kind, origin, message, context)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    snapshot.error_id.as_str(),
                    timestamp(snapshot.recorded_at),
                    snapshot.client_id.as_str(),
                    snapshot.state.as_str(),
                    snapshot.kind.as_str(),
                    snapshot.origin.prefix(),
                    snapshot.message,
                    context,
                ],
            )?;
            if inserted == 0 {
                return Err(SnapshotError::Duplicate(snapshot.error_id));
            }
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &ErrorId) -> SnapshotResult<Option<ErrorSnapshot>> {
        let id = id.clone();
        let row = self
            .with_conn(move |conn| {
                let row = conn
                    .query_row(
                        &format!("SELECT {COLUMNS} FROM error_snapshots WHERE error_id = ?1"),
                        params![id.as_str()],
                        read_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(decode).transpose()
    }

    async fn query(&self, query: &SnapshotQuery) -> SnapshotResult<Vec<ErrorSnapshot>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql + Send>> = Vec::new();

        if let Some(since) = query.since {
            clauses.push("recorded_at >= ?");
            values.push(Box::new(timestamp(since)));
        }
        if let Some(until) = query.until {
            clauses.push("recorded_at <= ?");
            values.push(Box::new(timestamp(until)));
        }
        if let Some(client) = &query.client {
            clauses.push("client_id = ?");
            values.push(Box::new(client.as_str().to_string()));
        }
        if let Some(kind) = query.kind {
            clauses.push("kind = ?");
            values.push(Box::new(kind.as_str()));
        }
        if let Some(state) = query.state {
            clauses.push("state = ?");
            values.push(Box::new(state.as_str()));
        }
        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let limit = i64::try_from(query.effective_limit()).unwrap_or(i64::MAX);
        values.push(Box::new(limit));
        let sql = format!(
            "SELECT {COLUMNS} FROM error_snapshots {filter}
             ORDER BY recorded_at DESC, error_id DESC LIMIT ?"
        );

        let rows: Vec<Row> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(values.iter()), read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(decode).collect()
    }

    async fn contains(&self, id: &ErrorId) -> SnapshotResult<bool> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM error_snapshots WHERE error_id = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> SnapshotResult<usize> {
        let cutoff = timestamp(cutoff);
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM error_snapshots WHERE recorded_at < ?1",
                params![cutoff],
            )?;
            Ok(removed)
        })
        .await
    }
}

/// Fixed-width UTC timestamps so text comparison orders chronologically
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode(row: Row) -> SnapshotResult<ErrorSnapshot> {
    let (error_id, recorded_at, client_id, state, kind, origin, message, context) = row;
    let corrupt = |field: &str, value: &str| {
        SnapshotError::Unavailable(format!("corrupt {field} in snapshot {error_id}: {value}"))
    };

    let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
        .map_err(|_| corrupt("recorded_at", &recorded_at))?
        .with_timezone(&Utc);
    let state: WorkflowState = state.parse().map_err(|_| corrupt("state", &state))?;
    let kind: FailureKind = kind.parse().map_err(|_| corrupt("kind", &kind))?;
    let origin = FailureOrigin::from_prefix(&origin).ok_or_else(|| corrupt("origin", &origin))?;
    let context: Context = serde_json::from_str(&context)?;
    let error_id = ErrorId::parse(&error_id).ok_or_else(|| corrupt("error_id", &error_id))?;

    Ok(ErrorSnapshot {
        error_id,
        recorded_at,
        client_id: ClientId::new(client_id),
        state,
        context,
        kind,
        origin,
        message,
    })
}
