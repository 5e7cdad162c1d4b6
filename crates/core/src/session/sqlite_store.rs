//! SQLite-backed session store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::command::VideoSource;

use super::store::{NewSession, SessionFilter, SessionStore, StoreError};
use super::types::{SessionStatus, StreamSession, TransitionOutcome, TransitionUpdate};

/// SQLite-backed session store.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Create a new store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS stream_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                rtmp_url TEXT NOT NULL,
                source TEXT NOT NULL,
                unit_id TEXT,
                unit_name TEXT,
                status TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                stopped_at TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON stream_sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON stream_sessions(status);
            CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON stream_sessions(updated_at);

            CREATE TABLE IF NOT EXISTS user_quotas (
                user_id TEXT PRIMARY KEY,
                allowed INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_where_clause(filter: &SessionFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref user_id) = filter.user_id {
            conditions.push("user_id = ?");
            params.push(Box::new(user_id.clone()));
        }

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<StreamSession> {
        let id: String = row.get(0)?;
        let user_id: String = row.get(1)?;
        let rtmp_url: String = row.get(2)?;
        let source_json: String = row.get(3)?;
        let unit_id: Option<String> = row.get(4)?;
        let unit_name: Option<String> = row.get(5)?;
        let status_str: String = row.get(6)?;
        let error: Option<String> = row.get(7)?;
        let created_at_str: String = row.get(8)?;
        let started_at_str: Option<String> = row.get(9)?;
        let stopped_at_str: Option<String> = row.get(10)?;
        let updated_at_str: String = row.get(11)?;

        let source: VideoSource = serde_json::from_str(&source_json)
            .unwrap_or_else(|_| VideoSource::hosted_url(source_json.clone()));

        let status = SessionStatus::parse(&status_str).unwrap_or(SessionStatus::Error);

        Ok(StreamSession {
            id,
            user_id,
            rtmp_url,
            source,
            unit_id,
            unit_name,
            status,
            error,
            created_at: parse_timestamp(&created_at_str),
            started_at: started_at_str.as_deref().map(parse_timestamp),
            stopped_at: stopped_at_str.as_deref().map(parse_timestamp),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    fn get_locked(conn: &Connection, id: &str) -> Result<Option<StreamSession>, StoreError> {
        let result = conn.query_row(
            "SELECT id, user_id, rtmp_url, source, unit_id, unit_name, status, error, created_at, started_at, stopped_at, updated_at FROM stream_sessions WHERE id = ?",
            params![id],
            Self::row_to_session,
        );

        match result {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SessionStore for SqliteSessionStore {
    fn insert(&self, request: NewSession) -> Result<StreamSession, StoreError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let status = SessionStatus::Starting;

        let source_json = serde_json::to_string(&request.source)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO stream_sessions (id, user_id, rtmp_url, source, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                request.user_id,
                request.rtmp_url,
                source_json,
                status.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(StreamSession {
            id,
            user_id: request.user_id,
            rtmp_url: request.rtmp_url,
            source: request.source,
            unit_id: None,
            unit_name: None,
            status,
            error: None,
            created_at: now,
            started_at: None,
            stopped_at: None,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<StreamSession>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::get_locked(&conn, id)
    }

    fn list(&self, filter: &SessionFilter) -> Result<Vec<StreamSession>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT id, user_id, rtmp_url, source, unit_id, unit_name, status, error, created_at, started_at, stopped_at, updated_at FROM stream_sessions {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_session)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut sessions = Vec::new();
        for row_result in rows {
            let session = row_result.map_err(|e| StoreError::Database(e.to_string()))?;
            sessions.push(session);
        }

        Ok(sessions)
    }

    fn count(&self, filter: &SessionFilter) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM stream_sessions {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn transition(
        &self,
        id: &str,
        from: &[SessionStatus],
        update: TransitionUpdate,
    ) -> Result<TransitionOutcome, StoreError> {
        debug_assert!(!from.is_empty(), "transition requires at least one source state");

        let conn = self.conn.lock().unwrap();

        let to = update.target();
        let now = Utc::now();

        let placeholders = from.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "UPDATE stream_sessions SET \
                status = ?, \
                updated_at = ?, \
                unit_id = COALESCE(?, unit_id), \
                unit_name = COALESCE(?, unit_name), \
                error = COALESCE(?, error), \
                started_at = COALESCE(?, started_at), \
                stopped_at = COALESCE(?, stopped_at) \
             WHERE id = ? AND status IN ({})",
            placeholders
        );

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(to.as_str().to_string()),
            Box::new(now.to_rfc3339()),
            Box::new(update.unit_id.clone()),
            Box::new(update.unit_name.clone()),
            Box::new(update.error.clone()),
            Box::new(update.started_at.map(|t| t.to_rfc3339())),
            Box::new(update.stopped_at.map(|t| t.to_rfc3339())),
            Box::new(id.to_string()),
        ];
        for status in from {
            all_params.push(Box::new(status.as_str().to_string()));
        }

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let changed = conn
            .execute(&sql, param_refs.as_slice())
            .map_err(|e| StoreError::Database(e.to_string()))?;

        // The connection mutex is held across the update and the re-read,
        // so the outcome reflects exactly this statement's effect.
        let session = Self::get_locked(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if changed == 1 {
            Ok(TransitionOutcome::Applied(session))
        } else {
            Ok(TransitionOutcome::Superseded {
                current: session.status,
            })
        }
    }

    fn get_user_quota(&self, user_id: &str) -> Result<Option<u32>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            "SELECT allowed FROM user_quotas WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        );

        match result {
            Ok(allowed) => Ok(Some(allowed)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }

    fn set_user_quota(&self, user_id: &str, allowed: u32) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO user_quotas (user_id, allowed) VALUES (?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET allowed = excluded.allowed",
            params![user_id, allowed],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn list_user_quotas(&self) -> Result<Vec<(String, u32)>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare("SELECT user_id, allowed FROM user_quotas")
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut quotas = Vec::new();
        for row_result in rows {
            quotas.push(row_result.map_err(|e| StoreError::Database(e.to_string()))?);
        }

        Ok(quotas)
    }
}
