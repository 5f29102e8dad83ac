use chrono::Utc;
use rusqlite::params;

use super::{parse_datetime, to_timestamp, Store, StoreResult};
use crate::models::*;

/// Number of audit records kept; older ones are evicted first
pub const AUDIT_LOG_CAPACITY: i64 = 500;

impl Store {
    // ==================== Audit Log Operations ====================

    /// Append a record and trim the log to the newest `AUDIT_LOG_CAPACITY` entries.
    pub fn append_log(
        &self,
        level: LogLevel,
        action: &str,
        user_id: Option<&str>,
        username: Option<&str>,
        details: Option<serde_json::Value>,
    ) -> StoreResult<LogEntry> {
        let details_json = details.as_ref().map(serde_json::to_string).transpose()?;
        let timestamp = Utc::now();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"INSERT INTO audit_logs (timestamp, level, action, user_id, username, details)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                to_timestamp(timestamp),
                level.as_str(),
                action,
                user_id,
                username,
                details_json,
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            r#"DELETE FROM audit_logs WHERE seq <=
               (SELECT seq FROM audit_logs ORDER BY seq DESC LIMIT 1 OFFSET ?1)"#,
            params![AUDIT_LOG_CAPACITY],
        )?;

        tx.commit()?;

        Ok(LogEntry {
            id,
            timestamp,
            level,
            action: action.to_string(),
            user_id: user_id.map(str::to_string),
            username: username.map(str::to_string),
            details,
        })
    }

    /// The newest `limit` records, newest first
    pub fn list_logs(&self, limit: i64) -> StoreResult<Vec<LogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM audit_logs ORDER BY seq DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit], row_to_log)?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?);
        }
        Ok(logs)
    }

    pub fn count_logs(&self) -> StoreResult<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_logs", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_log(row: &rusqlite::Row) -> rusqlite::Result<LogEntry> {
    let level: String = row.get("level")?;
    let level = level.parse::<LogLevel>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let details: Option<String> = row.get("details")?;

    Ok(LogEntry {
        id: row.get("seq")?,
        timestamp: parse_datetime(row.get::<_, String>("timestamp")?),
        level,
        action: row.get("action")?,
        user_id: row.get("user_id")?,
        username: row.get("username")?,
        details: details.and_then(|d| serde_json::from_str(&d).ok()),
    })
}
