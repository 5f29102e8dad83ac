use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{not_found, parse_datetime, to_timestamp, Store, StoreError, StoreResult};
use crate::models::*;

impl Store {
    // ==================== Access Grant Operations ====================

    /// Let `viewer_username` read the ledger of `owner_id`. Granting the same pair
    /// twice returns the grant created the first time.
    pub fn grant_access(&self, owner_id: &str, viewer_username: &str) -> StoreResult<AccessGrant> {
        let viewer_username = normalize_username(viewer_username);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.query_row("SELECT id FROM users WHERE id = ?1", params![owner_id], |row| {
            row.get::<_, String>(0)
        })
        .map_err(not_found(format!("User {}", owner_id)))?;

        let viewer_id: String = tx
            .query_row(
                "SELECT id FROM users WHERE username = ?1",
                params![&viewer_username],
                |row| row.get(0),
            )
            .map_err(not_found(format!("User {}", viewer_username)))?;

        if viewer_id == owner_id {
            return Err(StoreError::Invalid("Cannot share access with yourself".to_string()));
        }

        tx.execute(
            r#"INSERT INTO access_grants (id, owner_id, viewer_id, created_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(owner_id, viewer_id) DO NOTHING"#,
            params![
                Uuid::new_v4().to_string(),
                owner_id,
                &viewer_id,
                to_timestamp(Utc::now()),
            ],
        )?;

        let grant = tx.query_row(
            "SELECT * FROM access_grants WHERE owner_id = ?1 AND viewer_id = ?2",
            params![owner_id, &viewer_id],
            row_to_grant,
        )?;

        tx.commit()?;
        Ok(grant)
    }

    /// Remove the grant from `owner_id` to `viewer_username`
    pub fn revoke_access(&self, owner_id: &str, viewer_username: &str) -> StoreResult<User> {
        let viewer_username = normalize_username(viewer_username);
        let conn = self.conn()?;

        let viewer = conn
            .query_row(
                "SELECT * FROM users WHERE username = ?1",
                params![&viewer_username],
                super::row_to_user,
            )
            .map_err(not_found(format!("User {}", viewer_username)))?;

        let rows = conn.execute(
            "DELETE FROM access_grants WHERE owner_id = ?1 AND viewer_id = ?2",
            params![owner_id, &viewer.id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Access grant to {}", viewer_username)));
        }
        Ok(viewer)
    }

    /// Users `owner_id` has shared their ledger with
    pub fn list_granted_by(&self, owner_id: &str) -> StoreResult<Vec<SharedUser>> {
        self.list_shared_users(
            r#"SELECT u.*, g.id AS access_id, g.created_at AS granted_at
               FROM access_grants g JOIN users u ON u.id = g.viewer_id
               WHERE g.owner_id = ?1 ORDER BY g.created_at ASC, u.username ASC"#,
            owner_id,
        )
    }

    /// Users whose ledgers `viewer_id` may read
    pub fn list_shared_with(&self, viewer_id: &str) -> StoreResult<Vec<SharedUser>> {
        self.list_shared_users(
            r#"SELECT u.*, g.id AS access_id, g.created_at AS granted_at
               FROM access_grants g JOIN users u ON u.id = g.owner_id
               WHERE g.viewer_id = ?1 ORDER BY g.created_at ASC, u.username ASC"#,
            viewer_id,
        )
    }

    fn list_shared_users(&self, sql: &str, user_id: &str) -> StoreResult<Vec<SharedUser>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(SharedUser {
                id: row.get("id")?,
                username: row.get("username")?,
                display_name: row.get("display_name")?,
                profile_color: row.get("profile_color")?,
                profile_picture: row.get("profile_picture")?,
                access_id: row.get("access_id")?,
                granted_at: parse_datetime(row.get::<_, String>("granted_at")?),
            })
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Whether a grant from `owner_id` to `viewer_id` exists. Self access is not implied.
    pub fn check_access(&self, owner_id: &str, viewer_id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM access_grants WHERE owner_id = ?1 AND viewer_id = ?2",
                params![owner_id, viewer_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn row_to_grant(row: &rusqlite::Row) -> rusqlite::Result<AccessGrant> {
    Ok(AccessGrant {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        viewer_id: row.get("viewer_id")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
    })
}
