use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

mod analytics;
mod audit;
mod grants;
mod meals;
mod security;

pub use audit::AUDIT_LOG_CAPACITY;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    Invalid(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("Store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe SQLite store. Every write is committed before the call returns.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `db_path`. `":memory:"` gives a private in-memory database.
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL COLLATE NOCASE UNIQUE,
                password_hash TEXT NOT NULL,
                display_name TEXT NOT NULL,
                profile_color TEXT NOT NULL DEFAULT '#667eea',
                profile_picture TEXT,
                dark_mode INTEGER NOT NULL DEFAULT 0,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meal_entries (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                meal_type TEXT NOT NULL COLLATE NOCASE,
                food_description TEXT NOT NULL DEFAULT '',
                drinks TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, date, meal_type)
            );

            CREATE TABLE IF NOT EXISTS access_grants (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                viewer_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(owner_id, viewer_id)
            );

            CREATE TABLE IF NOT EXISTS security_questions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                question TEXT NOT NULL,
                answer_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_logs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                action TEXT NOT NULL,
                user_id TEXT,
                username TEXT,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_meal_entries_user_date ON meal_entries(user_id, date);
            CREATE INDEX IF NOT EXISTS idx_access_grants_viewer ON access_grants(viewer_id);
            CREATE INDEX IF NOT EXISTS idx_security_questions_user ON security_questions(user_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== User Operations ====================

    /// Insert a new user, assigning its id and creation time.
    /// Fails with `Conflict` when the username is taken in any casing.
    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.conn()?;
        user.id = Uuid::new_v4().to_string();
        user.username = normalize_username(&user.username);
        user.created_at = Utc::now();

        conn.execute(
            r#"INSERT INTO users (id, username, password_hash, display_name, profile_color,
                profile_picture, dark_mode, is_admin, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                &user.id,
                &user.username,
                &user.password_hash,
                &user.display_name,
                &user.profile_color,
                &user.profile_picture,
                user.dark_mode,
                user.is_admin,
                to_timestamp(user.created_at),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StoreError::Conflict(format!("Username {}", user.username))
            } else {
                StoreError::Database(e)
            }
        })?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.conn()?;
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], row_to_user)
            .map_err(not_found(format!("User {}", id)))
    }

    pub fn get_user_by_username(&self, username: &str) -> StoreResult<User> {
        let username = normalize_username(username);
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM users WHERE username = ?1",
            params![&username],
            row_to_user,
        )
        .map_err(not_found(format!("User {}", username)))
    }

    pub fn list_users(&self) -> StoreResult<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM users ORDER BY created_at ASC")?;
        let rows = stmt.query_map([], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    pub fn count_users(&self) -> StoreResult<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Persist the mutable attributes of an existing user
    pub fn update_user(&self, user: &User) -> StoreResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            r#"UPDATE users SET password_hash = ?1, display_name = ?2, profile_color = ?3,
               profile_picture = ?4, dark_mode = ?5, is_admin = ?6 WHERE id = ?7"#,
            params![
                &user.password_hash,
                &user.display_name,
                &user.profile_color,
                &user.profile_picture,
                user.dark_mode,
                user.is_admin,
                &user.id,
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("User {}", user.id)));
        }
        Ok(())
    }

    /// Remove a user together with their meal entries, grants in both
    /// directions and security questions. Audit records are kept.
    pub fn delete_user(&self, id: &str) -> StoreResult<User> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let user = tx
            .query_row("SELECT * FROM users WHERE id = ?1", params![id], row_to_user)
            .map_err(not_found(format!("User {}", id)))?;

        tx.execute("DELETE FROM meal_entries WHERE user_id = ?1", params![id])?;
        tx.execute(
            "DELETE FROM access_grants WHERE owner_id = ?1 OR viewer_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM security_questions WHERE user_id = ?1", params![id])?;
        tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(user)
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        password_hash: row.get("password_hash")?,
        display_name: row.get("display_name")?,
        profile_color: row.get("profile_color")?,
        profile_picture: row.get("profile_picture")?,
        dark_mode: row.get("dark_mode")?,
        is_admin: row.get("is_admin")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
    })
}

/// Map `QueryReturnedNoRows` onto `NotFound`, everything else onto `Database`.
fn not_found(what: String) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(what),
        _ => StoreError::Database(e),
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

/// Fixed-width RFC 3339 so stored timestamps sort as text
fn to_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn create_test_user(store: &Store, username: &str) -> User {
        let mut user = User::new(username, "hash".to_string(), username);
        store.create_user(&mut user).unwrap();
        user
    }

    #[test]
    fn test_create_and_get_user() {
        let store = Store::in_memory().unwrap();
        let mut user = User::new("TestUser", "hash".to_string(), "Test User");

        store.create_user(&mut user).unwrap();
        assert!(!user.id.is_empty());

        let retrieved = store.get_user(&user.id).unwrap();
        assert_eq!(retrieved.username, "testuser");
        assert_eq!(retrieved.display_name, "Test User");
        assert_eq!(retrieved.profile_color, DEFAULT_PROFILE_COLOR);
        assert!(!retrieved.is_admin);

        let by_name = store.get_user_by_username("  TESTUSER ").unwrap();
        assert_eq!(by_name.id, user.id);
    }

    #[test]
    fn test_duplicate_username_any_case_conflicts() {
        let store = Store::in_memory().unwrap();
        create_test_user(&store, "alice");

        let mut dup = User::new("Alice", "hash".to_string(), "Other Alice");
        let err = store.create_user(&mut dup).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.count_users().unwrap(), 1);
    }

    #[test]
    fn test_get_missing_user() {
        let store = Store::in_memory().unwrap();
        assert!(matches!(store.get_user("nope"), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.get_user_by_username("nobody"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_user() {
        let store = Store::in_memory().unwrap();
        let mut user = create_test_user(&store, "alice");

        user.display_name = "Alice A.".to_string();
        user.dark_mode = true;
        user.profile_picture = Some("🥑".to_string());
        user.is_admin = true;
        store.update_user(&user).unwrap();

        let retrieved = store.get_user(&user.id).unwrap();
        assert_eq!(retrieved.display_name, "Alice A.");
        assert!(retrieved.dark_mode);
        assert!(retrieved.is_admin);
        assert_eq!(retrieved.profile_picture.as_deref(), Some("🥑"));

        let mut ghost = user.clone();
        ghost.id = "missing".to_string();
        assert!(matches!(store.update_user(&ghost), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_delete_user_cascades() {
        let store = Store::in_memory().unwrap();
        let alice = create_test_user(&store, "alice");
        let bob = create_test_user(&store, "bob");
        let carol = create_test_user(&store, "carol");

        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        for slot in MealSlot::ALL {
            store
                .upsert_meal(&bob.id, day, slot, "food", &Default::default())
                .unwrap();
        }
        store.upsert_meal(&alice.id, day, MealSlot::Lunch, "salad", &Default::default()).unwrap();
        store.grant_access(&bob.id, "alice").unwrap();
        store.grant_access(&carol.id, "bob").unwrap();
        store
            .set_security_questions(
                &bob.id,
                &[
                    NewSecurityQuestion { question: "Pet?".to_string(), answer: "rex".to_string() },
                    NewSecurityQuestion { question: "City?".to_string(), answer: "oslo".to_string() },
                ],
            )
            .unwrap();

        let deleted = store.delete_user(&bob.id).unwrap();
        assert_eq!(deleted.username, "bob");

        assert!(matches!(store.get_user(&bob.id), Err(StoreError::NotFound(_))));
        assert!(store.get_meal_history(&bob.id, 100).unwrap().is_empty());
        assert!(store.list_shared_with(&alice.id).unwrap().is_empty());
        assert!(store.list_granted_by(&carol.id).unwrap().is_empty());
        assert!(!store.check_access(&bob.id, &alice.id).unwrap());
        assert!(!store.has_security_questions(&bob.id).unwrap());

        // Other users' data is untouched
        assert_eq!(store.get_meal_history(&alice.id, 100).unwrap().len(), 1);
        assert!(matches!(store.delete_user(&bob.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meals.db");
        let path = path.to_str().unwrap();

        let user_id = {
            let store = Store::new(path).unwrap();
            let user = create_test_user(&store, "alice");
            let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
            store.upsert_meal(&user.id, day, MealSlot::Dinner, "soup", &Default::default()).unwrap();
            user.id
        };

        let reopened = Store::new(path).unwrap();
        assert_eq!(reopened.get_user(&user_id).unwrap().username, "alice");
        assert_eq!(reopened.get_meal_history(&user_id, 10).unwrap()[0].food_description, "soup");
    }
}
