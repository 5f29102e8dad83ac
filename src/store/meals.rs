use chrono::{NaiveDate, Utc};
use rusqlite::params;
use std::collections::BTreeSet;
use uuid::Uuid;

use super::{not_found, parse_date, parse_datetime, to_timestamp, Store, StoreError, StoreResult};
use crate::models::*;

/// Day order of the slots, tolerant of legacy capitalized labels
const SLOT_ORDER: &str =
    "CASE lower(meal_type) WHEN 'breakfast' THEN 0 WHEN 'lunch' THEN 1 WHEN 'dinner' THEN 2 ELSE 3 END";

impl Store {
    // ==================== Meal Ledger Operations ====================

    /// Write the entry for (user, date, slot). An existing entry keeps its id and
    /// creation time while description, drinks and `updated_at` are replaced.
    /// Fails with `NotFound` when the user no longer exists.
    pub fn upsert_meal(
        &self,
        user_id: &str,
        date: NaiveDate,
        slot: MealSlot,
        description: &str,
        drinks: &BTreeSet<Drink>,
    ) -> StoreResult<(MealEntry, UpsertOutcome)> {
        let new_id = Uuid::new_v4().to_string();
        let now = to_timestamp(Utc::now());
        let drinks_json = serde_json::to_string(drinks)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.query_row("SELECT id FROM users WHERE id = ?1", params![user_id], |row| {
            row.get::<_, String>(0)
        })
        .map_err(not_found(format!("User {}", user_id)))?;

        // UNIQUE(user_id, date, meal_type) compares the slot case-insensitively, so
        // this one statement also replaces legacy capitalized rows.
        let entry = tx.query_row(
            r#"INSERT INTO meal_entries (id, user_id, date, meal_type, food_description, drinks,
                created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
               ON CONFLICT(user_id, date, meal_type) DO UPDATE SET
                   food_description = excluded.food_description,
                   drinks = excluded.drinks,
                   updated_at = excluded.updated_at
               RETURNING *"#,
            params![
                &new_id,
                user_id,
                date.to_string(),
                slot.as_str(),
                description,
                &drinks_json,
                &now,
            ],
            row_to_meal,
        )?;
        tx.commit()?;

        let outcome = if entry.id == new_id {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        };
        Ok((entry, outcome))
    }

    /// Entries of one day, breakfast first
    pub fn get_meals_by_date(&self, user_id: &str, date: NaiveDate) -> StoreResult<Vec<MealEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM meal_entries WHERE user_id = ?1 AND date = ?2 ORDER BY {SLOT_ORDER}"
        ))?;
        let rows = stmt.query_map(params![user_id, date.to_string()], row_to_meal)?;

        let mut meals = Vec::new();
        for row in rows {
            meals.push(row?);
        }
        Ok(meals)
    }

    /// The newest `limit` entries across all dates, newest day first and in
    /// slot order within a day.
    pub fn get_meal_history(&self, user_id: &str, limit: i64) -> StoreResult<Vec<MealEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM meal_entries WHERE user_id = ?1 ORDER BY date DESC, {SLOT_ORDER} LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![user_id, limit], row_to_meal)?;

        let mut meals = Vec::new();
        for row in rows {
            meals.push(row?);
        }
        Ok(meals)
    }

    /// Delete an entry owned by `user_id`. Someone else's entry is reported as not found.
    pub fn delete_meal(&self, id: &str, user_id: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM meal_entries WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("Meal {}", id)));
        }
        Ok(())
    }
}

fn row_to_meal(row: &rusqlite::Row) -> rusqlite::Result<MealEntry> {
    let date: String = row.get("date")?;
    let meal_type: String = row.get("meal_type")?;
    let meal_type = meal_type.parse::<MealSlot>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    // Unknown legacy drink labels are dropped; a column that is not a JSON list is an error
    let drinks_str: String = row.get("drinks")?;
    let drinks = serde_json::from_str::<Vec<String>>(&drinks_str)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?
        .iter()
        .filter_map(|label| label.parse::<Drink>().ok())
        .collect();

    Ok(MealEntry {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        date: parse_date(2, &date)?,
        meal_type,
        food_description: row.get("food_description")?,
        drinks,
        created_at: parse_datetime(row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
    })
}
