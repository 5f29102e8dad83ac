use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection, Params};
use std::collections::BTreeMap;

use super::{Store, StoreResult};
use crate::models::*;

impl Store {
    /// Aggregate usage numbers as of `today`. The week window covers the last seven days.
    pub fn analytics(&self, today: NaiveDate) -> StoreResult<Analytics> {
        let conn = self.conn()?;
        let today_str = today.to_string();
        let week_ago = (today - Duration::days(7)).to_string();

        let total_users = count(&conn, "SELECT COUNT(*) FROM users", [])?;
        let total_meals = count(&conn, "SELECT COUNT(*) FROM meal_entries", [])?;
        let today_meals = count(
            &conn,
            "SELECT COUNT(*) FROM meal_entries WHERE date = ?1",
            params![&today_str],
        )?;
        let week_meals = count(
            &conn,
            "SELECT COUNT(*) FROM meal_entries WHERE date >= ?1",
            params![&week_ago],
        )?;
        let shared_access = count(&conn, "SELECT COUNT(*) FROM access_grants", [])?;
        let active_today = count(
            &conn,
            "SELECT COUNT(DISTINCT user_id) FROM meal_entries WHERE date = ?1",
            params![&today_str],
        )?;
        let active_week = count(
            &conn,
            "SELECT COUNT(DISTINCT user_id) FROM meal_entries WHERE date >= ?1",
            params![&week_ago],
        )?;

        let mut slot_counts = BTreeMap::new();
        let mut stmt =
            conn.prepare("SELECT lower(meal_type), COUNT(*) FROM meal_entries GROUP BY 1")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (slot, n) = row?;
            if let Ok(slot) = slot.parse::<MealSlot>() {
                slot_counts.insert(slot, n);
            }
        }

        let mut drink_counts: BTreeMap<String, i64> =
            Drink::ALL.iter().map(|d| (d.as_str().to_string(), 0)).collect();
        let mut stmt = conn.prepare(
            r#"SELECT j.value, COUNT(*) FROM meal_entries m, json_each(m.drinks) j
               GROUP BY j.value"#,
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (label, n) = row?;
            if let Ok(drink) = label.parse::<Drink>() {
                *drink_counts.entry(drink.as_str().to_string()).or_insert(0) += n;
            }
        }

        let avg_meals_per_user = if total_users > 0 {
            total_meals as f64 / total_users as f64
        } else {
            0.0
        };

        Ok(Analytics {
            total_users,
            total_meals,
            today_meals,
            week_meals,
            shared_access,
            avg_meals_per_user,
            breakfast_count: slot_counts.get(&MealSlot::Breakfast).copied().unwrap_or(0),
            lunch_count: slot_counts.get(&MealSlot::Lunch).copied().unwrap_or(0),
            dinner_count: slot_counts.get(&MealSlot::Dinner).copied().unwrap_or(0),
            drink_counts,
            active_today,
            active_week,
        })
    }
}

fn count<P: Params>(conn: &Connection, sql: &str, params: P) -> rusqlite::Result<i64> {
    conn.query_row(sql, params, |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::create_test_user;
    use std::collections::BTreeSet;

    #[test]
    fn test_analytics_counts() {
        let store = Store::in_memory().unwrap();
        let alice = create_test_user(&store, "alice");
        let bob = create_test_user(&store, "bob");
        create_test_user(&store, "carol");

        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let three_days_ago = today - Duration::days(3);
        let long_ago = today - Duration::days(30);

        store
            .upsert_meal(&alice.id, today, MealSlot::Breakfast, "eggs", &BTreeSet::from([Drink::Coffee, Drink::Water]))
            .unwrap();
        store
            .upsert_meal(&alice.id, three_days_ago, MealSlot::Lunch, "soup", &BTreeSet::from([Drink::Water]))
            .unwrap();
        store
            .upsert_meal(&bob.id, long_ago, MealSlot::Dinner, "pizza", &BTreeSet::from([Drink::Soda]))
            .unwrap();
        store.grant_access(&alice.id, "bob").unwrap();

        let stats = store.analytics(today).unwrap();
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.total_meals, 3);
        assert_eq!(stats.today_meals, 1);
        assert_eq!(stats.week_meals, 2);
        assert_eq!(stats.shared_access, 1);
        assert!((stats.avg_meals_per_user - 1.0).abs() < f64::EPSILON);
        assert_eq!(stats.breakfast_count, 1);
        assert_eq!(stats.lunch_count, 1);
        assert_eq!(stats.dinner_count, 1);
        assert_eq!(stats.drink_counts["Water"], 2);
        assert_eq!(stats.drink_counts["Coffee"], 1);
        assert_eq!(stats.drink_counts["Soda"], 1);
        assert_eq!(stats.drink_counts["Energy Drink"], 0);
        assert_eq!(stats.active_today, 1);
        assert_eq!(stats.active_week, 1);
    }

    #[test]
    fn test_analytics_empty_store() {
        let store = Store::in_memory().unwrap();
        let stats = store.analytics(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).unwrap();
        assert_eq!(stats.total_users, 0);
        assert_eq!(stats.avg_meals_per_user, 0.0);
        assert_eq!(stats.drink_counts.len(), Drink::ALL.len());
    }
}
