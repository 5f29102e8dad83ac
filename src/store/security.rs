use chrono::Utc;
use rusqlite::params;
use std::collections::HashMap;
use uuid::Uuid;

use super::{not_found, to_timestamp, Store, StoreError, StoreResult};
use crate::auth::BCRYPT_COST;
use crate::models::*;

/// Fewest questions a user may hold; all of them are asked on reset
pub const MIN_SECURITY_QUESTIONS: usize = 2;

impl Store {
    // ==================== Security Question Operations ====================

    /// Replace the whole question set of a user in one transaction.
    pub fn set_security_questions(
        &self,
        user_id: &str,
        questions: &[NewSecurityQuestion],
    ) -> StoreResult<()> {
        if questions.len() < MIN_SECURITY_QUESTIONS {
            return Err(StoreError::Invalid(format!(
                "At least {} security questions required",
                MIN_SECURITY_QUESTIONS
            )));
        }

        // Hash before taking the lock; bcrypt is slow on purpose
        let mut prepared = Vec::with_capacity(questions.len());
        for q in questions {
            let question = q.question.trim();
            let answer = normalize_answer(&q.answer);
            if question.is_empty() || answer.is_empty() {
                return Err(StoreError::Invalid(
                    "Security questions and answers must not be blank".to_string(),
                ));
            }
            prepared.push((question.to_string(), bcrypt::hash(&answer, BCRYPT_COST)?));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.query_row("SELECT id FROM users WHERE id = ?1", params![user_id], |row| {
            row.get::<_, String>(0)
        })
        .map_err(not_found(format!("User {}", user_id)))?;

        tx.execute("DELETE FROM security_questions WHERE user_id = ?1", params![user_id])?;

        let now = to_timestamp(Utc::now());
        for (position, (question, answer_hash)) in prepared.iter().enumerate() {
            tx.execute(
                r#"INSERT INTO security_questions (id, user_id, position, question, answer_hash, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    position as i64,
                    question,
                    answer_hash,
                    &now,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Question texts of a user in the order they were set
    pub fn get_security_questions(&self, user_id: &str) -> StoreResult<Vec<PublicSecurityQuestion>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, question FROM security_questions WHERE user_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(PublicSecurityQuestion {
                id: row.get("id")?,
                question: row.get("question")?,
            })
        })?;

        let mut questions = Vec::new();
        for row in rows {
            questions.push(row?);
        }
        Ok(questions)
    }

    /// Questions for the forgot-password flow. Unknown users and users without
    /// questions are both `NotFound`.
    pub fn get_public_security_questions(&self, username: &str) -> StoreResult<Vec<PublicSecurityQuestion>> {
        let user = self.get_user_by_username(username)?;
        let questions = self.get_security_questions(&user.id)?;
        if questions.is_empty() {
            return Err(StoreError::NotFound(format!(
                "Security questions for {}",
                user.username
            )));
        }
        Ok(questions)
    }

    pub fn has_security_questions(&self, user_id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM security_questions WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// True only when every stored question has a matching answer in `answers`
    /// (keyed by question id). A user without questions never verifies.
    pub fn verify_security_answers(
        &self,
        user_id: &str,
        answers: &HashMap<String, String>,
    ) -> StoreResult<bool> {
        let stored: Vec<(String, String)> = {
            let conn = self.conn()?;
            let mut stmt =
                conn.prepare("SELECT id, answer_hash FROM security_questions WHERE user_id = ?1")?;
            let rows = stmt.query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let mut stored = Vec::new();
            for row in rows {
                stored.push(row?);
            }
            stored
        };

        if stored.is_empty() {
            return Ok(false);
        }

        Ok(stored.iter().all(|(id, answer_hash)| {
            answers
                .get(id)
                .map(|answer| normalize_answer(answer))
                .filter(|answer| !answer.is_empty())
                .map(|answer| bcrypt::verify(&answer, answer_hash).unwrap_or(false))
                .unwrap_or(false)
        }))
    }
}
