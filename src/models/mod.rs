use chrono::{DateTime, NaiveDate, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PROFILE_COLOR: &str = "#667eea";

/// User owns a meal ledger and may share it with other users
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub profile_color: String,
    pub profile_picture: Option<String>,
    pub dark_mode: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: &str, password_hash: String, display_name: &str) -> Self {
        Self {
            id: String::new(),
            username: normalize_username(username),
            password_hash,
            display_name: display_name.trim().to_string(),
            profile_color: DEFAULT_PROFILE_COLOR.to_string(),
            profile_picture: None,
            dark_mode: false,
            is_admin: false,
            created_at: Utc::now(),
        }
    }
}

/// Usernames are unique regardless of case, so they are stored trimmed and lowercased.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

// ==================== Meal Ledger ====================

#[derive(Debug, Error, PartialEq)]
#[error("unknown meal type '{0}'")]
pub struct ParseMealSlotError(String);

/// One of the three meal slots of a day. Ordering follows the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealSlot {
    pub const ALL: [MealSlot; 3] = [MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Dinner];

    pub fn as_str(self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast",
            MealSlot::Lunch => "lunch",
            MealSlot::Dinner => "dinner",
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealSlot {
    type Err = ParseMealSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        MealSlot::ALL
            .into_iter()
            .find(|slot| slot.as_str().eq_ignore_ascii_case(label))
            .ok_or_else(|| ParseMealSlotError(label.to_string()))
    }
}

impl<'de> Deserialize<'de> for MealSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown drink '{0}'")]
pub struct ParseDrinkError(String);

/// Fixed drink vocabulary a meal entry can be tagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Drink {
    Water,
    Juice,
    Soda,
    Coffee,
    Tea,
    Milk,
    #[serde(rename = "Energy Drink")]
    EnergyDrink,
}

impl Drink {
    pub const ALL: [Drink; 7] = [
        Drink::Water,
        Drink::Juice,
        Drink::Soda,
        Drink::Coffee,
        Drink::Tea,
        Drink::Milk,
        Drink::EnergyDrink,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Drink::Water => "Water",
            Drink::Juice => "Juice",
            Drink::Soda => "Soda",
            Drink::Coffee => "Coffee",
            Drink::Tea => "Tea",
            Drink::Milk => "Milk",
            Drink::EnergyDrink => "Energy Drink",
        }
    }
}

impl fmt::Display for Drink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Drink {
    type Err = ParseDrinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        Drink::ALL
            .into_iter()
            .find(|drink| drink.as_str().eq_ignore_ascii_case(label))
            .ok_or_else(|| ParseDrinkError(label.to_string()))
    }
}

impl<'de> Deserialize<'de> for Drink {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// MealEntry is the single record for one (user, date, slot)
#[derive(Debug, Clone, Serialize)]
pub struct MealEntry {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub meal_type: MealSlot,
    pub food_description: String,
    pub drinks: BTreeSet<Drink>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether an upsert inserted a new entry or overwrote an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

// ==================== Sharing ====================

/// AccessGrant lets `viewer_id` read the meal ledger of `owner_id`
#[derive(Debug, Clone, Serialize)]
pub struct AccessGrant {
    pub id: String,
    pub owner_id: String,
    pub viewer_id: String,
    pub created_at: DateTime<Utc>,
}

/// The user on the other side of a grant
#[derive(Debug, Clone, Serialize)]
pub struct SharedUser {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub profile_color: String,
    pub profile_picture: Option<String>,
    pub access_id: String,
    pub granted_at: DateTime<Utc>,
}

// ==================== Security Questions ====================

#[derive(Debug, Clone, Deserialize)]
pub struct NewSecurityQuestion {
    pub question: String,
    pub answer: String,
}

/// Question text exposed to the password reset flow; answers never leave the store
#[derive(Debug, Clone, Serialize)]
pub struct PublicSecurityQuestion {
    pub id: String,
    pub question: String,
}

/// Answers are compared case-insensitively after trimming.
pub fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

// ==================== Audit Log ====================

#[derive(Debug, Error, PartialEq)]
#[error("unknown log level '{0}'")]
pub struct ParseLogLevelError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Security,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Security => "security",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogLevel::Info),
            "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "security" => Ok(LogLevel::Security),
            other => Err(ParseLogLevelError(other.to_string())),
        }
    }
}

/// LogEntry is an immutable audit record
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub action: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub details: Option<serde_json::Value>,
}

// ==================== Admin ====================

/// Aggregate numbers shown on the admin dashboard
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Analytics {
    pub total_users: i64,
    pub total_meals: i64,
    pub today_meals: i64,
    pub week_meals: i64,
    pub shared_access: i64,
    pub avg_meals_per_user: f64,
    pub breakfast_count: i64,
    pub lunch_count: i64,
    pub dinner_count: i64,
    pub drink_counts: BTreeMap<String, i64>,
    pub active_today: i64,
    pub active_week: i64,
}

// Request/Response types for API
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct UpsertMealRequest {
    pub date: NaiveDate,
    pub meal_type: MealSlot,
    #[serde(default)]
    pub food_description: String,
    pub drinks: Option<Vec<Drink>>,
    /// Older clients only send a water flag
    #[serde(default)]
    pub had_water: bool,
}

impl UpsertMealRequest {
    pub fn drink_set(&self) -> BTreeSet<Drink> {
        match &self.drinks {
            Some(drinks) => drinks.iter().copied().collect(),
            None if self.had_water => BTreeSet::from([Drink::Water]),
            None => BTreeSet::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GrantAccessRequest {
    pub viewer_username: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub dark_mode: Option<bool>,
    pub profile_picture: Option<String>,
    pub profile_color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct SetSecurityQuestionsRequest {
    pub questions: Vec<NewSecurityQuestion>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyAnswersRequest {
    pub answers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub username: String,
    pub answers: HashMap<String, String>,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminResetPasswordRequest {
    pub user_id: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: User,
    pub has_security_questions: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { message: msg.into() }
    }
}
