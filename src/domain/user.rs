//! User entity and balance representation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw stored representation of a user's minute balance.
///
/// The persistence layer may hold the balance as an integer or as a text
/// column, depending on how the row was originally written. Conditional
/// updates compare against the exact stored representation, so `Int(7)` and
/// `Text("7")` are distinct values even though they decode to the same
/// quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredMinutes {
    Int(i64),
    Text(String),
}

impl StoredMinutes {
    /// Decode the stored value into a minute quantity.
    /// Unparseable text decodes to zero.
    pub fn minutes(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }
}

impl Default for StoredMinutes {
    fn default() -> Self {
        Self::Int(0)
    }
}

impl From<i64> for StoredMinutes {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

/// Per-user output preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    /// Wrap delivered text in monospace code tags
    pub use_code_tags: bool,
    /// Keep the letter "yo" (fold it to "ye" when false)
    pub use_yo: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            use_code_tags: false,
            use_yo: true,
        }
    }
}

/// A registered user of the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Prepaid minute balance, kept in its raw stored representation
    #[serde(default)]
    pub balance: StoredMinutes,
    #[serde(default)]
    pub settings: UserSettings,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
}

impl User {
    /// Create a user with the given id, name and minute balance
    pub fn new(user_id: i64, first_name: impl Into<String>, balance_minutes: i64) -> Self {
        Self {
            user_id,
            first_name: first_name.into(),
            username: None,
            balance: StoredMinutes::Int(balance_minutes),
            settings: UserSettings::default(),
            last_activity: None,
        }
    }

    /// Decoded minute balance
    pub fn balance_minutes(&self) -> f64 {
        self.balance.minutes()
    }
}
