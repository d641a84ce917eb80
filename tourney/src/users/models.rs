//! User and team data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User ID type
pub type UserId = i64;

/// Team ID type
pub type TeamId = i64;

/// User model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Global standing score, consulted by the verification gate
    pub score: i64,
    /// False once the account has been banned
    pub is_active: bool,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

/// User creation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub score: i64,
    pub is_staff: bool,
}

impl NewUser {
    /// Plain user with the given name and no contact details
    pub fn named(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Builder-style staff flag
    pub fn staff(mut self) -> Self {
        self.is_staff = true;
        self
    }

    /// Builder-style global score
    pub fn with_score(mut self, score: i64) -> Self {
        self.score = score;
        self
    }

    /// Builder-style contact details
    pub fn with_contact(mut self, email: &str, phone_number: &str) -> Self {
        self.email = Some(email.to_string());
        self.phone_number = Some(phone_number.to_string());
        self
    }
}

/// Team model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub captain_id: UserId,
    /// Standing members, captain excluded unless added explicitly
    pub members: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Team {
    /// Captain or standing member
    pub fn includes(&self, user_id: UserId) -> bool {
        self.captain_id == user_id || self.members.contains(&user_id)
    }
}
