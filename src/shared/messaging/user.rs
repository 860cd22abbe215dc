//! User Data Structure
//!
//! Represents an account that can open a live socket and own connections
//! and messages. The username is the identity key used for broadcast groups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique handle, stored lowercase
    pub username: String,
    /// First name, stored lowercase
    pub first_name: String,
    /// Last name, stored lowercase
    pub last_name: String,
    /// Media reference of the avatar image, if one was uploaded
    pub thumbnail: Option<String>,
    /// When the account was created
    pub created: DateTime<Utc>,
}

impl User {
    /// Display name as "First Last" with each part capitalized
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            capitalize(&self.first_name),
            capitalize(&self.last_name)
        )
    }

    /// Case-insensitive prefix match on handle, first name or last name
    pub fn matches_prefix(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        [&self.username, &self.first_name, &self.last_name]
            .iter()
            .any(|field| field.to_lowercase().starts_with(&query))
    }
}

/// Fields needed to create a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl NewUser {
    /// Build a new user record, normalizing every field to lowercase
    pub fn new(
        username: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into().trim().to_lowercase(),
            first_name: first_name.into().trim().to_lowercase(),
            last_name: last_name.into().trim().to_lowercase(),
        }
    }
}

/// Uppercase the first character and lowercase the rest
pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
