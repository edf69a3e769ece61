use serde::{Deserialize, Serialize};

use super::UserId;

/// Author snapshot joined onto an annotation when it is listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub username: String,
    pub full_name: Option<String>,
}

impl Author {
    /// Returns the full name when set, otherwise the username.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }

    /// Returns the uppercase first letter of the username, or `?`.
    pub fn initial(&self) -> char {
        self.username
            .chars()
            .next()
            .map(|c| c.to_uppercase().next().unwrap_or(c))
            .unwrap_or('?')
    }
}
