//! User model

use serde::{Deserialize, Serialize};

/// A user of the local store. Users act on synchronized projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub name: String,
}

impl User {
    #[must_use]
    pub fn new(login: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: 0,
            login: login.into(),
            name: name.into(),
        }
    }
}
