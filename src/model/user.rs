use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The user flags are evaluated for.
///
/// # Examples
/// ```
/// # use flagsync::User;
/// let user = User::new("user-id").with_attribute("plan", "premium");
/// assert_eq!(user.data.get("plan").map(String::as_str), Some("premium"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl User {
    /// Create a user without attributes.
    pub fn new(id: impl Into<String>) -> User {
        User {
            id: id.into(),
            data: HashMap::new(),
        }
    }

    /// Add a single attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> User {
        self.data.insert(key.into(), value.into());
        self
    }
}
