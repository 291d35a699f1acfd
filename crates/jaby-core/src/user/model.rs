//! UserProfile domain model.

use crate::fact::{Fact, UserFact};
use serde::{Deserialize, Serialize};

/// Identity of an authenticated user, as handed over by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserProfile {
    /// Opaque, stable user id
    pub id: String,
    /// Optional display name
    #[serde(default)]
    pub name: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = if name.trim().is_empty() { None } else { Some(name) };
        self
    }

    /// Display name, falling back to the user id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// The identity fact asserted once when the user's session is created.
    pub fn identity_fact(&self) -> Fact {
        Fact::User(UserFact::new(self.id.clone(), self.name.clone()))
    }
}
