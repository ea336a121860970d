use serde::{Deserialize, Serialize};

/// Identity attached to writes. Supplied by the caller, already authenticated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Actor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self { name: Some(name.into()), email: Some(email.into()) }.normalized()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), email: None }.normalized()
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Trims both fields and drops the blank ones.
    pub fn normalized(self) -> Self {
        let clean = |value: Option<String>| {
            value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
        };
        Self { name: clean(self.name), email: clean(self.email) }
    }

    pub fn is_attributable(&self) -> bool {
        let present = |value: &Option<String>| {
            value.as_deref().map(|value| !value.trim().is_empty()).unwrap_or(false)
        };
        present(&self.name) || present(&self.email)
    }

    pub fn display(&self) -> &str {
        self.name.as_deref().or(self.email.as_deref()).unwrap_or("anonymous")
    }
}
