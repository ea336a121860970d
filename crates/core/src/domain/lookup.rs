use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::required;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LookupId(pub String);

/// Master-data tables maintained from the admin dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupKind {
    Port,
    Country,
    Currency,
    ContainerType,
    Incoterm,
    Commodity,
}

impl LookupKind {
    pub const ALL: [Self; 6] = [
        Self::Port,
        Self::Country,
        Self::Currency,
        Self::ContainerType,
        Self::Incoterm,
        Self::Commodity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Port => "PORT",
            Self::Country => "COUNTRY",
            Self::Currency => "CURRENCY",
            Self::ContainerType => "CONTAINER_TYPE",
            Self::Incoterm => "INCOTERM",
            Self::Commodity => "COMMODITY",
        }
    }

    /// Accepts `container-type`, `container_type` and `CONTAINER_TYPE` alike.
    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match key.as_str() {
            "PORT" | "PORTS" => Some(Self::Port),
            "COUNTRY" | "COUNTRIES" => Some(Self::Country),
            "CURRENCY" | "CURRENCIES" => Some(Self::Currency),
            "CONTAINER_TYPE" | "CONTAINER_TYPES" => Some(Self::ContainerType),
            "INCOTERM" | "INCOTERMS" => Some(Self::Incoterm),
            "COMMODITY" | "COMMODITIES" => Some(Self::Commodity),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub id: LookupId,
    pub kind: LookupKind,
    pub code: String,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLookupEntry {
    pub code: String,
    pub name: String,
}

impl LookupEntry {
    pub fn create(
        id: LookupId,
        kind: LookupKind,
        input: NewLookupEntry,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let code = required("code", &input.code)?.to_ascii_uppercase();
        if code.contains(char::is_whitespace) {
            return Err(DomainError::validation("code", "must not contain whitespace"));
        }

        let name = required("name", &input.name)?;
        Ok(Self { id, kind, code, name, active: true, created_at: now })
    }
}
