use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::Actor;
use crate::domain::{optional, required};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotationId(pub String);

/// Lifecycle of a shipment quotation.
///
/// Any status may replace any other; the set only classifies a quotation,
/// it does not police how it got there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotationStatus {
    Created,
    Quotation,
    Confirmed,
    Ongoing,
    Arrived,
    Released,
    Closed,
    Cancelled,
}

impl QuotationStatus {
    pub const ALL: [Self; 8] = [
        Self::Created,
        Self::Quotation,
        Self::Confirmed,
        Self::Ongoing,
        Self::Arrived,
        Self::Released,
        Self::Closed,
        Self::Cancelled,
    ];

    pub const ACTIVE: [Self; 6] = [
        Self::Created,
        Self::Quotation,
        Self::Confirmed,
        Self::Ongoing,
        Self::Arrived,
        Self::Released,
    ];

    pub const OFFER_SENT: [Self; 5] =
        [Self::Quotation, Self::Confirmed, Self::Ongoing, Self::Arrived, Self::Released];

    pub const APPROVED: [Self; 3] = [Self::Confirmed, Self::Released, Self::Closed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Quotation => "QUOTATION",
            Self::Confirmed => "CONFIRMED",
            Self::Ongoing => "ONGOING",
            Self::Arrived => "ARRIVED",
            Self::Released => "RELEASED",
            Self::Closed => "CLOSED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Strict lookup: `None` for anything outside the canonical set and its aliases.
    pub fn parse(value: &str) -> Option<Self> {
        let key = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match key.as_str() {
            "CREATED" => Some(Self::Created),
            "QUOTATION" => Some(Self::Quotation),
            "CONFIRMED" => Some(Self::Confirmed),
            "ONGOING" => Some(Self::Ongoing),
            "ARRIVED" => Some(Self::Arrived),
            "RELEASED" => Some(Self::Released),
            "CLOSED" => Some(Self::Closed),
            "CANCELLED" | "CANCELED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Total over every input; unknown, empty and missing values become `Created`.
    pub fn normalize(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or(Self::Created)
    }

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn is_offer_sent(self) -> bool {
        Self::OFFER_SENT.contains(&self)
    }

    pub fn is_approved(self) -> bool {
        Self::APPROVED.contains(&self)
    }

    pub fn classify(self) -> QuotationClassification {
        QuotationClassification {
            status: self,
            active: self.is_active(),
            offer_sent: self.is_offer_sent(),
            approved: self.is_approved(),
        }
    }
}

impl fmt::Display for QuotationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn normalize(raw: Option<&str>) -> QuotationStatus {
    QuotationStatus::normalize(raw)
}

pub fn is_active(raw: Option<&str>) -> bool {
    normalize(raw).is_active()
}

pub fn is_offer_sent(raw: Option<&str>) -> bool {
    normalize(raw).is_offer_sent()
}

pub fn is_approved(raw: Option<&str>) -> bool {
    normalize(raw).is_approved()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationClassification {
    pub status: QuotationStatus,
    pub active: bool,
    pub offer_sent: bool,
    pub approved: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub reference: String,
    pub client_name: String,
    pub origin: String,
    pub destination: String,
    pub commodity: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub status: QuotationStatus,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuotation {
    pub reference: String,
    pub client_name: String,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub commodity: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Quotation {
    pub fn create(
        id: QuotationId,
        input: NewQuotation,
        created_by: Actor,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let amount = match input.amount {
            Some(amount) if amount.is_sign_negative() => {
                return Err(DomainError::validation("amount", "must not be negative"));
            }
            other => other,
        };

        Ok(Self {
            id,
            reference: required("reference", &input.reference)?,
            client_name: required("client_name", &input.client_name)?,
            origin: required("origin", &input.origin)?,
            destination: required("destination", &input.destination)?,
            commodity: optional(input.commodity),
            amount,
            currency: optional(input.currency).map(|code| currency_code(&code)).transpose()?,
            status: QuotationStatus::normalize(input.status.as_deref()),
            created_by: created_by.normalized(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces the status with the normalized form of `raw`.
    pub fn set_status(&mut self, raw: Option<&str>, now: DateTime<Utc>) -> QuotationStatus {
        self.status = QuotationStatus::normalize(raw);
        self.updated_at = now;
        self.status
    }

    pub fn classification(&self) -> QuotationClassification {
        self.status.classify()
    }
}

fn currency_code(value: &str) -> Result<String, DomainError> {
    let code = value.trim().to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|ch| ch.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(DomainError::validation("currency", format!("`{value}` is not a 3-letter code")))
    }
}
