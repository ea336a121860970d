use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::Actor;
use crate::domain::{email, optional, required};
use crate::errors::DomainError;

/// The forwarder's own company details, printed on quotations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tax_id: Option<String>,
    pub website: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfileUpdate {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

impl CompanyProfileUpdate {
    pub fn into_profile(
        self,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<CompanyProfile, DomainError> {
        let website = optional(self.website);
        if let Some(website) = &website {
            if !website.starts_with("http://") && !website.starts_with("https://") {
                return Err(DomainError::validation(
                    "website",
                    "must start with http:// or https://",
                ));
            }
        }

        Ok(CompanyProfile {
            name: required("name", &self.name)?,
            address: optional(self.address),
            phone: optional(self.phone),
            email: optional(self.email).map(|value| email("email", &value)).transpose()?,
            tax_id: optional(self.tax_id),
            website,
            updated_at: now,
            updated_by: actor.is_attributable().then(|| actor.display().to_owned()),
        })
    }
}
