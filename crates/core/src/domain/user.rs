use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{email, required};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Sales,
    Operations,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Sales => "SALES",
            Self::Operations => "OPERATIONS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Self::Admin),
            "SALES" => Some(Self::Sales),
            "OPERATIONS" => Some(Self::Operations),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: String,
}

impl User {
    pub fn register(id: UserId, input: NewUser, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let role = UserRole::parse(&input.role).ok_or_else(|| {
            DomainError::validation(
                "role",
                format!("`{}` is not one of ADMIN|SALES|OPERATIONS", input.role.trim()),
            )
        })?;

        Ok(Self {
            id,
            name: required("name", &input.name)?,
            email: email("email", &input.email)?,
            role,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn set_active(&mut self, active: bool, now: DateTime<Utc>) {
        if self.active != active {
            self.active = active;
            self.updated_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{NewUser, User, UserId, UserRole};
    use crate::errors::DomainError;

    fn input(role: &str) -> NewUser {
        NewUser {
            name: " Dana Ops ".to_owned(),
            email: "Dana@Forwarder.Test".to_owned(),
            role: role.to_owned(),
        }
    }

    #[test]
    fn register_normalizes_name_email_and_role() {
        let user = User::register(UserId("U-1".to_owned()), input("operations"), Utc::now())
            .expect("valid user");

        assert_eq!(user.name, "Dana Ops");
        assert_eq!(user.email, "dana@forwarder.test");
        assert_eq!(user.role, UserRole::Operations);
        assert!(user.active);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let error = User::register(UserId("U-2".to_owned()), input("superuser"), Utc::now())
            .expect_err("unknown role");
        assert!(matches!(error, DomainError::Validation { field: "role", .. }));
    }

    #[test]
    fn toggling_to_same_state_keeps_timestamp() {
        let created = Utc::now();
        let mut user =
            User::register(UserId("U-3".to_owned()), input("SALES"), created).expect("user");

        user.set_active(true, created + Duration::hours(1));
        assert_eq!(user.updated_at, created);

        user.set_active(false, created + Duration::hours(2));
        assert!(!user.active);
        assert_eq!(user.updated_at, created + Duration::hours(2));
    }
}
