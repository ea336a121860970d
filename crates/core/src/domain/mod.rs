pub mod actor;
pub mod company;
pub mod lookup;
pub mod quotation;
pub mod sales_task;
pub mod user;

use crate::errors::DomainError;

pub(crate) fn required(field: &'static str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, "must not be blank"));
    }
    Ok(trimmed.to_owned())
}

pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

pub(crate) fn email(field: &'static str, value: &str) -> Result<String, DomainError> {
    let normalized = value.trim().to_ascii_lowercase();
    let valid = match normalized.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !normalized.contains(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(normalized)
    } else {
        Err(DomainError::validation(field, format!("`{}` is not an email address", value.trim())))
    }
}
