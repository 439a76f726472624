use roster::domain::{NewRegistration, RegistrationChanges};
use shared::{Error, Result};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
const MAX_EMAIL_LEN: usize = 254;
const MAX_NAME_LEN: usize = 200;

pub fn page_params(page: Option<u32>, size: Option<u32>) -> Result<(u32, u32)> {
    let page = page.unwrap_or(DEFAULT_PAGE);
    let size = size.unwrap_or(DEFAULT_PAGE_SIZE);

    if page < 1 {
        return Err(Error::Validation("page must be at least 1".into()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&size) {
        return Err(Error::Validation(format!(
            "size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    Ok((page, size))
}

pub fn new_registration(request: &NewRegistration) -> Result<()> {
    email(&request.email)?;
    full_name(&request.full_name)?;
    ticket_type(&request.ticket_type)
}

pub fn changes(changes: &RegistrationChanges) -> Result<()> {
    if let Some(value) = &changes.email {
        email(value)?;
    }
    if let Some(value) = &changes.full_name {
        full_name(value)?;
    }
    if let Some(value) = &changes.ticket_type {
        ticket_type(value)?;
    }
    Ok(())
}

/// Shape check only: one `@`, a non-empty local part, a dotted domain, no whitespace.
pub fn email(value: &str) -> Result<()> {
    let value = value.trim();
    let invalid = || Error::Validation(format!("'{}' is not a valid email address", value));

    if value.is_empty() || value.len() > MAX_EMAIL_LEN || value.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(())
}

pub fn full_name(value: &str) -> Result<()> {
    let len = value.trim().chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "full_name must be between 1 and {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn ticket_type(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation("ticket_type must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_defaults_and_bounds() {
        assert_eq!(page_params(None, None).unwrap(), (1, 20));
        assert_eq!(page_params(Some(4), Some(100)).unwrap(), (4, 100));
        assert!(page_params(Some(0), None).is_err());
        assert!(page_params(None, Some(0)).is_err());
        assert!(page_params(None, Some(101)).is_err());
    }

    #[test]
    fn test_email_shape() {
        assert!(email("ada@example.com").is_ok());
        assert!(email("  ada@example.com ").is_ok());
        assert!(email("ada@localhost").is_err());
        assert!(email("ada.example.com").is_err());
        assert!(email("@example.com").is_err());
        assert!(email("a b@example.com").is_err());
        assert!(email("a@b@example.com").is_err());
        assert!(email("ada@example.").is_err());
    }

    #[test]
    fn test_full_name_length() {
        assert!(full_name("Ada").is_ok());
        assert!(full_name("   ").is_err());
        assert!(full_name(&"x".repeat(201)).is_err());
    }
}
