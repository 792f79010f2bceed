//! Client-side checks run on account forms before any network call.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Minimum password length accepted at registration and reset
pub const MIN_PASSWORD_LENGTH: usize = 6;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\S+@\S+\.\S+").expect("email pattern is valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Email is required")]
    EmailEmpty,

    #[error("Email is not valid")]
    EmailInvalid,

    #[error("Password is required")]
    PasswordEmpty,

    #[error("Password must be at least {MIN_PASSWORD_LENGTH} characters")]
    PasswordTooShort,

    #[error("Please confirm your password")]
    ConfirmationEmpty,

    #[error("Passwords do not match")]
    ConfirmationMismatch,

    #[error("Username is required")]
    UsernameEmpty,

    #[error("Code is required")]
    CodeEmpty,
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::EmailEmpty);
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::EmailInvalid);
    }
    Ok(())
}

/// Login only requires a password to be present.
pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationError> {
    validate_email(email)?;
    if password.is_empty() {
        return Err(ValidationError::PasswordEmpty);
    }
    Ok(())
}

pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::PasswordEmpty);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort);
    }
    if confirm.is_empty() {
        return Err(ValidationError::ConfirmationEmpty);
    }
    if confirm != password {
        return Err(ValidationError::ConfirmationMismatch);
    }
    Ok(())
}

pub fn validate_registration(
    username: &str,
    email: &str,
    password: &str,
    confirm: &str,
) -> Result<(), ValidationError> {
    if username.trim().is_empty() {
        return Err(ValidationError::UsernameEmpty);
    }
    validate_email(email)?;
    validate_new_password(password, confirm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("user+tag@sub.example.org").is_ok());
    }

    #[test]
    fn test_invalid_emails() {
        assert_eq!(validate_email(""), Err(ValidationError::EmailEmpty));
        assert_eq!(validate_email("notanemail"), Err(ValidationError::EmailInvalid));
        assert_eq!(validate_email("missing@domain"), Err(ValidationError::EmailInvalid));
    }

    #[test]
    fn test_login_requires_password() {
        assert_eq!(
            validate_login("user@example.com", ""),
            Err(ValidationError::PasswordEmpty)
        );
        assert!(validate_login("user@example.com", "x").is_ok());
    }

    #[test]
    fn test_registration_rules_in_field_order() {
        assert_eq!(
            validate_registration("", "bad", "", ""),
            Err(ValidationError::UsernameEmpty)
        );
        assert_eq!(
            validate_registration("luna", "luna@example.com", "12345", "12345"),
            Err(ValidationError::PasswordTooShort)
        );
        assert_eq!(
            validate_registration("luna", "luna@example.com", "123456", ""),
            Err(ValidationError::ConfirmationEmpty)
        );
        assert_eq!(
            validate_registration("luna", "luna@example.com", "123456", "1234567"),
            Err(ValidationError::ConfirmationMismatch)
        );
        assert!(validate_registration("luna", "luna@example.com", "123456", "123456").is_ok());
    }
}
