//! Input validation for the auth and post endpoints

use regex::Regex;
use std::sync::OnceLock;

use crate::error::FieldError;

/// Normalize an email for lookup and storage
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate a display name
pub fn validate_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();

    if trimmed.len() < 2 || trimmed.len() > 50 {
        return Err("Name must be between 2 and 50 characters".to_string());
    }

    Ok(())
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();

    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Please enter a valid email address".to_string());
    }

    Ok(())
}

/// Validate a password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());

    if !has_letter || !has_digit || !has_special {
        return Err("Password must contain letters, numbers, and special characters".to_string());
    }

    Ok(())
}

/// Validate a login payload
pub fn validate_login(email: &str, password: &str) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if let Err(message) = validate_email(email) {
        errors.push(FieldError::new("email", message));
    }

    if password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate a registration payload
pub fn validate_registration(
    name: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if let Err(message) = validate_name(name) {
        errors.push(FieldError::new("name", message));
    }

    if let Err(message) = validate_email(email) {
        errors.push(FieldError::new("email", message));
    }

    if let Err(message) = validate_password(password) {
        errors.push(FieldError::new("password", message));
    }

    if confirm_password != password {
        errors.push(FieldError::new("confirm_password", "Passwords do not match"));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate a post payload
pub fn validate_post(title: &str, content: &str) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    let title = title.trim();
    if title.len() < 3 || title.len() > 255 {
        errors.push(FieldError::new(
            "title",
            "Title must be between 3 and 255 characters",
        ));
    }

    if content.trim().len() < 10 {
        errors.push(FieldError::new(
            "content",
            "Content must be at least 10 characters long",
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
