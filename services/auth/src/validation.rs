//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

/// Trim and lowercase an email before storage or lookup
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate full name
pub fn validate_full_name(full_name: &str) -> Result<(), String> {
    let full_name = full_name.trim();

    if full_name.is_empty() {
        return Err("Full name is required".to_string());
    }

    if full_name.chars().count() > 100 {
        return Err("Full name must be at most 100 characters long".to_string());
    }

    Ok(())
}

/// Validate optional display name
pub fn validate_display_name(display_name: Option<&str>) -> Result<(), String> {
    match display_name {
        Some(name) if name.chars().count() > 50 => {
            Err("Display name must be at most 50 characters long".to_string())
        }
        _ => Ok(()),
    }
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
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
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate an account address (`0x` followed by 40 hex digits)
pub fn validate_address(address: &str) -> Result<(), String> {
    if address.is_empty() {
        return Err("Address is required".to_string());
    }

    static ADDRESS_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = ADDRESS_REGEX.get_or_init(|| {
        Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("Failed to compile address regex")
    });

    if !regex.is_match(address) {
        return Err("Invalid address format".to_string());
    }

    Ok(())
}
