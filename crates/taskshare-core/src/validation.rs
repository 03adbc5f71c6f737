//! Input validation for share requests.

use crate::error::ValidationError;

/// Maximum length of an email address (RFC 5321 path limit).
pub const MAX_EMAIL_LEN: usize = 254;

/// Canonical form of an email: trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check an email is syntactically plausible and return its normalized form.
///
/// This is a structural check only (one `@`, non-empty local part, dotted
/// domain, no whitespace). Whether a user owns the address is decided by the
/// directory lookup, not here.
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let normalized = normalize_email(email);
    if normalized.is_empty() {
        return Err(ValidationError::EmptyEmail);
    }

    let invalid = || ValidationError::InvalidEmail(email.trim().to_string());

    if normalized.len() > MAX_EMAIL_LEN || normalized.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let (local, domain) = normalized.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }

    Ok(normalized)
}
