//! Validation helpers for DTOs.

use validator::ValidationError;

const HANDLE_MIN_LEN: usize = 3;
const HANDLE_MAX_LEN: usize = 32;

/// Validates the shape of a login handle.
///
/// An empty handle passes here; the ledger reports it as a missing field.
///
/// # Examples
///
/// ```ignore
/// validate_login_handle("rusty_1")   // Ok
/// validate_login_handle("rusty one") // Err - space
/// validate_login_handle("ab")        // Err - too short
/// ```
pub fn validate_login_handle(handle: &str) -> Result<(), ValidationError> {
    if handle.is_empty() {
        return Ok(());
    }

    let len = handle.chars().count();
    if !(HANDLE_MIN_LEN..=HANDLE_MAX_LEN).contains(&len) {
        let mut err = ValidationError::new("login_handle_length");
        err.message = Some(
            format!(
                "Login handle must be between {HANDLE_MIN_LEN} and {HANDLE_MAX_LEN} characters (got {len})"
            )
            .into(),
        );
        return Err(err);
    }

    if !handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        let mut err = ValidationError::new("login_handle_format");
        err.message =
            Some("Login handle may only contain letters, digits, `_`, `-` and `.`".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_login_handle_valid() {
        assert!(validate_login_handle("rusty_1").is_ok());
        assert!(validate_login_handle("Ada.Lovelace").is_ok());
        assert!(validate_login_handle("x-y").is_ok());
        assert!(validate_login_handle("").is_ok());
    }

    #[test]
    fn test_validate_login_handle_invalid_length() {
        assert!(validate_login_handle("ab").is_err()); // too short
        assert!(validate_login_handle(&"a".repeat(33)).is_err()); // too long
    }

    #[test]
    fn test_validate_login_handle_invalid_format() {
        assert!(validate_login_handle("rusty one").is_err()); // space
        assert!(validate_login_handle("rusty!").is_err()); // punctuation
        assert!(validate_login_handle("ünïcode").is_err()); // non-ascii
    }
}
