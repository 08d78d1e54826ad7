//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest nickname accepted, counted in characters after trimming.
pub const NICKNAME_MAX_CHARS: usize = 32;

/// Validates that a PIN is exactly six ASCII digits.
///
/// # Examples
///
/// ```ignore
/// validate_pin("012345") // Ok
/// validate_pin("12345")  // Err - too short
/// validate_pin("12a456") // Err - not a digit
/// ```
pub fn validate_pin(pin: &str) -> Result<(), ValidationError> {
    if pin.len() != 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("pin_format");
        err.message = Some("PIN must be exactly 6 digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a nickname is non-blank and at most [`NICKNAME_MAX_CHARS`] characters once trimmed.
pub fn validate_nickname(nickname: &str) -> Result<(), ValidationError> {
    let trimmed = nickname.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("nickname_empty");
        err.message = Some("Nickname must not be blank".into());
        return Err(err);
    }

    let chars = trimmed.chars().count();
    if chars > NICKNAME_MAX_CHARS {
        let mut err = ValidationError::new("nickname_length");
        err.message = Some(
            format!("Nickname must be at most {NICKNAME_MAX_CHARS} characters (got {chars})")
                .into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pin_valid() {
        assert!(validate_pin("123456").is_ok());
        assert!(validate_pin("000000").is_ok());
    }

    #[test]
    fn test_validate_pin_invalid() {
        assert!(validate_pin("12345").is_err()); // too short
        assert!(validate_pin("1234567").is_err()); // too long
        assert!(validate_pin("12a456").is_err()); // letter
        assert!(validate_pin("١٢٣٤٥٦").is_err()); // non ascii digits
        assert!(validate_pin("").is_err());
    }

    #[test]
    fn test_validate_nickname() {
        assert!(validate_nickname("Ana").is_ok());
        assert!(validate_nickname("  padded  ").is_ok());
        assert!(validate_nickname("   ").is_err());
        assert!(validate_nickname(&"é".repeat(32)).is_ok());
        assert!(validate_nickname(&"x".repeat(33)).is_err());
    }
}
