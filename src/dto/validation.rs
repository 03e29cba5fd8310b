//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::services::pin::{is_well_formed, normalize_pin};

/// Longest nickname accepted in a lobby.
pub const MAX_NICKNAME_CHARS: usize = 24;

/// Validates that a nickname is non-blank once trimmed, printable, and not too long.
///
/// ```ignore
/// validate_nickname("ana")      // Ok
/// validate_nickname("   ")      // Err - blank
/// validate_nickname("a\u{7}b")  // Err - control character
/// ```
pub fn validate_nickname(nickname: &str) -> Result<(), ValidationError> {
    let trimmed = nickname.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("nickname_blank");
        err.message = Some("Nickname must not be blank".into());
        return Err(err);
    }

    let count = trimmed.chars().count();
    if count > MAX_NICKNAME_CHARS {
        let mut err = ValidationError::new("nickname_length");
        err.message = Some(
            format!("Nickname must be at most {MAX_NICKNAME_CHARS} characters (got {count})")
                .into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("nickname_format");
        err.message = Some("Nickname must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a PIN has the shape of a generated access code.
pub fn validate_pin(pin: &str) -> Result<(), ValidationError> {
    if is_well_formed(&normalize_pin(pin)) {
        return Ok(());
    }
    let mut err = ValidationError::new("pin_format");
    err.message = Some("PIN must be 6 letters or digits".into());
    Err(err)
}
