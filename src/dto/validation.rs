//! Validation helpers for DTOs.

use validator::ValidationError;

/// Hard cap on names accepted at the HTTP boundary; the configured limit is
/// enforced by the match rules.
const NAME_HARD_LIMIT: usize = 64;

/// Validates a self-declared player name: not blank, printable, bounded.
///
/// # Examples
///
/// ```ignore
/// validate_player_name("Ann")       // Ok
/// validate_player_name("   ")       // Err - blank
/// validate_player_name("Ann\nBob")  // Err - control character
/// ```
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("player_name_empty");
        err.message = Some("Player name must not be blank".into());
        return Err(err);
    }

    let length = trimmed.chars().count();
    if length > NAME_HARD_LIMIT {
        let mut err = ValidationError::new("player_name_length");
        err.message = Some(
            format!("Player name must be at most {NAME_HARD_LIMIT} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("player_name_format");
        err.message = Some("Player name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}
