//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest player identifier accepted from clients.
pub const MAX_PLAYER_ID_LEN: usize = 64;

const ROOM_ID_PREFIX: &str = "room_";

/// Validates that a player ID is non-empty, bounded and made of
/// ASCII alphanumerics, `-` or `_`.
///
/// # Examples
///
/// ```ignore
/// validate_player_id("player-42") // Ok
/// validate_player_id("")          // Err - empty
/// validate_player_id("two words") // Err - space
/// ```
pub fn validate_player_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_PLAYER_ID_LEN {
        let mut err = ValidationError::new("player_id_length");
        err.message = Some(
            format!(
                "Player ID must be between 1 and {MAX_PLAYER_ID_LEN} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("player_id_format");
        err.message =
            Some("Player ID must contain only ASCII letters, digits, '-' or '_'".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a room ID has the `room_<n>` shape allocated by the registry.
pub fn validate_room_id(id: &str) -> Result<(), ValidationError> {
    let valid = id
        .strip_prefix(ROOM_ID_PREFIX)
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));

    if !valid {
        let mut err = ValidationError::new("room_id_format");
        err.message = Some(format!("Room ID must look like `{ROOM_ID_PREFIX}<n>` (got `{id}`)").into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a display name is not blank.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("name_blank");
        err.message = Some("Name must not be blank".into());
        return Err(err);
    }
    Ok(())
}
