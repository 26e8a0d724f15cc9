// ---------------------------------------------------------------------------
// Input validation limits
// ---------------------------------------------------------------------------

/// Maximum length of a raw show or season name, in characters.
pub const MAX_NAME_LENGTH: usize = 200;

/// Maximum length of a raw source tag, in characters.
pub const MAX_SOURCE_LENGTH: usize = 64;

/// Validate the length of a free-text field before it is sanitized.
pub fn validate_length(field: &str, value: &str, max_chars: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len > max_chars {
        return Err(format!(
            "{} is {} characters long (max {})",
            field, len, max_chars
        ));
    }
    Ok(())
}

/// Validate an episode number. Any positive `u32` is addressable.
pub fn validate_episode(episode: u32) -> Result<(), String> {
    if episode == 0 {
        return Err("episode must be a positive integer".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_length() {
        assert!(validate_length("title", "Foo", MAX_NAME_LENGTH).is_ok());
        assert!(validate_length("title", &"x".repeat(201), MAX_NAME_LENGTH).is_err());
        // Counted in characters, not bytes.
        assert!(validate_length("title", &"é".repeat(200), MAX_NAME_LENGTH).is_ok());
    }

    #[test]
    fn test_validate_episode() {
        assert!(validate_episode(1).is_ok());
        assert!(validate_episode(0).is_err());
        assert!(validate_episode(u32::MAX).is_ok());
    }
}
