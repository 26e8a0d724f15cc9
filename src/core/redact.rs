use std::fmt;

// ---------------------------------------------------------------------------
// Sensitive field redaction
// ---------------------------------------------------------------------------

/// A wrapper that redacts its contents when displayed or debug-printed.
///
/// ```ignore
/// let secret = Redacted::new(&config.storage.secret_access_key);
/// tracing::info!(secret = %secret, "connecting"); // logs: secret=[REDACTED]
/// ```
#[derive(Clone)]
pub struct Redacted<T>(T);

impl<T> Redacted<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Redact an Authorization header value for logging, keeping only the scheme.
pub fn redact_bearer_token(header_value: &str) -> String {
    if header_value.is_empty() {
        "<none>".to_string()
    } else if header_value.starts_with("Bearer ") {
        "Bearer [REDACTED]".to_string()
    } else {
        "[REDACTED]".to_string()
    }
}

/// Redact an access key id: first four characters, then `***`.
pub fn redact_access_key(key: &str) -> String {
    if key.chars().count() <= 4 {
        return "****".to_string();
    }
    let visible: String = key.chars().take(4).collect();
    format!("{}***", visible)
}
