//! Opaque token generation.

use uuid::Uuid;

/// Generator for opaque, unguessable tokens.
#[derive(Debug, Clone, Default)]
pub struct TokenGenerator {
    _private: (),
}

impl TokenGenerator {
    /// Create a new token generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a session token (64 hex characters).
    #[must_use]
    pub fn session_token(&self) -> String {
        // Two v4 UUIDs: no time component, 244 random bits.
        format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        )
    }

    /// Generate a shorter token for links such as unsubscribe URLs.
    #[must_use]
    pub fn link_token(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}
