//! Identifier generation.

use uuid::Uuid;

/// Generates a random (v4) identifier string.
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
