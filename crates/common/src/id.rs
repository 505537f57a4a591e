//! ID generation and validation.

use ulid::Ulid;

use crate::{AppError, AppResult};

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// ULIDs are lexicographically sortable and shorter than UUIDs when
    /// represented as strings.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }
}

/// Validate a caller-supplied identifier.
///
/// Returns the trimmed identifier. `label` names the entity in the error
/// message ("Video" -> "Video ID is required" / "Invalid Video ID").
pub fn validate_id<'a>(label: &str, raw: &'a str) -> AppResult<&'a str> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(AppError::InvalidArgument(format!("{label} ID is required")));
    }
    if Ulid::from_string(id).is_err() {
        return Err(AppError::InvalidArgument(format!("Invalid {label} ID")));
    }
    Ok(id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ulid() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.generate();
        let id2 = id_gen.generate();

        assert_eq!(id1.len(), 26);
        assert_eq!(id2.len(), 26);
        assert_ne!(id1, id2);
        assert_eq!(id1, id1.to_lowercase());
    }

    #[test]
    fn test_validate_generated_id() {
        let id = IdGenerator::new().generate();
        assert_eq!(validate_id("Video", &id).unwrap(), id);
    }

    #[test]
    fn test_validate_trims_whitespace() {
        let id = IdGenerator::new().generate();
        let padded = format!("  {id} ");
        assert_eq!(validate_id("Video", &padded).unwrap(), id);
    }

    #[test]
    fn test_validate_blank_id() {
        let err = validate_id("Tweet", "   ").unwrap_err();
        assert_eq!(err.to_string(), "Tweet ID is required");
    }

    #[test]
    fn test_validate_malformed_id() {
        let err = validate_id("Playlist", "not-an-id").unwrap_err();
        assert_eq!(err.to_string(), "Invalid Playlist ID");
    }
}
