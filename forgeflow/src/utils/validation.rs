//! Validation utilities for recipe names.
//!
//! Stage and pipeline names end up in filesystem paths, cache keys, and
//! event payloads, so they are restricted to a conservative character set.

use regex::Regex;
use std::sync::OnceLock;

/// Error indicating an invalid stage or pipeline name.
#[derive(Debug, Clone)]
pub struct InvalidNameError {
    /// The rejected name.
    pub name: String,
    /// Why the name was rejected.
    pub reason: String,
}

impl std::fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid name '{}': {}", self.name, self.reason)
    }
}

impl std::error::Error for InvalidNameError {}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Lowercase alphanumeric, may contain single dashes/underscores inside.
        #[allow(clippy::unwrap_used)]
        Regex::new(r"^[a-z0-9][a-z0-9_-]{0,62}$").unwrap()
    })
}

/// Validates a stage name.
///
/// Stage names must be 1-63 characters of lowercase alphanumerics,
/// dashes, or underscores, starting with an alphanumeric.
///
/// # Errors
///
/// Returns `InvalidNameError` describing the violation.
pub fn validate_stage_name(name: &str) -> Result<(), InvalidNameError> {
    if name.trim().is_empty() {
        return Err(InvalidNameError {
            name: name.to_string(),
            reason: "name cannot be empty or whitespace-only".to_string(),
        });
    }
    if !name_pattern().is_match(name) {
        return Err(InvalidNameError {
            name: name.to_string(),
            reason: "names are 1-63 chars of [a-z0-9_-], starting alphanumeric".to_string(),
        });
    }
    Ok(())
}

/// Validates a pipeline name.
///
/// Pipeline names follow the same rules as stage names.
///
/// # Errors
///
/// Returns `InvalidNameError` describing the violation.
pub fn validate_pipeline_name(name: &str) -> Result<(), InvalidNameError> {
    validate_stage_name(name)
}
