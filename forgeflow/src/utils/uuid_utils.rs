//! UUID generation helpers for run identities and scratch naming.

use uuid::Uuid;

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates a new UUID v7 (time-ordered).
#[must_use]
pub fn generate_uuid_v7() -> Uuid {
    Uuid::now_v7()
}

/// Returns a short (8 hex character) identifier derived from a fresh UUID.
///
/// Used for human-readable scratch directory names; not collision-proof
/// across long horizons, which is fine for run-scoped paths.
#[must_use]
pub fn short_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
