//! Common identifiers and time helpers shared across noesis crates

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Task identity, used as the cache fingerprint
pub type TaskId = String;

/// Mint a fresh opaque identity
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}
