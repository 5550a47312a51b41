//! Hashing y canonicalización JSON (claves de idempotencia del outbox).

pub mod canonical_json;
pub mod hash;

pub use canonical_json::to_canonical_json;
pub use hash::hash_parts;
