// src/release/staging.rs

//! Deterministic per-client bucket for staged rollouts

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Map a client id onto `[0, 100)`.
///
/// The same id always lands in the same bucket, so a client's staging
/// decision for a given release never flips between runs.
pub fn staging_bucket(client_id: &Uuid) -> u32 {
    let digest = Sha256::digest(client_id.as_bytes());
    let prefix = [digest[0], digest[1], digest[2], digest[3]];
    u32::from_le_bytes(prefix) % 100
}
