//! UUIDv7 helpers.
//!
//! Every identifier minted by taxon is a UUIDv7, so ids sort by creation time
//! and FIFO ordering can fall back on the id when timestamps collide.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Whether the UUID is version 7.
pub fn is_v7(uuid: &Uuid) -> bool {
    uuid.get_version_num() == 7
}
