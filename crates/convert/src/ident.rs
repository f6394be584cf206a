//! Stable string → integer identity derivation.

use sha2::{Digest, Sha256};

/// Size of the target protocol's actor/group id space.
const ID_SPACE: u64 = 1 << 31;

/// Map an opaque string identity into the target id space.
///
/// Pure and stable across processes: the same string always yields the same
/// integer. Empty input maps to 0.
pub fn derive(identity: &str) -> i64 {
    if identity.is_empty() {
        return 0;
    }
    let digest = Sha256::digest(identity.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % ID_SPACE) as i64
}
