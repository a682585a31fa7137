//! Salted SHA-256 credential hashing.

use rand::RngCore;
use sha2::{Digest, Sha256};

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;

/// Hash a raw credential with a fresh random salt.
///
/// The result has the shape `sha256$<salt hex>$<digest hex>`.
pub fn hash_credential(raw: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    format!("{SCHEME}${}${}", hex::encode(salt), digest(&salt, raw))
}

/// Check a raw credential against a stored hash.
pub fn verify_credential(raw: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(SCHEME), Some(salt_hex), Some(expected)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };

    constant_time_eq(&digest(&salt, raw), expected)
}

/// Compare two secrets; the timing does not depend on where the first mismatch is.
pub fn constant_time_eq(left: &str, right: &str) -> bool {
    left.len() == right.len()
        && left
            .bytes()
            .zip(right.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn digest(salt: &[u8], raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
