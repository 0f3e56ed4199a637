//! Password digests.
//!
//! Passwords are never stored. Each account keeps a random 16-byte salt
//! and `SHA-256(salt || password)`. Verification recomputes the digest
//! and compares it in constant time, so response timing does not leak
//! how many leading bytes of a guess were right.

use std::fmt;

use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

/// A salted one-way password digest.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash {
    salt: [u8; SALT_LEN],
    digest: [u8; DIGEST_LEN],
}

impl PasswordHash {
    /// Hashes `password` under a freshly generated salt.
    pub fn new(password: &str) -> Self {
        let salt: [u8; SALT_LEN] = rand::rng().random();
        Self::with_salt(salt, password)
    }

    fn with_salt(salt: [u8; SALT_LEN], password: &str) -> Self {
        Self {
            salt,
            digest: digest(&salt, password),
        }
    }

    /// Returns `true` if `password` produces the stored digest.
    pub fn verify(&self, password: &str) -> bool {
        let candidate = digest(&self.salt, password);
        candidate.ct_eq(&self.digest).into()
    }
}

fn digest(salt: &[u8], password: &str) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

// Keep digests out of logs.
impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(..)")
    }
}
