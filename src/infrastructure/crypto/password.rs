//! Password hashing utilities

use bcrypt::{hash, verify, DEFAULT_COST};

/// Plaintext behind [`dummy_hash`]. Never a valid account password because
/// login compares against it only when no real account is involved.
const DUMMY_PASSWORD: &str = "lms-manager-dummy-password";

/// Hash a password using bcrypt
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password, DEFAULT_COST)
}

/// Hash with an explicit work factor. Low costs are only meant for tests.
pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(password, cost)
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password, hash)
}

/// A hash with the given cost whose verification burns the same work as a
/// real account's. Used when the account is unknown or disabled so response
/// time does not reveal whether the username exists.
pub fn dummy_hash(cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(DUMMY_PASSWORD, cost)
}
