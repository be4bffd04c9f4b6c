//! Account credential checks.
//!
//! The stored hash is `sha512_hex(password + ":" + sha512_hex(account_name))`.
//! Salting with the account name is weak (equal passwords under equal names
//! collide across deployments, and the salt is public); the format is kept
//! because seeded accounts are stored this way.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha512};

static ACCOUNT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A[0-9a-zA-Z_]{3,}\z").unwrap());
static PASSWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A[0-9a-zA-Z_]{6,}\z").unwrap());

/// Lowercase hex SHA-512 of `src`.
pub fn digest(src: &str) -> String {
    hex::encode(Sha512::digest(src.as_bytes()))
}

fn calculate_salt(account_name: &str) -> String {
    digest(account_name)
}

pub fn calculate_passhash(account_name: &str, password: &str) -> String {
    digest(&format!("{}:{}", password, calculate_salt(account_name)))
}

pub fn validate_account_name(account_name: &str) -> bool {
    ACCOUNT_NAME.is_match(account_name)
}

pub fn validate_password(password: &str) -> bool {
    PASSWORD.is_match(password)
}

/// Both fields must be acceptable for registration to proceed.
pub fn validate_user(account_name: &str, password: &str) -> bool {
    validate_account_name(account_name) && validate_password(password)
}

/// Compare a password against a stored hash.
pub fn verify(account_name: &str, password: &str, passhash: &str) -> bool {
    calculate_passhash(account_name, password) == passhash
}
