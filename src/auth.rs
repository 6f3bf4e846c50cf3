use sha2::{Digest, Sha256};

use crate::errors::AuthError;

pub fn digest_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Checks a supplied password against the configured digest. The plain
/// password is never stored or logged.
pub fn verify_password(supplied: Option<&str>, expected_sha256: &str) -> Result<(), AuthError> {
    let supplied = supplied.ok_or(AuthError::Missing)?;
    if digest_password(supplied).eq_ignore_ascii_case(expected_sha256) {
        Ok(())
    } else {
        tracing::warn!("rejected dashboard password");
        Err(AuthError::Mismatch)
    }
}
