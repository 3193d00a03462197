//! Induction token secrets and password handling.

use std::fmt;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Number of random bytes behind an induction link token.
pub const INDUCTION_TOKEN_BYTES: usize = 32;

const TEMPORARY_PASSWORD_LEN: usize = 20;

static ARGON2: Lazy<Argon2<'static>> = Lazy::new(|| {
    Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::DEFAULT,
    )
});

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("failed to verify password: {0}")]
    Verify(String),
}

/// Raw induction secret. Only ever leaves the process inside the emailed link.
pub struct InductionSecret {
    bytes: [u8; INDUCTION_TOKEN_BYTES],
}

impl InductionSecret {
    pub fn generate() -> Self {
        let mut bytes = [0u8; INDUCTION_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Hex form placed in the link.
    pub fn encode(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Digest persisted in place of the secret.
    pub fn digest(&self) -> String {
        token_digest(&self.encode())
    }
}

impl fmt::Debug for InductionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InductionSecret(**redacted**)")
    }
}

impl Drop for InductionSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// SHA-256 hex digest of a presented token, used for lookups.
pub fn token_digest(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.trim().as_bytes()))
}

/// Random password for accounts created before the driver picks their own.
pub fn generate_temporary_password() -> SecretInput {
    let password: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(TEMPORARY_PASSWORD_LEN)
        .map(char::from)
        .collect();
    SecretInput::new(password)
}

pub fn hash_password(password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    ARGON2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| CredentialError::Hash(err.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, CredentialError> {
    let parsed = PasswordHash::new(hash).map_err(|err| CredentialError::Verify(err.to_string()))?;
    match ARGON2.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(CredentialError::Verify(err.to_string())),
    }
}

/// Plain-text secret received from a client. Redacted in `Debug` and wiped on drop.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SecretInput(String);

impl SecretInput {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretInput(**redacted**)")
    }
}

impl Drop for SecretInput {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}
