//! The HMAC signing key.

use std::fmt;

use rand::RngCore;

use crate::TokenError;

/// Secret key for signing token envelopes.
///
/// `Debug` never prints the key material, so the key can sit inside
/// config structs that get logged.
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    /// Shortest accepted key: the HMAC-SHA256 output size.
    pub const MIN_LEN: usize = 32;

    /// Wraps existing key material.
    ///
    /// # Errors
    /// [`TokenError::KeyTooShort`] if fewer than [`Self::MIN_LEN`] bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, TokenError> {
        let bytes = bytes.into();
        if bytes.len() < Self::MIN_LEN {
            return Err(TokenError::KeyTooShort {
                min: Self::MIN_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }

    /// A fresh random key. Tokens signed with it die with the process.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; Self::MIN_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey(<{} bytes redacted>)", self.0.len())
    }
}
