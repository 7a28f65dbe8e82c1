//! Credential encryption
//!
//! Provider API keys are stored as base64(nonce ‖ AES-256-GCM ciphertext)
//! and decrypted only when a provider is resolved for use.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{Engine as _, engine::general_purpose};
use std::fmt;

use crate::error::{Error, Result};

const NONCE_LEN: usize = 12;

/// Encrypts and decrypts stored credentials
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher")
            .field("key", &"<REDACTED>")
            .finish()
    }
}

impl SecretCipher {
    /// Create a cipher from raw key bytes
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derive a cipher from a configured secret
    ///
    /// A base64 value decoding to at least 32 bytes is used directly;
    /// anything else is repeated to fill the key.
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::config("Encryption secret cannot be empty"));
        }

        let mut key = [0u8; 32];
        if let Ok(decoded) = general_purpose::STANDARD.decode(secret)
            && decoded.len() >= 32
        {
            key.copy_from_slice(&decoded[..32]);
            return Ok(Self::new(key));
        }

        let bytes = secret.as_bytes();
        for (i, slot) in key.iter_mut().enumerate() {
            *slot = bytes[i % bytes.len()];
        }
        Ok(Self::new(key))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }

    /// Encrypt a plaintext credential
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::secret(format!("Encryption failed: {e}")))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(general_purpose::STANDARD.encode(combined))
    }

    /// Decrypt a stored credential
    pub fn decrypt(&self, encrypted: &str) -> Result<String> {
        let combined = general_purpose::STANDARD
            .decode(encrypted.trim())
            .map_err(|e| Error::secret(format!("Base64 decode failed: {e}")))?;

        if combined.len() <= NONCE_LEN {
            return Err(Error::secret("Invalid encrypted data: too short"));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| Error::secret(format!("Decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| Error::secret(format!("UTF-8 conversion failed: {e}")))
    }
}
