use ring::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, NONCE_LEN, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

/// Required key size in bytes (256 bits)
const KEY_LEN: usize = 32;

/// GCM authentication tag size in bytes
const TAG_LEN: usize = 16;

#[derive(Debug, Error, Clone)]
pub enum CipherError {
    #[error("Encryption key must be {KEY_LEN} bytes, got {0}")]
    KeyLength(usize),

    #[error("Failed to generate random nonce")]
    Nonce,

    #[error("Encryption failed")]
    Encryption,

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Malformed ciphertext blob: {0}")]
    Malformed(String),
}

/// AES-256-GCM cipher for OAuth token ciphertext at rest.
///
/// Every encryption draws a fresh 96-bit nonce, so encrypting the same
/// plaintext twice never produces the same blob. Blobs are stored as
/// `ivHex:tagHex:ciphertextHex` so the nonce and authentication tag travel
/// with the ciphertext.
pub struct TokenCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    /// Build a cipher from a raw 32-byte key. Anything other than exactly
    /// 32 bytes is rejected; there is no key derivation fallback.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::KeyLength(key.len()));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| CipherError::Encryption)?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CipherError::Nonce)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.as_bytes().to_vec();
        let tag = self
            .key
            .seal_in_place_separate_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CipherError::Encryption)?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag.as_ref()),
            hex::encode(&in_out)
        ))
    }

    pub fn decrypt(&self, blob: &str) -> Result<String, CipherError> {
        // Reject blobs of the wrong shape before touching key material.
        let segments: Vec<&str> = blob.split(':').collect();
        if segments.len() != 3 {
            return Err(CipherError::Malformed(format!(
                "expected 3 colon-delimited segments, got {}",
                segments.len()
            )));
        }
        let (iv_hex, tag_hex, ciphertext_hex) = (segments[0], segments[1], segments[2]);

        let iv = hex::decode(iv_hex)
            .map_err(|_| CipherError::Malformed("iv segment is not valid hex".to_string()))?;
        let nonce_bytes: [u8; NONCE_LEN] = iv
            .try_into()
            .map_err(|_| CipherError::Malformed("iv segment has wrong length".to_string()))?;

        let tag = hex::decode(tag_hex)
            .map_err(|_| CipherError::Malformed("tag segment is not valid hex".to_string()))?;
        if tag.len() != TAG_LEN {
            return Err(CipherError::Malformed(
                "tag segment has wrong length".to_string(),
            ));
        }

        let ciphertext = hex::decode(ciphertext_hex).map_err(|_| {
            CipherError::Malformed("ciphertext segment is not valid hex".to_string())
        })?;

        let mut in_out = ciphertext;
        in_out.extend_from_slice(&tag);

        let nonce = Nonce::assume_unique_for_key(nonce_bytes);
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| {
                CipherError::Decryption("integrity check failed (wrong key or tampered data)".to_string())
            })?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| CipherError::Decryption("plaintext is not valid UTF-8".to_string()))
    }
}
