use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Invalid hex key: {0}")]
    InvalidHexKey(#[from] hex::FromHexError),
}

/// Seals notification channel credentials with AES-256-GCM.
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    pub fn new(key: &[u8]) -> Result<Self, EncryptionError> {
        Ok(Self {
            cipher: Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::InvalidKeyLength)?,
        })
    }

    /// Builds the service from a 64-character hex key, as found in configuration.
    pub fn from_hex_key(key_hex: &str) -> Result<Self, EncryptionError> {
        let key = hex::decode(key_hex.trim())?;
        Self::new(&key)
    }

    /// Output layout: 12-byte nonce followed by the ciphertext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if sealed.len() < NONCE_LEN {
            return Err(EncryptionError::DecryptionFailed(
                "Invalid encrypted data: too short to contain a nonce".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_encrypt_decrypt_success() {
        let service = EncryptionService::from_hex_key(KEY_HEX).unwrap();
        let sealed = service.encrypt(b"bot-token").unwrap();

        assert_ne!(&sealed[NONCE_LEN..], b"bot-token");
        assert_eq!(service.decrypt(&sealed).unwrap(), b"bot-token");
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let service = EncryptionService::from_hex_key(KEY_HEX).unwrap();
        let other = EncryptionService::from_hex_key(
            "f1e1d1c1b1a191817161514131211101f0e0d0c0b0a090807060504030201000",
        )
        .unwrap();
        let sealed = service.encrypt(b"secret").unwrap();

        assert!(matches!(
            other.decrypt(&sealed),
            Err(EncryptionError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_invalid_key() {
        assert!(matches!(
            EncryptionService::from_hex_key("1234"),
            Err(EncryptionError::InvalidKeyLength)
        ));
        assert!(matches!(
            EncryptionService::from_hex_key("not-a-hex-string"),
            Err(EncryptionError::InvalidHexKey(_))
        ));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let service = EncryptionService::from_hex_key(KEY_HEX).unwrap();
        assert!(service.decrypt(&[0u8; 4]).is_err());
    }
}
