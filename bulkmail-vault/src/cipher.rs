//! Authenticated encryption of provider API keys at rest.
//!
//! Each value gets its own random salt and IV. The AES-256 key is derived from
//! the process secret with PBKDF2-HMAC-SHA256, and the stored form is
//! `hex(salt):hex(iv):hex(ciphertext):hex(tag)`.

use std::{fmt, sync::Arc};

use aes_gcm::{
    AesGcm, KeyInit, Nonce, Tag,
    aead::{AeadInPlace, consts::U16},
    aes::Aes256,
};
use rand::RngCore;
use sha2::Sha256;

use crate::error::CryptoError;

/// AES-256-GCM with a 128-bit IV
type Cipher = AesGcm<Aes256, U16>;

pub const MIN_SECRET_LEN: usize = 32;
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const SALT_LEN: usize = 64;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Encrypts and decrypts credentials with a process-wide secret.
#[derive(Clone)]
pub struct Vault {
    secret: Arc<str>,
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault").field("secret", &"<redacted>").finish()
    }
}

impl Vault {
    /// # Errors
    ///
    /// If `secret` is shorter than [`MIN_SECRET_LEN`] characters.
    pub fn new(secret: impl Into<String>) -> Result<Self, CryptoError> {
        let secret = secret.into();
        let actual = secret.chars().count();

        if actual < MIN_SECRET_LEN {
            return Err(CryptoError::WeakSecret {
                minimum: MIN_SECRET_LEN,
                actual,
            });
        }

        Ok(Self {
            secret: Arc::from(secret),
        })
    }

    /// Read the secret from the environment variable `var`.
    ///
    /// # Errors
    ///
    /// If the variable is unset or holds a weak secret.
    pub fn from_env(var: &str) -> Result<Self, CryptoError> {
        let secret = std::env::var(var).map_err(|_| CryptoError::MissingSecret(var.to_string()))?;
        Self::new(secret)
    }

    fn cipher(&self, salt: &[u8]) -> Result<Cipher, CryptoError> {
        let mut key = [0_u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(self.secret.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);

        Cipher::new_from_slice(&key).map_err(|_| CryptoError::Encrypt)
    }

    /// # Errors
    ///
    /// Only if the underlying AEAD refuses the input.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut rng = rand::rng();

        let mut salt = [0_u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        let mut iv = [0_u8; IV_LEN];
        rng.fill_bytes(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher(&salt)?
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| CryptoError::Encrypt)?;

        Ok(format!(
            "{}:{}:{}:{}",
            hex::encode(salt),
            hex::encode(iv),
            hex::encode(&buffer),
            hex::encode(tag)
        ))
    }

    /// # Errors
    ///
    /// [`CryptoError::Malformed`] for anything that is not four hex fields of
    /// the right lengths, [`CryptoError::Authentication`] on tag mismatch.
    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let fields: Vec<&str> = stored.trim().split(':').collect();
        let [salt, iv, ciphertext, tag] = fields.as_slice() else {
            return Err(CryptoError::Malformed(format!(
                "expected 4 fields, found {}",
                fields.len()
            )));
        };

        let salt = decode_field("salt", salt, Some(SALT_LEN))?;
        let iv = decode_field("iv", iv, Some(IV_LEN))?;
        let mut buffer = decode_field("ciphertext", ciphertext, None)?;
        let tag = decode_field("tag", tag, Some(TAG_LEN))?;

        self.cipher(&salt)?
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&iv),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| CryptoError::Authentication)?;

        String::from_utf8(buffer).map_err(|_| CryptoError::InvalidUtf8)
    }
}

fn decode_field(name: &str, field: &str, expected: Option<usize>) -> Result<Vec<u8>, CryptoError> {
    let bytes = hex::decode(field).map_err(|e| CryptoError::Malformed(format!("{name}: {e}")))?;

    match expected {
        Some(len) if bytes.len() != len => Err(CryptoError::Malformed(format!(
            "{name}: expected {len} bytes, found {}",
            bytes.len()
        ))),
        _ => Ok(bytes),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn vault() -> Vault {
        Vault::new(SECRET).expect("secret is long enough")
    }

    #[test]
    fn test_round_trip() {
        let vault = vault();

        for plaintext in ["re_123456789", "", "ключ 🔑 with spaces"] {
            let stored = vault.encrypt(plaintext).expect("encrypt");
            assert_eq!(vault.decrypt(&stored).expect("decrypt"), plaintext);
        }
    }

    #[test]
    fn test_stored_format() {
        let stored = vault().encrypt("re_abc").expect("encrypt");
        let fields: Vec<&str> = stored.split(':').collect();

        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0].len(), SALT_LEN * 2);
        assert_eq!(fields[1].len(), IV_LEN * 2);
        assert_eq!(fields[2].len(), "re_abc".len() * 2);
        assert_eq!(fields[3].len(), TAG_LEN * 2);
    }

    #[test]
    fn test_fresh_salt_and_iv_per_value() {
        let vault = vault();
        assert_ne!(
            vault.encrypt("same").expect("encrypt"),
            vault.encrypt("same").expect("encrypt")
        );
    }

    #[test]
    fn test_flipped_hex_char_fails_authentication() {
        let vault = vault();
        let stored = vault.encrypt("re_secret_key").expect("encrypt");

        let (head, tail) = stored.split_at(stored.rfind(':').expect("tag separator") + 1);
        let mut tag: Vec<char> = tail.chars().collect();
        tag[0] = if tag[0] == '0' { '1' } else { '0' };
        let tampered = format!("{head}{}", tag.into_iter().collect::<String>());

        assert_eq!(vault.decrypt(&tampered), Err(CryptoError::Authentication));

        let ct_start = stored.match_indices(':').nth(1).expect("iv separator").0 + 1;
        let mut bytes = stored.into_bytes();
        bytes[ct_start] = if bytes[ct_start] == b'a' { b'b' } else { b'a' };
        let tampered = String::from_utf8(bytes).expect("ascii");

        assert_eq!(vault.decrypt(&tampered), Err(CryptoError::Authentication));
    }

    #[test]
    fn test_wrong_secret_fails_authentication() {
        let stored = vault().encrypt("re_secret_key").expect("encrypt");
        let other = Vault::new("fedcba9876543210fedcba9876543210").expect("secret");

        assert_eq!(other.decrypt(&stored), Err(CryptoError::Authentication));
    }

    #[test]
    fn test_malformed_input() {
        let vault = vault();

        assert!(matches!(vault.decrypt("abc"), Err(CryptoError::Malformed(_))));
        assert!(matches!(
            vault.decrypt("zz:00:00:00"),
            Err(CryptoError::Malformed(_))
        ));
        assert!(matches!(
            vault.decrypt("00:00:00:00"),
            Err(CryptoError::Malformed(_))
        ));
    }

    #[test]
    fn test_weak_secret_rejected() {
        assert_eq!(
            Vault::new("short").unwrap_err(),
            CryptoError::WeakSecret {
                minimum: 32,
                actual: 5
            }
        );
    }
}
