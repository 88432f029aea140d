// ── Local broker credential decryption ──
//
// The cloud hands out each device's broker password encrypted with a
// fixed vendor key: base64(AES-256-CBC(json, key, zero IV)), where the
// JSON carries the password under `apPasswordHash`.

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::CredentialError;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

const VENDOR_KEY: [u8; 32] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10,
    0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f, 0x20,
];
const ZERO_IV: [u8; 16] = [0; 16];

/// Turns the cloud's encrypted credential into the broker password.
pub trait CredentialDecryptor: Send + Sync {
    fn decrypt(&self, encrypted: &str) -> Result<SecretString, CredentialError>;
}

/// The vendor's fixed-key scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCredentialCipher;

#[derive(Deserialize)]
struct DecryptedCredential {
    #[serde(rename = "apPasswordHash")]
    ap_password_hash: Option<String>,
}

impl CredentialDecryptor for LocalCredentialCipher {
    fn decrypt(&self, encrypted: &str) -> Result<SecretString, CredentialError> {
        let cipher_text = STANDARD.decode(encrypted.trim())?;
        let plain = Aes256CbcDec::new(&VENDOR_KEY.into(), &ZERO_IV.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&cipher_text)
            .map_err(|_| CredentialError::Cipher)?;
        let parsed: DecryptedCredential = serde_json::from_slice(&plain)?;
        parsed
            .ap_password_hash
            .map(SecretString::from)
            .ok_or(CredentialError::MissingHash)
    }
}
