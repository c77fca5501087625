//! Password-encrypted storage for local key material
//!
//! AES-256-GCM with a key expanded by HKDF-SHA256 from the password and a
//! per-vault random salt. All fields are hex so the vault can sit inside a
//! JSON keyring descriptor.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::WalletError;

const VAULT_KEY_INFO: &[u8] = b"wallet-gate/local-vault/v1";

/// Decrypted vault contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSecret {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    /// Number of accounts derived from the mnemonic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedVault {
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32], WalletError> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), password.as_bytes());
    let mut key = [0u8; 32];
    hkdf.expand(VAULT_KEY_INFO, &mut key)
        .map_err(|_| WalletError::Keyring("HKDF expansion failed".to_string()))?;
    Ok(key)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, WalletError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|e| WalletError::Keyring(format!("Invalid vault {name}: {e}")))
}

impl EncryptedVault {
    pub fn seal(secret: &VaultSecret, password: &str) -> Result<Self, WalletError> {
        let mut salt = [0u8; 16];
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let key = derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| WalletError::Keyring(format!("Failed to create cipher: {e}")))?;

        let plaintext = serde_json::to_vec(secret)
            .map_err(|e| WalletError::Keyring(format!("Failed to serialize vault: {e}")))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|e| WalletError::Keyring(format!("Encryption failed: {e}")))?;

        Ok(Self {
            salt: hex::encode(salt),
            nonce: hex::encode(nonce_bytes),
            ciphertext: hex::encode(ciphertext),
        })
    }

    pub fn open(&self, password: &str) -> Result<VaultSecret, WalletError> {
        let salt = decode_field("salt", &self.salt)?;
        let nonce_bytes = decode_field("nonce", &self.nonce)?;
        let ciphertext = decode_field("ciphertext", &self.ciphertext)?;
        if nonce_bytes.len() != 12 {
            return Err(WalletError::Keyring("Invalid vault nonce length".to_string()));
        }

        let key = derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| WalletError::Keyring(format!("Failed to create cipher: {e}")))?;

        // GCM tag mismatch is the only signal of a wrong password
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| WalletError::Keyring("Incorrect password".to_string()))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| WalletError::Keyring(format!("Corrupt vault contents: {e}")))
    }
}
