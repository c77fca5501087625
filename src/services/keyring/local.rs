//! In-process signer over vault-encrypted key material
//!
//! Addresses are kept in the clear so accounts can be listed while locked;
//! private keys exist in memory only between `unlock` and `lock`.

use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, B256, Signature};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::SignerSync;
use alloy::signers::local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use super::vault::{EncryptedVault, VaultSecret};
use super::{SignedTransaction, SignerBackend, sign_request, typed_data_hash};
use crate::error::WalletError;
use crate::models::{Account, KeyringType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalOptions {
    vault: EncryptedVault,
    #[serde(default)]
    accounts: Vec<Address>,
    #[serde(default = "default_brand")]
    brand_name: String,
}

fn default_brand() -> String {
    "Seed Phrase".to_string()
}

fn derive_signers(secret: &VaultSecret) -> Result<Vec<PrivateKeySigner>, WalletError> {
    let mut signers = Vec::new();

    if let Some(phrase) = &secret.mnemonic {
        for index in 0..secret.count.unwrap_or(1) {
            let signer = MnemonicBuilder::<English>::default()
                .phrase(phrase.as_str())
                .index(index)
                .and_then(|builder| builder.build())
                .map_err(|e| WalletError::Keyring(format!("Failed to derive account {index}: {e}")))?;
            signers.push(signer);
        }
    }

    for key in &secret.private_keys {
        let signer = key
            .parse::<PrivateKeySigner>()
            .map_err(|e| WalletError::Keyring(format!("Failed to parse private key: {e}")))?;
        signers.push(signer);
    }

    Ok(signers)
}

pub struct LocalSeedSigner {
    vault: Option<EncryptedVault>,
    brand_name: String,
    addresses: RwLock<Vec<Address>>,
    keys: RwLock<HashMap<Address, PrivateKeySigner>>,
}

impl LocalSeedSigner {
    /// Rebuild from persisted descriptor options. Starts locked.
    pub fn from_options(options: &Value) -> Result<Self, WalletError> {
        let options: LocalOptions = serde_json::from_value(options.clone())
            .map_err(|e| WalletError::Keyring(format!("Invalid local keyring options: {e}")))?;
        Ok(Self {
            vault: Some(options.vault),
            brand_name: options.brand_name,
            addresses: RwLock::new(options.accounts),
            keys: RwLock::new(HashMap::new()),
        })
    }

    /// Seal `secret` under `password` and return the backend (unlocked) with
    /// the descriptor options to persist.
    pub fn create(secret: &VaultSecret, password: &str) -> Result<(Self, Value), WalletError> {
        let signers = derive_signers(secret)?;
        let vault = EncryptedVault::seal(secret, password)?;
        let brand_name = if secret.mnemonic.is_some() {
            default_brand()
        } else {
            "Private Key".to_string()
        };
        let options = LocalOptions {
            vault: vault.clone(),
            accounts: signers.iter().map(|s| s.address()).collect(),
            brand_name: brand_name.clone(),
        };
        let options = serde_json::to_value(&options)
            .map_err(|e| WalletError::Keyring(format!("Failed to serialize options: {e}")))?;

        let backend = Self {
            vault: Some(vault),
            brand_name,
            addresses: RwLock::new(Vec::new()),
            keys: RwLock::new(HashMap::new()),
        };
        backend.install(signers);
        Ok((backend, options))
    }

    /// Unlocked, vault-less backend over existing keys.
    pub fn from_signers(signers: Vec<PrivateKeySigner>) -> Self {
        let backend = Self {
            vault: None,
            brand_name: "Private Key".to_string(),
            addresses: RwLock::new(Vec::new()),
            keys: RwLock::new(HashMap::new()),
        };
        backend.install(signers);
        backend
    }

    fn install(&self, signers: Vec<PrivateKeySigner>) {
        let addresses: Vec<Address> = signers.iter().map(|s| s.address()).collect();
        *self.addresses.write().unwrap_or_else(|e| e.into_inner()) = addresses;
        *self.keys.write().unwrap_or_else(|e| e.into_inner()) =
            signers.into_iter().map(|s| (s.address(), s)).collect();
    }

    pub fn unlock(&self, password: &str) -> Result<(), WalletError> {
        let Some(vault) = &self.vault else {
            return if self.is_unlocked() {
                Ok(())
            } else {
                Err(WalletError::Keyring("Keyring has no vault to unlock".to_string()))
            };
        };
        let secret = vault.open(password)?;
        self.install(derive_signers(&secret)?);
        tracing::debug!("Unlocked local keyring ({})", self.brand_name);
        Ok(())
    }

    pub fn lock(&self) {
        self.keys.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn is_unlocked(&self) -> bool {
        !self.keys.read().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    fn signer(&self, address: Address) -> Result<PrivateKeySigner, WalletError> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        if keys.is_empty() {
            return Err(WalletError::Locked);
        }
        keys.get(&address)
            .cloned()
            .ok_or(WalletError::AccountNotFound(address))
    }

    pub fn sign_hash(&self, address: Address, hash: B256) -> Result<Signature, WalletError> {
        self.signer(address)?
            .sign_hash_sync(&hash)
            .map_err(|e| WalletError::Keyring(format!("Failed to sign hash: {e}")))
    }
}

#[async_trait]
impl SignerBackend for LocalSeedSigner {
    fn keyring_type(&self) -> KeyringType {
        KeyringType::Local
    }

    async fn get_accounts(&self) -> Result<Vec<Account>, WalletError> {
        let addresses = self.addresses.read().unwrap_or_else(|e| e.into_inner());
        Ok(addresses
            .iter()
            .map(|address| Account {
                address: *address,
                brand_name: self.brand_name.clone(),
                keyring_type: KeyringType::Local,
            })
            .collect())
    }

    async fn sign_transaction(
        &self,
        address: Address,
        tx: TransactionRequest,
    ) -> Result<SignedTransaction, WalletError> {
        let signer = self.signer(address)?;
        sign_request(signer, address, tx).await
    }

    async fn sign_message(&self, address: Address, data: &[u8]) -> Result<Signature, WalletError> {
        self.signer(address)?
            .sign_message_sync(data)
            .map_err(|e| WalletError::Keyring(format!("Failed to sign message: {e}")))
    }

    async fn sign_typed_data(
        &self,
        address: Address,
        typed_data: &TypedData,
    ) -> Result<Signature, WalletError> {
        let hash = typed_data_hash(typed_data)?;
        self.sign_hash(address, hash)
    }
}
