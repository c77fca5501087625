//! Hardware-device signer
//!
//! Key material never leaves the device. This backend only knows the derived
//! addresses and their HD paths, and talks to the device through a
//! [`HardwareTransport`]. Opening the transport is retried a bounded number of
//! times; once the attempts are exhausted the backend stays closed until
//! [`HardwareTransportSigner::retry_init`] is called. A `close` always wins
//! over an init still in progress: the transport is closed again as soon as
//! that init opens it.

use alloy::consensus::{SignableTransaction, Transaction as _};
use alloy::dyn_abi::TypedData;
use alloy::network::TxSigner;
use alloy::primitives::{Address, B256, ChainId, Signature, eip191_hash_message};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::{Error as SignerError, Signer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{SignedTransaction, SignerBackend, sign_request, typed_data_hash};
use crate::error::WalletError;
use crate::models::{Account, HardwareConfig, KeyringType};

/// Channel to a physical signing device.
#[async_trait]
pub trait HardwareTransport: Send + Sync {
    async fn open(&self) -> Result<(), String>;

    async fn close(&self) -> Result<(), String>;

    /// Sign a 32-byte digest with the key at `hd_path`.
    async fn sign_digest(&self, hd_path: &str, digest: B256) -> Result<Signature, String>;
}

/// Builds a transport for a device brand.
pub trait TransportFactory: Send + Sync {
    fn create(&self, brand: &str) -> Result<Arc<dyn HardwareTransport>, WalletError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareAccount {
    pub address: Address,
    pub hd_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareOptions {
    pub brand: String,
    pub accounts: Vec<HardwareAccount>,
}

struct Inner {
    brand: String,
    accounts: Vec<HardwareAccount>,
    transport: Arc<dyn HardwareTransport>,
    config: HardwareConfig,
    init_lock: Mutex<()>,
    ready: AtomicBool,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct HardwareTransportSigner {
    inner: Arc<Inner>,
}

impl HardwareTransportSigner {
    pub fn new(
        options: HardwareOptions,
        transport: Arc<dyn HardwareTransport>,
        config: HardwareConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                brand: options.brand,
                accounts: options.accounts,
                transport,
                config,
                init_lock: Mutex::new(()),
                ready: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_options(
        options: &Value,
        factory: &dyn TransportFactory,
        config: HardwareConfig,
    ) -> Result<Self, WalletError> {
        let options: HardwareOptions = serde_json::from_value(options.clone())
            .map_err(|e| WalletError::Keyring(format!("Invalid hardware keyring options: {e}")))?;
        let transport = factory.create(&options.brand)?;
        Ok(Self::new(options, transport, config))
    }

    pub fn brand(&self) -> &str {
        &self.inner.brand
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    fn closed_error(&self) -> WalletError {
        WalletError::HardwareInitFailed(format!("{} keyring was closed", self.inner.brand))
    }

    /// Open the transport, retrying up to the configured attempt count.
    /// Gives up early once the backend has been closed.
    pub async fn init(&self) -> Result<(), WalletError> {
        let _guard = self.inner.init_lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }

        let attempts = self.inner.config.init_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(self.closed_error());
            }
            match self.inner.transport.open().await {
                Ok(()) => {
                    self.inner.ready.store(true, Ordering::SeqCst);
                    if self.inner.closed.load(Ordering::SeqCst) {
                        // close() ran while the device was opening
                        if self.inner.ready.swap(false, Ordering::SeqCst)
                            && let Err(e) = self.inner.transport.close().await
                        {
                            tracing::warn!("Closing {} transport failed: {}", self.inner.brand, e);
                        }
                        return Err(self.closed_error());
                    }
                    tracing::info!(
                        "Opened {} transport on attempt {}/{}",
                        self.inner.brand,
                        attempt,
                        attempts
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "Opening {} transport failed (attempt {}/{}): {}",
                        self.inner.brand,
                        attempt,
                        attempts,
                        e
                    );
                    last_error = e;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.inner.config.init_interval).await;
            }
        }

        Err(WalletError::HardwareInitFailed(format!(
            "{} transport did not open after {} attempts: {}",
            self.inner.brand, attempts, last_error
        )))
    }

    /// Run `init` in the background. Failure is only logged; signing will fail
    /// fast until `retry_init` succeeds.
    pub fn spawn_init(&self) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.init().await {
                tracing::error!("Background hardware init failed: {}", e);
            }
        })
    }

    /// Explicit re-initialization, reopening a closed backend. The error
    /// surfaces to the caller.
    pub async fn retry_init(&self) -> Result<(), WalletError> {
        self.inner.closed.store(false, Ordering::SeqCst);
        self.init().await
    }

    /// Close the transport. Safe to call any number of times.
    pub async fn close(&self) -> Result<(), WalletError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let was_ready = self.inner.ready.swap(false, Ordering::SeqCst);
        if !was_ready {
            return Ok(());
        }
        self.inner
            .transport
            .close()
            .await
            .map_err(|e| WalletError::Keyring(format!("Failed to close {} transport: {e}", self.inner.brand)))
    }

    fn session(&self, address: Address) -> Result<HardwareSession, WalletError> {
        if !self.is_ready() {
            return Err(WalletError::HardwareInitFailed(format!(
                "{} transport is not open",
                self.inner.brand
            )));
        }
        let account = self
            .inner
            .accounts
            .iter()
            .find(|a| a.address == address)
            .ok_or(WalletError::AccountNotFound(address))?;
        Ok(HardwareSession {
            transport: self.inner.transport.clone(),
            address,
            hd_path: account.hd_path.clone(),
            chain_id: None,
        })
    }

    pub async fn sign_hash(&self, address: Address, hash: B256) -> Result<Signature, WalletError> {
        let session = self.session(address)?;
        session
            .sign_hash(&hash)
            .await
            .map_err(|e| WalletError::Keyring(format!("Device signing failed: {e}")))
    }
}

#[async_trait]
impl SignerBackend for HardwareTransportSigner {
    fn keyring_type(&self) -> KeyringType {
        KeyringType::HardwareTransport
    }

    async fn get_accounts(&self) -> Result<Vec<Account>, WalletError> {
        Ok(self
            .inner
            .accounts
            .iter()
            .map(|a| Account {
                address: a.address,
                brand_name: self.inner.brand.clone(),
                keyring_type: KeyringType::HardwareTransport,
            })
            .collect())
    }

    async fn sign_transaction(
        &self,
        address: Address,
        tx: TransactionRequest,
    ) -> Result<SignedTransaction, WalletError> {
        let session = self.session(address)?;
        sign_request(session, address, tx).await
    }

    async fn sign_message(&self, address: Address, data: &[u8]) -> Result<Signature, WalletError> {
        self.sign_hash(address, eip191_hash_message(data)).await
    }

    async fn sign_typed_data(
        &self,
        address: Address,
        typed_data: &TypedData,
    ) -> Result<Signature, WalletError> {
        let hash = typed_data_hash(typed_data)?;
        self.sign_hash(address, hash).await
    }
}

/// Alloy [`Signer`] for one account on an open device.
#[derive(Clone)]
pub struct HardwareSession {
    transport: Arc<dyn HardwareTransport>,
    address: Address,
    hd_path: String,
    chain_id: Option<ChainId>,
}

#[async_trait]
impl Signer for HardwareSession {
    async fn sign_hash(&self, hash: &B256) -> Result<Signature, SignerError> {
        tracing::debug!("Signing digest on device path {}", self.hd_path);
        self.transport
            .sign_digest(&self.hd_path, *hash)
            .await
            .map_err(SignerError::other)
    }

    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> Option<ChainId> {
        self.chain_id
    }

    fn set_chain_id(&mut self, chain_id: Option<ChainId>) {
        self.chain_id = chain_id;
    }
}

#[async_trait]
impl TxSigner<Signature> for HardwareSession {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_transaction(
        &self,
        tx: &mut dyn SignableTransaction<Signature>,
    ) -> alloy::signers::Result<Signature> {
        if let Some(chain_id) = self.chain_id
            && !tx.set_chain_id_checked(chain_id)
        {
            return Err(SignerError::TransactionChainIdMismatch {
                signer: chain_id,
                tx: tx.chain_id().unwrap_or_default(),
            });
        }
        Signer::sign_hash(self, &tx.signature_hash()).await
    }
}

impl std::fmt::Debug for HardwareSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareSession")
            .field("address", &self.address)
            .field("hd_path", &self.hd_path)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}
