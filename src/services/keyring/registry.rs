//! Registry of live signer backends
//!
//! Backends are held as `Arc<KeyringBackend>` in a map guarded by a short,
//! never-awaited lock. Lookups clone the `Arc`s out, so a backend evicted
//! while a signature is in progress stays alive until that call returns.

use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, B256, Signature};
use alloy::rpc::types::TransactionRequest;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::federation::FederationService;
use super::hardware::{HardwareTransportSigner, TransportFactory};
use super::local::LocalSeedSigner;
use super::multisig::{MultisigCoordinatorSigner, MultisigOptions};
use super::store::DescriptorStore;
use super::vault::VaultSecret;
use super::{KeyringBackend, SignedTransaction, SignerBackend};
use crate::error::WalletError;
use crate::models::{Account, HardwareConfig, KeyringDescriptor, KeyringType, MultisigTransaction};
use crate::services::events::EventBus;

pub struct KeyringRegistry {
    backends: RwLock<HashMap<String, Arc<KeyringBackend>>>,
    store: Arc<dyn DescriptorStore>,
    bus: Arc<EventBus>,
    federation: Arc<dyn FederationService>,
    transports: Arc<dyn TransportFactory>,
    hardware: HardwareConfig,
    unlocked: AtomicBool,
}

impl KeyringRegistry {
    pub fn new(
        store: Arc<dyn DescriptorStore>,
        bus: Arc<EventBus>,
        federation: Arc<dyn FederationService>,
        transports: Arc<dyn TransportFactory>,
        hardware: HardwareConfig,
    ) -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
            store,
            bus,
            federation,
            transports,
            hardware,
            unlocked: AtomicBool::new(false),
        }
    }

    fn snapshot(&self) -> Vec<(String, Arc<KeyringBackend>)> {
        let backends = self.backends.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = backends
            .iter()
            .map(|(id, b)| (id.clone(), b.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn keyring_count(&self) -> usize {
        self.backends.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn get(&self, id: &str) -> Option<Arc<KeyringBackend>> {
        self.backends
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Re-instantiate every persisted backend. Returns how many came up.
    ///
    /// Multisig coordinators are built last because they borrow an owner
    /// backend. A descriptor that fails to instantiate is logged and skipped.
    pub async fn restore(&self) -> Result<usize, WalletError> {
        let descriptors = self.store.load_all().await?;
        let (multisig, singles): (Vec<_>, Vec<_>) = descriptors
            .into_iter()
            .partition(|(_, d)| d.keyring_type == KeyringType::MultisigCoordinator);

        let mut restored = 0;
        for (id, descriptor) in singles.into_iter().chain(multisig) {
            match self.instantiate(&descriptor).await {
                Ok(backend) => {
                    self.insert(&id, backend);
                    restored += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to restore {} keyring {}: {}",
                        descriptor.keyring_type.as_str(),
                        id,
                        e
                    );
                }
            }
        }
        tracing::info!("Restored {} keyring(s)", restored);
        Ok(restored)
    }

    async fn instantiate(&self, descriptor: &KeyringDescriptor) -> Result<KeyringBackend, WalletError> {
        match descriptor.keyring_type {
            KeyringType::Local => Ok(KeyringBackend::Local(LocalSeedSigner::from_options(
                &descriptor.options,
            )?)),
            KeyringType::HardwareTransport => {
                let signer = HardwareTransportSigner::from_options(
                    &descriptor.options,
                    self.transports.as_ref(),
                    self.hardware.clone(),
                )?;
                // device may not be attached yet; failures only log
                signer.spawn_init();
                Ok(KeyringBackend::HardwareTransport(signer))
            }
            KeyringType::MultisigCoordinator => {
                let options = MultisigOptions::parse(&descriptor.options)?;
                let owner_backend = self.resolve_owner(options.owner).await?;
                Ok(KeyringBackend::MultisigCoordinator(
                    MultisigCoordinatorSigner::new(
                        options,
                        owner_backend,
                        self.federation.clone(),
                        self.bus.clone(),
                    ),
                ))
            }
        }
    }

    async fn resolve_owner(&self, owner: Address) -> Result<Arc<KeyringBackend>, WalletError> {
        for (_, backend) in self.snapshot() {
            if backend.keyring_type() == KeyringType::MultisigCoordinator {
                continue;
            }
            if backend
                .get_accounts()
                .await?
                .iter()
                .any(|a| a.address == owner)
            {
                return Ok(backend);
            }
        }
        Err(WalletError::AccountNotFound(owner))
    }

    fn insert(&self, id: &str, backend: KeyringBackend) {
        self.backends
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), Arc::new(backend));
    }

    /// Register an already-built backend without persisting it.
    pub fn add_backend(&self, backend: KeyringBackend) -> String {
        let id = Uuid::new_v4().to_string();
        self.insert(&id, backend);
        id
    }

    /// Instantiate, persist and register a backend from its descriptor.
    pub async fn add_keyring(&self, descriptor: KeyringDescriptor) -> Result<String, WalletError> {
        let backend = self.instantiate(&descriptor).await?;
        let id = Uuid::new_v4().to_string();
        self.store.save(&id, &descriptor).await?;
        self.insert(&id, backend);
        Ok(id)
    }

    /// Seal a new local vault under `password` and register it unlocked.
    pub async fn create_local(&self, secret: &VaultSecret, password: &str) -> Result<String, WalletError> {
        let (backend, options) = LocalSeedSigner::create(secret, password)?;
        let id = Uuid::new_v4().to_string();
        self.store
            .save(&id, &KeyringDescriptor::new(KeyringType::Local, options))
            .await?;
        self.insert(&id, KeyringBackend::Local(backend));
        Ok(id)
    }

    pub async fn remove_keyring(&self, id: &str) -> Result<(), WalletError> {
        let removed = self
            .backends
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        let Some(backend) = removed else {
            return Err(WalletError::Keyring(format!("Keyring {id} not found")));
        };
        if let Some(hardware) = backend.as_hardware()
            && let Err(e) = hardware.close().await
        {
            tracing::warn!("Closing hardware keyring {} failed: {}", id, e);
        }
        self.store.remove(id).await
    }

    /// Accounts from every backend, minus those missing required side-tables.
    pub async fn get_accounts(&self) -> Result<Vec<Account>, WalletError> {
        let mut accounts = Vec::new();
        for (id, backend) in self.snapshot() {
            match backend.get_accounts().await {
                Ok(list) => accounts.extend(
                    list.into_iter()
                        .filter(|a| backend.account_is_usable(&a.address)),
                ),
                Err(e) => tracing::warn!("Listing accounts of keyring {} failed: {}", id, e),
            }
        }
        Ok(accounts)
    }

    /// Backend that owns `address`.
    pub async fn resolve(&self, address: Address) -> Result<Arc<KeyringBackend>, WalletError> {
        for (_, backend) in self.snapshot() {
            if !backend.account_is_usable(&address) {
                continue;
            }
            let accounts = backend.get_accounts().await?;
            if accounts.iter().any(|a| a.address == address) {
                return Ok(backend);
            }
        }
        Err(WalletError::AccountNotFound(address))
    }

    pub async fn sign_transaction(
        &self,
        address: Address,
        tx: TransactionRequest,
    ) -> Result<SignedTransaction, WalletError> {
        self.resolve(address).await?.sign_transaction(address, tx).await
    }

    pub async fn sign_message(&self, address: Address, data: &[u8]) -> Result<Signature, WalletError> {
        self.resolve(address).await?.sign_message(address, data).await
    }

    pub async fn sign_typed_data(
        &self,
        address: Address,
        typed_data: &TypedData,
    ) -> Result<Signature, WalletError> {
        self.resolve(address)
            .await?
            .sign_typed_data(address, typed_data)
            .await
    }

    async fn multisig_backend(&self, safe: Address) -> Result<Arc<KeyringBackend>, WalletError> {
        let backend = self.resolve(safe).await?;
        if backend.as_multisig().is_none() {
            return Err(WalletError::InvalidParams(format!("{safe} is not a multisig account")));
        }
        Ok(backend)
    }

    pub async fn confirm_multisig(
        &self,
        safe: Address,
        explicit: Option<MultisigTransaction>,
    ) -> Result<MultisigTransaction, WalletError> {
        let backend = self.multisig_backend(safe).await?;
        match backend.as_multisig() {
            Some(coordinator) => coordinator.confirm_transaction(explicit).await,
            None => Err(WalletError::NoAvailableTransaction),
        }
    }

    pub async fn exec_multisig(
        &self,
        safe: Address,
        explicit: Option<MultisigTransaction>,
    ) -> Result<B256, WalletError> {
        let backend = self.multisig_backend(safe).await?;
        match backend.as_multisig() {
            Some(coordinator) => coordinator.exec_transaction(explicit).await,
            None => Err(WalletError::NoAvailableTransaction),
        }
    }

    /// Caller-visible retry of a hardware keyring's transport.
    pub async fn retry_hardware(&self, id: &str) -> Result<(), WalletError> {
        let backend = self
            .get(id)
            .ok_or_else(|| WalletError::Keyring(format!("Keyring {id} not found")))?;
        let hardware = backend
            .as_hardware()
            .ok_or_else(|| WalletError::InvalidParams(format!("Keyring {id} is not a hardware keyring")))?;
        hardware.retry_init().await.inspect_err(|e| {
            sentry::capture_message(&e.to_string(), sentry::Level::Warning);
        })
    }

    /// Unlock every local backend with `password`. All or nothing: if any
    /// backend refuses, the ones already unlocked are locked again.
    pub fn unlock(&self, password: &str) -> Result<(), WalletError> {
        for (id, backend) in self.snapshot() {
            if let Some(local) = backend.as_local()
                && let Err(e) = local.unlock(password)
            {
                tracing::warn!("Unlocking keyring {} failed: {}", id, e);
                self.lock();
                return Err(e);
            }
        }
        self.unlocked.store(true, Ordering::SeqCst);
        tracing::info!("Wallet unlocked");
        Ok(())
    }

    pub fn lock(&self) {
        for (_, backend) in self.snapshot() {
            if let Some(local) = backend.as_local() {
                local.lock();
            }
        }
        self.unlocked.store(false, Ordering::SeqCst);
        tracing::info!("Wallet locked");
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::SeqCst)
    }
}
