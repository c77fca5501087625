//! Safe-style N-of-M coordinator
//!
//! `sign_transaction` does not produce a broadcastable transaction. It builds
//! a Safe envelope, signs its EIP-712 hash with the configured owner key,
//! proposes it to the federation service and stages it locally. Further owners
//! confirm through [`MultisigCoordinatorSigner::confirm_transaction`] and the
//! transaction lands on chain through
//! [`MultisigCoordinatorSigner::exec_transaction`] once the threshold is met.

use alloy::dyn_abi::TypedData;
use alloy::primitives::{Address, B256, Bytes, Signature, TxKind, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::federation::FederationService;
use super::{KeyringBackend, SignedTransaction, SignerBackend};
use crate::error::WalletError;
use crate::models::{Account, KeyringType, MultisigTransaction, SafeTxData};
use crate::services::events::{EventBus, WalletEvent};

sol! {
    struct SafeTx {
        address to;
        uint256 value;
        bytes data;
        uint8 operation;
        uint256 safeTxGas;
        uint256 baseGas;
        uint256 gasPrice;
        address gasToken;
        address refundReceiver;
        uint256 nonce;
    }
}

/// EIP-712 hash of a Safe envelope for `safe` on `chain_id`.
pub fn safe_tx_hash(tx: &SafeTxData, safe: Address, chain_id: u64) -> B256 {
    let domain = Eip712Domain::new(None, None, Some(U256::from(chain_id)), Some(safe), None);
    SafeTx {
        to: tx.to,
        value: tx.value,
        data: tx.data.clone(),
        operation: tx.operation,
        safeTxGas: tx.safe_tx_gas,
        baseGas: tx.base_gas,
        gasPrice: tx.gas_price,
        gasToken: tx.gas_token,
        refundReceiver: tx.refund_receiver,
        nonce: tx.nonce,
    }
    .eip712_signing_hash(&domain)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeAccount {
    pub address: Address,
    #[serde(default)]
    pub network_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigOptions {
    /// Owner account whose backend signs on this coordinator's behalf
    pub owner: Address,
    pub accounts: Vec<SafeAccount>,
}

impl MultisigOptions {
    pub fn parse(options: &Value) -> Result<Self, WalletError> {
        serde_json::from_value(options.clone())
            .map_err(|e| WalletError::Keyring(format!("Invalid multisig keyring options: {e}")))
    }
}

type CompletionCallback = Box<dyn FnOnce(B256) + Send>;

pub struct MultisigCoordinatorSigner {
    safes: Vec<Address>,
    network_ids: HashMap<Address, Vec<u64>>,
    owner: Address,
    owner_backend: Arc<KeyringBackend>,
    federation: Arc<dyn FederationService>,
    bus: Arc<EventBus>,
    cache: Mutex<HashMap<B256, MultisigTransaction>>,
    staged: Mutex<Option<B256>>,
    callbacks: Mutex<Vec<CompletionCallback>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MultisigCoordinatorSigner {
    pub fn new(
        options: MultisigOptions,
        owner_backend: Arc<KeyringBackend>,
        federation: Arc<dyn FederationService>,
        bus: Arc<EventBus>,
    ) -> Self {
        let safes = options.accounts.iter().map(|a| a.address).collect();
        let network_ids = options
            .accounts
            .into_iter()
            .filter(|a| !a.network_ids.is_empty())
            .map(|a| (a.address, a.network_ids))
            .collect();
        Self {
            safes,
            network_ids,
            owner: options.owner,
            owner_backend,
            federation,
            bus,
            cache: Mutex::new(HashMap::new()),
            staged: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn has_network_mapping(&self, address: &Address) -> bool {
        self.network_ids.get(address).is_some_and(|ids| !ids.is_empty())
    }

    pub fn staged_transaction(&self) -> Option<MultisigTransaction> {
        let staged = (*guard(&self.staged))?;
        guard(&self.cache).get(&staged).cloned()
    }

    /// Register a callback fired with the on-chain hash after execution.
    pub fn on_completion<F>(&self, callback: F)
    where
        F: FnOnce(B256) + Send + 'static,
    {
        guard(&self.callbacks).push(Box::new(callback));
    }

    fn resolve_chain(&self, safe: Address, requested: Option<u64>) -> Result<u64, WalletError> {
        let ids = self
            .network_ids
            .get(&safe)
            .ok_or(WalletError::AccountNotFound(safe))?;
        match requested {
            Some(id) if ids.contains(&id) => Ok(id),
            Some(id) => Err(WalletError::InvalidParams(format!(
                "safe {safe} is not deployed on chain {id}"
            ))),
            None => ids.first().copied().ok_or(WalletError::AccountNotFound(safe)),
        }
    }

    async fn owner_signature(&self, hash: B256) -> Result<Bytes, WalletError> {
        let signature = self.owner_backend.sign_hash(self.owner, hash).await?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }

    /// Merge one owner signature into the cached copy of `tx`.
    ///
    /// Returns the updated snapshot and whether the signature was new.
    fn merge_signature(
        &self,
        tx: &MultisigTransaction,
        owner: Address,
        signature: Bytes,
    ) -> Result<(MultisigTransaction, bool), WalletError> {
        let mut cache = guard(&self.cache);
        let entry = cache.entry(tx.hash).or_insert_with(|| tx.clone());
        for (known, sig) in &tx.signatures {
            entry.signatures.entry(*known).or_insert_with(|| sig.clone());
        }
        let added = match entry.record_signature(owner, signature) {
            Ok(()) => true,
            Err(WalletError::MultisigDuplicateSigner(dup)) => {
                tracing::debug!("Owner {} already confirmed {}, ignoring", dup, tx.hash);
                false
            }
            Err(e) => return Err(e),
        };
        Ok((entry.clone(), added))
    }

    fn target(&self, explicit: Option<MultisigTransaction>) -> Result<MultisigTransaction, WalletError> {
        if let Some(tx) = explicit {
            return Ok(tx);
        }
        self.staged_transaction()
            .ok_or(WalletError::NoAvailableTransaction)
    }

    /// Record a confirmation that arrived from another owner's session.
    pub fn add_confirmation(
        &self,
        tx: &MultisigTransaction,
        owner: Address,
        signature: Bytes,
    ) -> Result<MultisigTransaction, WalletError> {
        let (snapshot, added) = self.merge_signature(tx, owner, signature)?;
        if added {
            self.bus.emit(WalletEvent::TransactionConfirmed {
                hash: snapshot.hash,
                signer: owner,
            });
        }
        Ok(snapshot)
    }

    /// Add this coordinator's owner signature to the staged or explicit transaction.
    pub async fn confirm_transaction(
        &self,
        explicit: Option<MultisigTransaction>,
    ) -> Result<MultisigTransaction, WalletError> {
        let target = self.target(explicit)?;
        if target.signatures.contains_key(&self.owner) {
            tracing::debug!("Owner {} already confirmed {}", self.owner, target.hash);
            let mut cache = guard(&self.cache);
            let entry = cache.entry(target.hash).or_insert(target);
            return Ok(entry.clone());
        }

        let signature = self.owner_signature(target.hash).await?;
        let (snapshot, added) = self.merge_signature(&target, self.owner, signature.clone())?;
        if added {
            self.federation
                .confirm_transaction(&snapshot, &signature)
                .await?;
            self.bus.emit(WalletEvent::TransactionConfirmed {
                hash: snapshot.hash,
                signer: self.owner,
            });
            tracing::info!(
                "Confirmed {} ({}/{})",
                snapshot.hash,
                snapshot.signatures.len(),
                snapshot.threshold
            );
        }
        Ok(snapshot)
    }

    /// Execute once enough owners have signed. Returns the on-chain hash.
    pub async fn exec_transaction(
        &self,
        explicit: Option<MultisigTransaction>,
    ) -> Result<B256, WalletError> {
        let mut target = self.confirm_transaction(explicit).await?;

        match self.federation.list_confirmations(&target).await {
            Ok(remote) => {
                for confirmation in remote {
                    match self.merge_signature(&target, confirmation.owner, confirmation.signature) {
                        Ok((snapshot, _)) => target = snapshot,
                        Err(e) => tracing::warn!("Skipping remote confirmation: {}", e),
                    }
                }
            }
            Err(e) => tracing::warn!("Could not refresh confirmations for {}: {}", target.hash, e),
        }

        if !target.is_executable() {
            return Err(WalletError::ThresholdNotMet {
                collected: target.signatures.len(),
                threshold: target.threshold,
            });
        }

        let tx_hash = self.federation.execute_transaction(&target).await?;
        tracing::info!("Executed safe transaction {} as {}", target.hash, tx_hash);

        guard(&self.cache).remove(&target.hash);
        {
            let mut staged = guard(&self.staged);
            if *staged == Some(target.hash) {
                *staged = None;
            }
        }

        let callbacks: Vec<CompletionCallback> = guard(&self.callbacks).drain(..).collect();
        for callback in callbacks {
            callback(tx_hash);
        }
        Ok(tx_hash)
    }
}

#[async_trait]
impl SignerBackend for MultisigCoordinatorSigner {
    fn keyring_type(&self) -> KeyringType {
        KeyringType::MultisigCoordinator
    }

    async fn get_accounts(&self) -> Result<Vec<Account>, WalletError> {
        Ok(self
            .safes
            .iter()
            .map(|address| Account {
                address: *address,
                brand_name: "Safe".to_string(),
                keyring_type: KeyringType::MultisigCoordinator,
            })
            .collect())
    }

    async fn sign_transaction(
        &self,
        address: Address,
        tx: TransactionRequest,
    ) -> Result<SignedTransaction, WalletError> {
        let chain_id = self.resolve_chain(address, tx.chain_id)?;
        let info = self.federation.get_safe_info(address, chain_id).await?;

        let to = match tx.to {
            Some(TxKind::Call(to)) => to,
            _ => {
                return Err(WalletError::InvalidParams(
                    "multisig transactions need a recipient".to_string(),
                ));
            }
        };
        let envelope = SafeTxData {
            to,
            value: tx.value.unwrap_or_default(),
            data: tx.input.input().cloned().unwrap_or_default(),
            operation: 0,
            safe_tx_gas: U256::ZERO,
            base_gas: U256::ZERO,
            gas_price: U256::ZERO,
            gas_token: Address::ZERO,
            refund_receiver: Address::ZERO,
            nonce: U256::from(info.nonce),
        };
        let hash = safe_tx_hash(&envelope, address, chain_id);

        let mut proposal = MultisigTransaction::new(
            address,
            chain_id,
            info.owners,
            info.threshold,
            hash,
            envelope,
        )?;
        let signature = self.owner_signature(hash).await?;
        proposal.record_signature(self.owner, signature.clone())?;

        self.federation
            .post_transaction(&proposal, self.owner, &signature)
            .await?;

        guard(&self.cache).insert(hash, proposal);
        *guard(&self.staged) = Some(hash);
        self.bus.emit(WalletEvent::TransactionBuilt { hash });

        Ok(SignedTransaction { hash, raw: None })
    }

    async fn sign_message(&self, _address: Address, _data: &[u8]) -> Result<Signature, WalletError> {
        Err(WalletError::MultisigUnsupported("message signing"))
    }

    async fn sign_typed_data(
        &self,
        _address: Address,
        _typed_data: &TypedData,
    ) -> Result<Signature, WalletError> {
        Err(WalletError::MultisigUnsupported("typed data signing"))
    }
}
