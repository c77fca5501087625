//! Signer backends and the registry that owns them
//!
//! - SignerBackend: the uniform signing capability set
//! - KeyringBackend: tagged union over the three backend families
//! - LocalSeedSigner: vault-encrypted keys held in memory only while unlocked
//! - HardwareTransportSigner: signing delegated to a device behind a transport
//! - MultisigCoordinatorSigner: Safe-style N-of-M proposal/confirm/execute
//! - KeyringRegistry: descriptor persistence, account resolution, dispatch

pub mod bridge;
pub mod federation;
pub mod hardware;
pub mod local;
pub mod multisig;
pub mod registry;
pub mod store;
pub mod vault;

pub use bridge::{BridgeTransport, BridgeTransportFactory};
pub use federation::{FederationService, SafeServiceClient};
pub use hardware::{HardwareSession, HardwareTransport, HardwareTransportSigner, TransportFactory};
pub use local::LocalSeedSigner;
pub use multisig::MultisigCoordinatorSigner;
pub use registry::KeyringRegistry;
pub use store::{DescriptorStore, MemoryDescriptorStore, RedisDescriptorStore};
pub use vault::{EncryptedVault, VaultSecret};

use alloy::dyn_abi::TypedData;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder, TxSigner};
use alloy::primitives::{Address, B256, Bytes, Signature};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

use crate::error::WalletError;
use crate::models::{Account, KeyringType};

/// Output of `sign_transaction`.
///
/// Single-key backends return the signed, 2718-encoded transaction ready to
/// broadcast. The multisig coordinator returns only the Safe transaction hash;
/// the on-chain transaction appears once the threshold is met.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: B256,
    pub raw: Option<Bytes>,
}

#[async_trait]
pub trait SignerBackend: Send + Sync {
    fn keyring_type(&self) -> KeyringType;

    async fn get_accounts(&self) -> Result<Vec<Account>, WalletError>;

    async fn sign_transaction(
        &self,
        address: Address,
        tx: TransactionRequest,
    ) -> Result<SignedTransaction, WalletError>;

    async fn sign_message(&self, address: Address, data: &[u8]) -> Result<Signature, WalletError>;

    async fn sign_typed_data(
        &self,
        address: Address,
        typed_data: &TypedData,
    ) -> Result<Signature, WalletError>;
}

pub enum KeyringBackend {
    Local(LocalSeedSigner),
    HardwareTransport(HardwareTransportSigner),
    MultisigCoordinator(MultisigCoordinatorSigner),
}

impl KeyringBackend {
    fn inner(&self) -> &dyn SignerBackend {
        match self {
            KeyringBackend::Local(b) => b,
            KeyringBackend::HardwareTransport(b) => b,
            KeyringBackend::MultisigCoordinator(b) => b,
        }
    }

    /// Sign a raw 32-byte digest. Used for multisig owner confirmations.
    pub async fn sign_hash(&self, address: Address, hash: B256) -> Result<Signature, WalletError> {
        match self {
            KeyringBackend::Local(b) => b.sign_hash(address, hash),
            KeyringBackend::HardwareTransport(b) => b.sign_hash(address, hash).await,
            KeyringBackend::MultisigCoordinator(_) => {
                Err(WalletError::MultisigUnsupported("raw digest signing"))
            }
        }
    }

    /// Whether an account has every side-table it needs to be offered to pages.
    pub fn account_is_usable(&self, address: &Address) -> bool {
        match self {
            KeyringBackend::MultisigCoordinator(b) => b.has_network_mapping(address),
            _ => true,
        }
    }

    pub fn as_multisig(&self) -> Option<&MultisigCoordinatorSigner> {
        match self {
            KeyringBackend::MultisigCoordinator(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_hardware(&self) -> Option<&HardwareTransportSigner> {
        match self {
            KeyringBackend::HardwareTransport(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_local(&self) -> Option<&LocalSeedSigner> {
        match self {
            KeyringBackend::Local(b) => Some(b),
            _ => None,
        }
    }
}

#[async_trait]
impl SignerBackend for KeyringBackend {
    fn keyring_type(&self) -> KeyringType {
        self.inner().keyring_type()
    }

    async fn get_accounts(&self) -> Result<Vec<Account>, WalletError> {
        self.inner().get_accounts().await
    }

    async fn sign_transaction(
        &self,
        address: Address,
        tx: TransactionRequest,
    ) -> Result<SignedTransaction, WalletError> {
        self.inner().sign_transaction(address, tx).await
    }

    async fn sign_message(&self, address: Address, data: &[u8]) -> Result<Signature, WalletError> {
        self.inner().sign_message(address, data).await
    }

    async fn sign_typed_data(
        &self,
        address: Address,
        typed_data: &TypedData,
    ) -> Result<Signature, WalletError> {
        self.inner().sign_typed_data(address, typed_data).await
    }
}

/// Sign a fully populated request with any alloy transaction signer.
pub(crate) async fn sign_request<S>(
    signer: S,
    address: Address,
    mut tx: TransactionRequest,
) -> Result<SignedTransaction, WalletError>
where
    S: TxSigner<Signature> + Send + Sync + 'static,
{
    tx.from = Some(address);
    let wallet = EthereumWallet::from(signer);
    let envelope = tx
        .build(&wallet)
        .await
        .map_err(|e| WalletError::Keyring(format!("Failed to sign transaction: {e}")))?;

    Ok(SignedTransaction {
        hash: *envelope.tx_hash(),
        raw: Some(Bytes::from(envelope.encoded_2718())),
    })
}

/// EIP-712 digest of a typed-data payload.
pub(crate) fn typed_data_hash(typed_data: &TypedData) -> Result<B256, WalletError> {
    typed_data
        .eip712_signing_hash()
        .map_err(|e| WalletError::InvalidParams(format!("Invalid typed data: {e}")))
}
