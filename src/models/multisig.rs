use alloy::primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::error::WalletError;

/// Safe transaction envelope fields, in EIP-712 order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeTxData {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: u8,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub nonce: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeInfo {
    pub address: Address,
    pub nonce: u64,
    pub threshold: usize,
    pub owners: Vec<Address>,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeConfirmation {
    pub owner: Address,
    pub signature: Bytes,
}

/// A Safe transaction collecting owner signatures.
///
/// `signatures` is keyed by owner so a repeated confirmation replaces the
/// earlier entry; iteration order is ascending by address, which is the order
/// the Safe contract expects packed signatures in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigTransaction {
    pub safe_address: Address,
    pub chain_id: u64,
    pub owners: Vec<Address>,
    pub threshold: usize,
    pub signatures: BTreeMap<Address, Bytes>,
    pub hash: B256,
    pub tx: SafeTxData,
}

impl MultisigTransaction {
    pub fn new(
        safe_address: Address,
        chain_id: u64,
        owners: Vec<Address>,
        threshold: usize,
        hash: B256,
        tx: SafeTxData,
    ) -> Result<Self, WalletError> {
        if threshold == 0 || threshold > owners.len() {
            return Err(WalletError::InvalidParams(format!(
                "threshold {threshold} is invalid for {} owners",
                owners.len()
            )));
        }
        Ok(Self {
            safe_address,
            chain_id,
            owners,
            threshold,
            signatures: BTreeMap::new(),
            hash,
            tx,
        })
    }

    pub fn is_owner(&self, address: &Address) -> bool {
        self.owners.contains(address)
    }

    /// Record an owner's signature.
    ///
    /// A second signature from the same owner replaces the first and reports
    /// `MultisigDuplicateSigner`, which callers treat as a no-op.
    pub fn record_signature(&mut self, owner: Address, signature: Bytes) -> Result<(), WalletError> {
        if !self.is_owner(&owner) {
            return Err(WalletError::InvalidParams(format!(
                "{owner} is not an owner of safe {}",
                self.safe_address
            )));
        }
        match self.signatures.entry(owner) {
            Entry::Occupied(_) => Err(WalletError::MultisigDuplicateSigner(owner)),
            Entry::Vacant(slot) => {
                slot.insert(signature);
                Ok(())
            }
        }
    }

    pub fn is_executable(&self) -> bool {
        self.signatures.len() >= self.threshold
    }

    /// Signatures concatenated in ascending owner order.
    pub fn packed_signatures(&self) -> Bytes {
        let mut packed = Vec::with_capacity(self.signatures.len() * 65);
        for signature in self.signatures.values() {
            packed.extend_from_slice(signature);
        }
        Bytes::from(packed)
    }
}
