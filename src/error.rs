//! Crate-wide error type
//!
//! Every failure that can reach a dapp is normalized into a [`WalletError`]. The
//! RPC layer renders it as `{code, message, data}` using [`WalletError::rpc_code`]
//! and [`WalletError::code`].

use alloy::primitives::Address;
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("method {method} not found")]
    MethodNotFound { method: String, request: Value },

    #[error("hardware device unavailable: {0}")]
    HardwareInitFailed(String),

    #[error("gas not enough: transaction needs {required} gas but limit is {limit}")]
    GasNotEnough { required: u64, limit: u64 },

    #[error("gas cost too high: ${usd} exceeds the ${threshold} limit")]
    GasTooHigh { usd: String, threshold: String },

    #[error("submit transaction failed: {0}")]
    SubmitTxFailed(String),

    #[error("{0}")]
    DefaultFailed(String),

    #[error("owner {0} already confirmed this transaction")]
    MultisigDuplicateSigner(Address),

    #[error("no transaction available to confirm or execute")]
    NoAvailableTransaction,

    #[error("multisig keyring does not support {0}")]
    MultisigUnsupported(&'static str),

    #[error("multisig threshold not met: {collected} of {threshold} signatures")]
    ThresholdNotMet { collected: usize, threshold: usize },

    #[error("user rejected the request: {0}")]
    UserRejected(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("no keyring owns account {0}")]
    AccountNotFound(Address),

    #[error("wallet is locked")]
    Locked,

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("federation service error: {0}")]
    Federation(String),

    #[error("chain data service error: {0}")]
    ChainData(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl WalletError {
    /// Normalized code the UI layer keys its messages on.
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            WalletError::HardwareInitFailed(_) => "HARDWARE_INIT_FAILED",
            WalletError::GasNotEnough { .. } => "GAS_NOT_ENOUGH",
            WalletError::GasTooHigh { .. } => "GAS_TOO_HIGH",
            WalletError::SubmitTxFailed(_) => "SUBMIT_TX_FAILED",
            WalletError::DefaultFailed(_) => "DEFAULT_FAILED",
            WalletError::MultisigDuplicateSigner(_) => "MULTISIG_DUPLICATE_SIGNER",
            WalletError::NoAvailableTransaction => "NO_AVAILABLE_TRANSACTION",
            WalletError::MultisigUnsupported(_) => "MULTISIG_UNSUPPORTED",
            WalletError::ThresholdNotMet { .. } => "THRESHOLD_NOT_MET",
            WalletError::UserRejected(_) => "USER_REJECTED",
            WalletError::InvalidParams(_) => "INVALID_PARAMS",
            WalletError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            WalletError::Locked => "LOCKED",
            WalletError::Keyring(_) => "KEYRING_ERROR",
            WalletError::Federation(_) => "FEDERATION_ERROR",
            WalletError::ChainData(_) => "CHAIN_DATA_ERROR",
            WalletError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// JSON-RPC / EIP-1193 numeric error code.
    pub fn rpc_code(&self) -> i64 {
        match self {
            WalletError::MethodNotFound { .. } => -32601,
            WalletError::InvalidParams(_) => -32602,
            WalletError::UserRejected(_) => 4001,
            WalletError::Locked => 4100,
            _ => -32603,
        }
    }

    /// Structured payload for the `data` member of an RPC error.
    pub fn rpc_data(&self) -> Value {
        match self {
            WalletError::MethodNotFound { method, request } => json!({
                "code": self.code(),
                "method": method,
                "request": request,
            }),
            WalletError::GasTooHigh { usd, threshold } => json!({
                "code": self.code(),
                "gasCostUsd": usd,
                "threshold": threshold,
            }),
            WalletError::GasNotEnough { required, limit } => json!({
                "code": self.code(),
                "required": required,
                "limit": limit,
            }),
            _ => json!({ "code": self.code() }),
        }
    }
}
