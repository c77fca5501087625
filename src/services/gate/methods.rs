//! Dapp-facing RPC methods
//!
//! Method names are camel-cased (`eth_chainId` -> `ethChainId`) and matched
//! against a closed enum. Anything not listed is `MethodNotFound`.

use alloy::primitives::{Address, Bytes};
use alloy::rpc::types::TransactionRequest;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

use super::PermissionStore;
use crate::error::WalletError;
use crate::models::{IncomingRequest, SubmitOptions};
use crate::services::keyring::KeyringRegistry;
use crate::services::transaction::TransactionPipeline;

/// Methods that always pass through the `Sign` checkpoint.
pub const NEED_CONFIRM: [&str; 2] = ["personal_sign", "eth_sendTransaction"];

pub fn needs_confirm(method: &str) -> bool {
    NEED_CONFIRM.contains(&method)
}

/// `eth_chainId` -> `ethChainId`
pub fn camel_case(method: &str) -> String {
    let mut parts = method.split('_');
    let mut out = parts.next().unwrap_or_default().to_string();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    EthChainId,
    NetVersion,
    EthAccounts,
    EthRequestAccounts,
    PersonalSign,
    EthSendTransaction,
    WalletGetPendingTransaction,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 7] = [
        RpcMethod::EthChainId,
        RpcMethod::NetVersion,
        RpcMethod::EthAccounts,
        RpcMethod::EthRequestAccounts,
        RpcMethod::PersonalSign,
        RpcMethod::EthSendTransaction,
        RpcMethod::WalletGetPendingTransaction,
    ];

    pub fn handler_name(&self) -> &'static str {
        match self {
            RpcMethod::EthChainId => "ethChainId",
            RpcMethod::NetVersion => "netVersion",
            RpcMethod::EthAccounts => "ethAccounts",
            RpcMethod::EthRequestAccounts => "ethRequestAccounts",
            RpcMethod::PersonalSign => "personalSign",
            RpcMethod::EthSendTransaction => "ethSendTransaction",
            RpcMethod::WalletGetPendingTransaction => "walletGetPendingTransaction",
        }
    }

    pub fn resolve(method: &str) -> Option<Self> {
        let key = camel_case(method);
        Self::ALL.into_iter().find(|m| m.handler_name() == key)
    }
}

fn param<'a>(request: &'a IncomingRequest, index: usize) -> Result<&'a Value, WalletError> {
    request
        .params
        .get(index)
        .ok_or_else(|| WalletError::InvalidParams(format!("missing param {index} for {}", request.method)))
}

fn parse_address(value: &Value) -> Result<Address, WalletError> {
    value
        .as_str()
        .ok_or_else(|| WalletError::InvalidParams("address must be a string".to_string()))?
        .parse()
        .map_err(|e| WalletError::InvalidParams(format!("invalid address: {e}")))
}

/// `personal_sign` data is hex when it parses as hex, otherwise UTF-8 text.
fn message_bytes(value: &Value) -> Result<Vec<u8>, WalletError> {
    let text = value
        .as_str()
        .ok_or_else(|| WalletError::InvalidParams("message must be a string".to_string()))?;
    if let Some(hex) = text.strip_prefix("0x")
        && let Ok(bytes) = hex.parse::<Bytes>()
    {
        return Ok(bytes.to_vec());
    }
    Ok(text.as_bytes().to_vec())
}

/// Privileged handlers reached from the `Dispatch` state.
pub struct MethodHandlers {
    chain_id: u64,
    registry: Arc<KeyringRegistry>,
    pipeline: Arc<TransactionPipeline>,
    permissions: Arc<dyn PermissionStore>,
}

impl MethodHandlers {
    pub fn new(
        chain_id: u64,
        registry: Arc<KeyringRegistry>,
        pipeline: Arc<TransactionPipeline>,
        permissions: Arc<dyn PermissionStore>,
    ) -> Self {
        Self {
            chain_id,
            registry,
            pipeline,
            permissions,
        }
    }

    pub async fn dispatch(&self, method: RpcMethod, request: &IncomingRequest) -> Result<Value, WalletError> {
        tracing::debug!("Dispatching {} for {}", method.handler_name(), request.session.origin);
        match method {
            RpcMethod::EthChainId => Ok(json!(format!("0x{:x}", self.chain_id))),
            RpcMethod::NetVersion => Ok(json!(self.chain_id.to_string())),
            RpcMethod::EthAccounts | RpcMethod::EthRequestAccounts => self.accounts(request).await,
            RpcMethod::PersonalSign => self.personal_sign(request).await,
            RpcMethod::EthSendTransaction => self.send_transaction(request).await,
            RpcMethod::WalletGetPendingTransaction => self.pending_transaction(request),
        }
    }

    async fn accounts(&self, request: &IncomingRequest) -> Result<Value, WalletError> {
        if !self.permissions.has_grant(&request.session.origin) {
            return Ok(json!([]));
        }
        let accounts = self.registry.get_accounts().await?;
        Ok(json!(
            accounts
                .iter()
                .map(|a| a.address.to_string())
                .collect::<Vec<_>>()
        ))
    }

    async fn personal_sign(&self, request: &IncomingRequest) -> Result<Value, WalletError> {
        let data = message_bytes(param(request, 0)?)?;
        let address = parse_address(param(request, 1)?)?;
        let signature = self.registry.sign_message(address, &data).await?;
        Ok(json!(format!("0x{}", hex::encode(signature.as_bytes()))))
    }

    async fn send_transaction(&self, request: &IncomingRequest) -> Result<Value, WalletError> {
        let tx: TransactionRequest = serde_json::from_value(param(request, 0)?.clone())
            .map_err(|e| WalletError::InvalidParams(format!("invalid transaction: {e}")))?;
        if tx.from.is_none() {
            return Err(WalletError::InvalidParams("transaction has no sender".to_string()));
        }
        let chain_id = tx.chain_id.unwrap_or(self.chain_id);
        let result = self
            .pipeline
            .submit(tx, chain_id, SubmitOptions::default())
            .await?;
        Ok(json!(result.tx_hash.to_string()))
    }

    fn pending_transaction(&self, request: &IncomingRequest) -> Result<Value, WalletError> {
        let id: Uuid = param(request, 0)?
            .as_str()
            .ok_or_else(|| WalletError::InvalidParams("id must be a string".to_string()))?
            .parse()
            .map_err(|e| WalletError::InvalidParams(format!("invalid id: {e}")))?;
        match self.pipeline.pending(id) {
            Some(record) => serde_json::to_value(record)
                .map_err(|e| WalletError::DefaultFailed(format!("failed to serialize record: {e}"))),
            None => Ok(Value::Null),
        }
    }
}
