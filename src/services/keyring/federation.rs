//! Client for the Safe transaction service
//!
//! The service is the source of truth for collected owner signatures. The
//! coordinator's own cache is refreshed from `list_confirmations` before
//! execution.

use alloy::primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::WalletError;
use crate::models::{MultisigTransaction, SafeConfirmation, SafeInfo};

#[async_trait]
pub trait FederationService: Send + Sync {
    async fn get_safe_info(&self, safe: Address, network_id: u64) -> Result<SafeInfo, WalletError>;

    /// Propose `tx` with the proposer's signature attached.
    async fn post_transaction(
        &self,
        tx: &MultisigTransaction,
        sender: Address,
        signature: &Bytes,
    ) -> Result<(), WalletError>;

    async fn confirm_transaction(
        &self,
        tx: &MultisigTransaction,
        signature: &Bytes,
    ) -> Result<(), WalletError>;

    async fn list_confirmations(
        &self,
        tx: &MultisigTransaction,
    ) -> Result<Vec<SafeConfirmation>, WalletError>;

    /// Relay `execTransaction` on chain. Returns the on-chain transaction hash.
    async fn execute_transaction(&self, tx: &MultisigTransaction) -> Result<B256, WalletError>;

    async fn get_threshold(&self, safe: Address, network_id: u64) -> Result<usize, WalletError> {
        Ok(self.get_safe_info(safe, network_id).await?.threshold)
    }
}

#[derive(Debug, Deserialize)]
struct ConfirmationPage {
    results: Vec<SafeConfirmation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteResponse {
    tx_hash: B256,
}

pub struct SafeServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl SafeServiceClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str, network_id: u64) -> String {
        format!("{}/api/v1/{}?chainId={}", self.base_url, path, network_id)
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response, WalletError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let error_msg = format!("Safe service {what} failed with {status}: {body}");
        tracing::error!("{}", error_msg);
        sentry::capture_message(&error_msg, sentry::Level::Error);
        Err(WalletError::Federation(error_msg))
    }

    fn transport_error(what: &str, e: reqwest::Error) -> WalletError {
        let error_msg = format!("Safe service {what} request failed: {e}");
        tracing::error!("{}", error_msg);
        WalletError::Federation(error_msg)
    }
}

#[async_trait]
impl FederationService for SafeServiceClient {
    async fn get_safe_info(&self, safe: Address, network_id: u64) -> Result<SafeInfo, WalletError> {
        let response = self
            .client
            .get(self.url(&format!("safes/{safe}/"), network_id))
            .send()
            .await
            .map_err(|e| Self::transport_error("safe info", e))?;
        Self::check(response, "safe info")
            .await?
            .json()
            .await
            .map_err(|e| WalletError::Federation(format!("Invalid safe info: {e}")))
    }

    async fn post_transaction(
        &self,
        tx: &MultisigTransaction,
        sender: Address,
        signature: &Bytes,
    ) -> Result<(), WalletError> {
        let body = json!({
            "to": tx.tx.to,
            "value": tx.tx.value.to_string(),
            "data": tx.tx.data,
            "operation": tx.tx.operation,
            "safeTxGas": tx.tx.safe_tx_gas.to_string(),
            "baseGas": tx.tx.base_gas.to_string(),
            "gasPrice": tx.tx.gas_price.to_string(),
            "gasToken": tx.tx.gas_token,
            "refundReceiver": tx.tx.refund_receiver,
            "nonce": tx.tx.nonce.to_string(),
            "contractTransactionHash": tx.hash,
            "sender": sender,
            "signature": signature,
        });
        let response = self
            .client
            .post(self.url(
                &format!("safes/{}/multisig-transactions/", tx.safe_address),
                tx.chain_id,
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("propose", e))?;
        Self::check(response, "propose").await?;
        tracing::info!("Proposed safe transaction {} on {}", tx.hash, tx.safe_address);
        Ok(())
    }

    async fn confirm_transaction(
        &self,
        tx: &MultisigTransaction,
        signature: &Bytes,
    ) -> Result<(), WalletError> {
        let response = self
            .client
            .post(self.url(
                &format!("multisig-transactions/{}/confirmations/", tx.hash),
                tx.chain_id,
            ))
            .json(&json!({ "signature": signature }))
            .send()
            .await
            .map_err(|e| Self::transport_error("confirm", e))?;
        Self::check(response, "confirm").await?;
        Ok(())
    }

    async fn list_confirmations(
        &self,
        tx: &MultisigTransaction,
    ) -> Result<Vec<SafeConfirmation>, WalletError> {
        let response = self
            .client
            .get(self.url(
                &format!("multisig-transactions/{}/confirmations/", tx.hash),
                tx.chain_id,
            ))
            .send()
            .await
            .map_err(|e| Self::transport_error("confirmations", e))?;
        let page: ConfirmationPage = Self::check(response, "confirmations")
            .await?
            .json()
            .await
            .map_err(|e| WalletError::Federation(format!("Invalid confirmations: {e}")))?;
        Ok(page.results)
    }

    async fn execute_transaction(&self, tx: &MultisigTransaction) -> Result<B256, WalletError> {
        let response = self
            .client
            .post(self.url(
                &format!("multisig-transactions/{}/execute/", tx.hash),
                tx.chain_id,
            ))
            .json(&json!({ "signatures": tx.packed_signatures() }))
            .send()
            .await
            .map_err(|e| Self::transport_error("execute", e))?;
        let executed: ExecuteResponse = Self::check(response, "execute")
            .await?
            .json()
            .await
            .map_err(|e| WalletError::Federation(format!("Invalid execute response: {e}")))?;
        Ok(executed.tx_hash)
    }
}
