//! Chain collaborators used by the pipeline
//!
//! - ChainDataService: nonce hints, gas market, simulation, prices, action metadata
//! - ChainRpc: raw transaction broadcast and receipt lookup

use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;

use crate::error::WalletError;
use crate::models::{GasLevel, PipelineConfig, PreExecResult, ReceiptSummary, TxAction};

#[async_trait]
pub trait ChainDataService: Send + Sync {
    async fn recommend_nonce(&self, chain_id: u64, from: Address) -> Result<u64, WalletError>;

    async fn gas_market(&self, chain_id: u64) -> Result<Vec<GasLevel>, WalletError>;

    async fn pre_exec(
        &self,
        chain_id: u64,
        tx: &TransactionRequest,
        pending: &[TransactionRequest],
    ) -> Result<PreExecResult, WalletError>;

    /// USD price of one whole native token, as a decimal string.
    async fn native_price_usd(&self, chain_id: u64) -> Result<String, WalletError>;

    async fn parse_action(&self, chain_id: u64, tx: &TransactionRequest) -> Result<TxAction, WalletError>;

    /// Protocol name a contract belongs to, when known.
    async fn contract_protocol(
        &self,
        chain_id: u64,
        contract: Address,
    ) -> Result<Option<String>, WalletError>;
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn send_raw_transaction(&self, chain_id: u64, raw: &Bytes) -> Result<B256, WalletError>;

    async fn get_receipt(&self, chain_id: u64, hash: B256) -> Result<Option<ReceiptSummary>, WalletError>;
}

/// Wei amounts arrive either as decimal strings or as JSON integers.
fn parse_wei(value: &Value) -> Option<U256> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x") {
                Some(hex) => U256::from_str_radix(hex, 16).ok(),
                None => U256::from_str_radix(s, 10).ok(),
            }
        }
        Value::Number(n) => n.as_u64().map(U256::from),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct NonceResponse {
    nonce: u64,
}

#[derive(Debug, Deserialize)]
struct GasLevelWire {
    level: String,
    price: Value,
    #[serde(default)]
    priority_price: Option<Value>,
    #[serde(default)]
    base_fee: Option<Value>,
}

impl GasLevelWire {
    fn into_level(self) -> Result<GasLevel, WalletError> {
        let price = parse_wei(&self.price)
            .ok_or_else(|| WalletError::ChainData(format!("invalid gas price for level {}", self.level)))?;
        Ok(GasLevel {
            level: self.level,
            price,
            priority_price: self.priority_price.as_ref().and_then(parse_wei),
            base_fee: self.base_fee.as_ref().and_then(parse_wei),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PreExecGas {
    success: bool,
    gas_used: u64,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PreExecResponse {
    gas: PreExecGas,
    #[serde(default)]
    balance_change: Value,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: Value,
}

#[derive(Debug, Deserialize)]
struct ActionWire {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ParseTxResponse {
    action: ActionWire,
}

#[derive(Debug, Deserialize)]
struct ProtocolWire {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ContractResponse {
    #[serde(default)]
    protocol: Option<ProtocolWire>,
}

/// HTTP client for the chain data service
pub struct HttpChainData {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChainData {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, String)]) -> Result<T, WalletError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await
            .map_err(|e| WalletError::ChainData(format!("GET {path} failed: {e}")))?;
        Self::decode(path, response).await
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, path: &str, body: &Value) -> Result<T, WalletError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| WalletError::ChainData(format!("POST {path} failed: {e}")))?;
        Self::decode(path, response).await
    }

    async fn decode<T: for<'de> Deserialize<'de>>(path: &str, response: reqwest::Response) -> Result<T, WalletError> {
        let status = response.status();
        if !status.is_success() {
            return Err(WalletError::ChainData(format!("{path} returned {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| WalletError::ChainData(format!("invalid {path} response: {e}")))
    }
}

#[async_trait]
impl ChainDataService for HttpChainData {
    async fn recommend_nonce(&self, chain_id: u64, from: Address) -> Result<u64, WalletError> {
        let response: NonceResponse = self
            .get(
                "/v1/wallet/recommend_nonce",
                &[("chain_id", chain_id.to_string()), ("user_addr", from.to_string())],
            )
            .await?;
        Ok(response.nonce)
    }

    async fn gas_market(&self, chain_id: u64) -> Result<Vec<GasLevel>, WalletError> {
        let levels: Vec<GasLevelWire> = self
            .get("/v1/wallet/gas_market", &[("chain_id", chain_id.to_string())])
            .await?;
        levels.into_iter().map(GasLevelWire::into_level).collect()
    }

    async fn pre_exec(
        &self,
        chain_id: u64,
        tx: &TransactionRequest,
        pending: &[TransactionRequest],
    ) -> Result<PreExecResult, WalletError> {
        let response: PreExecResponse = self
            .post(
                "/v1/wallet/pre_exec_tx",
                &json!({ "chain_id": chain_id, "tx": tx, "pending_tx_list": pending }),
            )
            .await?;
        Ok(PreExecResult {
            success: response.gas.success,
            gas_used: response.gas.gas_used,
            error: response.gas.error,
            balance_change: response.balance_change,
        })
    }

    async fn native_price_usd(&self, chain_id: u64) -> Result<String, WalletError> {
        let response: PriceResponse = self
            .get(
                "/v1/token",
                &[("chain_id", chain_id.to_string()), ("id", "native".to_string())],
            )
            .await?;
        // keep the decimal text as sent so no precision is lost
        match response.price {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(WalletError::ChainData(format!("invalid price {other}"))),
        }
    }

    async fn parse_action(&self, chain_id: u64, tx: &TransactionRequest) -> Result<TxAction, WalletError> {
        let response: ParseTxResponse = self
            .post("/v1/wallet/parse_tx", &json!({ "chain_id": chain_id, "tx": tx }))
            .await?;
        Ok(TxAction::Described {
            kind: response.action.kind,
            detail: response.action.data,
        })
    }

    async fn contract_protocol(
        &self,
        chain_id: u64,
        contract: Address,
    ) -> Result<Option<String>, WalletError> {
        let response: ContractResponse = self
            .get(
                "/v1/contract",
                &[("chain_id", chain_id.to_string()), ("id", contract.to_string())],
            )
            .await?;
        Ok(response.protocol.map(|p| p.name))
    }
}

/// One alloy HTTP provider per configured chain
pub struct AlloyChainRpc {
    providers: HashMap<u64, DynProvider>,
}

impl AlloyChainRpc {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, String> {
        let mut providers = HashMap::new();
        for chain in config.chains.values() {
            let Some(url) = &chain.rpc_url else {
                continue;
            };
            let url = url
                .parse()
                .map_err(|e| format!("Invalid RPC URL for chain {}: {e}", chain.id))?;
            providers.insert(chain.id, ProviderBuilder::new().connect_http(url).erased());
            tracing::info!("RPC provider configured for chain {}", chain.id);
        }
        Ok(Self { providers })
    }

    fn provider(&self, chain_id: u64) -> Result<&DynProvider, WalletError> {
        self.providers
            .get(&chain_id)
            .ok_or_else(|| WalletError::InvalidParams(format!("no RPC configured for chain {chain_id}")))
    }
}

#[async_trait]
impl ChainRpc for AlloyChainRpc {
    async fn send_raw_transaction(&self, chain_id: u64, raw: &Bytes) -> Result<B256, WalletError> {
        let pending = self
            .provider(chain_id)?
            .send_raw_transaction(raw)
            .await
            .map_err(|e| WalletError::SubmitTxFailed(format!("broadcast failed: {e}")))?;
        Ok(*pending.tx_hash())
    }

    async fn get_receipt(&self, chain_id: u64, hash: B256) -> Result<Option<ReceiptSummary>, WalletError> {
        let receipt = self
            .provider(chain_id)?
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| WalletError::ChainData(format!("receipt lookup failed: {e}")))?;
        Ok(receipt.map(|r| ReceiptSummary {
            tx_hash: r.transaction_hash,
            gas_used: r.gas_used,
            effective_gas_price: r.effective_gas_price,
            success: r.status(),
        }))
    }
}
