use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::TransactionRequest;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Building,
    Built,
    Signed,
    Submitted,
    Completed,
    Failed,
}

/// One level of the gas market, prices in wei.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasLevel {
    pub level: String,
    pub price: U256,
    pub priority_price: Option<U256>,
    pub base_fee: Option<U256>,
}

impl GasLevel {
    pub fn custom(price: U256) -> Self {
        Self {
            level: "custom".to_string(),
            price,
            priority_price: None,
            base_fee: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPlan {
    pub level: GasLevel,
    pub nonce: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
}

/// Predicted cost, all decimal strings computed without floating point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostExplain {
    pub gas_cost_wei: U256,
    pub gas_cost_native: String,
    pub gas_cost_usd: String,
    pub native_price_usd: String,
}

/// Human-meaningful reading of what a transaction does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TxAction {
    NativeSend {
        to: Address,
        value: U256,
    },
    TokenTransfer {
        token: Address,
        to: Address,
        amount: U256,
    },
    TokenApprove {
        token: Address,
        spender: Address,
        amount: U256,
    },
    ContractCall {
        contract: Address,
        selector: Option<String>,
        protocol: Option<String>,
    },
    Deploy,
    /// Action as described by the chain data service.
    Described {
        kind: String,
        detail: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: Uuid,
    pub chain_id: u64,
    pub raw_tx: TransactionRequest,
    pub gas_plan: Option<GasPlan>,
    pub explain: Option<CostExplain>,
    pub action: Option<TxAction>,
    pub status: TxStatus,
    pub tx_hash: Option<B256>,
    pub error: Option<String>,
    /// Set once nothing further will happen to the record. Settled records
    /// are evicted after the pipeline's record TTL.
    #[serde(skip)]
    pub settled_at: Option<Instant>,
}

impl PendingTransaction {
    pub fn new(id: Uuid, chain_id: u64, raw_tx: TransactionRequest) -> Self {
        Self {
            id,
            chain_id,
            raw_tx,
            gas_plan: None,
            explain: None,
            action: None,
            status: TxStatus::Building,
            tx_hash: None,
            error: None,
            settled_at: None,
        }
    }

    /// A record is in flight from build until it completes, fails or is
    /// given up on.
    pub fn is_in_flight(&self) -> bool {
        self.settled_at.is_none() && !matches!(self.status, TxStatus::Completed | TxStatus::Failed)
    }

    pub fn settle(&mut self) {
        if self.settled_at.is_none() {
            self.settled_at = Some(Instant::now());
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.settled_at.is_some_and(|at| at.elapsed() >= ttl)
    }
}

/// Caller-selectable knobs for one submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Pending record id; a fresh one is generated when absent.
    pub id: Option<Uuid>,
    pub gas_level: Option<GasLevel>,
    pub gas_limit: Option<u64>,
    pub ignore_gas_check: bool,
    pub wait_completed: bool,
    /// Transactions queued ahead of this one, passed to the simulator.
    pub pending_txs: Vec<TransactionRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasCost {
    pub gas_used: u64,
    pub native: String,
    pub usd: String,
    /// True once computed from the on-chain receipt rather than the estimate.
    pub realized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub id: Uuid,
    pub tx_hash: B256,
    pub gas_cost: GasCost,
}

/// Receipt fields the pipeline cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub tx_hash: B256,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub success: bool,
}

/// Simulation output from the chain data service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreExecResult {
    pub success: bool,
    pub gas_used: u64,
    pub error: Option<String>,
    pub balance_change: serde_json::Value,
}
