//! Build, check and submit a transaction through a resolved signer
//!
//! Every submission gets a [`PendingTransaction`] record keyed by id. The
//! record is created before any collaborator is called and survives failure,
//! so the decoded action can still be shown afterwards. A record leaves the
//! store once its receipt arrives. Records that fail, are never broadcast or
//! time out waiting for a receipt are settled instead, and evicted once they
//! are older than the configured record TTL.

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::TransactionRequest;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::action::decode_local;
use super::chain::{ChainDataService, ChainRpc};
use super::execution::{SenderLocks, is_nonce_error};
use super::gas::{self, explain_cost, recommend_gas_limit};
use super::watcher::ReceiptWatcher;
use crate::error::WalletError;
use crate::models::{
    CostExplain, GasCost, GasLevel, GasPlan, PendingTransaction, PipelineConfig, ReceiptSummary,
    SubmitOptions, SubmitResult, TxAction, TxStatus,
};
use crate::services::events::{EventBus, EventWaiter, WalletEvent};
use crate::services::keyring::KeyringRegistry;

type PendingStore = Arc<Mutex<HashMap<Uuid, PendingTransaction>>>;

fn lock(store: &PendingStore) -> MutexGuard<'_, HashMap<Uuid, PendingTransaction>> {
    store.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct TransactionPipeline {
    config: PipelineConfig,
    chain_data: Arc<dyn ChainDataService>,
    rpc: Arc<dyn ChainRpc>,
    registry: Arc<KeyringRegistry>,
    bus: Arc<EventBus>,
    watcher: ReceiptWatcher,
    senders: SenderLocks,
    pending: PendingStore,
}

/// Everything decided before the signer is called.
struct Prepared {
    tx: TransactionRequest,
    plan: GasPlan,
    explain: CostExplain,
}

impl TransactionPipeline {
    pub fn new(
        config: PipelineConfig,
        chain_data: Arc<dyn ChainDataService>,
        rpc: Arc<dyn ChainRpc>,
        registry: Arc<KeyringRegistry>,
        bus: Arc<EventBus>,
    ) -> Self {
        let watcher = ReceiptWatcher::new(
            rpc.clone(),
            bus.clone(),
            config.receipt_poll_interval,
            config.receipt_timeout,
        );
        Self {
            config,
            chain_data,
            rpc,
            registry,
            bus,
            watcher,
            senders: SenderLocks::new(),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn pending(&self, id: Uuid) -> Option<PendingTransaction> {
        lock(&self.pending).get(&id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Cancel the submission `id`, or every in-flight submission when `None`.
    pub fn cancel(&self, id: Option<Uuid>, reason: &str) -> usize {
        self.bus.emit(WalletEvent::SubmissionCancelled {
            id,
            reason: reason.to_string(),
        })
    }

    fn update<F: FnOnce(&mut PendingTransaction)>(&self, id: Uuid, f: F) {
        if let Some(record) = lock(&self.pending).get_mut(&id) {
            f(record);
        }
    }

    fn settle(&self, id: Uuid) {
        self.update(id, PendingTransaction::settle);
    }

    fn register(&self, id: Uuid, chain_id: u64, tx: &TransactionRequest) -> Result<(), WalletError> {
        let mut pending = lock(&self.pending);
        let ttl = self.config.pending_record_ttl;
        pending.retain(|_, record| !record.is_expired(ttl));
        if pending.get(&id).is_some_and(PendingTransaction::is_in_flight) {
            return Err(WalletError::InvalidParams(format!(
                "transaction {id} is already in flight"
            )));
        }
        pending.insert(id, PendingTransaction::new(id, chain_id, tx.clone()));
        Ok(())
    }

    pub async fn submit(
        &self,
        tx: TransactionRequest,
        chain_id: u64,
        options: SubmitOptions,
    ) -> Result<SubmitResult, WalletError> {
        let from = tx
            .from
            .ok_or_else(|| WalletError::InvalidParams("transaction has no sender".to_string()))?;
        let id = options.id.unwrap_or_else(Uuid::new_v4);
        self.register(id, chain_id, &tx)?;
        tracing::info!("Submitting transaction {} from {} on chain {}", id, from, chain_id);

        let result = self.run(id, from, tx, chain_id, &options).await;
        if let Err(e) = &result {
            tracing::warn!("Transaction {} failed: {}", id, e);
            self.update(id, |record| {
                record.status = TxStatus::Failed;
                record.error = Some(e.to_string());
                record.settle();
            });
        }
        result
    }

    async fn run(
        &self,
        id: Uuid,
        from: Address,
        tx: TransactionRequest,
        chain_id: u64,
        options: &SubmitOptions,
    ) -> Result<SubmitResult, WalletError> {
        let (prepared, tx_hash, broadcast) = self
            .senders
            .run(chain_id, from, async {
                let prepared = self.prepare(from, tx, chain_id, options).await?;

                let action = self.parse_action(chain_id, &prepared.tx).await;
                self.update(id, |record| {
                    record.raw_tx = prepared.tx.clone();
                    record.gas_plan = Some(prepared.plan.clone());
                    record.explain = Some(prepared.explain.clone());
                    record.action = Some(action);
                    record.status = TxStatus::Built;
                });

                let (tx_hash, broadcast) = self
                    .sign_and_send(id, from, chain_id, prepared.tx.clone())
                    .await?;
                Ok::<_, WalletError>((prepared, tx_hash, broadcast))
            })
            .await?;
        self.update(id, |record| {
            record.status = TxStatus::Submitted;
            record.tx_hash = Some(tx_hash);
        });

        let mut gas_cost = GasCost {
            gas_used: prepared.plan.gas_used,
            native: prepared.explain.gas_cost_native.clone(),
            usd: prepared.explain.gas_cost_usd.clone(),
            realized: false,
        };

        if !broadcast {
            self.settle(id);
        } else {
            // subscribe before the watcher starts so the event cannot be missed
            let waiter = self.bus.completion(tx_hash);
            self.watcher.watch(chain_id, tx_hash);
            let limit = self.config.receipt_timeout + self.config.receipt_poll_interval;

            if options.wait_completed {
                match await_receipt(waiter, limit).await {
                    Some(receipt) => {
                        gas_cost = realized_cost(&receipt, &prepared.explain.native_price_usd)?;
                        lock(&self.pending).remove(&id);
                    }
                    None => {
                        tracing::warn!("No receipt for {} yet, reporting estimated cost", tx_hash);
                        self.settle(id);
                    }
                }
            } else {
                let store = self.pending.clone();
                tokio::spawn(async move {
                    let mined = await_receipt(waiter, limit).await.is_some();
                    let mut pending = lock(&store);
                    if mined {
                        pending.remove(&id);
                    } else if let Some(record) = pending.get_mut(&id) {
                        record.settle();
                    }
                });
            }
        }

        Ok(SubmitResult {
            id,
            tx_hash,
            gas_cost,
        })
    }

    /// Steps up to and including the risk checks. No signer is touched here.
    async fn prepare(
        &self,
        from: Address,
        mut tx: TransactionRequest,
        chain_id: u64,
        options: &SubmitOptions,
    ) -> Result<Prepared, WalletError> {
        let nonce = match tx.nonce {
            Some(nonce) => nonce,
            None => self.chain_data.recommend_nonce(chain_id, from).await?,
        };
        tx.nonce = Some(nonce);
        tx.chain_id = Some(chain_id);

        let level = match &options.gas_level {
            Some(level) => level.clone(),
            None => self.pick_gas_level(chain_id).await?,
        };

        let simulated = match self
            .chain_data
            .pre_exec(chain_id, &tx, &options.pending_txs)
            .await
        {
            Ok(result) => {
                if !result.success {
                    tracing::warn!(
                        "Simulation predicts failure: {}",
                        result.error.as_deref().unwrap_or("unknown")
                    );
                }
                Some(result.gas_used)
            }
            Err(e) => {
                tracing::warn!("Pre-execution failed: {}", e);
                None
            }
        };

        let gas_limit = match (options.gas_limit, simulated) {
            (Some(limit), _) => limit,
            (None, Some(used)) => recommend_gas_limit(used, &self.config.gas_limit_ratio)?,
            (None, None) => match tx.gas {
                Some(limit) => limit,
                None => {
                    return Err(WalletError::DefaultFailed(
                        "cannot estimate gas: simulation unavailable".to_string(),
                    ));
                }
            },
        };
        let gas_used = simulated.unwrap_or(gas_limit);

        let native_price = match self.chain_data.native_price_usd(chain_id).await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!("Native price unavailable for chain {}: {}", chain_id, e);
                "0".to_string()
            }
        };
        let explain = explain_cost(level.price, gas_limit, &native_price)?;

        if gas_used > gas_limit {
            return Err(WalletError::GasNotEnough {
                required: gas_used,
                limit: gas_limit,
            });
        }
        let threshold = gas::usd_threshold(&self.config, chain_id);
        if !options.ignore_gas_check && gas::exceeds_threshold(&explain.gas_cost_usd, threshold)? {
            tracing::warn!(
                "Gas cost ${} exceeds ${} on chain {}",
                explain.gas_cost_usd,
                threshold,
                chain_id
            );
            return Err(WalletError::GasTooHigh {
                usd: explain.gas_cost_usd,
                threshold: threshold.to_string(),
            });
        }

        self.assemble(&mut tx, chain_id, &level, gas_limit)?;

        Ok(Prepared {
            tx,
            plan: GasPlan {
                level,
                nonce,
                gas_used,
                gas_limit,
            },
            explain,
        })
    }

    async fn pick_gas_level(&self, chain_id: u64) -> Result<GasLevel, WalletError> {
        let mut levels = self.chain_data.gas_market(chain_id).await?;
        if let Some(pos) = levels.iter().position(|l| l.level == "normal") {
            return Ok(levels.swap_remove(pos));
        }
        levels
            .into_iter()
            .next()
            .ok_or_else(|| WalletError::ChainData(format!("empty gas market for chain {chain_id}")))
    }

    fn assemble(
        &self,
        tx: &mut TransactionRequest,
        chain_id: u64,
        level: &GasLevel,
        gas_limit: u64,
    ) -> Result<(), WalletError> {
        let wei = |value: U256| -> Result<u128, WalletError> {
            value
                .try_into()
                .map_err(|_| WalletError::InvalidParams(format!("gas price {value} out of range")))
        };
        tx.gas = Some(gas_limit);
        if self.config.supports_eip1559(chain_id) {
            tx.max_fee_per_gas = Some(wei(level.price)?);
            tx.max_priority_fee_per_gas = Some(wei(level.priority_price.unwrap_or(level.price))?);
            tx.gas_price = None;
        } else {
            tx.gas_price = Some(wei(level.price)?);
            tx.max_fee_per_gas = None;
            tx.max_priority_fee_per_gas = None;
        }
        Ok(())
    }

    /// Best effort: the service's description, else a local decode.
    async fn parse_action(&self, chain_id: u64, tx: &TransactionRequest) -> TxAction {
        let action = match self.chain_data.parse_action(chain_id, tx).await {
            Ok(action) => action,
            Err(e) => {
                tracing::debug!("Action parse unavailable, decoding locally: {}", e);
                decode_local(tx)
            }
        };
        match action {
            TxAction::ContractCall {
                contract,
                selector,
                protocol: None,
            } => {
                let protocol = self
                    .chain_data
                    .contract_protocol(chain_id, contract)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::debug!("Contract metadata unavailable for {}: {}", contract, e);
                        None
                    });
                TxAction::ContractCall {
                    contract,
                    selector,
                    protocol,
                }
            }
            other => other,
        }
    }

    /// Sign and broadcast, racing a cancellation addressed to `id`.
    ///
    /// Returns the hash and whether it was broadcast on chain. Multisig
    /// proposals return the Safe transaction hash without broadcasting.
    async fn sign_and_send(
        &self,
        id: Uuid,
        from: Address,
        chain_id: u64,
        tx: TransactionRequest,
    ) -> Result<(B256, bool), WalletError> {
        let cancelled = self.bus.cancellation(id);

        let submission = async {
            let signed = self.registry.sign_transaction(from, tx).await?;
            self.update(id, |record| record.status = TxStatus::Signed);
            match signed.raw {
                Some(raw) => Ok((self.rpc.send_raw_transaction(chain_id, &raw).await?, true)),
                None => Ok((signed.hash, false)),
            }
        };

        let outcome: Result<(B256, bool), WalletError> = tokio::select! {
            result = submission => result,
            event = cancelled.recv() => {
                let reason = match event {
                    Ok(WalletEvent::SubmissionCancelled { reason, .. }) => reason,
                    Ok(_) | Err(_) => "cancelled".to_string(),
                };
                Err(WalletError::UserRejected(reason))
            }
        };

        outcome.map_err(|e| {
            let message = match e {
                WalletError::SubmitTxFailed(message) => message,
                other => other.to_string(),
            };
            if is_nonce_error(&message) {
                tracing::warn!("Submission {} hit a nonce conflict: {}", id, message);
            }
            WalletError::SubmitTxFailed(message)
        })
    }

}

/// The receipt announced on `waiter`, or `None` if the watcher gave up or
/// nothing arrived within `limit`. The waiter's listeners are gone either way.
async fn await_receipt(waiter: EventWaiter, limit: Duration) -> Option<ReceiptSummary> {
    match tokio::time::timeout(limit, waiter.recv()).await {
        Ok(Ok(WalletEvent::TransactionCompleted { receipt })) => Some(receipt),
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            tracing::warn!("Receipt wait ended early: {}", e);
            None
        }
        Err(_) => None,
    }
}

/// Actual cost from a receipt: gas used times the effective price paid.
fn realized_cost(receipt: &ReceiptSummary, native_price_usd: &str) -> Result<GasCost, WalletError> {
    let explain = explain_cost(
        U256::from(receipt.effective_gas_price),
        receipt.gas_used,
        native_price_usd,
    )?;
    Ok(GasCost {
        gas_used: receipt.gas_used,
        native: explain.gas_cost_native,
        usd: explain.gas_cost_usd,
        realized: true,
    })
}
