use alloy::primitives::B256;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::chain::ChainRpc;
use crate::services::events::{EventBus, WalletEvent};

/// Polls for a receipt and announces it as `TransactionCompleted`, or as
/// `TransactionTimedOut` once the timeout passes without one.
#[derive(Clone)]
pub struct ReceiptWatcher {
    rpc: Arc<dyn ChainRpc>,
    bus: Arc<EventBus>,
    interval: Duration,
    timeout: Duration,
}

impl ReceiptWatcher {
    pub fn new(rpc: Arc<dyn ChainRpc>, bus: Arc<EventBus>, interval: Duration, timeout: Duration) -> Self {
        Self {
            rpc,
            bus,
            interval,
            timeout,
        }
    }

    pub fn watch(&self, chain_id: u64, hash: B256) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.poll(chain_id, hash).await })
    }

    async fn poll(&self, chain_id: u64, hash: B256) {
        let started = tokio::time::Instant::now();
        loop {
            match self.rpc.get_receipt(chain_id, hash).await {
                Ok(Some(receipt)) => {
                    tracing::info!(
                        "Transaction {} mined on chain {} (success: {}, gas used: {})",
                        hash,
                        chain_id,
                        receipt.success,
                        receipt.gas_used
                    );
                    self.bus.emit(WalletEvent::TransactionCompleted { receipt });
                    return;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Receipt poll for {} failed: {}", hash, e),
            }
            if started.elapsed() >= self.timeout {
                tracing::warn!("Gave up waiting for receipt of {} after {:?}", hash, self.timeout);
                self.bus.emit(WalletEvent::TransactionTimedOut { hash });
                return;
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
