use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

/// Per-sender submission mutexes
///
/// Two submissions from the same account on the same chain would otherwise
/// both receive the same recommended nonce. Holding the sender's mutex from
/// nonce resolution through broadcast keeps them in order.
#[derive(Default)]
pub struct SenderLocks {
    locks: StdMutex<HashMap<(u64, Address), Arc<Mutex<()>>>>,
}

impl SenderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, chain_id: u64, sender: Address) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((chain_id, sender))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `operation` while holding the lock for `(chain_id, sender)`.
    pub async fn run<F, T>(&self, chain_id: u64, sender: Address, operation: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let mutex = self.lock_for(chain_id, sender);
        let _lock = mutex.lock().await;
        tracing::debug!("Acquired submission lock for {} on chain {}", sender, chain_id);
        let result = operation.await;
        tracing::debug!("Released submission lock for {} on chain {}", sender, chain_id);
        result
    }
}

/// Detect nonce-related errors from node error messages
pub fn is_nonce_error(error_msg: &str) -> bool {
    let error_lower = error_msg.to_lowercase();
    error_lower.contains("nonce too low")
        || error_lower.contains("nonce too high")
        || error_lower.contains("invalid nonce")
        || error_lower.contains("nonce is invalid")
        || error_lower.contains("nonce is too low")
        || error_lower.contains("replacement transaction underpriced")
        || error_lower.contains("replacement tx underpriced")
}
