//! User-facing approval prompts
//!
//! The gate only needs [`ApprovalUi`]. [`ApprovalQueue`] is the concrete
//! implementation used by the service: every prompt becomes a pending entry
//! that the extension UI lists and resolves over the management routes.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::WalletError;
use crate::models::Session;

/// Interactive checkpoints. Any `Err` aborts the request.
#[async_trait]
pub trait ApprovalUi: Send + Sync {
    async fn request_unlock(&self, session: &Session) -> Result<(), WalletError>;
    async fn request_connect(&self, session: &Session) -> Result<(), WalletError>;
    async fn request_sign(&self, session: &Session, method: &str, params: &[Value]) -> Result<(), WalletError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalKind {
    Unlock,
    Connect,
    Sign,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub kind: ApprovalKind,
    pub session: Session,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}

type Decision = Result<(), String>;

struct Entry {
    seq: u64,
    request: ApprovalRequest,
    reply: oneshot::Sender<Decision>,
}

#[derive(Default)]
pub struct ApprovalQueue {
    entries: Mutex<HashMap<Uuid, Entry>>,
    seq: AtomicU64,
}

/// Removes an entry whose waiter went away before it was resolved.
struct EntryGuard<'a> {
    queue: &'a ApprovalQueue,
    id: Uuid,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.queue
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

impl ApprovalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending prompts, oldest first.
    pub fn list(&self) -> Vec<ApprovalRequest> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut pending: Vec<_> = entries.values().map(|e| (e.seq, e.request.clone())).collect();
        pending.sort_by_key(|(seq, _)| *seq);
        pending.into_iter().map(|(_, request)| request).collect()
    }

    pub fn get(&self, id: Uuid) -> Option<ApprovalRequest> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .map(|e| e.request.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Answer a prompt. Returns false if the id is unknown or already answered.
    pub fn resolve(&self, id: Uuid, approved: bool, reason: Option<String>) -> bool {
        let entry = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
        let Some(entry) = entry else {
            return false;
        };
        let decision = if approved {
            Ok(())
        } else {
            Err(reason.unwrap_or_else(|| "User rejected the request.".to_string()))
        };
        tracing::info!("Approval {} ({:?}) resolved: approved={}", id, entry.request.kind, approved);
        entry.reply.send(decision).is_ok()
    }

    pub fn reject_all(&self, reason: &str) -> usize {
        let drained: Vec<Entry> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.reply.send(Err(reason.to_string()));
        }
        if count > 0 {
            tracing::info!("Rejected {} pending approvals: {}", count, reason);
        }
        count
    }

    async fn prompt(
        &self,
        kind: ApprovalKind,
        session: &Session,
        method: Option<&str>,
        params: &[Value],
    ) -> Result<(), WalletError> {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let request = ApprovalRequest {
            id,
            kind,
            session: session.clone(),
            method: method.map(str::to_string),
            params: params.to_vec(),
        };
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).insert(
            id,
            Entry {
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
                request,
                reply: tx,
            },
        );
        tracing::debug!("Queued {:?} approval {} for {}", kind, id, session.origin);
        let _guard = EntryGuard { queue: self, id };

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(WalletError::UserRejected(reason)),
            Err(_) => Err(WalletError::UserRejected("approval was discarded".to_string())),
        }
    }
}

#[async_trait]
impl ApprovalUi for ApprovalQueue {
    async fn request_unlock(&self, session: &Session) -> Result<(), WalletError> {
        self.prompt(ApprovalKind::Unlock, session, None, &[]).await
    }

    async fn request_connect(&self, session: &Session) -> Result<(), WalletError> {
        self.prompt(ApprovalKind::Connect, session, None, &[]).await
    }

    async fn request_sign(&self, session: &Session, method: &str, params: &[Value]) -> Result<(), WalletError> {
        self.prompt(ApprovalKind::Sign, session, Some(method), params).await
    }
}
