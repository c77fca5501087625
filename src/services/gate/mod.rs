//! Approval gate for dapp requests
//!
//! Every inbound call walks `Locked -> Unlocked -> Connect -> Sign -> Dispatch -> Done`,
//! skipping the checkpoints it does not need. Only `Dispatch` reaches a privileged
//! handler.

pub mod approval;
pub mod methods;
pub mod permission;
pub mod state;

pub use approval::{ApprovalKind, ApprovalQueue, ApprovalRequest, ApprovalUi};
pub use methods::{MethodHandlers, NEED_CONFIRM, RpcMethod, camel_case, needs_confirm};
pub use permission::{ConnectedSite, ConnectedSites, PermissionStore};
pub use state::{ApprovalState, GateEvent, RequestContext, transition};

use serde_json::Value;
use std::sync::Arc;

use crate::error::WalletError;
use crate::models::IncomingRequest;
use crate::services::keyring::KeyringRegistry;

pub trait UnlockChecker: Send + Sync {
    fn is_unlocked(&self) -> bool;
}

impl UnlockChecker for KeyringRegistry {
    fn is_unlocked(&self) -> bool {
        KeyringRegistry::is_unlocked(self)
    }
}

pub struct RequestGate {
    chain_id: u64,
    unlock: Arc<dyn UnlockChecker>,
    permissions: Arc<dyn PermissionStore>,
    ui: Arc<dyn ApprovalUi>,
    handlers: MethodHandlers,
}

impl RequestGate {
    pub fn new(
        chain_id: u64,
        unlock: Arc<dyn UnlockChecker>,
        permissions: Arc<dyn PermissionStore>,
        ui: Arc<dyn ApprovalUi>,
        handlers: MethodHandlers,
    ) -> Self {
        Self {
            chain_id,
            unlock,
            permissions,
            ui,
            handlers,
        }
    }

    pub async fn handle(&self, request: IncomingRequest) -> Result<Value, WalletError> {
        self.handle_traced(request).await.0
    }

    /// Like [`handle`](Self::handle), also returning every state the request entered.
    pub async fn handle_traced(&self, request: IncomingRequest) -> (Result<Value, WalletError>, Vec<ApprovalState>) {
        let mut ctx = RequestContext::new(request, self.unlock.is_unlocked());
        let result = self.drive(&mut ctx).await;
        if let Err(e) = &result {
            tracing::debug!(
                "{} from {} failed in {:?}: {}",
                ctx.request().method,
                ctx.request().session.origin,
                ctx.state(),
                e
            );
        }
        (result, ctx.into_visited())
    }

    async fn drive(&self, ctx: &mut RequestContext) -> Result<Value, WalletError> {
        loop {
            if let Some(result) = self.forward(ctx).await? {
                return result;
            }
            if ctx.state() > ApprovalState::Dispatch {
                return Err(WalletError::DefaultFailed("request finished without a result".to_string()));
            }
        }
    }

    /// Perform the work of the current state. `Some` carries the handler outcome
    /// once `Done` is reached.
    async fn forward(&self, ctx: &mut RequestContext) -> Result<Option<Result<Value, WalletError>>, WalletError> {
        let (event, outcome) = self.step(ctx.state(), ctx.request()).await?;
        ctx.advance(event)?;
        Ok(outcome)
    }

    /// Work for one state. Returns the event that leaves it and, after
    /// dispatch, the handler outcome.
    async fn step(
        &self,
        state: ApprovalState,
        request: &IncomingRequest,
    ) -> Result<(GateEvent, Option<Result<Value, WalletError>>), WalletError> {
        let session = &request.session;
        let event = match state {
            ApprovalState::Locked => {
                self.ui.request_unlock(session).await?;
                GateEvent::UnlockApproved
            }
            ApprovalState::Unlocked => GateEvent::Checked {
                connected: self.permissions.has_grant(&session.origin),
                needs_confirm: needs_confirm(&request.method),
            },
            ApprovalState::Connect => {
                self.ui.request_connect(session).await?;
                self.permissions.grant(session, self.chain_id);
                GateEvent::ConnectApproved {
                    needs_confirm: needs_confirm(&request.method),
                }
            }
            ApprovalState::Sign => {
                self.ui
                    .request_sign(session, &request.method, &request.params)
                    .await?;
                self.permissions.touch(&session.origin);
                GateEvent::SignApproved
            }
            ApprovalState::Dispatch => {
                let method = RpcMethod::resolve(&request.method).ok_or_else(|| WalletError::MethodNotFound {
                    method: request.method.clone(),
                    request: request.payload(),
                })?;
                let outcome = self.handlers.dispatch(method, request).await;
                return Ok((GateEvent::Dispatched, Some(outcome)));
            }
            ApprovalState::Done => {
                return Err(WalletError::DefaultFailed("request already dispatched".to_string()));
            }
        };
        Ok((event, None))
    }
}
