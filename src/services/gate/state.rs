use serde::Serialize;

use crate::error::WalletError;
use crate::models::IncomingRequest;

/// Checkpoints a request passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ApprovalState {
    Locked,
    Unlocked,
    Connect,
    Sign,
    Dispatch,
    Done,
}

/// Outcome of the work done in one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    UnlockApproved,
    /// Permission lookup finished for an unlocked wallet
    Checked { connected: bool, needs_confirm: bool },
    ConnectApproved { needs_confirm: bool },
    SignApproved,
    /// Handler settled, successfully or not
    Dispatched,
}

/// Pure transition function. `None` means the event is not valid in `state`.
pub fn transition(state: ApprovalState, event: GateEvent) -> Option<ApprovalState> {
    use ApprovalState::*;
    let next = match (state, event) {
        (Locked, GateEvent::UnlockApproved) => Unlocked,
        (Unlocked, GateEvent::Checked { connected: false, .. }) => Connect,
        (Unlocked, GateEvent::Checked { needs_confirm: true, .. }) => Sign,
        (Unlocked, GateEvent::Checked { .. }) => Dispatch,
        (Connect, GateEvent::ConnectApproved { needs_confirm: true }) => Sign,
        (Connect, GateEvent::ConnectApproved { .. }) => Dispatch,
        (Sign, GateEvent::SignApproved) => Dispatch,
        (Dispatch, GateEvent::Dispatched) => Done,
        _ => return None,
    };
    Some(next)
}

/// Per-request approval state. Never shared between requests.
#[derive(Debug)]
pub struct RequestContext {
    request: IncomingRequest,
    state: ApprovalState,
    visited: Vec<ApprovalState>,
}

impl RequestContext {
    pub fn new(request: IncomingRequest, unlocked: bool) -> Self {
        let state = if unlocked {
            ApprovalState::Unlocked
        } else {
            ApprovalState::Locked
        };
        Self {
            request,
            state,
            visited: vec![state],
        }
    }

    pub fn request(&self) -> &IncomingRequest {
        &self.request
    }

    pub fn state(&self) -> ApprovalState {
        self.state
    }

    /// States entered so far, starting with the initial one.
    pub fn visited(&self) -> &[ApprovalState] {
        &self.visited
    }

    pub fn into_visited(self) -> Vec<ApprovalState> {
        self.visited
    }

    pub fn advance(&mut self, event: GateEvent) -> Result<ApprovalState, WalletError> {
        let next = transition(self.state, event).ok_or_else(|| {
            WalletError::DefaultFailed(format!("invalid gate event {:?} in state {:?}", event, self.state))
        })?;
        tracing::trace!("{} {:?} -> {:?}", self.request.method, self.state, next);
        self.state = next;
        self.visited.push(next);
        Ok(next)
    }
}
