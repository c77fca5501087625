use std::sync::Arc;

use crate::models::GateConfig;
use crate::services::events::EventBus;
use crate::services::gate::{ApprovalQueue, ConnectedSites, RequestGate};
use crate::services::keyring::KeyringRegistry;
use crate::services::transaction::TransactionPipeline;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub chain_id: u64,
    pub gate: Arc<RequestGate>,
    pub registry: Arc<KeyringRegistry>,
    pub pipeline: Arc<TransactionPipeline>,
    pub bus: Arc<EventBus>,
    /// Prompts awaiting an answer from the extension UI
    pub approvals: Arc<ApprovalQueue>,
    pub permissions: Arc<ConnectedSites>,

    // Authentication
    pub access_token: String,
}

impl AppState {
    /// Wire the gate over already-built services.
    pub fn assemble(
        config: &GateConfig,
        registry: Arc<KeyringRegistry>,
        pipeline: Arc<TransactionPipeline>,
        bus: Arc<EventBus>,
    ) -> Self {
        let approvals = Arc::new(ApprovalQueue::new());
        let permissions = Arc::new(ConnectedSites::new());
        let handlers = crate::services::gate::MethodHandlers::new(
            config.chain_id,
            registry.clone(),
            pipeline.clone(),
            permissions.clone(),
        );
        let gate = Arc::new(RequestGate::new(
            config.chain_id,
            registry.clone(),
            permissions.clone(),
            approvals.clone(),
            handlers,
        ));
        Self {
            chain_id: config.chain_id,
            gate,
            registry,
            pipeline,
            bus,
            approvals,
            permissions,
            access_token: config.access_token.clone(),
        }
    }
}
