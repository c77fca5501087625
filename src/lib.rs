use rocket::{Build, Rocket};
use std::sync::Arc;

pub mod error;
pub mod fairings;
pub mod guards;
pub mod models;
pub mod routes;
pub mod services;

pub use error::WalletError;

use crate::models::{AppState, GateConfig};
use crate::services::events::EventBus;
use crate::services::keyring::{
    BridgeTransportFactory, DescriptorStore, KeyringRegistry, MemoryDescriptorStore, RedisDescriptorStore,
    SafeServiceClient,
};
use crate::services::transaction::{AlloyChainRpc, HttpChainData, TransactionPipeline};

/// Build every service from `config` and restore persisted keyrings.
pub async fn build_state(config: &GateConfig) -> Result<AppState, WalletError> {
    let store: Arc<dyn DescriptorStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Keyring descriptors persisted in redis");
            Arc::new(RedisDescriptorStore::new(url).await?)
        }
        None => {
            tracing::warn!("REDIS_URL not set; keyring descriptors are kept in memory only");
            Arc::new(MemoryDescriptorStore::new())
        }
    };

    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(KeyringRegistry::new(
        store,
        bus.clone(),
        Arc::new(SafeServiceClient::new(&config.safe_service_url)),
        Arc::new(BridgeTransportFactory::new(&config.hardware.bridge_url)),
        config.hardware.clone(),
    ));
    let restored = registry.restore().await?;
    tracing::info!("Restored {} keyrings", restored);

    let rpc = AlloyChainRpc::from_config(&config.pipeline).map_err(WalletError::DefaultFailed)?;
    let pipeline = Arc::new(TransactionPipeline::new(
        config.pipeline.clone(),
        Arc::new(HttpChainData::new(&config.chain_data_url)),
        Arc::new(rpc),
        registry.clone(),
        bus.clone(),
    ));

    Ok(AppState::assemble(config, registry, pipeline, bus))
}

/// Mount every route over an assembled state.
pub fn build_rocket(state: AppState) -> Rocket<Build> {
    rocket::build()
        .attach(fairings::RequestLogger)
        .attach(fairings::PanicCatcher)
        .manage(state)
        .mount(
            "/",
            rocket::routes![
                routes::index,
                routes::dapp_rpc,
                routes::list_approvals,
                routes::resolve_approval,
                routes::reject_all,
                routes::unlock,
                routes::lock,
                routes::list_sites,
                routes::revoke_site,
                routes::list_accounts,
                routes::add_keyring,
                routes::create_local_keyring,
                routes::remove_keyring,
                routes::retry_keyring,
                routes::confirm_multisig,
                routes::exec_multisig,
                routes::cancel_transaction,
            ],
        )
}

pub async fn create_rocket(config: GateConfig) -> Result<Rocket<Build>, WalletError> {
    tracing::info!("Gate configured:");
    tracing::info!("  - Chain ID: {}", config.chain_id);
    tracing::info!("  - Chains with RPC: {}", config.pipeline.chains.len());
    tracing::info!("  - Hardware bridge: {}", config.hardware.bridge_url);

    let state = build_state(&config).await?;
    Ok(build_rocket(state))
}
