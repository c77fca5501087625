use alloy::primitives::Address;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post};
use uuid::Uuid;

use super::{RouteResult, failure};
use crate::error::WalletError;
use crate::guards::ApiToken;
use crate::models::{
    Account, ApiResponse, AppState, CreateLocalKeyringRequest, KeyringDescriptor, MultisigActionRequest,
    MultisigTransaction,
};
use crate::services::keyring::VaultSecret;

fn parse_address(value: &str) -> Result<Address, WalletError> {
    value
        .parse()
        .map_err(|e| WalletError::InvalidParams(format!("invalid address '{value}': {e}")))
}

#[get("/accounts")]
pub async fn list_accounts(state: &State<AppState>, _token: ApiToken) -> RouteResult<Vec<Account>> {
    let accounts = state.registry.get_accounts().await.map_err(failure)?;
    let message = format!("{} accounts", accounts.len());
    Ok(Json(ApiResponse::ok(accounts, message)))
}

#[post("/keyrings", format = "json", data = "<descriptor>")]
pub async fn add_keyring(
    state: &State<AppState>,
    descriptor: Json<KeyringDescriptor>,
    _token: ApiToken,
) -> RouteResult<String> {
    let descriptor = descriptor.into_inner();
    tracing::info!("Adding {} keyring", descriptor.keyring_type.as_str());
    let id = state.registry.add_keyring(descriptor).await.map_err(failure)?;
    Ok(Json(ApiResponse::ok(id, "Keyring added")))
}

#[post("/keyrings/local", format = "json", data = "<request>")]
pub async fn create_local_keyring(
    state: &State<AppState>,
    request: Json<CreateLocalKeyringRequest>,
    _token: ApiToken,
) -> RouteResult<String> {
    let request = request.into_inner();
    let secret = VaultSecret {
        mnemonic: request.mnemonic,
        count: request.count,
        private_keys: request.private_keys,
    };
    let id = state
        .registry
        .create_local(&secret, &request.password)
        .await
        .map_err(failure)?;
    Ok(Json(ApiResponse::ok(id, "Local keyring created")))
}

#[delete("/keyrings/<id>")]
pub async fn remove_keyring(state: &State<AppState>, id: &str, _token: ApiToken) -> RouteResult<String> {
    state.registry.remove_keyring(id).await.map_err(failure)?;
    Ok(Json(ApiResponse::ok(id.to_string(), "Keyring removed")))
}

#[post("/keyrings/<id>/retry")]
pub async fn retry_keyring(state: &State<AppState>, id: &str, _token: ApiToken) -> RouteResult<String> {
    state.registry.retry_hardware(id).await.map_err(failure)?;
    Ok(Json(ApiResponse::ok(id.to_string(), "Hardware transport ready")))
}

#[post("/multisig/<safe>/confirm", format = "json", data = "<request>")]
pub async fn confirm_multisig(
    state: &State<AppState>,
    safe: &str,
    request: Json<MultisigActionRequest>,
    _token: ApiToken,
) -> RouteResult<MultisigTransaction> {
    let safe = parse_address(safe).map_err(failure)?;
    let tx = state
        .registry
        .confirm_multisig(safe, request.into_inner().transaction)
        .await
        .map_err(failure)?;
    let message = format!("{} of {} signatures collected", tx.signatures.len(), tx.threshold);
    Ok(Json(ApiResponse::ok(tx, message)))
}

#[post("/multisig/<safe>/exec", format = "json", data = "<request>")]
pub async fn exec_multisig(
    state: &State<AppState>,
    safe: &str,
    request: Json<MultisigActionRequest>,
    _token: ApiToken,
) -> RouteResult<String> {
    let safe = parse_address(safe).map_err(failure)?;
    let hash = state
        .registry
        .exec_multisig(safe, request.into_inner().transaction)
        .await
        .map_err(failure)?;
    Ok(Json(ApiResponse::ok(hash.to_string(), "Safe transaction executed")))
}

#[delete("/transactions/<id>")]
pub fn cancel_transaction(state: &State<AppState>, id: &str, _token: ApiToken) -> RouteResult<usize> {
    let id: Uuid = id
        .parse()
        .map_err(|e| failure(WalletError::InvalidParams(format!("invalid transaction id '{id}': {e}"))))?;
    let cancelled = state.pipeline.cancel(Some(id), "User cancelled the transaction.");
    Ok(Json(ApiResponse::ok(cancelled, "Cancellation requested")))
}
