use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post};
use uuid::Uuid;

use super::{RouteResult, failure};
use crate::error::WalletError;
use crate::guards::ApiToken;
use crate::models::{ApiResponse, AppState, ApprovalDecision, UnlockRequest};
use crate::services::gate::{ApprovalKind, ApprovalRequest, ConnectedSite, PermissionStore};

fn parse_id(id: &str) -> Result<Uuid, WalletError> {
    id.parse()
        .map_err(|e| WalletError::InvalidParams(format!("invalid approval id '{id}': {e}")))
}

fn wrong_password<T>(err: WalletError) -> (Status, Json<ApiResponse<T>>) {
    tracing::warn!("Unlock failed: {}", err);
    (Status::Unauthorized, Json(ApiResponse::error(err.to_string())))
}

#[get("/approvals")]
pub fn list_approvals(state: &State<AppState>, _token: ApiToken) -> Json<ApiResponse<Vec<ApprovalRequest>>> {
    let pending = state.approvals.list();
    let message = format!("{} pending approvals", pending.len());
    Json(ApiResponse::ok(pending, message))
}

/// Answer a prompt. Approving an unlock prompt unlocks the keyrings first; a
/// wrong password leaves the prompt pending.
#[post("/approvals/<id>", format = "json", data = "<decision>")]
pub fn resolve_approval(
    state: &State<AppState>,
    id: &str,
    decision: Json<ApprovalDecision>,
    _token: ApiToken,
) -> RouteResult<String> {
    tracing::info!("Received request: POST /approvals/{}", id);
    let id = parse_id(id).map_err(failure)?;
    let pending = state
        .approvals
        .get(id)
        .ok_or_else(|| failure(WalletError::InvalidParams(format!("no pending approval {id}"))))?;

    let decision = decision.into_inner();
    if decision.approved && pending.kind == ApprovalKind::Unlock {
        let password = decision
            .password
            .as_deref()
            .ok_or_else(|| failure(WalletError::InvalidParams("password is required to unlock".to_string())))?;
        state.registry.unlock(password).map_err(wrong_password)?;
    }

    if !state.approvals.resolve(id, decision.approved, decision.reason) {
        return Err(failure(WalletError::InvalidParams(format!(
            "approval {id} is no longer pending"
        ))));
    }
    Ok(Json(ApiResponse::ok(id.to_string(), "Approval resolved")))
}

/// Reject every pending prompt and cancel every in-flight submission.
#[delete("/approvals")]
pub fn reject_all(state: &State<AppState>, _token: ApiToken) -> Json<ApiResponse<usize>> {
    let reason = "User rejected the request.";
    let rejected = state.approvals.reject_all(reason);
    let cancelled = state.pipeline.cancel(None, reason);
    Json(ApiResponse::ok(
        rejected,
        format!("Rejected {rejected} approvals, cancelled {cancelled} submissions"),
    ))
}

#[post("/unlock", format = "json", data = "<request>")]
pub fn unlock(state: &State<AppState>, request: Json<UnlockRequest>, _token: ApiToken) -> RouteResult<bool> {
    state.registry.unlock(&request.password).map_err(wrong_password)?;
    Ok(Json(ApiResponse::ok(true, "Wallet unlocked")))
}

#[post("/lock")]
pub fn lock(state: &State<AppState>, _token: ApiToken) -> Json<ApiResponse<bool>> {
    state.registry.lock();
    Json(ApiResponse::ok(false, "Wallet locked"))
}

#[get("/sites")]
pub fn list_sites(state: &State<AppState>, _token: ApiToken) -> Json<ApiResponse<Vec<ConnectedSite>>> {
    let sites = state.permissions.list();
    let message = format!("{} connected sites", sites.len());
    Json(ApiResponse::ok(sites, message))
}

#[delete("/sites?<origin>")]
pub fn revoke_site(state: &State<AppState>, origin: &str, _token: ApiToken) -> RouteResult<String> {
    if !state.permissions.revoke(origin) {
        return Err(failure(WalletError::InvalidParams(format!("{origin} is not connected"))));
    }
    Ok(Json(ApiResponse::ok(origin.to_string(), "Connection revoked")))
}
