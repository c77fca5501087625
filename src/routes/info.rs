use rocket::serde::json::Json;
use rocket::{State, get};

use crate::models::{ApiResponse, AppState, ServiceSummary};
use crate::services::gate::RpcMethod;

#[get("/")]
pub fn index(state: &State<AppState>) -> Json<ApiResponse<ServiceSummary>> {
    tracing::info!("Received request: GET /");

    let summary = ServiceSummary {
        chain_id: format!("0x{:x}", state.chain_id),
        keyrings: state.registry.keyring_count(),
        unlocked: state.registry.is_unlocked(),
        methods: RpcMethod::ALL
            .iter()
            .map(|m| m.handler_name().to_string())
            .collect(),
    };
    let message = format!(
        "Wallet gate serving chain {} with {} keyrings",
        summary.chain_id, summary.keyrings
    );
    Json(ApiResponse::ok(summary, message))
}
