use rocket::serde::json::Json;
use rocket::{State, post};

use crate::guards::ApiToken;
use crate::models::{AppState, IncomingRequest, RpcEnvelope, RpcResponse};

/// Dapp RPC channel.
///
/// Always answers 200; failures travel inside the `error` member so the
/// content script can hand them to the page unchanged.
#[post("/rpc", format = "json", data = "<envelope>")]
pub async fn dapp_rpc(state: &State<AppState>, envelope: Json<RpcEnvelope>, _token: ApiToken) -> Json<RpcResponse> {
    let request = IncomingRequest::from(envelope.into_inner());
    tracing::info!("RPC {} from {}", request.method, request.session.origin);
    let _guard = sentry::Hub::current().push_scope();
    sentry::configure_scope(|scope| {
        scope.set_tag("endpoint", "/rpc");
        scope.set_tag("rpc_method", &request.method);
        scope.set_extra("origin", request.session.origin.clone().into());
    });

    let method = request.method.clone();
    match state.gate.handle(request).await {
        Ok(result) => Json(RpcResponse::success(result)),
        Err(e) => {
            tracing::info!("RPC {} failed: {}", method, e);
            if matches!(e.rpc_code(), -32603) {
                sentry::capture_message(&format!("RPC {method} failed: {e}"), sentry::Level::Error);
            }
            Json(RpcResponse::failure(&e))
        }
    }
}
