use rocket::http::Status;
use rocket::serde::json::Json;

use crate::error::WalletError;
use crate::models::ApiResponse;

pub mod approvals;
pub mod info;
pub mod keyring;
pub mod rpc;

pub use approvals::*;
pub use info::*;
pub use keyring::*;
pub use rpc::*;

pub type RouteResult<T> = Result<Json<ApiResponse<T>>, (Status, Json<ApiResponse<T>>)>;

/// HTTP status for a failure surfaced on a management route.
pub fn status_for(err: &WalletError) -> Status {
    match err {
        WalletError::InvalidParams(_) | WalletError::MethodNotFound { .. } => Status::BadRequest,
        WalletError::AccountNotFound(_) => Status::NotFound,
        WalletError::UserRejected(_) | WalletError::Locked => Status::Forbidden,
        WalletError::NoAvailableTransaction
        | WalletError::ThresholdNotMet { .. }
        | WalletError::MultisigDuplicateSigner(_)
        | WalletError::MultisigUnsupported(_) => Status::Conflict,
        WalletError::HardwareInitFailed(_) => Status::ServiceUnavailable,
        WalletError::Federation(_) | WalletError::ChainData(_) => Status::BadGateway,
        _ => Status::InternalServerError,
    }
}

pub(crate) fn failure<T>(err: WalletError) -> (Status, Json<ApiResponse<T>>) {
    let status = status_for(&err);
    if status == Status::InternalServerError {
        tracing::error!("Route failed: {}", err);
    } else {
        tracing::warn!("Route failed: {}", err);
    }
    (status, Json(ApiResponse::error(err.to_string())))
}
