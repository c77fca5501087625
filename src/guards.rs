use crate::models::AppState;
use rocket::{Request, State, http::Status, request::FromRequest, request::Outcome};

/// Bearer token shared with the extension's content-script bridge.
///
/// Must match `WALLET_GATE_ACCESS_TOKEN`. Pages never see this token, so a
/// request carrying it has come through the extension itself.
pub struct ApiToken;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ApiToken {
    type Error = String;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let endpoint = request.uri().to_string();

        let Outcome::Success(state) = request.guard::<&State<AppState>>().await else {
            tracing::error!("Application state not available for: {}", endpoint);
            sentry::capture_message(
                "Application state not available in ApiToken guard",
                sentry::Level::Error,
            );
            return Outcome::Error((
                Status::InternalServerError,
                "Application state not available".to_string(),
            ));
        };

        match request.headers().get_one("Authorization") {
            Some(header) => match header.strip_prefix("Bearer ") {
                Some(token) if token == state.access_token => Outcome::Success(ApiToken),
                Some(_) => {
                    tracing::warn!("Invalid bridge token for: {}", endpoint);
                    sentry::capture_message(
                        &format!("Invalid bridge token attempt for: {endpoint}"),
                        sentry::Level::Warning,
                    );
                    Outcome::Error((Status::Unauthorized, "Invalid API token".to_string()))
                }
                None => {
                    tracing::warn!("Authorization header is not a bearer token for: {}", endpoint);
                    Outcome::Error((
                        Status::Unauthorized,
                        "Authorization header must start with 'Bearer '".to_string(),
                    ))
                }
            },
            None => {
                tracing::warn!("Missing Authorization header for: {}", endpoint);
                Outcome::Error((Status::Unauthorized, "Missing Authorization header".to_string()))
            }
        }
    }
}
