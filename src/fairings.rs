use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Status;
use rocket::{Data, Request, Response};
use std::time::Instant;

/// Start time of a request, cached on the request by [`RequestLogger`].
#[derive(Clone, Copy)]
struct RequestStart(Option<Instant>);

/// Logs every request with its status and latency.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(|| RequestStart(Some(Instant::now())));
        tracing::debug!("Incoming request: {} {}", request.method(), request.uri());
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let elapsed = request
            .local_cache(|| RequestStart(None))
            .0
            .map(|start| start.elapsed().as_millis())
            .unwrap_or_default();
        let status = response.status();
        if status.class().is_success() {
            tracing::info!("{} {} - {} in {}ms", request.method(), request.uri(), status, elapsed);
        } else {
            tracing::warn!("{} {} - {} in {}ms", request.method(), request.uri(), status, elapsed);
        }
    }
}

/// Reports 500 responses to Sentry; they indicate a panic or an unhandled error.
pub struct PanicCatcher;

#[rocket::async_trait]
impl Fairing for PanicCatcher {
    fn info(&self) -> Info {
        Info {
            name: "Panic Catcher",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if response.status() == Status::InternalServerError {
            let method = request.method();
            let uri = request.uri();
            tracing::error!("Internal Server Error for {} {}", method, uri);
            sentry::capture_message(
                &format!("Internal Server Error: {method} {uri}"),
                sentry::Level::Error,
            );
        }
    }
}
