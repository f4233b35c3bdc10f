//! HTTP mapping of flow errors

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

/// Errors a login route turns into an HTTP response.
///
/// Redirect-leg failures are not represented here: they travel inside the
/// `Outcome` rendered by the redirect handler.
#[derive(Error, Debug)]
pub enum Error {
    #[error("could not start login: {0}")]
    Begin(#[from] oidc_client::Error),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Begin(oidc_client::Error::Configuration(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::Begin(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let Error::Begin(ref source) = self;
        (self.status(), Json(json!({ "error": error_body(source) }))).into_response()
    }
}

/// Status for a completed redirect leg.
///
/// State problems are the caller's fault. Discovery and exchange failures
/// are upstream faults. Verification failures still carry the tokens and are
/// reported in the body with 200.
pub fn redirect_status(error: Option<&oidc_client::Error>) -> StatusCode {
    match error {
        None => StatusCode::OK,
        Some(oidc_client::Error::State(_)) => StatusCode::BAD_REQUEST,
        Some(oidc_client::Error::Discovery(_) | oidc_client::Error::Exchange(_)) => {
            StatusCode::BAD_GATEWAY
        }
        Some(oidc_client::Error::Configuration(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        Some(_) => StatusCode::OK,
    }
}

/// JSON shape of an error in responses: `{ "kind": ..., "message": ... }`.
pub fn error_body(error: &oidc_client::Error) -> Value {
    json!({
        "kind": error.kind(),
        "message": error.to_string(),
    })
}
