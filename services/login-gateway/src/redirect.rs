//! Redirect leg
//!
//! `complete_redirect` is route middleware for `/redirect`: it runs the
//! callback handler and stores the resulting `Outcome` in the request
//! extensions. `render_outcome` is the route handler that turns it into
//! `{ "token": ..., "error": ... }`.

use std::collections::HashMap;
use std::time::Instant;

use axum::Json;
use axum::extract::{Extension, Query, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use oidc_client::Outcome;
use serde_json::json;
use tracing::{Instrument, info_span};

use crate::AppState;
use crate::error::{error_body, redirect_status};
use crate::metrics;

pub async fn complete_redirect(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let started = Instant::now();

    let outcome = state
        .client
        .handle_redirect(&params, None)
        .instrument(info_span!("redirect", %request_id))
        .await;
    metrics::record_redirect(&outcome, started.elapsed().as_secs_f64());

    request.extensions_mut().insert(outcome);
    next.run(request).await
}

pub async fn render_outcome(Extension(outcome): Extension<Outcome>) -> Response {
    let status = redirect_status(outcome.error.as_ref());
    let body = json!({
        "token": outcome.tokens,
        "error": outcome.error.as_ref().map(error_body),
    });
    (status, Json(body)).into_response()
}
