//! Prometheus metrics exposition
//!
//! - `login_started_total` (counter): label `flow`
//! - `login_begin_errors_total` (counter): labels `flow`, `kind`
//! - `redirects_total` (counter): label `outcome`
//! - `redirect_duration_seconds` (histogram): label `outcome`

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use oidc_client::{Error, Outcome};

const REDIRECT_DURATION_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("redirect_duration_seconds".to_string()),
        REDIRECT_DURATION_BUCKETS,
    )
}

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record an authorization redirect handed to the user agent.
pub fn record_login_started(flow: &'static str) {
    metrics::counter!("login_started_total", "flow" => flow).increment(1);
}

/// Record a failure to start a login.
pub fn record_begin_error(flow: &'static str, error: &Error) {
    metrics::counter!("login_begin_errors_total", "flow" => flow, "kind" => error.kind())
        .increment(1);
}

/// Record a completed redirect leg.
pub fn record_redirect(outcome: &Outcome, duration_secs: f64) {
    let label = outcome_label(outcome);
    metrics::counter!("redirects_total", "outcome" => label).increment(1);
    metrics::histogram!("redirect_duration_seconds", "outcome" => label).record(duration_secs);
}

/// Low-cardinality label for a redirect outcome.
pub fn outcome_label(outcome: &Outcome) -> &'static str {
    match &outcome.error {
        None => "success",
        Some(Error::State(_)) => "state_rejected",
        Some(Error::Exchange(_)) => "exchange_failed",
        Some(Error::Verification(_) | Error::MalformedIdToken(_) | Error::KeyResolution(_)) => {
            "verification_failed"
        }
        Some(_) => "other_error",
    }
}
