//! Issuer configuration discovery
//!
//! Fetches `{scheme}://{domain}/.well-known/{document}` and parses it into a
//! [`DiscoveryDocument`]. The identity-token flow reads
//! `openid-configuration`; the access-token flow reads a provider-specific
//! document. Nothing is cached: every authorization attempt fetches again.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// URL scheme used to reach the discovery endpoint.
///
/// `Http` exists for local development against plaintext issuers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryScheme {
    #[default]
    Https,
    Http,
}

impl DiscoveryScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscoveryScheme::Https => "https",
            DiscoveryScheme::Http => "http",
        }
    }
}

/// Parsed well-known configuration of an authorization server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DiscoveryDocument {
    pub authorization_endpoint: String,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    /// Fields not modelled above, kept for callers that need them.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Location of a well-known document for `domain`.
pub fn well_known_url(scheme: DiscoveryScheme, domain: &str, document: &str) -> String {
    format!(
        "{}://{}/.well-known/{}",
        scheme.as_str(),
        domain.trim_end_matches('/'),
        document
    )
}

/// Fetch and parse a discovery document. No retries.
pub async fn fetch(
    client: &reqwest::Client,
    scheme: DiscoveryScheme,
    domain: &str,
    document: &str,
) -> Result<DiscoveryDocument> {
    let url = well_known_url(scheme, domain, document);
    debug!(%url, "fetching discovery document");

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::Discovery(format!("GET {url} failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Discovery(format!("GET {url} returned {status}")));
    }

    response
        .json::<DiscoveryDocument>()
        .await
        .map_err(|e| Error::Discovery(format!("invalid discovery document at {url}: {e}")))
}
