//! Signing key resolution
//!
//! Fetches the issuer's published key set and picks the key whose `kid`
//! matches the token header. The set is kept as raw JSON and only the
//! selected entry is parsed, so unrelated key types in the set cannot make
//! resolution fail.

use jsonwebtoken::jwk::Jwk;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{KeyResolutionError, Result};

/// JSON Web Key Set with its keys unparsed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawKeySet {
    pub keys: Vec<Value>,
}

/// First key whose `kid` equals `kid`. A token without `kid` matches a key
/// without one.
pub fn select_key(set: &RawKeySet, kid: Option<&str>) -> Result<Jwk> {
    let entry = set
        .keys
        .iter()
        .find(|key| key.get("kid").and_then(Value::as_str) == kid)
        .ok_or_else(|| KeyResolutionError::NotFound(kid.map(str::to_string)))?;

    serde_json::from_value::<Jwk>(entry.clone())
        .map_err(|e| KeyResolutionError::Unparsable(format!("key {kid:?}: {e}")).into())
}

/// Fetch the key set at `jwks_uri` and select the key for `kid`.
pub async fn resolve(client: &reqwest::Client, jwks_uri: &str, kid: Option<&str>) -> Result<Jwk> {
    debug!(jwks_uri, kid, "resolving signing key");

    let response = client
        .get(jwks_uri)
        .send()
        .await
        .map_err(|e| KeyResolutionError::Unreachable(format!("GET {jwks_uri} failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(
            KeyResolutionError::Unreachable(format!("GET {jwks_uri} returned {status}")).into(),
        );
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| KeyResolutionError::Unreachable(format!("reading {jwks_uri}: {e}")))?;
    let set: RawKeySet = serde_json::from_slice(&body)
        .map_err(|e| KeyResolutionError::Unparsable(format!("{jwks_uri}: {e}")))?;

    select_key(&set, kid)
}
