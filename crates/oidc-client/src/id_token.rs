//! ID token verification against the issuer's published keys

use jsonwebtoken::jwk::{Jwk, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::constants::ID_TOKEN_LEEWAY_SECS;
use crate::discovery::DiscoveryDocument;
use crate::error::{Error, KeyResolutionError, Result};
use crate::jwks;

/// Signature algorithms accepted for ID tokens. Symmetric algorithms are
/// refused: the client never shares a key with the issuer's key set.
const ACCEPTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Verify `raw` and return its claim set.
///
/// The header is decoded first without verification to learn the `kid`.
/// The algorithm must be asymmetric; when the selected key names its own
/// `alg`, that one is required. Expiry is always checked; the audience when
/// `client_id` is known, and the issuer when the discovery document
/// advertises one.
pub async fn verify(
    client: &reqwest::Client,
    discovery: &DiscoveryDocument,
    client_id: Option<&str>,
    raw: &str,
) -> Result<Map<String, Value>> {
    let header =
        jsonwebtoken::decode_header(raw).map_err(|e| Error::MalformedIdToken(e.to_string()))?;

    if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
        return Err(Error::Verification(format!(
            "unsupported signature algorithm {:?}",
            header.alg
        )));
    }

    let jwks_uri = discovery
        .jwks_uri
        .as_deref()
        .ok_or(KeyResolutionError::MissingJwksUri)?;

    let jwk = jwks::resolve(client, jwks_uri, header.kid.as_deref()).await?;
    let key = DecodingKey::from_jwk(&jwk)
        .map_err(|e| KeyResolutionError::Unparsable(format!("unusable key: {e}")))?;

    let alg = key_algorithm(&jwk)?.unwrap_or(header.alg);
    if alg != header.alg {
        return Err(Error::Verification(format!(
            "token is signed with {:?} but the key requires {alg:?}",
            header.alg
        )));
    }

    let mut validation = Validation::new(alg);
    validation.leeway = ID_TOKEN_LEEWAY_SECS;
    match client_id {
        Some(client_id) => validation.set_audience(&[client_id]),
        None => validation.validate_aud = false,
    }
    if let Some(issuer) = discovery.issuer.as_deref() {
        validation.set_issuer(&[issuer]);
    }

    match jsonwebtoken::decode::<Map<String, Value>>(raw, &key, &validation) {
        Ok(data) => {
            debug!(kid = header.kid.as_deref(), "ID token verified");
            Ok(data.claims)
        }
        Err(e) => {
            warn!(kid = header.kid.as_deref(), error = %e, "ID token rejected");
            Err(Error::Verification(e.to_string()))
        }
    }
}

/// The algorithm the key declares, if any. A declared algorithm outside
/// the accepted set makes the key unusable for ID tokens.
fn key_algorithm(jwk: &Jwk) -> Result<Option<Algorithm>> {
    let Some(declared) = jwk.common.key_algorithm.as_ref() else {
        return Ok(None);
    };
    let alg = match declared {
        KeyAlgorithm::RS256 => Algorithm::RS256,
        KeyAlgorithm::RS384 => Algorithm::RS384,
        KeyAlgorithm::RS512 => Algorithm::RS512,
        KeyAlgorithm::PS256 => Algorithm::PS256,
        KeyAlgorithm::PS384 => Algorithm::PS384,
        KeyAlgorithm::PS512 => Algorithm::PS512,
        KeyAlgorithm::ES256 => Algorithm::ES256,
        KeyAlgorithm::ES384 => Algorithm::ES384,
        KeyAlgorithm::EdDSA => Algorithm::EdDSA,
        other => {
            return Err(Error::Verification(format!(
                "key algorithm {other:?} cannot verify ID tokens"
            )));
        }
    };
    Ok(Some(alg))
}
