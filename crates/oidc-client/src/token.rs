//! Authorization code exchange
//!
//! POSTs the code to the issuer's token endpoint, form-encoded. The client
//! authenticates with either its configured `client_secret` or a short-lived
//! RS256 client assertion signed with its private key.

use std::collections::HashMap;

use jsonwebtoken::{Algorithm, Header};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::constants::CLIENT_ASSERTION_TTL;
use crate::error::{Error, Result};
use crate::options::PrivateKey;

/// ID token as received (compact JWS), after verification (claim set), or
/// present on the wire in a shape that cannot be a JWS.
///
/// Deserialization never yields `Verified`: a string becomes `Raw` and any
/// other JSON value becomes `Invalid`. Only verification produces claims.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IdToken {
    Raw(String),
    Verified(Map<String, Value>),
    Invalid(Value),
}

impl<'de> Deserialize<'de> for IdToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(raw) => IdToken::Raw(raw),
            other => IdToken::Invalid(other),
        })
    }
}

impl IdToken {
    pub fn raw(&self) -> Option<&str> {
        match self {
            IdToken::Raw(raw) => Some(raw),
            IdToken::Verified(_) | IdToken::Invalid(_) => None,
        }
    }

    pub fn claims(&self) -> Option<&Map<String, Value>> {
        match self {
            IdToken::Verified(claims) => Some(claims),
            IdToken::Raw(_) | IdToken::Invalid(_) => None,
        }
    }
}

/// Token endpoint response, or the redirect parameters when no code was
/// exchanged. Fields other than the two tokens are passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<IdToken>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenResponse {
    /// Treat redirect query parameters as a token response.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let mut response = TokenResponse::default();
        for (name, value) in params {
            match name.as_str() {
                "access_token" => response.access_token = Some(value.clone()),
                "id_token" => response.id_token = Some(IdToken::Raw(value.clone())),
                _ => {
                    response
                        .extra
                        .insert(name.clone(), Value::String(value.clone()));
                }
            }
        }
        response
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    ac: &'a str,
    iss: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// Sign a client assertion binding `code` to this client and token endpoint.
pub fn client_assertion(
    key: &PrivateKey,
    client_id: &str,
    token_endpoint: &str,
    code: &str,
) -> Result<String> {
    let iat = jsonwebtoken::get_current_timestamp();
    let claims = AssertionClaims {
        ac: code,
        iss: client_id,
        aud: token_endpoint,
        iat,
        exp: iat + CLIENT_ASSERTION_TTL.as_secs(),
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.kid().map(str::to_string);

    jsonwebtoken::encode(&header, &claims, &key.encoding_key()?)
        .map_err(|e| Error::Exchange(format!("could not sign client assertion: {e}")))
}

/// Form fields for the authorization code grant.
#[derive(Serialize)]
pub struct CodeGrant<'a> {
    pub grant_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<&'a str>,
    pub client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<&'a str>,
    pub code: &'a str,
}

impl<'a> CodeGrant<'a> {
    pub fn new(code: &'a str, client_secret: &'a str) -> Self {
        Self {
            grant_type: "authorization_code",
            redirect_uri: None,
            client_secret,
            client_id: None,
            code,
        }
    }
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_endpoint: &str,
    grant: &CodeGrant<'_>,
) -> Result<TokenResponse> {
    debug!(
        token_endpoint,
        client_id = grant.client_id,
        redirect_uri = grant.redirect_uri,
        "exchanging authorization code"
    );

    let response = client
        .post(token_endpoint)
        .form(grant)
        .send()
        .await
        .map_err(|e| Error::Exchange(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Exchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::Exchange(format!("invalid token response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        TEST_KID, TEST_RSA_E, TEST_RSA_N, TEST_RSA_PRIVATE_KEY_PEM, spawn_issuer,
    };
    use axum::http::StatusCode;
    use jsonwebtoken::{DecodingKey, Validation};

    #[test]
    fn token_response_keeps_unknown_fields() {
        let json =
            r#"{"access_token":"at","id_token":"a.b.c","expires_in":3600,"token_type":"Bearer"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token.as_deref(), Some("at"));
        assert_eq!(token.id_token, Some(IdToken::Raw("a.b.c".into())));
        assert_eq!(token.extra["expires_in"], 3600);
    }

    #[test]
    fn claims_object_on_the_wire_is_never_verified() {
        let json = r#"{"access_token":"at","id_token":{"sub":"admin","iss":"forged"}}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        let id_token = token.id_token.unwrap();
        assert!(matches!(id_token, IdToken::Invalid(_)));
        assert!(id_token.claims().is_none());
        assert!(id_token.raw().is_none());
    }

    #[test]
    fn null_id_token_is_absent() {
        let token: TokenResponse = serde_json::from_str(r#"{"id_token":null}"#).unwrap();
        assert!(token.id_token.is_none());
    }

    #[test]
    fn verified_id_token_serializes_as_claims() {
        let mut claims = Map::new();
        claims.insert("sub".into(), Value::from("user-123"));
        let token = TokenResponse {
            access_token: None,
            id_token: Some(IdToken::Verified(claims)),
            extra: Map::new(),
        };
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["id_token"]["sub"], "user-123");
        assert!(json.get("access_token").is_none());
    }

    #[test]
    fn from_params_splits_tokens_from_the_rest() {
        let params = HashMap::from([
            ("state".to_string(), "abc".to_string()),
            ("id_token".to_string(), "x.y.z".to_string()),
        ]);
        let token = TokenResponse::from_params(&params);
        assert_eq!(token.id_token.unwrap().raw(), Some("x.y.z"));
        assert_eq!(token.extra["state"], "abc");
        assert!(token.access_token.is_none());
    }

    #[test]
    fn client_assertion_binds_code_client_and_endpoint() {
        let key = PrivateKey::pem(TEST_RSA_PRIVATE_KEY_PEM, Some(TEST_KID.into()));
        let jwt = client_assertion(&key, "c1", "https://issuer.example/token", "code-1").unwrap();

        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some(TEST_KID));

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&["https://issuer.example/token"]);
        validation.set_issuer(&["c1"]);
        let decoding = DecodingKey::from_rsa_components(TEST_RSA_N, TEST_RSA_E).unwrap();
        let data = jsonwebtoken::decode::<Value>(&jwt, &decoding, &validation).unwrap();

        assert_eq!(data.claims["ac"], "code-1");
        let iat = data.claims["iat"].as_u64().unwrap();
        let exp = data.claims["exp"].as_u64().unwrap();
        assert_eq!(exp - iat, 60);
    }

    #[test]
    fn client_assertion_with_bad_key_fails() {
        let key = PrivateKey::pem("garbage", None);
        let err = client_assertion(&key, "c1", "https://issuer.example/token", "code").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn exchange_posts_authorization_code_form() {
        let issuer = spawn_issuer(|_| {}).await;
        let client = reqwest::Client::new();

        let mut grant = CodeGrant::new("code-1", "s3cr3t");
        grant.client_id = Some("c1");
        grant.redirect_uri = Some("https://app/cb");

        let token = exchange_code(&client, &format!("{}/token", issuer.base), &grant)
            .await
            .unwrap();
        assert_eq!(token.access_token.as_deref(), Some("at_123"));
        assert!(matches!(token.id_token, Some(IdToken::Raw(_))));

        let requests = issuer.token_requests();
        assert_eq!(requests.len(), 1);
        let form = &requests[0];
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["code"], "code-1");
        assert_eq!(form["client_secret"], "s3cr3t");
        assert_eq!(form["client_id"], "c1");
        assert_eq!(form["redirect_uri"], "https://app/cb");
    }

    #[tokio::test]
    async fn exchange_rejected_by_issuer_is_an_exchange_error() {
        let issuer = spawn_issuer(|config| {
            config.token_status = StatusCode::BAD_REQUEST;
            config.token_body = r#"{"error":"invalid_grant"}"#.into();
        })
        .await;
        let client = reqwest::Client::new();

        let err = exchange_code(
            &client,
            &format!("{}/token", issuer.base),
            &CodeGrant::new("code", "secret"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Exchange(_)));
        assert!(err.to_string().contains("invalid_grant"), "got: {err}");
    }

    #[tokio::test]
    async fn exchange_with_non_json_body_is_an_exchange_error() {
        let issuer = spawn_issuer(|config| config.token_body = "<html>".into()).await;
        let client = reqwest::Client::new();

        let err = exchange_code(
            &client,
            &format!("{}/token", issuer.base),
            &CodeGrant::new("code", "secret"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Exchange(_)));
    }
}
