//! Protocol constants
//!
//! Well-known document names, fixed scopes, and the default lifetimes used
//! by the flow. Lifetimes can be overridden on [`crate::ClientBuilder`].

use std::time::Duration;

/// Discovery document for the OIDC identity-token flow.
pub const OPENID_CONFIGURATION: &str = "openid-configuration";

/// Discovery document for the domain access-token flow.
pub const OADA_CONFIGURATION: &str = "oada-configuration";

/// Scope requested by the identity-token flow.
pub const ID_TOKEN_SCOPE: &str = "openid profile";

/// Authorization request parameter that must never reach a browser.
pub const CLIENT_SECRET_PARAM: &str = "client_secret";

/// How long an issued state token stays redeemable.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

/// Lifetime of the signed client assertion sent to the token endpoint.
pub const CLIENT_ASSERTION_TTL: Duration = Duration::from_secs(60);

/// Clock skew tolerated when checking ID token `exp`/`nbf`.
pub const ID_TOKEN_LEEWAY_SECS: u64 = 60;

/// Raw bytes of randomness in a state token (128 bits).
pub const STATE_TOKEN_BYTES: usize = 16;
