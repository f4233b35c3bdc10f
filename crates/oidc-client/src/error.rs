//! Error types for the authorization flow
//!
//! Every error carries owned strings rather than source errors so the same
//! value can be handed to several completion observers.

/// Reasons a state token could not be redeemed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// Unknown, missing, or already redeemed state token.
    #[error("spurious redirect received: no pending authorization for this state")]
    Spurious,

    #[error("state token expired before the redirect arrived")]
    Expired,

    #[error("state store failure: {0}")]
    Store(String),
}

/// Reasons the signing key for an ID token could not be found.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyResolutionError {
    #[error("discovery document does not advertise a jwks_uri")]
    MissingJwksUri,

    #[error("key set unreachable: {0}")]
    Unreachable(String),

    #[error("key set unparsable: {0}")]
    Unparsable(String),

    #[error("no key in the key set matches kid {0:?}")]
    NotFound(Option<String>),
}

/// Errors from discovery, redirect construction, code exchange, and ID token
/// verification.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    KeyResolution(#[from] KeyResolutionError),

    #[error("could not decode ID token as JWT: {0}")]
    MalformedIdToken(String),

    #[error("ID token verification failed: {0}")]
    Verification(String),

    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Short label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Discovery(_) => "discovery",
            Error::State(_) => "state",
            Error::KeyResolution(_) => "key_resolution",
            Error::MalformedIdToken(_) => "malformed_id_token",
            Error::Verification(_) => "verification",
            Error::Exchange(_) => "exchange",
            Error::Configuration(_) => "configuration",
        }
    }
}

/// Result alias for flow operations.
pub type Result<T> = std::result::Result<T, Error>;
