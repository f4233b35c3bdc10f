//! OpenID Connect / OAuth 2.0 authorization code flow client
//!
//! Drives the client side of the authorization code flow against issuers
//! found by domain-based discovery. The library has no web-framework
//! dependency: the host mounts the two legs wherever it likes.
//!
//! Flow:
//! 1. `Client::get_id_token()` / `Client::get_access_token()` fetch the
//!    issuer's well-known document, store a `PendingAuthorization` under a
//!    fresh `StateToken`, and return the authorization URL
//! 2. The user agent is redirected there and comes back with `state` and `code`
//! 3. `Client::handle_redirect()` redeems the state token, exchanges the code
//!    at the token endpoint via `token::exchange_code()`
//! 4. The ID token is checked by `id_token::verify()` against the key that
//!    `jwks::resolve()` selects from the issuer's key set
//! 5. The `Outcome` is delivered to the registered `CompletionObserver`s

pub mod constants;
pub mod discovery;
pub mod error;
pub mod flow;
pub mod id_token;
pub mod jwks;
pub mod observer;
pub mod options;
pub mod state;
pub mod token;

#[cfg(test)]
mod testing;

pub use constants::*;
pub use discovery::{DiscoveryDocument, DiscoveryScheme};
pub use error::{Error, KeyResolutionError, Result, StateError};
pub use flow::{Client, ClientBuilder};
pub use observer::{CompletionObserver, Observer, Observers, Outcome};
pub use options::{ClientOptions, KeyEncoding, PrivateKey, ScopePolicy};
pub use state::{
    MemoryStateStore, PendingAuthorization, StateStore, StateToken, spawn_sweep_task,
};
pub use token::{IdToken, TokenResponse};
pub use url::Url;
