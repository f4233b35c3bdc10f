//! Common types shared by the OIDC client library and the login gateway

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
