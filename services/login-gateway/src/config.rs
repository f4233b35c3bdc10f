//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from OIDC_CLIENT_SECRET or client_secret_file,
//! never stored in the TOML directly.

use common::Secret;
use oidc_client::{
    ClientOptions, DiscoveryScheme, KeyEncoding, OADA_CONFIGURATION, PrivateKey, ScopePolicy,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub oidc: OidcConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Issuer and client registration
#[derive(Debug, Deserialize)]
pub struct OidcConfig {
    /// Domain whose well-known documents are discovered
    pub domain: String,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,
    /// Discover over plain http (local development only)
    #[serde(default)]
    pub insecure_discovery: bool,
    #[serde(default)]
    pub scope_policy: ScopePolicy,
    #[serde(default = "default_access_document")]
    pub access_document: String,
    /// Timeout for discovery, key set, and token endpoint requests
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to OIDC_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub private_key: Option<PrivateKeyConfig>,
    /// Extra authorization request parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Private key used to sign client assertions
#[derive(Debug, Deserialize)]
pub struct PrivateKeyConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub kty: KeyEncoding,
}

fn default_max_connections() -> usize {
    1000
}

fn default_state_ttl_secs() -> u64 {
    600
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_access_document() -> String {
    OADA_CONFIGURATION.to_string()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. OIDC_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.oidc.state_ttl_secs == 0 {
            return Err(common::Error::Config(
                "state_ttl_secs must be greater than 0".into(),
            ));
        }

        if config.oidc.http_timeout_secs == 0 {
            return Err(common::Error::Config(
                "http_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.oidc.domain.trim().is_empty() {
            return Err(common::Error::Config("domain must not be empty".into()));
        }

        if !config.oidc.redirect_uri.starts_with("http://")
            && !config.oidc.redirect_uri.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "redirect_uri must start with http:// or https://, got: {}",
                config.oidc.redirect_uri
            )));
        }

        if let Ok(secret) = std::env::var("OIDC_CLIENT_SECRET") {
            config.oidc.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.oidc.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.oidc.client_secret = Some(Secret::new(secret));
            }
        }

        if config.oidc.client_secret.is_none() && config.oidc.private_key.is_none() {
            return Err(common::Error::Config(
                "either a client secret or [oidc.private_key] is required to exchange codes"
                    .into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("oidc-login-gateway.toml")
    }
}

impl OidcConfig {
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn discovery_scheme(&self) -> DiscoveryScheme {
        if self.insecure_discovery {
            DiscoveryScheme::Http
        } else {
            DiscoveryScheme::Https
        }
    }

    /// Client defaults for every login attempt. Reads the private key file.
    pub fn client_options(&self) -> common::Result<ClientOptions> {
        let mut options = ClientOptions::new()
            .with_client_id(&self.client_id)
            .with_redirect_uri(&self.redirect_uri);
        if let Some(scope) = &self.scope {
            options = options.with_scope(scope);
        }
        if let Some(prompt) = &self.prompt {
            options = options.with_prompt(prompt);
        }
        options.client_secret = self.client_secret.clone();

        if let Some(key) = &self.private_key {
            let material =
                std::fs::read(&key.path).map_err(|e| common::Error::file(&key.path, e))?;
            options = options.with_private_key(PrivateKey::new(key.kty, material, key.kid.clone()));
        }

        for (name, value) in &self.params {
            options = options.with_param(name, value);
        }

        Ok(options)
    }
}
