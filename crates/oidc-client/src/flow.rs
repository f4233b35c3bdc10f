//! Authorization flow orchestration
//!
//! [`Client::begin`] runs discovery, records the pending authorization under
//! a fresh state token, and returns the URL to send the user agent to.
//! [`Client::handle_redirect`] completes the flow: redeem the state token,
//! exchange the code if one was returned, verify the ID token, and notify
//! the observers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};
use url::Url;

use crate::constants::{
    CLIENT_SECRET_PARAM, DEFAULT_STATE_TTL, OADA_CONFIGURATION, OPENID_CONFIGURATION,
};
use crate::discovery::{self, DiscoveryScheme};
use crate::error::{Error, Result, StateError};
use crate::id_token;
use crate::observer::{Observer, Observers, Outcome};
use crate::options::{ClientOptions, ScopePolicy};
use crate::state::{MemoryStateStore, PendingAuthorization, StateStore, StateToken};
use crate::token::{self, CodeGrant, IdToken, TokenResponse};

/// Configures and builds a [`Client`].
pub struct ClientBuilder {
    http: Option<reqwest::Client>,
    defaults: ClientOptions,
    state_store: Option<Arc<dyn StateStore>>,
    state_ttl: Duration,
    discovery_scheme: DiscoveryScheme,
    scope_policy: ScopePolicy,
    access_document: String,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            http: None,
            defaults: ClientOptions::default(),
            state_store: None,
            state_ttl: DEFAULT_STATE_TTL,
            discovery_scheme: DiscoveryScheme::default(),
            scope_policy: ScopePolicy::default(),
            access_document: OADA_CONFIGURATION.to_string(),
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Options applied to every attempt unless overridden per call.
    pub fn defaults(mut self, defaults: ClientOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Replace the in-process store. The TTL setting is then ignored.
    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    pub fn state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    pub fn discovery_scheme(mut self, scheme: DiscoveryScheme) -> Self {
        self.discovery_scheme = scheme;
        self
    }

    pub fn scope_policy(mut self, policy: ScopePolicy) -> Self {
        self.scope_policy = policy;
        self
    }

    /// Well-known document read by [`Client::get_access_token`].
    pub fn access_document(mut self, document: impl Into<String>) -> Self {
        self.access_document = document.into();
        self
    }

    pub fn build(self) -> Result<Client> {
        if self.state_ttl.is_zero() {
            return Err(Error::Configuration(
                "state TTL must be greater than zero".into(),
            ));
        }
        if self.access_document.trim().is_empty() {
            return Err(Error::Configuration(
                "access document name must not be empty".into(),
            ));
        }
        if let Some(key) = &self.defaults.private_key {
            key.encoding_key()?;
        }

        let state_store = self
            .state_store
            .unwrap_or_else(|| Arc::new(MemoryStateStore::new(self.state_ttl)));

        Ok(Client {
            inner: Arc::new(Inner {
                http: self.http.unwrap_or_default(),
                defaults: self.defaults,
                state_store,
                discovery_scheme: self.discovery_scheme,
                scope_policy: self.scope_policy,
                access_document: self.access_document,
            }),
        })
    }
}

struct Inner {
    http: reqwest::Client,
    defaults: ClientOptions,
    state_store: Arc<dyn StateStore>,
    discovery_scheme: DiscoveryScheme,
    scope_policy: ScopePolicy,
    access_document: String,
}

/// Authorization code flow client. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn defaults(&self) -> &ClientOptions {
        &self.inner.defaults
    }

    pub fn state_store(&self) -> &Arc<dyn StateStore> {
        &self.inner.state_store
    }

    /// Begin the identity-token flow against `domain`'s OpenID configuration.
    pub async fn get_id_token(
        &self,
        domain: &str,
        options: &ClientOptions,
        observer: Option<Observer>,
    ) -> Result<Url> {
        let requested = self.inner.defaults.merge(options).scope;
        let mut options = options.clone();
        options.scope = Some(self.inner.scope_policy.apply(requested.as_deref()));

        self.begin(domain, OPENID_CONFIGURATION, &options, observer)
            .await
    }

    /// Begin the access-token flow against `domain`'s access document.
    pub async fn get_access_token(
        &self,
        domain: &str,
        options: &ClientOptions,
        observer: Option<Observer>,
    ) -> Result<Url> {
        self.begin(domain, &self.inner.access_document, options, observer)
            .await
    }

    /// Start an authorization attempt and return the authorization URL.
    ///
    /// A failure is reported to `observer` as well as returned.
    #[instrument(skip_all, fields(domain = %domain, document = %document))]
    pub async fn begin(
        &self,
        domain: &str,
        document: &str,
        options: &ClientOptions,
        observer: Option<Observer>,
    ) -> Result<Url> {
        let options = self.inner.defaults.merge(options);

        match self
            .authorization_url(domain, document, options, observer.clone())
            .await
        {
            Ok(url) => {
                info!("authorization started");
                Ok(url)
            }
            Err(e) => {
                warn!(error = %e, "authorization could not start");
                Observers::new()
                    .with(observer)
                    .notify(&Outcome::failure(e.clone()));
                Err(e)
            }
        }
    }

    async fn authorization_url(
        &self,
        domain: &str,
        document: &str,
        mut options: ClientOptions,
        observer: Option<Observer>,
    ) -> Result<Url> {
        let discovery =
            discovery::fetch(&self.inner.http, self.inner.discovery_scheme, domain, document)
                .await?;

        let endpoint = Url::parse(&discovery.authorization_endpoint).map_err(|e| {
            Error::Discovery(format!(
                "invalid authorization_endpoint {:?}: {e}",
                discovery.authorization_endpoint
            ))
        })?;

        let params: Vec<(String, String)> = options
            .query_pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let pending = PendingAuthorization {
            private_key: options.private_key.take(),
            domain: domain.to_string(),
            discovery,
            observer,
            options,
        };
        let state = self.inner.state_store.issue(pending).await?;

        Ok(authorization_url(endpoint, &state, &params))
    }

    /// Complete an authorization attempt from the redirect's query parameters.
    ///
    /// Observers are notified in order: the one registered when the attempt
    /// began, then `observer`. A redirect that does not match a pending
    /// attempt is reported to `observer` only.
    #[instrument(skip_all, fields(domain))]
    pub async fn handle_redirect(
        &self,
        params: &HashMap<String, String>,
        observer: Option<Observer>,
    ) -> Outcome {
        let pending = match self.redeem(params.get("state")).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "redirect rejected");
                let outcome = Outcome::partial(e, TokenResponse::from_params(params));
                Observers::new().with(observer).notify(&outcome);
                return outcome;
            }
        };
        tracing::Span::current().record("domain", pending.domain.as_str());

        let outcome = self.complete(&pending, params).await;
        match &outcome.error {
            None => info!("authorization completed"),
            Some(e) => warn!(error = %e, kind = e.kind(), "authorization failed"),
        }

        Observers::new()
            .with(pending.observer.clone())
            .with(observer)
            .notify(&outcome);
        outcome
    }

    async fn redeem(&self, state: Option<&String>) -> Result<PendingAuthorization> {
        let state = state.ok_or(StateError::Spurious)?;
        self.inner
            .state_store
            .redeem(state)
            .await?
            .ok_or_else(|| StateError::Spurious.into())
    }

    async fn complete(
        &self,
        pending: &PendingAuthorization,
        params: &HashMap<String, String>,
    ) -> Outcome {
        let mut tokens = match params.get("code") {
            None => TokenResponse::from_params(params),
            Some(code) => match self.exchange(pending, code).await {
                Ok(tokens) => tokens,
                Err(e) => return Outcome::failure(e),
            },
        };

        let raw = match &tokens.id_token {
            None => return Outcome::success(tokens),
            Some(IdToken::Raw(raw)) => raw.clone(),
            Some(IdToken::Invalid(_) | IdToken::Verified(_)) => {
                let error = Error::MalformedIdToken("id_token is not a compact JWS string".into());
                return Outcome::partial(error, tokens);
            }
        };

        match id_token::verify(
            &self.inner.http,
            &pending.discovery,
            pending.options.client_id.as_deref(),
            &raw,
        )
        .await
        {
            Ok(claims) => {
                tokens.id_token = Some(IdToken::Verified(claims));
                Outcome::success(tokens)
            }
            Err(e) => Outcome::partial(e, tokens),
        }
    }

    async fn exchange(&self, pending: &PendingAuthorization, code: &str) -> Result<TokenResponse> {
        let token_endpoint = pending
            .discovery
            .token_endpoint
            .as_deref()
            .ok_or_else(|| Error::Exchange("discovery document has no token_endpoint".into()))?;
        let client_id = pending.options.client_id.as_deref();

        let configured_secret = pending
            .options
            .client_secret
            .as_ref()
            .filter(|secret| !secret.expose().is_empty());

        let assertion;
        let client_secret = match (configured_secret, &pending.private_key) {
            (Some(secret), _) => secret.expose().as_str(),
            (None, Some(key)) => {
                let client_id = client_id.ok_or_else(|| {
                    Error::Exchange("a client assertion requires a client_id".into())
                })?;
                assertion = token::client_assertion(key, client_id, token_endpoint, code)?;
                assertion.as_str()
            }
            (None, None) => {
                return Err(Error::Exchange(
                    "neither a client_secret nor a private key is configured".into(),
                ));
            }
        };

        let mut grant = CodeGrant::new(code, client_secret);
        grant.client_id = client_id;
        grant.redirect_uri = pending.options.redirect_uri.as_deref();

        token::exchange_code(&self.inner.http, token_endpoint, &grant).await
    }
}

/// Append `state` and the authorization parameters to `endpoint`.
///
/// Any query the endpoint already carries is kept. `client_secret` is
/// dropped wherever it appears, and a caller-supplied `state` cannot
/// displace the issued one.
fn authorization_url(mut endpoint: Url, state: &StateToken, params: &[(String, String)]) -> Url {
    let existing: Vec<(String, String)> = endpoint
        .query_pairs()
        .into_owned()
        .filter(|(k, _)| k != CLIENT_SECRET_PARAM && k != "state")
        .collect();

    {
        let mut query = endpoint.query_pairs_mut();
        query.clear();
        query.extend_pairs(&existing);
        query.append_pair("state", state.as_str());
        query.extend_pairs(
            params
                .iter()
                .filter(|(k, _)| k != CLIENT_SECRET_PARAM && k != "state"),
        );
    }

    endpoint
}
