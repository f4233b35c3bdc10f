//! State token issuance and redemption
//!
//! A state token binds a pending authorization to the redirect that
//! completes it. Tokens are single-use: redemption removes the mapping
//! before anything else happens, whatever the outcome of the redirect leg.
//!
//! [`StateStore`] is the pluggable seam. Both operations are required
//! members of one trait, so a store that replaces only issuance or only
//! redemption cannot be constructed. [`MemoryStateStore`] is the in-process
//! implementation with a time-to-live.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::constants::{DEFAULT_STATE_TTL, STATE_TOKEN_BYTES};
use crate::discovery::DiscoveryDocument;
use crate::error::{Result, StateError};
use crate::observer::{Observer, Observers, Outcome};
use crate::options::{ClientOptions, PrivateKey};

/// Opaque, URL-safe state value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateToken(String);

impl StateToken {
    /// 128 bits from the thread-local CSPRNG, base64url without padding
    /// (22 characters).
    pub fn generate() -> Self {
        let mut bytes = [0u8; STATE_TOKEN_BYTES];
        rand::rng().fill(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StateToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Everything the redirect leg needs, remembered between the two legs.
pub struct PendingAuthorization {
    /// Signs the client assertion when no client secret is configured.
    pub private_key: Option<PrivateKey>,
    pub domain: String,
    pub discovery: DiscoveryDocument,
    /// Notified when the redirect leg completes.
    pub observer: Option<Observer>,
    /// Effective options. Still holds `client_secret` for the exchange.
    pub options: ClientOptions,
}

impl fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("domain", &self.domain)
            .field("discovery", &self.discovery)
            .field("has_private_key", &self.private_key.is_some())
            .field("has_observer", &self.observer.is_some())
            .field("options", &self.options)
            .finish()
    }
}

/// Single-use storage of pending authorizations keyed by state token.
///
/// Uses `Pin<Box<dyn Future>>` return types so stores can be shared as
/// `Arc<dyn StateStore>`.
pub trait StateStore: Send + Sync {
    /// Store `pending` under a fresh token and return the token.
    fn issue(
        &self,
        pending: PendingAuthorization,
    ) -> Pin<Box<dyn Future<Output = Result<StateToken>> + Send + '_>>;

    /// Look up and delete in one step. `None` when unknown or already redeemed.
    ///
    /// A store that discards an expired entry reports `StateError::Expired`
    /// to the entry's observer, since no redirect will ever complete it.
    fn redeem<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PendingAuthorization>>> + Send + 'a>>;
}

struct Entry {
    pending: PendingAuthorization,
    created_at: Instant,
}

/// In-process state store with a time-to-live.
///
/// Expired entries are dropped lazily on every `issue`, and by
/// [`spawn_sweep_task`] when one is running. Their observers are told the
/// attempt expired.
pub struct MemoryStateStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of pending authorizations, expired ones included until purged.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let expired = take_expired(&mut *self.entries.lock().await, self.ttl);
        let purged = expired.len();
        notify_expired(expired);
        purged
    }
}

fn take_expired(
    entries: &mut HashMap<String, Entry>,
    ttl: Duration,
) -> Vec<PendingAuthorization> {
    let stale: Vec<String> = entries
        .iter()
        .filter(|(_, e)| e.created_at.elapsed() >= ttl)
        .map(|(token, _)| token.clone())
        .collect();

    stale
        .iter()
        .filter_map(|token| entries.remove(token))
        .map(|e| e.pending)
        .collect()
}

/// Called with the store lock released.
fn notify_expired(expired: Vec<PendingAuthorization>) {
    for pending in expired {
        debug!(domain = %pending.domain, "pending authorization expired");
        Observers::new()
            .with(pending.observer)
            .notify(&Outcome::failure(StateError::Expired.into()));
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TTL)
    }
}

impl StateStore for MemoryStateStore {
    fn issue(
        &self,
        pending: PendingAuthorization,
    ) -> Pin<Box<dyn Future<Output = Result<StateToken>> + Send + '_>> {
        Box::pin(async move {
            let token = StateToken::generate();

            let expired = {
                let mut entries = self.entries.lock().await;
                let expired = take_expired(&mut entries, self.ttl);
                entries.insert(
                    token.as_str().to_owned(),
                    Entry {
                        pending,
                        created_at: Instant::now(),
                    },
                );
                debug!(pending = entries.len(), "state token issued");
                expired
            };
            notify_expired(expired);

            Ok(token)
        })
    }

    fn redeem<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<PendingAuthorization>>> + Send + 'a>> {
        Box::pin(async move {
            let entry = self.entries.lock().await.remove(token);

            match entry {
                None => Ok(None),
                Some(entry) if entry.created_at.elapsed() >= self.ttl => {
                    notify_expired(vec![entry.pending]);
                    Err(StateError::Expired.into())
                }
                Some(entry) => Ok(Some(entry.pending)),
            }
        })
    }
}

/// Spawn a background task that purges expired state entries every `interval`.
///
/// Bounds memory held by authorizations whose redirect never arrives.
pub fn spawn_sweep_task(
    store: Arc<MemoryStateStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Nothing can have expired yet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                info!(purged, "purged expired state tokens");
            }
        }
    })
}
