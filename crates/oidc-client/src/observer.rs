//! Completion observers
//!
//! The result of a redirect leg is an [`Outcome`]: an optional error and an
//! optional token set, possibly both. It is delivered to every registered
//! observer in registration order.

use std::sync::Arc;

use crate::error::Error;
use crate::token::TokenResponse;

/// The `(error, result)` pair produced by a flow leg.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    pub error: Option<Error>,
    pub tokens: Option<TokenResponse>,
}

impl Outcome {
    pub fn success(tokens: TokenResponse) -> Self {
        Self {
            error: None,
            tokens: Some(tokens),
        }
    }

    pub fn failure(error: Error) -> Self {
        Self {
            error: Some(error),
            tokens: None,
        }
    }

    /// An error that still carries whatever tokens were obtained.
    pub fn partial(error: Error, tokens: TokenResponse) -> Self {
        Self {
            error: Some(error),
            tokens: Some(tokens),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Receives the outcome of an authorization attempt.
pub trait CompletionObserver: Send + Sync {
    fn on_complete(&self, outcome: &Outcome);
}

impl<F> CompletionObserver for F
where
    F: Fn(&Outcome) + Send + Sync,
{
    fn on_complete(&self, outcome: &Outcome) {
        self(outcome)
    }
}

/// Shared handle to an observer.
pub type Observer = Arc<dyn CompletionObserver>;

/// Ordered set of observers notified with the same outcome.
#[derive(Default, Clone)]
pub struct Observers(Vec<Observer>);

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `observer` if present.
    pub fn with(mut self, observer: Option<Observer>) -> Self {
        self.0.extend(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn notify(&self, outcome: &Outcome) {
        for observer in &self.0 {
            observer.on_complete(outcome);
        }
    }
}
