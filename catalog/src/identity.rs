//! Identity-provider interface and session state.
//!
//! The provider's ambient session is surfaced as one subscribed stream;
//! everything downstream reads the identity from current state at the
//! moment of use, never from a value captured across a suspension point.

use async_trait::async_trait;
use shared_types::UserId;
use tokio::sync::watch;

use crate::error::AuthError;

/// Current authentication state as reported by the identity provider.
///
/// `Unknown` until the provider's first notification arrives, then either
/// `SignedOut` or `SignedIn` on every subsequent change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Unknown,
    SignedOut,
    SignedIn(UserId),
}

impl AuthState {
    pub fn user(&self) -> Option<&UserId> {
        match self {
            AuthState::SignedIn(user) => Some(user),
            _ => None,
        }
    }
}

/// Async interface to the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Subscribe to session changes. The receiver's current value is the
    /// last reported state.
    fn subscribe(&self) -> watch::Receiver<AuthState>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserId, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError>;

    /// Popup-based federated sign-in (e.g. "google"). Only meaningful in a
    /// browser shell; other connectors report [`AuthError::Unknown`].
    async fn sign_in_with_provider(&self, provider: &str) -> Result<UserId, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}
