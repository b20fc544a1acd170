//! `IdentityProvider` connector for the Firebase Identity Toolkit REST API.
//!
//! Sign-up and sign-in exchange email credentials for an id token and the
//! account's local id. The token lands in a [`TokenSlot`] shared with the
//! Firestore connector; session transitions are broadcast on a watch
//! channel, matching the provider-initiated listener model the core's
//! session tracker consumes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};

use catalog::{AuthError, AuthState, IdentityProvider, UserId};

use crate::config::FirebaseConfig;

/// Holder for the current session's id token, shared between the auth and
/// Firestore connectors. Empty while signed out.
#[derive(Clone, Default)]
pub struct TokenSlot {
    inner: Arc<RwLock<Option<String>>>,
}

impl TokenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<String> {
        self.inner.read().await.clone()
    }

    async fn set(&self, token: String) {
        *self.inner.write().await = Some(token);
    }

    async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: String,
    local_id: String,
}

pub struct FirebaseAuth {
    config: FirebaseConfig,
    client: reqwest::Client,
    token: TokenSlot,
    session: watch::Sender<AuthState>,
}

impl FirebaseAuth {
    pub fn new(config: FirebaseConfig, token: TokenSlot) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::Unknown(format!("Failed to create HTTP client: {e}")))?;
        let (session, _) = watch::channel(AuthState::Unknown);
        Ok(Self {
            config,
            client,
            token,
            session,
        })
    }

    /// There is no persisted session to restore over REST, so startup
    /// resolves straight to signed-out.
    pub fn announce_signed_out(&self) {
        let _ = self.session.send(AuthState::SignedOut);
    }

    async fn account_request(&self, action: &str, email: &str, password: &str) -> Result<UserId, AuthError> {
        let url = self.config.auth_endpoint(action);
        let body = json!({
            "email": email,
            "password": password,
            "returnSecureToken": true
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Unknown(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Unknown(e.to_string()))?;

        if !status.is_success() {
            let code = error_code(&body);
            warn!(action, code = %code, "account request rejected");
            return Err(map_auth_code(&code));
        }

        let tokens: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::Unknown(format!("Malformed token response: {e}")))?;
        let user = UserId(tokens.local_id);
        self.token.set(tokens.id_token).await;
        let _ = self.session.send(AuthState::SignedIn(user.clone()));
        debug!(action, user = %user, "session established");
        Ok(user)
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.session.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        self.account_request("signUp", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, AuthError> {
        self.account_request("signInWithPassword", email, password)
            .await
    }

    /// Federated sign-in needs a browser redirect the REST surface cannot
    /// drive; callers land on the email/password path instead.
    async fn sign_in_with_provider(&self, provider: &str) -> Result<UserId, AuthError> {
        Err(AuthError::Unknown(format!(
            "federated sign-in with {provider} requires a browser flow"
        )))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.token.clear().await;
        let _ = self.session.send(AuthState::SignedOut);
        Ok(())
    }
}

/// Pull the Identity Toolkit error code out of a failure body, e.g.
/// `{"error":{"message":"EMAIL_EXISTS"}}`.
fn error_code(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(serde_json::Value::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn map_auth_code(code: &str) -> AuthError {
    // Codes may carry a suffix, e.g. "TOO_MANY_ATTEMPTS_TRY_LATER : ...".
    let base = code.split_whitespace().next().unwrap_or(code);
    match base {
        "EMAIL_EXISTS" => AuthError::EmailInUse,
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL" => {
            AuthError::InvalidCredential
        }
        "USER_DISABLED" => AuthError::InvalidCredential,
        other => AuthError::Unknown(other.to_string()),
    }
}
