use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// Web API key of the Firebase project (not a secret; it scopes requests
    /// to the project, authorization is the id token).
    pub api_key: String,
    /// Firebase project id, e.g. `reeldeck-prod`.
    pub project_id: String,
    /// Per-request timeout for both auth and Firestore calls.
    pub request_timeout: Duration,
}

impl FirebaseConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            api_key: env_required("FIREBASE_API_KEY")?,
            project_id: env_required("FIREBASE_PROJECT_ID")?,
            request_timeout: Duration::from_secs(env_parse(
                "FIREBASE_REQUEST_TIMEOUT_SECS",
                30,
            )?),
        })
    }

    /// Base URL for the project's default Firestore database.
    pub fn firestore_base(&self) -> String {
        format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents",
            self.project_id
        )
    }

    /// Identity Toolkit endpoint for the given account action.
    pub fn auth_endpoint(&self, action: &str) -> String {
        format!(
            "https://identitytoolkit.googleapis.com/v1/accounts:{action}?key={}",
            self.api_key
        )
    }
}

fn env_required(key: &str) -> anyhow::Result<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Missing required env var {key}"))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}
