//! Per-account OAuth2 sessions cached on disk.
//!
//! Each account (email address) gets one JSON file under the token directory
//! holding its refresh token and the most recent access token. Sessions are
//! refreshed when loaded and never during a run.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::config::OAuthConfig;
use crate::error::{Error, Result};
use crate::store;

/// Scope needed to read and create contacts and groups
pub const CONTACTS_SCOPE: &str = "https://www.googleapis.com/auth/contacts";

/// Refresh this many seconds before the recorded expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

/// A usable access token for one account
#[derive(Debug, Clone)]
pub struct Credential {
    pub account: String,
    pub access_token: String,
}

/// Resolves an account identifier to a credential
#[allow(async_fn_in_trait)]
pub trait CredentialProvider {
    async fn authorize(&self, account: &str) -> Result<Credential>;
}

/// Persisted session for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub account: String,
    pub refresh_token: String,
    pub access_token: String,
    /// Unix timestamp (seconds) after which the access token is invalid
    pub expires_at: i64,
}

impl AuthSession {
    pub fn is_expired(&self, now: i64) -> bool {
        now + EXPIRY_MARGIN_SECS >= self.expires_at
    }

    pub fn credential(&self) -> Credential {
        Credential {
            account: self.account.clone(),
            access_token: self.access_token.clone(),
        }
    }

    pub fn expires_at_display(&self) -> String {
        OffsetDateTime::from_unix_timestamp(self.expires_at)
            .ok()
            .and_then(|at| at.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.expires_at.to_string())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// File-backed credential provider
pub struct TokenStore {
    dir: PathBuf,
    oauth: OAuthConfig,
    http: Client,
}

impl TokenStore {
    pub fn new(dir: impl Into<PathBuf>, oauth: OAuthConfig, http: Client) -> Self {
        Self {
            dir: dir.into(),
            oauth,
            http,
        }
    }

    pub fn session_path(&self, account: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_filename(account)))
    }

    pub fn load(&self, account: &str) -> Result<Option<AuthSession>> {
        let path = self.session_path(account);
        if !path.exists() {
            return Ok(None);
        }
        store::read_json(&path).map(Some)
    }

    pub fn save(&self, session: &AuthSession) -> Result<()> {
        let path = self.session_path(&session.account);
        store::write_private_json(&path, session)
    }

    /// Consent page URL for the console authorization flow
    pub fn authorization_url(&self, account: &str, state: &str) -> Result<Url> {
        let client_id = self.client_id()?;
        Url::parse_with_params(
            &self.oauth.auth_url,
            &[
                ("client_id", client_id),
                ("redirect_uri", self.oauth.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", CONTACTS_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("login_hint", account),
                ("state", state),
            ],
        )
        .map_err(|err| Error::Auth(format!("invalid authorization URL {}: {err}", self.oauth.auth_url)))
    }

    /// Interactive first authorization: print the consent URL, read the code
    /// from standard input, exchange it and persist the session.
    pub async fn login(&self, account: &str) -> Result<AuthSession> {
        let state = uuid::Uuid::new_v4().to_string();
        let url = self.authorization_url(account, &state)?;

        println!("Open this URL in a browser and sign in as {account}:");
        println!();
        println!("  {url}");
        println!();
        print!("Paste the `code` parameter from the redirected URL: ");
        io::stdout()
            .flush()
            .map_err(|source| Error::Io { path: PathBuf::from("<stdout>"), source })?;

        let mut code = String::new();
        io::stdin()
            .lock()
            .read_line(&mut code)
            .map_err(|source| Error::Io { path: PathBuf::from("<stdin>"), source })?;
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::validation("authorization code cannot be empty"));
        }

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id()?),
            ("client_secret", self.client_secret()?),
            ("redirect_uri", self.oauth.redirect_uri.as_str()),
        ];
        let token = self.request_token(&form).await?;
        let refresh_token = token.refresh_token.ok_or_else(|| {
            Error::Auth("token endpoint did not return a refresh token".to_string())
        })?;

        let session = AuthSession {
            account: account.to_string(),
            refresh_token,
            access_token: token.access_token,
            expires_at: now() + token.expires_in,
        };
        self.save(&session)?;
        info!(account, "stored new session");
        Ok(session)
    }

    async fn refresh(&self, session: &AuthSession) -> Result<AuthSession> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", session.refresh_token.as_str()),
            ("client_id", self.client_id()?),
            ("client_secret", self.client_secret()?),
        ];
        let token = self.request_token(&form).await?;

        Ok(AuthSession {
            account: session.account.clone(),
            refresh_token: token
                .refresh_token
                .unwrap_or_else(|| session.refresh_token.clone()),
            access_token: token.access_token,
            expires_at: now() + token.expires_in,
        })
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let endpoint = self.oauth.token_url.as_str();
        let response = self
            .http
            .post(endpoint)
            .form(form)
            .send()
            .await
            .map_err(|source| Error::Http {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {description}", err.error),
                    None => err.error,
                },
                Err(_) => format!("token endpoint returned {status}"),
            };
            return Err(Error::Auth(reason));
        }

        response.json().await.map_err(|source| Error::Http {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    fn client_id(&self) -> Result<&str> {
        self.oauth.client_id.as_deref().ok_or_else(|| {
            Error::validation("oauth.client_id is not configured (or set PEOPLESYNC_CLIENT_ID)")
        })
    }

    fn client_secret(&self) -> Result<&str> {
        self.oauth.client_secret.as_deref().ok_or_else(|| {
            Error::validation(
                "oauth.client_secret is not configured (or set PEOPLESYNC_CLIENT_SECRET)",
            )
        })
    }
}

impl CredentialProvider for TokenStore {
    async fn authorize(&self, account: &str) -> Result<Credential> {
        let Some(session) = self.load(account)? else {
            return Err(Error::Auth(format!(
                "no stored session for {account}; run `peoplesync auth login --account {account}`"
            )));
        };

        if !session.is_expired(now()) {
            debug!(account, "using cached access token");
            return Ok(session.credential());
        }

        debug!(account, "refreshing access token");
        let refreshed = self.refresh(&session).await?;
        self.save(&refreshed)?;
        Ok(refreshed.credential())
    }
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Sanitize a string for use as a filename
fn sanitize_filename(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use tempfile::TempDir;

    fn store(dir: &Path) -> TokenStore {
        let oauth = OAuthConfig {
            client_id: Some("client-123".into()),
            client_secret: Some("secret".into()),
            ..OAuthConfig::default()
        };
        TokenStore::new(dir, oauth, Client::new())
    }

    fn session(expires_at: i64) -> AuthSession {
        AuthSession {
            account: "ada@example.com".into(),
            refresh_token: "refresh".into(),
            access_token: "access".into(),
            expires_at,
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        assert!(store.load("ada@example.com").unwrap().is_none());

        let saved = session(1_900_000_000);
        store.save(&saved).unwrap();
        assert_eq!(store.load("ada@example.com").unwrap(), Some(saved));
        assert!(temp.path().join("ada@example.com.json").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_session_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        store.save(&session(1_900_000_000)).unwrap();

        let path = store.session_path("ada@example.com");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_expiry_margin() {
        let s = session(1_000);
        assert!(!s.is_expired(900));
        assert!(s.is_expired(940));
        assert!(s.is_expired(2_000));
    }

    #[test]
    fn test_session_path_is_sanitized() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        assert_eq!(
            store.session_path("a/b:c@example.com"),
            temp.path().join("a_b_c@example.com.json")
        );
    }

    #[test]
    fn test_authorization_url() {
        let temp = TempDir::new().unwrap();
        let url = store(temp.path())
            .authorization_url("ada@example.com", "state-1")
            .unwrap();
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("client_id".into(), "client-123".into())));
        assert!(query.contains(&("scope".into(), CONTACTS_SCOPE.into())));
        assert!(query.contains(&("login_hint".into(), "ada@example.com".into())));
        assert!(query.contains(&("access_type".into(), "offline".into())));
    }

    #[test]
    fn test_authorization_url_requires_client_id() {
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path(), OAuthConfig::default(), Client::new());
        assert!(matches!(
            store.authorization_url("ada@example.com", "s"),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_authorize_without_session_fails() {
        let temp = TempDir::new().unwrap();
        let err = store(temp.path())
            .authorize("nobody@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(err.to_string().contains("auth login --account nobody@example.com"));
    }

    #[tokio::test]
    async fn test_authorize_uses_fresh_token_without_network() {
        let temp = TempDir::new().unwrap();
        let store = store(temp.path());
        store.save(&session(now() + 3_600)).unwrap();

        let credential = store.authorize("ada@example.com").await.unwrap();
        assert_eq!(credential.access_token, "access");
        assert_eq!(credential.account, "ada@example.com");
    }

    #[test]
    fn test_expires_at_display() {
        assert_eq!(session(0).expires_at_display(), "1970-01-01T00:00:00Z");
    }
}
