//! Credentials and the authenticator that applies them to requests.
//!
//! Basic API-key and session-token credentials are immutable. An IAM token
//! is refreshed before use once it is within the skew window of its expiry;
//! refreshes are single-flight, so concurrent calls observing an expiring
//! token trigger exactly one exchange with the IAM endpoint.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;

use crate::error::Error;
use crate::request::{ApiRequest, TransportKind};
use crate::secret::SecretString;

pub mod iam;

pub use iam::{IamAccount, IamClient};

/// Refresh an IAM token this long before it expires.
pub const DEFAULT_REFRESH_SKEW: TimeDelta = TimeDelta::seconds(60);

/// An IAM access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamToken {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
    /// IAM account the token is scoped to
    pub account_id: Option<String>,
    /// Classic-infrastructure account linked to `account_id`
    pub ims_account: Option<String>,
}

impl IamToken {
    pub fn new(access_token: impl Into<SecretString>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            account_id: None,
            ims_account: None,
        }
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<SecretString>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    #[must_use]
    pub fn with_account(mut self, account_id: Option<String>, ims_account: Option<String>) -> Self {
        self.account_id = account_id;
        self.ims_account = ims_account;
        self
    }

    /// `now + skew >= expires_at`. Tokens without an expiry never need a refresh.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>, skew: TimeDelta) -> bool {
        self.expires_at.is_some_and(|expires_at| now + skew >= expires_at)
    }
}

/// How a call is authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    BasicApiKey {
        username: String,
        api_key: SecretString,
    },
    SessionToken {
        user_id: i64,
        auth_token: SecretString,
    },
    Iam(IamToken),
}

impl Credential {
    pub fn basic(username: impl Into<String>, api_key: impl Into<SecretString>) -> Self {
        Credential::BasicApiKey {
            username: username.into(),
            api_key: api_key.into(),
        }
    }

    pub fn session(user_id: i64, auth_token: impl Into<SecretString>) -> Self {
        Credential::SessionToken {
            user_id,
            auth_token: auth_token.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::BasicApiKey { .. } => "basic_api_key",
            Credential::SessionToken { .. } => "session_token",
            Credential::Iam(_) => "iam_token",
        }
    }

    /// Attach the credential to a request for the given wire encoding.
    pub fn apply(&self, request: &mut ApiRequest, transport: TransportKind) {
        match (self, transport) {
            (Credential::BasicApiKey { username, api_key }, TransportKind::XmlRpc) => {
                request.headers.insert(
                    "authenticate".to_owned(),
                    json!({ "username": username, "apiKey": api_key.expose() }),
                );
            }
            (Credential::BasicApiKey { username, api_key }, TransportKind::Rest) => {
                request.transport_user = Some(username.clone());
                request.transport_password = Some(api_key.clone());
            }
            (Credential::SessionToken { user_id, auth_token }, TransportKind::XmlRpc) => {
                request.headers.insert(
                    "authenticate".to_owned(),
                    json!({
                        "complexType": "PortalLoginToken",
                        "userId": user_id,
                        "authToken": auth_token.expose(),
                    }),
                );
            }
            (Credential::SessionToken { user_id, auth_token }, TransportKind::Rest) => {
                request.transport_user = Some(user_id.to_string());
                request.transport_password = Some(auth_token.clone());
            }
            (Credential::Iam(token), _) => {
                request.transport_headers.push((
                    "Authorization".to_owned(),
                    format!("Bearer {}", token.access_token.expose()),
                ));
            }
        }
    }
}

/// Receives every newly installed IAM token so the caller can persist it.
pub type TokenRefreshCallback = Arc<dyn Fn(&IamToken) + Send + Sync>;

/// Holds the active credential and refreshes IAM tokens on demand.
pub struct Authenticator {
    credential: ArcSwapOption<Credential>,
    refresh_lock: tokio::sync::Mutex<()>,
    iam: IamClient,
    skew: TimeDelta,
    on_token_refresh: Option<TokenRefreshCallback>,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field(
                "credential",
                &self.credential.load().as_deref().map(Credential::kind),
            )
            .field("iam", &self.iam)
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new(None, IamClient::default())
    }
}

impl Authenticator {
    #[must_use]
    pub fn new(credential: Option<Credential>, iam: IamClient) -> Self {
        Self {
            credential: ArcSwapOption::from(credential.map(Arc::new)),
            refresh_lock: tokio::sync::Mutex::new(()),
            iam,
            skew: DEFAULT_REFRESH_SKEW,
            on_token_refresh: None,
        }
    }

    #[must_use]
    pub fn with_skew(mut self, skew: TimeDelta) -> Self {
        self.skew = skew;
        self
    }

    #[must_use]
    pub fn with_token_refresh_callback(mut self, callback: TokenRefreshCallback) -> Self {
        self.on_token_refresh = Some(callback);
        self
    }

    #[must_use]
    pub fn iam(&self) -> &IamClient {
        &self.iam
    }

    /// The installed credential, without refreshing it.
    #[must_use]
    pub fn credential(&self) -> Option<Arc<Credential>> {
        self.credential.load_full()
    }

    pub fn set_credential(&self, credential: Credential) {
        self.credential.store(Some(Arc::new(credential)));
    }

    pub fn clear(&self) {
        self.credential.store(None);
    }

    /// Install an IAM token and hand it to the refresh callback.
    pub fn install_iam_token(&self, token: IamToken) {
        if let Some(callback) = &self.on_token_refresh {
            callback(&token);
        }
        self.set_credential(Credential::Iam(token));
    }

    /// The credential to use for the next call, refreshing an expiring IAM
    /// token first.
    ///
    /// # Errors
    ///
    /// Returns the IAM endpoint's error when a required refresh fails.
    pub async fn current(&self) -> Result<Option<Arc<Credential>>, Error> {
        let Some(credential) = self.credential.load_full() else {
            return Ok(None);
        };
        if !self.is_expiring(&credential) {
            return Ok(Some(credential));
        }

        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while this one waited.
        let Some(credential) = self.credential.load_full() else {
            return Ok(None);
        };
        if !self.is_expiring(&credential) {
            return Ok(Some(credential));
        }
        let Credential::Iam(token) = credential.as_ref() else {
            return Ok(Some(credential));
        };
        let Some(refresh_token) = &token.refresh_token else {
            tracing::warn!("IAM token is expiring and no refresh token is available");
            return Ok(Some(credential));
        };

        let refreshed = self
            .iam
            .refresh(
                refresh_token,
                token.account_id.as_deref(),
                token.ims_account.as_deref(),
            )
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "IAM token refresh failed"))?;
        tracing::info!(expires_at = ?refreshed.expires_at, "IAM token refreshed");
        self.install_iam_token(refreshed);
        Ok(self.credential.load_full())
    }

    /// Resolve the current credential and attach it to `request`.
    ///
    /// # Errors
    ///
    /// See [`Authenticator::current`].
    pub async fn authorize(
        &self,
        request: &mut ApiRequest,
        transport: TransportKind,
    ) -> Result<(), Error> {
        if let Some(credential) = self.current().await? {
            credential.apply(request, transport);
        }
        Ok(())
    }

    fn is_expiring(&self, credential: &Credential) -> bool {
        match credential {
            Credential::Iam(token) => token.needs_refresh(Utc::now(), self.skew),
            Credential::BasicApiKey { .. } | Credential::SessionToken { .. } => false,
        }
    }
}
