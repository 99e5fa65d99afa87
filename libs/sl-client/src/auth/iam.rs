//! IAM token endpoint and account listing.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::IamToken;
use crate::config::{IAM_ACCOUNTS_ENDPOINT, IAM_TOKEN_ENDPOINT, user_agent};
use crate::error::Error;
use crate::secret::SecretString;
use crate::transport::http::map_reqwest_error;
use crate::transport::preview;

/// Public client id the IAM endpoint expects for CLI logins.
const IAM_CLIENT_ID: &str = "bx";
const IAM_CLIENT_SECRET: &str = "bx";

const PASSCODE_GRANT: &str = "urn:ibm:params:oauth:grant-type:passcode";

const IAM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Absolute expiry, seconds since the epoch
    #[serde(default)]
    expiration: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

/// An IAM account and the classic-infrastructure account linked to it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IamAccount {
    pub account_id: String,
    pub name: String,
    pub ims_account: Option<String>,
}

/// Talks to the IAM token and accounts endpoints.
#[derive(Debug, Clone)]
pub struct IamClient {
    http: reqwest::Client,
    token_endpoint: String,
    accounts_endpoint: String,
}

impl Default for IamClient {
    fn default() -> Self {
        Self::new(IAM_TOKEN_ENDPOINT, IAM_ACCOUNTS_ENDPOINT)
    }
}

impl IamClient {
    pub fn new(token_endpoint: impl Into<String>, accounts_endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_endpoint: token_endpoint.into(),
            accounts_endpoint: accounts_endpoint.into(),
        }
    }

    #[must_use]
    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    /// Exchange IBMid credentials for a token pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] when IAM rejects the credentials and
    /// [`Error::Transport`] when the endpoint cannot be reached.
    pub async fn login_with_password(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<IamToken, Error> {
        self.request_token(&[
            ("grant_type", "password"),
            ("username", username),
            ("password", password.expose()),
            ("response_type", "cloud_iam"),
        ])
        .await
    }

    /// Exchange a one-time passcode (SSO login) for a token pair.
    ///
    /// # Errors
    ///
    /// See [`IamClient::login_with_password`].
    pub async fn login_with_passcode(&self, passcode: &SecretString) -> Result<IamToken, Error> {
        self.request_token(&[
            ("grant_type", PASSCODE_GRANT),
            ("passcode", passcode.expose()),
            ("response_type", "cloud_iam"),
        ])
        .await
    }

    /// Exchange a refresh token, optionally scoping the new pair to an
    /// account. The returned token keeps the requested account scope.
    ///
    /// # Errors
    ///
    /// See [`IamClient::login_with_password`].
    pub async fn refresh(
        &self,
        refresh_token: &SecretString,
        account_id: Option<&str>,
        ims_account: Option<&str>,
    ) -> Result<IamToken, Error> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose()),
            ("response_type", "cloud_iam"),
        ];
        if let Some(account_id) = account_id {
            form.push(("bss_account", account_id));
        }
        if let Some(ims_account) = ims_account {
            form.push(("ims_account", ims_account));
        }
        let mut token = self.request_token(&form).await?;
        token.account_id = account_id.map(ToOwned::to_owned);
        token.ims_account = ims_account.map(ToOwned::to_owned);
        Ok(token)
    }

    /// List the accounts the token's identity can act on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] on a rejected token and [`Error::Parse`] on an
    /// unexpected body.
    pub async fn accounts(&self, access_token: &SecretString) -> Result<Vec<IamAccount>, Error> {
        const OPERATION: &str = "IAM.accounts";

        let response = self
            .http
            .get(&self.accounts_endpoint)
            .bearer_auth(access_token.expose())
            .header(reqwest::header::USER_AGENT, user_agent())
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(IAM_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_reqwest_error(OPERATION, &e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(OPERATION, &e))?;
        if !(200..300).contains(&status) {
            return Err(iam_error(OPERATION, status, &body));
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| Error::parse(OPERATION, e.to_string()))?;
        let resources = value
            .get("resources")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::parse(OPERATION, "missing 'resources' list"))?;
        Ok(resources.iter().filter_map(parse_account).collect())
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<IamToken, Error> {
        const OPERATION: &str = "IAM.token";

        let response = self
            .http
            .post(&self.token_endpoint)
            .basic_auth(IAM_CLIENT_ID, Some(IAM_CLIENT_SECRET))
            .header(reqwest::header::USER_AGENT, user_agent())
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(IAM_TIMEOUT)
            .form(form)
            .send()
            .await
            .map_err(|e| map_reqwest_error(OPERATION, &e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(OPERATION, &e))?;
        if !(200..300).contains(&status) {
            let err = iam_error(OPERATION, status, &body);
            tracing::warn!(status, error = %err, "IAM token request rejected");
            return Err(err);
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| Error::parse(OPERATION, e.to_string()))?;
        if let Some(token_type) = &parsed.token_type
            && !token_type.eq_ignore_ascii_case("bearer")
        {
            return Err(Error::parse(
                OPERATION,
                format!("unsupported token type '{token_type}'"),
            ));
        }
        Ok(token_from_response(parsed, Utc::now()))
    }
}

fn token_from_response(response: TokenResponse, now: DateTime<Utc>) -> IamToken {
    let expires_at = response
        .expiration
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .or_else(|| {
            response
                .expires_in
                .and_then(TimeDelta::try_seconds)
                .map(|ttl| now + ttl)
        });
    IamToken {
        access_token: SecretString::from(response.access_token),
        refresh_token: response.refresh_token.map(SecretString::from),
        expires_at,
        account_id: None,
        ims_account: None,
    }
}

/// IAM errors carry `errorCode`/`errorMessage`.
fn iam_error(operation: &str, status: u16, body: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
    };
    let code = field("errorCode").unwrap_or_else(|| status.to_string());
    let message = field("errorMessage").unwrap_or_else(|| preview(body));
    Error::api(operation, code, message, Some(status))
}

fn parse_account(resource: &Value) -> Option<IamAccount> {
    let metadata = resource.get("metadata")?;
    let account_id = metadata.get("guid")?.as_str()?.to_owned();
    let name = resource
        .pointer("/entity/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let ims_account = metadata
        .get("linked_accounts")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|linked| linked.get("origin").and_then(Value::as_str) == Some("IMS"))
        .and_then(|linked| match linked.get("id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        });
    Some(IamAccount {
        account_id,
        name,
        ims_account,
    })
}
