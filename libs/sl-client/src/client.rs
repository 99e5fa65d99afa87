use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use futures_core::Stream;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use sl_query::fix_filter;
use tower::ServiceBuilder;

use crate::auth::{
    Authenticator, Credential, DEFAULT_REFRESH_SKEW, IamAccount, IamClient, IamToken,
    TokenRefreshCallback,
};
use crate::config::{ClientConfig, DEFAULT_TIMEOUT, RetryConfig, default_endpoint, user_agent};
use crate::error::Error;
use crate::layers::{
    CallRecord, DEFAULT_DIAGNOSTICS_CAPACITY, Diagnostics, DiagnosticsLayer, RetryLayer,
};
use crate::pager::{DEFAULT_PAGE_SIZE, OffsetPager};
use crate::request::{ApiRequest, ApiResponse, CallOptions, TransportKind};
use crate::secret::SecretString;
use crate::transport::{RestTransport, Transport, XmlRpcTransport};

const SERVICE_PREFIX: &str = "SoftLayer_";

/// Prefix service names lacking `SoftLayer_`.
#[must_use]
pub fn service_name(service: &str) -> String {
    if service.starts_with(SERVICE_PREFIX) {
        service.to_owned()
    } else {
        format!("{SERVICE_PREFIX}{service}")
    }
}

/// Relational property a list method returns, used to scope the injected
/// `orderBy`. `getVirtualGuests` lists `virtualGuests`; `getAllObjects` and
/// `getObject` list the service's own objects.
#[must_use]
pub fn filter_scope(method: &str) -> Option<String> {
    let property = method.strip_prefix("get")?;
    if property.is_empty() || property == "Object" || property == "AllObjects" {
        return None;
    }
    let mut chars = property.chars();
    let first = chars.next()?;
    Some(first.to_lowercase().chain(chars).collect())
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    endpoint_url: Option<String>,
    transport_kind: TransportKind,
    transport: Option<Arc<dyn Transport>>,
    credential: Option<Credential>,
    timeout: Duration,
    proxy: Option<String>,
    verify: bool,
    user_agent: Option<String>,
    retry: RetryConfig,
    diagnostics_capacity: usize,
    iam: Option<IamClient>,
    refresh_skew: TimeDelta,
    on_token_refresh: Option<TokenRefreshCallback>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            transport_kind: TransportKind::default(),
            transport: None,
            credential: None,
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
            verify: true,
            user_agent: None,
            retry: RetryConfig::default(),
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
            iam: None,
            refresh_skew: DEFAULT_REFRESH_SKEW,
            on_token_refresh: None,
        }
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("endpoint_url", &self.endpoint_url)
            .field("transport_kind", &self.transport_kind)
            .field("credential", &self.credential.as_ref().map(Credential::kind))
            .field("timeout", &self.timeout)
            .field("proxy", &self.proxy)
            .field("verify", &self.verify)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from loaded configuration. An `access_token` selects IAM
    /// authentication; otherwise `username` and `api_key` select API-key
    /// authentication.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut builder = Self::new()
            .transport_kind(config.transport())
            .endpoint_url(config.endpoint_url())
            .timeout(config.timeout());
        builder.proxy.clone_from(&config.proxy);
        if let Some(verify) = config.verify {
            builder.verify = verify;
        }
        builder.user_agent.clone_from(&config.user_agent);

        builder.credential = match (&config.access_token, &config.username, &config.api_key) {
            (Some(access_token), _, _) if !access_token.is_empty() => {
                let mut token = IamToken::new(access_token.as_str())
                    .with_account(config.account_id.clone(), config.ims_account.clone());
                token.refresh_token = config
                    .refresh_token
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .map(SecretString::from);
                Some(Credential::Iam(token))
            }
            (_, Some(username), Some(api_key)) if !username.is_empty() && !api_key.is_empty() => {
                Some(Credential::basic(username.as_str(), api_key.as_str()))
            }
            _ => None,
        };
        builder
    }

    #[must_use]
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn transport_kind(mut self, kind: TransportKind) -> Self {
        self.transport_kind = kind;
        self
    }

    /// Use a custom transport instead of the built-in one for
    /// [`transport_kind`](Self::transport_kind).
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport_kind = transport.kind();
        self.transport = Some(Arc::new(transport));
        self
    }

    #[must_use]
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    #[must_use]
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.diagnostics_capacity = capacity;
        self
    }

    #[must_use]
    pub fn iam_client(mut self, iam: IamClient) -> Self {
        self.iam = Some(iam);
        self
    }

    #[must_use]
    pub fn refresh_skew(mut self, skew: TimeDelta) -> Self {
        self.refresh_skew = skew;
        self
    }

    #[must_use]
    pub fn on_token_refresh(
        mut self,
        callback: impl Fn(&IamToken) + Send + Sync + 'static,
    ) -> Self {
        self.on_token_refresh = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn build(self) -> Client {
        let base: Arc<dyn Transport> = self.transport.unwrap_or_else(|| match self.transport_kind {
            TransportKind::XmlRpc => Arc::new(XmlRpcTransport::new()),
            TransportKind::Rest => Arc::new(RestTransport::new()),
        });
        let diagnostics = Diagnostics::new(self.diagnostics_capacity);
        let transport = ServiceBuilder::new()
            .layer(RetryLayer::new(self.retry))
            .layer(DiagnosticsLayer::new(diagnostics.clone()))
            .service(base);

        let mut auth = Authenticator::new(self.credential, self.iam.unwrap_or_default())
            .with_skew(self.refresh_skew);
        if let Some(callback) = self.on_token_refresh {
            auth = auth.with_token_refresh_callback(callback);
        }

        let endpoint_url = self
            .endpoint_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default_endpoint(self.transport_kind).to_owned());

        Client {
            inner: Arc::new(ClientInner {
                endpoint_url: endpoint_url.trim_end_matches('/').to_owned(),
                transport: Arc::new(transport),
                auth,
                diagnostics,
                timeout: self.timeout,
                proxy: self.proxy,
                verify: self.verify,
                user_agent: self.user_agent.unwrap_or_else(user_agent),
            }),
        }
    }
}

struct ClientInner {
    endpoint_url: String,
    transport: Arc<dyn Transport>,
    auth: Authenticator,
    diagnostics: Diagnostics,
    timeout: Duration,
    proxy: Option<String>,
    verify: bool,
    user_agent: String,
}

/// SoftLayer API client.
///
/// Cheap to clone; clones share the transport, credential and diagnostics.
/// Safe to use from many tasks at once.
///
/// ```rust,ignore
/// let client = ClientBuilder::from_config(&ClientConfig::load(None)?).build();
/// let account = client
///     .call("Account", "getObject", vec![], CallOptions::new().mask("id,companyName"))
///     .await?;
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint_url", &self.inner.endpoint_url)
            .field("transport", &self.inner.transport.kind())
            .field("auth", &self.inner.auth)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl Client {
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client from `~/.softlayer` and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configuration cannot be loaded.
    pub fn from_env() -> Result<Self, Error> {
        let config = ClientConfig::load(None)?;
        Ok(ClientBuilder::from_config(&config).build())
    }

    #[must_use]
    pub fn endpoint_url(&self) -> &str {
        &self.inner.endpoint_url
    }

    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        self.inner.transport.kind()
    }

    /// Handle for one service. No I/O happens until a method is called.
    #[must_use]
    pub fn service(&self, name: &str) -> ServiceHandle {
        ServiceHandle {
            client: self.clone(),
            name: service_name(name),
        }
    }

    /// Call `service.method` and return the decoded result.
    ///
    /// # Errors
    ///
    /// Returns the [`Error`] taxonomy after retries are exhausted.
    pub async fn call(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        opts: CallOptions,
    ) -> Result<Value, Error> {
        Ok(self.call_raw(service, method, args, &opts).await?.value)
    }

    /// Like [`call`](Self::call), keeping the HTTP status and total-items count.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_raw(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        opts: &CallOptions,
    ) -> Result<ApiResponse, Error> {
        let mut request = self.request(service, method, args, opts);
        self.inner
            .auth
            .authorize(&mut request, self.inner.transport.kind())
            .await?;
        tracing::debug!(
            service = %request.service,
            method = %request.method,
            id = ?request.identifier,
            limit = ?request.limit,
            offset = request.offset,
            "calling"
        );
        self.inner.transport.send(&request).await
    }

    /// Stream every result of a list method, one page at a time.
    ///
    /// Pages hold `opts.limit` items (default 100) starting at `opts.offset`.
    /// An `orderBy id ASC` is added to the filter unless it already orders
    /// the results, so items are yielded at most once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a zero page size. Errors of
    /// individual pages are yielded by the stream.
    pub fn iter_call(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        opts: CallOptions,
    ) -> Result<impl Stream<Item = Result<Value, Error>> + Send + 'static, Error> {
        let limit = opts.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = opts.offset;
        let mut base = opts;
        base.filter = Some(fix_filter(base.filter.take(), filter_scope(method).as_deref()));

        let client = self.clone();
        let service = service.to_owned();
        let method = method.to_owned();
        OffsetPager::new(
            limit,
            offset,
            move |offset, limit| -> BoxFuture<'static, Result<ApiResponse, Error>> {
                let client = client.clone();
                let service = service.clone();
                let method = method.clone();
                let args = args.clone();
                let opts = base.clone().limit(limit).offset(offset);
                Box::pin(async move { client.call_raw(&service, &method, args, &opts).await })
            },
        )
    }

    /// Render the request `call` would send, with credentials replaced by
    /// placeholders: a `curl` command for REST, the raw HTTP request for
    /// XML-RPC.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be encoded.
    pub fn reproduce(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        opts: &CallOptions,
    ) -> Result<String, Error> {
        let kind = self.inner.transport.kind();
        let mut request = self.request(service, method, args, opts);
        if let Some(credential) = self.inner.auth.credential() {
            placeholder_credential(&credential).apply(&mut request, kind);
        }
        let prepared = self.inner.transport.prepare(&request)?;
        Ok(match kind {
            TransportKind::Rest => prepared.to_curl(),
            TransportKind::XmlRpc => prepared.to_raw(),
        })
    }

    /// Diagnostic records of recent exchanges, oldest first.
    #[must_use]
    pub fn last_calls(&self) -> Vec<CallRecord> {
        self.inner.diagnostics.snapshot()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    /// The installed credential, if any.
    #[must_use]
    pub fn credential(&self) -> Option<Arc<Credential>> {
        self.inner.auth.credential()
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.inner.auth
    }

    /// Log in with portal credentials and install the returned session token.
    ///
    /// # Errors
    ///
    /// Returns the service fault for rejected credentials and
    /// [`Error::Parse`] when the reply lacks `userId`/`hash`.
    pub async fn authenticate_with_password(
        &self,
        username: &str,
        password: &SecretString,
        security_question_id: Option<i64>,
        security_question_answer: Option<&str>,
    ) -> Result<(i64, SecretString), Error> {
        const OPERATION: &str = "SoftLayer_User_Customer.getPortalLoginToken";

        let reply = self
            .call(
                "User_Customer",
                "getPortalLoginToken",
                vec![
                    json!(username),
                    json!(password.expose()),
                    json!(security_question_id),
                    json!(security_question_answer),
                ],
                CallOptions::new(),
            )
            .await?;
        let user_id = reply
            .get("userId")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::parse(OPERATION, "reply has no 'userId'"))?;
        let hash = reply
            .get("hash")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::parse(OPERATION, "reply has no 'hash'"))?;
        let hash = SecretString::new(hash);
        self.authenticate_with_hash(user_id, hash.clone());
        Ok((user_id, hash))
    }

    /// Install a session token obtained elsewhere.
    pub fn authenticate_with_hash(&self, user_id: i64, auth_hash: SecretString) {
        self.inner
            .auth
            .set_credential(Credential::session(user_id, auth_hash));
    }

    /// Install an IAM token pair obtained elsewhere.
    pub fn authenticate_with_iam_token(
        &self,
        access_token: SecretString,
        refresh_token: Option<SecretString>,
    ) {
        let mut token = IamToken::new(access_token);
        token.refresh_token = refresh_token;
        self.inner.auth.set_credential(Credential::Iam(token));
    }

    /// Exchange a session token for a fresh one and install it. The service
    /// may return several strings; the longest is the token.
    ///
    /// # Errors
    ///
    /// Returns the service fault, or [`Error::Parse`] when the reply holds
    /// no token.
    pub async fn refresh_token(
        &self,
        user_id: i64,
        current_token: &SecretString,
    ) -> Result<SecretString, Error> {
        let reply = self
            .call(
                "User_Employee",
                "refreshEncryptedToken",
                vec![json!(current_token.expose())],
                CallOptions::new().id(user_id),
            )
            .await?;
        let token = longest_string(&reply).ok_or_else(|| {
            Error::parse(
                "SoftLayer_User_Employee.refreshEncryptedToken",
                "reply holds no token",
            )
        })?;
        let token = SecretString::new(token);
        self.authenticate_with_hash(user_id, token.clone());
        Ok(token)
    }

    /// Log in to IAM with IBMid credentials and install the token.
    ///
    /// # Errors
    ///
    /// Returns the IAM endpoint's error.
    pub async fn iam_login_with_password(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<IamToken, Error> {
        let token = self
            .inner
            .auth
            .iam()
            .login_with_password(username, password)
            .await?;
        self.inner.auth.install_iam_token(token.clone());
        Ok(token)
    }

    /// Log in to IAM with a one-time passcode and install the token.
    ///
    /// # Errors
    ///
    /// Returns the IAM endpoint's error.
    pub async fn iam_login_with_passcode(
        &self,
        passcode: &SecretString,
    ) -> Result<IamToken, Error> {
        let token = self.inner.auth.iam().login_with_passcode(passcode).await?;
        self.inner.auth.install_iam_token(token.clone());
        Ok(token)
    }

    /// Accounts reachable with the installed IAM token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when no IAM token is installed.
    pub async fn iam_accounts(&self) -> Result<Vec<IamAccount>, Error> {
        let token = self.iam_token()?;
        self.inner.auth.iam().accounts(&token.access_token).await
    }

    /// Re-scope the installed IAM token to `account_id` and install the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when no refreshable IAM token is
    /// installed, or the IAM endpoint's error.
    pub async fn iam_select_account(
        &self,
        account_id: &str,
        ims_account: Option<&str>,
    ) -> Result<IamToken, Error> {
        let current = self.iam_token()?;
        let refresh_token = current.refresh_token.as_ref().ok_or_else(|| {
            Error::InvalidArgument("the IAM token has no refresh token".to_owned())
        })?;
        let token = self
            .inner
            .auth
            .iam()
            .refresh(refresh_token, Some(account_id), ims_account)
            .await?;
        self.inner.auth.install_iam_token(token.clone());
        Ok(token)
    }

    fn iam_token(&self) -> Result<IamToken, Error> {
        match self.inner.auth.credential().as_deref() {
            Some(Credential::Iam(token)) => Ok(token.clone()),
            _ => Err(Error::InvalidArgument(
                "an IAM token is required; log in with IAM first".to_owned(),
            )),
        }
    }

    fn request(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        opts: &CallOptions,
    ) -> ApiRequest {
        let inner = &self.inner;
        let mut request =
            ApiRequest::new(inner.endpoint_url.as_str(), service_name(service), method)
                .with_args(args);
        request.timeout = inner.timeout;
        request.proxy.clone_from(&inner.proxy);
        request.verify = inner.verify;
        request.user_agent.clone_from(&inner.user_agent);
        request.apply_options(opts);
        request
    }
}

fn placeholder_credential(credential: &Credential) -> Credential {
    match credential {
        Credential::BasicApiKey { username, .. } => Credential::basic(username.as_str(), "$API_KEY"),
        Credential::SessionToken { user_id, .. } => Credential::session(*user_id, "$TOKEN"),
        Credential::Iam(_) => Credential::Iam(IamToken::new("$TOKEN")),
    }
}

fn longest_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .max_by_key(|s| s.len())
            .map(ToOwned::to_owned),
        _ => None,
    }
}

/// Calls bound to one service, e.g. `client.service("Account")`.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    client: Client,
    name: String,
}

impl ServiceHandle {
    /// Full service name, always `SoftLayer_`-prefixed.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// # Errors
    ///
    /// See [`Client::call`].
    pub async fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        opts: CallOptions,
    ) -> Result<Value, Error> {
        self.client.call(&self.name, method, args, opts).await
    }

    /// # Errors
    ///
    /// See [`Client::iter_call`].
    pub fn iter_call(
        &self,
        method: &str,
        args: Vec<Value>,
        opts: CallOptions,
    ) -> Result<impl Stream<Item = Result<Value, Error>> + Send + 'static, Error> {
        self.client.iter_call(&self.name, method, args, opts)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use std::sync::Mutex;
    use crate::request::PreparedRequest;

    /// Records requests and answers from a closure.
    struct FakeTransport {
        kind: TransportKind,
        seen: Arc<Mutex<Vec<ApiRequest>>>,
        reply: Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, Error> + Send + Sync>,
    }

    impl FakeTransport {
        fn new(
            seen: Arc<Mutex<Vec<ApiRequest>>>,
            reply: impl Fn(&ApiRequest) -> Result<ApiResponse, Error> + Send + Sync + 'static,
        ) -> Self {
            Self {
                kind: TransportKind::XmlRpc,
                seen,
                reply: Box::new(reply),
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        fn kind(&self) -> TransportKind {
            self.kind
        }

        fn prepare(&self, request: &ApiRequest) -> Result<PreparedRequest, Error> {
            match self.kind {
                TransportKind::XmlRpc => XmlRpcTransport::new().prepare(request),
                TransportKind::Rest => RestTransport::new().prepare(request),
            }
        }

        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
            self.seen.lock().unwrap().push(request.clone());
            (self.reply)(request)
        }
    }

    fn ok(value: Value) -> Result<ApiResponse, Error> {
        Ok(ApiResponse {
            value,
            http_status: 200,
            total_items: None,
        })
    }

    fn client_with(
        reply: impl Fn(&ApiRequest) -> Result<ApiResponse, Error> + Send + Sync + 'static,
    ) -> (Client, Arc<Mutex<Vec<ApiRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = Client::builder()
            .endpoint_url("https://api.example/xmlrpc/v3.1/")
            .transport(FakeTransport::new(seen.clone(), reply))
            .credential(Credential::basic("user", "key"))
            .retry(RetryConfig::fast())
            .build();
        (client, seen)
    }

    #[test]
    fn service_names_are_prefixed() {
        assert_eq!(service_name("Account"), "SoftLayer_Account");
        assert_eq!(service_name("SoftLayer_Account"), "SoftLayer_Account");
    }

    #[test]
    fn filter_scope_follows_method_name() {
        assert_eq!(filter_scope("getVirtualGuests").as_deref(), Some("virtualGuests"));
        assert_eq!(filter_scope("getHardware").as_deref(), Some("hardware"));
        assert_eq!(filter_scope("getAllObjects"), None);
        assert_eq!(filter_scope("getObject"), None);
        assert_eq!(filter_scope("findByHostname"), None);
    }

    #[tokio::test]
    async fn call_builds_request_from_options_and_defaults() {
        let (client, seen) = client_with(|_| ok(json!({"id": 1})));
        let value = client
            .call(
                "Account",
                "getObject",
                vec![json!("x")],
                CallOptions::new().id(5).mask("id").limit(10).offset(20),
            )
            .await
            .unwrap();
        assert_eq!(value, json!({"id": 1}));

        let seen = seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.endpoint_url, "https://api.example/xmlrpc/v3.1");
        assert_eq!(request.service, "SoftLayer_Account");
        assert_eq!(request.identifier, Some(5));
        assert_eq!(request.limit, Some(10));
        assert_eq!(request.offset, 20);
        assert_eq!(request.args, vec![json!("x")]);
        assert_eq!(
            request.headers["authenticate"],
            json!({"username": "user", "apiKey": "key"})
        );
        assert_eq!(client.last_calls().len(), 1);
    }

    #[tokio::test]
    async fn service_handle_dispatches_without_io_until_called() {
        let (client, seen) = client_with(|_| ok(json!([])));
        let account = client.service("Account");
        assert_eq!(account.name(), "SoftLayer_Account");
        assert!(seen.lock().unwrap().is_empty());

        account
            .call("getVirtualGuests", vec![], CallOptions::new())
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap()[0].method, "getVirtualGuests");
    }

    #[tokio::test]
    async fn iter_call_injects_ordering_and_pages() {
        let (client, seen) = client_with(|request| {
            let start = request.offset;
            let end = (start + request.limit.unwrap_or(0)).min(25);
            ok(Value::Array((start..end).map(|i| json!({"id": i})).collect()))
        });

        let items: Vec<Value> = client
            .iter_call("Account", "getVirtualGuests", vec![], CallOptions::new().limit(10))
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 25);

        let seen = seen.lock().unwrap();
        let offsets: Vec<u32> = seen.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 10, 20]);
        assert_eq!(
            seen[0].filter.as_ref().unwrap().to_value(),
            json!({"virtualGuests": {"id": {"operation": "orderBy", "options": [
                {"name": "sort", "value": ["ASC"]}
            ]}}})
        );
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let (client, _) = client_with(|_| ok(json!([])));
        let err = client
            .iter_call("Account", "getVirtualGuests", vec![], CallOptions::new().limit(0))
            .err()
            .unwrap();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[tokio::test]
    async fn password_login_installs_session_token() {
        let (client, seen) = client_with(|request| match request.method.as_str() {
            "getPortalLoginToken" => ok(json!({"userId": 99, "hash": "abcdef"})),
            _ => ok(json!(true)),
        });

        let (user_id, hash) = client
            .authenticate_with_password("user", &SecretString::new("pw"), None, None)
            .await
            .unwrap();
        assert_eq!(user_id, 99);
        assert_eq!(hash.expose(), "abcdef");

        client
            .call("Account", "getObject", vec![], CallOptions::new())
            .await
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0].args,
            vec![json!("user"), json!("pw"), Value::Null, Value::Null]
        );
        assert_eq!(
            seen[1].headers["authenticate"],
            json!({"complexType": "PortalLoginToken", "userId": 99, "authToken": "abcdef"})
        );
    }

    #[tokio::test]
    async fn refresh_token_keeps_longest_string() {
        let (client, seen) = client_with(|_| ok(json!(["short", "the-longest-token", "mid-size"])));
        let token = client
            .refresh_token(7, &SecretString::new("old"))
            .await
            .unwrap();
        assert_eq!(token.expose(), "the-longest-token");

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].service, "SoftLayer_User_Employee");
        assert_eq!(seen[0].identifier, Some(7));
        assert_eq!(
            client.credential().as_deref(),
            Some(&Credential::session(7, "the-longest-token"))
        );
    }

    #[tokio::test]
    async fn iam_operations_require_an_iam_token() {
        let (client, _) = client_with(|_| ok(json!(true)));
        assert_eq!(client.iam_accounts().await.unwrap_err().kind(), "invalid_argument");

        client.authenticate_with_iam_token(SecretString::new("a"), None);
        let err = client.iam_select_account("abc", None).await.unwrap_err();
        assert!(err.to_string().contains("no refresh token"));
    }

    #[test]
    fn reproduce_hides_credentials() {
        let (client, _) = client_with(|_| ok(json!(true)));
        let rendered = client
            .reproduce("Account", "getObject", vec![], &CallOptions::new().mask("id"))
            .unwrap();
        assert!(rendered.starts_with("POST https://api.example/xmlrpc/v3.1/SoftLayer_Account"));
        assert!(rendered.contains("$API_KEY"));
        assert!(!rendered.contains("<string>key</string>"));
        assert!(rendered.contains("mask[id]"));
    }

    #[test]
    fn config_selects_credential() {
        let config = ClientConfig {
            username: Some("user".to_owned()),
            api_key: Some("key".to_owned()),
            transport: Some(TransportKind::Rest),
            ..ClientConfig::default()
        };
        let client = ClientBuilder::from_config(&config).build();
        assert_eq!(client.transport_kind(), TransportKind::Rest);
        assert_eq!(client.endpoint_url(), "https://api.softlayer.com/rest/v3.1");
        assert_eq!(client.credential().unwrap().kind(), "basic_api_key");

        let config = ClientConfig {
            access_token: Some("tok".to_owned()),
            refresh_token: Some("ref".to_owned()),
            account_id: Some("abc".to_owned()),
            ..config
        };
        let client = ClientBuilder::from_config(&config).build();
        match client.credential().as_deref() {
            Some(Credential::Iam(token)) => {
                assert_eq!(token.access_token.expose(), "tok");
                assert_eq!(token.account_id.as_deref(), Some("abc"));
                assert!(token.refresh_token.is_some());
            }
            other => panic!("unexpected credential: {other:?}"),
        }
    }
}
