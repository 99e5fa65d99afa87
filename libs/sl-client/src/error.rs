use std::fmt;

use thiserror::Error;

/// Low-level cause of a [`Error::Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportFailure {
    /// Connection refused, reset or DNS failure
    Connect,
    /// Per-request timeout elapsed
    Timeout,
    /// TLS handshake or certificate failure
    Tls,
    /// Non-2xx HTTP reply that carried no structured fault
    Status(u16),
    /// Any other I/O failure while exchanging the request
    Io,
}

impl TransportFailure {
    #[must_use]
    pub fn is_retriable(self) -> bool {
        match self {
            TransportFailure::Connect
            | TransportFailure::Timeout
            | TransportFailure::Tls
            | TransportFailure::Io => true,
            TransportFailure::Status(status) => status == 429 || status >= 500,
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFailure::Connect => f.write_str("connect"),
            TransportFailure::Timeout => f.write_str("timeout"),
            TransportFailure::Tls => f.write_str("tls"),
            TransportFailure::Status(status) => write!(f, "status {status}"),
            TransportFailure::Io => f.write_str("io"),
        }
    }
}

/// Sub-classification of service faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ApiErrorKind {
    Authentication,
    Authorization,
    NotFound,
    RateLimit,
    Validation,
    ServerInternal,
    Other,
}

/// Standard XML-RPC server error codes treated as internal failures.
const XMLRPC_SERVER_CODES: [i64; 4] = [-32603, -32500, -32400, -32300];

/// Standard XML-RPC codes describing a malformed request.
const XMLRPC_REQUEST_CODES: [i64; 5] = [-32700, -32701, -32702, -32600, -32602];

impl ApiErrorKind {
    /// Classify a fault. The first matching rule wins.
    #[must_use]
    pub fn classify(fault_code: &str, fault_string: &str, http_status: Option<u16>) -> Self {
        let numeric = fault_code.trim().parse::<i64>().ok();
        let status = http_status.unwrap_or(0);

        if fault_string.contains("Invalid API token") {
            return ApiErrorKind::Authentication;
        }
        if fault_code.contains("RateLimitExceeded") || status == 429 {
            return ApiErrorKind::RateLimit;
        }
        if fault_code == "SoftLayer_Exception_Public"
            || fault_string.contains("Please try again")
            || (500..600).contains(&status)
            || numeric.is_some_and(|n| XMLRPC_SERVER_CODES.contains(&n))
        {
            return ApiErrorKind::ServerInternal;
        }
        if fault_code.contains("InvalidCredentials")
            || fault_code.contains("InvalidLegacyToken")
            || fault_code.contains("LoginFailed")
            || status == 401
        {
            return ApiErrorKind::Authentication;
        }
        if fault_code.contains("PermissionDenied") || status == 403 {
            return ApiErrorKind::Authorization;
        }
        if fault_code.contains("NotFound") || numeric == Some(-32601) || status == 404 {
            return ApiErrorKind::NotFound;
        }
        if fault_code.contains("Invalid")
            || fault_code.contains("Missing")
            || numeric.is_some_and(|n| XMLRPC_REQUEST_CODES.contains(&n))
            || (400..500).contains(&status)
        {
            return ApiErrorKind::Validation;
        }
        ApiErrorKind::Other
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ApiErrorKind::Authentication => "authentication",
            ApiErrorKind::Authorization => "authorization",
            ApiErrorKind::NotFound => "not_found",
            ApiErrorKind::RateLimit => "rate_limit",
            ApiErrorKind::Validation => "validation",
            ApiErrorKind::ServerInternal => "server_internal",
            ApiErrorKind::Other => "other",
        }
    }

    #[must_use]
    pub fn is_retriable(self) -> bool {
        matches!(self, ApiErrorKind::RateLimit | ApiErrorKind::ServerInternal)
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client error taxonomy.
///
/// Every variant that originates from a call carries the `Service.method`
/// it came from. Use [`Error::kind`] for a stable, loggable category.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Network, DNS, TLS or timeout failure, or a bare HTTP error status
    #[error("{operation}: transport error ({failure}): {message}")]
    Transport {
        operation: String,
        failure: TransportFailure,
        http_status: Option<u16>,
        message: String,
    },

    /// The service reported a structured fault
    #[error("{operation}: {fault_code}: {fault_string}")]
    Api {
        operation: String,
        kind: ApiErrorKind,
        fault_code: String,
        fault_string: String,
        http_status: Option<u16>,
    },

    /// Response body could not be decoded
    #[error("{operation}: malformed response: {message}")]
    Parse { operation: String, message: String },

    /// An order could not be resolved; `keyname` names the offending input
    #[error("{message}")]
    Ordering {
        operation: String,
        keyname: String,
        message: String,
    },

    /// An identifier matched zero or several objects
    #[error("{message}")]
    Resolver {
        operation: String,
        identifier: String,
        candidates: Vec<i64>,
        message: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build an API fault, classifying it.
    pub fn api(
        operation: impl Into<String>,
        fault_code: impl Into<String>,
        fault_string: impl Into<String>,
        http_status: Option<u16>,
    ) -> Self {
        let fault_code = fault_code.into();
        let fault_string = fault_string.into();
        Error::Api {
            operation: operation.into(),
            kind: ApiErrorKind::classify(&fault_code, &fault_string, http_status),
            fault_code,
            fault_string,
            http_status,
        }
    }

    pub fn transport(
        operation: impl Into<String>,
        failure: TransportFailure,
        message: impl Into<String>,
    ) -> Self {
        let http_status = match failure {
            TransportFailure::Status(status) => Some(status),
            _ => None,
        };
        Error::Transport {
            operation: operation.into(),
            failure,
            http_status,
            message: message.into(),
        }
    }

    pub fn parse(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Parse {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn ordering(
        operation: impl Into<String>,
        keyname: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Ordering {
            operation: operation.into(),
            keyname: keyname.into(),
            message: message.into(),
        }
    }

    /// Stable category string.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Transport { .. } => "transport_error",
            Error::Api { .. } => "api_error",
            Error::Parse { .. } => "parse_error",
            Error::Ordering { .. } => "ordering_error",
            Error::Resolver { .. } => "resolver_error",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::Config(_) => "config_error",
        }
    }

    /// Originating `Service.method`, when the error came from a call.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        match self {
            Error::Transport { operation, .. }
            | Error::Api { operation, .. }
            | Error::Parse { operation, .. }
            | Error::Ordering { operation, .. }
            | Error::Resolver { operation, .. } => Some(operation),
            Error::InvalidArgument(_) | Error::Config(_) => None,
        }
    }

    #[must_use]
    pub fn fault_code(&self) -> Option<&str> {
        match self {
            Error::Api { fault_code, .. } => Some(fault_code),
            _ => None,
        }
    }

    /// Fault code as a number, for XML-RPC integer faults.
    #[must_use]
    pub fn numeric_fault_code(&self) -> Option<i64> {
        self.fault_code().and_then(|c| c.trim().parse().ok())
    }

    #[must_use]
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Error::Api { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::Transport { http_status, .. } | Error::Api { http_status, .. } => *http_status,
            _ => None,
        }
    }

    /// Whether the retry layer may re-issue the call that produced this error.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::Transport { failure, .. } => failure.is_retriable(),
            Error::Api { kind, .. } => kind.is_retriable(),
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn kind_of(code: &str, message: &str, status: Option<u16>) -> ApiErrorKind {
        ApiErrorKind::classify(code, message, status)
    }

    #[test]
    fn classification_follows_rule_order() {
        assert_eq!(
            kind_of("SoftLayer_Exception_Public", "Invalid API token.", None),
            ApiErrorKind::Authentication
        );
        assert_eq!(
            kind_of("SoftLayer_Exception_WebService_RateLimitExceeded", "slow down", None),
            ApiErrorKind::RateLimit
        );
        assert_eq!(
            kind_of("SoftLayer_Exception_Public", "boom", None),
            ApiErrorKind::ServerInternal
        );
        assert_eq!(
            kind_of("SoftLayer_Exception_Order", "Please try again later", None),
            ApiErrorKind::ServerInternal
        );
        assert_eq!(
            kind_of("SoftLayer_Exception_InvalidCredentials", "nope", None),
            ApiErrorKind::Authentication
        );
        assert_eq!(
            kind_of("SoftLayer_Exception_PermissionDenied", "nope", None),
            ApiErrorKind::Authorization
        );
        assert_eq!(
            kind_of("SoftLayer_Exception_ObjectNotFound", "gone", None),
            ApiErrorKind::NotFound
        );
        assert_eq!(
            kind_of("SoftLayer_Exception_MissingCreationProperty", "x", None),
            ApiErrorKind::Validation
        );
        assert_eq!(kind_of("Something", "else", None), ApiErrorKind::Other);
    }

    #[test]
    fn numeric_and_http_codes_are_classified() {
        assert_eq!(kind_of("-32601", "no method", None), ApiErrorKind::NotFound);
        assert_eq!(kind_of("-32700", "parse", None), ApiErrorKind::Validation);
        assert_eq!(kind_of("-32500", "app", None), ApiErrorKind::ServerInternal);
        assert_eq!(kind_of("x", "y", Some(503)), ApiErrorKind::ServerInternal);
        assert_eq!(kind_of("x", "y", Some(429)), ApiErrorKind::RateLimit);
        assert_eq!(kind_of("x", "y", Some(401)), ApiErrorKind::Authentication);
        assert_eq!(kind_of("x", "y", Some(403)), ApiErrorKind::Authorization);
        assert_eq!(kind_of("x", "y", Some(404)), ApiErrorKind::NotFound);
        assert_eq!(kind_of("x", "y", Some(418)), ApiErrorKind::Validation);
    }

    #[test]
    fn retriability_by_variant() {
        assert!(Error::transport("A.b", TransportFailure::Timeout, "read timeout").is_retriable());
        assert!(Error::transport("A.b", TransportFailure::Status(502), "bad gw").is_retriable());
        assert!(!Error::transport("A.b", TransportFailure::Status(400), "bad").is_retriable());
        assert!(Error::api("A.b", "SoftLayer_Exception_Public", "x", None).is_retriable());
        assert!(!Error::api("A.b", "SoftLayer_Exception_Public", "Invalid API token.", None)
            .is_retriable());
        assert!(!Error::parse("A.b", "bad xml").is_retriable());
        assert!(!Error::ordering("A.b", "RAM_4_GB", "missing").is_retriable());
    }

    #[test]
    fn accessors_expose_context() {
        let err = Error::api("SoftLayer_Account.getObject", "-32601", "no such method", Some(200));
        assert_eq!(err.kind(), "api_error");
        assert_eq!(err.operation(), Some("SoftLayer_Account.getObject"));
        assert_eq!(err.numeric_fault_code(), Some(-32601));
        assert_eq!(err.http_status(), Some(200));
        assert_eq!(err.api_kind(), Some(ApiErrorKind::NotFound));
        assert_eq!(
            err.to_string(),
            "SoftLayer_Account.getObject: -32601: no such method"
        );

        let err = Error::transport("X.y", TransportFailure::Status(500), "oops");
        assert_eq!(err.http_status(), Some(500));
        assert_eq!(err.kind(), "transport_error");
        assert_eq!(Error::Config("x".to_owned()).kind(), "config_error");
        assert!(Error::InvalidArgument("x".to_owned()).operation().is_none());
    }
}
