//! Per-request configuration.
//!
//! Every knob the transport translates into a curl option lives here,
//! together with the message-shaping conveniences (headers, query pairs,
//! body sources). Unset fields fall through to the client defaults and
//! then to the library defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::body::Body;

pub(crate) const DEFAULT_USER_AGENT: &str =
    concat!("curlstack/", env!("CARGO_PKG_VERSION"));

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_REDIRECTS: u32 = 10;

/// Credentials attached to a request.
#[derive(Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Auth {
    /// HTTP basic auth, encoded by libcurl.
    Basic { user: String, password: String },
    /// `Authorization: Bearer <token>` header.
    Bearer { token: String },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("password", &"***")
                .finish(),
            Self::Bearer { .. } => {
                f.debug_struct("Bearer").field("token", &"***").finish()
            }
        }
    }
}

/// How the transport treats 3xx responses. Redirects are followed inside
/// libcurl; the parser keeps only the final hop's head and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Return 3xx responses as-is.
    None,
    /// Follow up to this many redirects.
    Limited(u32),
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::Limited(DEFAULT_MAX_REDIRECTS)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Body>,
    form: Option<Vec<(String, String)>>,
    #[cfg(feature = "json")]
    json: Option<serde_json::Value>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    redirects: Option<RedirectPolicy>,
    tls_verify: Option<bool>,
    ca_bundle: Option<PathBuf>,
    proxy: Option<String>,
    auth: Option<Auth>,
    http_errors: Option<bool>,
    user_agent: Option<String>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_headers<I, K, V>(mut self, iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Appends a query pair to whatever query string the URL already has.
    #[must_use]
    pub fn with_query(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_query_pairs<I, K, V>(mut self, iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Raw request body. Mutually exclusive with `with_json` and
    /// `with_form`.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// JSON request body; sets `Content-Type: application/json` unless a
    /// content type header is already present.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.json = Some(value);
        self
    }

    /// URL-encoded form body; sets
    /// `Content-Type: application/x-www-form-urlencoded` unless a content
    /// type header is already present.
    #[must_use]
    pub fn with_form<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.form = Some(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Total transfer deadline. Unset means no limit.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_redirects(mut self, policy: RedirectPolicy) -> Self {
        self.redirects = Some(policy);
        self
    }

    /// Toggles TLS peer and host verification. Leave on outside tests.
    #[must_use]
    pub fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = Some(verify);
        self
    }

    #[must_use]
    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    /// Proxy URL handed straight to libcurl.
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    #[must_use]
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    #[must_use]
    pub fn with_basic_auth(
        self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.with_auth(Auth::Basic {
            user: user.into(),
            password: password.into(),
        })
    }

    #[must_use]
    pub fn with_bearer(self, token: impl Into<String>) -> Self {
        self.with_auth(Auth::Bearer {
            token: token.into(),
        })
    }

    /// When false, 4xx/5xx responses come back as `Ok` instead of
    /// [`Error::BadResponse`](crate::Error::BadResponse).
    #[must_use]
    pub fn with_http_errors(mut self, enabled: bool) -> Self {
        self.http_errors = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    // Resolved accessors, used by the client, transport and middleware.

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn redirect_policy(&self) -> RedirectPolicy {
        self.redirects.unwrap_or_default()
    }

    pub fn tls_verify(&self) -> bool {
        self.tls_verify.unwrap_or(true)
    }

    pub fn ca_bundle(&self) -> Option<&Path> {
        self.ca_bundle.as_deref()
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn auth(&self) -> Option<&Auth> {
        self.auth.as_ref()
    }

    pub fn http_errors_enabled(&self) -> bool {
        self.http_errors.unwrap_or(true)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    pub(crate) fn body_ref(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub(crate) fn form_ref(&self) -> Option<&[(String, String)]> {
        self.form.as_deref()
    }

    #[cfg(feature = "json")]
    pub(crate) fn json_ref(&self) -> Option<&serde_json::Value> {
        self.json.as_ref()
    }

    /// Number of body sources set; more than one is a builder error.
    pub(crate) fn body_source_count(&self) -> usize {
        let mut count = usize::from(self.body.is_some());
        count += usize::from(self.form.is_some());
        #[cfg(feature = "json")]
        {
            count += usize::from(self.json.is_some());
        }
        count
    }

    /// Folds client defaults underneath these options. Scalar fields keep
    /// the per-request value when set; default headers are kept unless the
    /// request sets the same header name; query pairs concatenate with the
    /// defaults first.
    pub(crate) fn merge_over(mut self, defaults: &Self) -> Self {
        let mut headers = defaults.headers.clone();
        headers.retain(|(name, _)| {
            !self
                .headers
                .iter()
                .any(|(own, _)| own.eq_ignore_ascii_case(name))
        });
        headers.append(&mut self.headers);
        self.headers = headers;

        let mut query = defaults.query.clone();
        query.append(&mut self.query);
        self.query = query;

        self.body = self.body.or_else(|| defaults.body.clone());
        self.form = self.form.or_else(|| defaults.form.clone());
        #[cfg(feature = "json")]
        {
            self.json = self.json.or_else(|| defaults.json.clone());
        }
        self.timeout = self.timeout.or(defaults.timeout);
        self.connect_timeout = self.connect_timeout.or(defaults.connect_timeout);
        self.redirects = self.redirects.or(defaults.redirects);
        self.tls_verify = self.tls_verify.or(defaults.tls_verify);
        self.ca_bundle = self.ca_bundle.or_else(|| defaults.ca_bundle.clone());
        self.proxy = self.proxy.or_else(|| defaults.proxy.clone());
        self.auth = self.auth.or_else(|| defaults.auth.clone());
        self.http_errors = self.http_errors.or(defaults.http_errors);
        self.user_agent = self.user_agent.or_else(|| defaults.user_agent.clone());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_defaults() {
        let options = RequestOptions::new();
        assert_eq!(options.connect_timeout(), Duration::from_secs(30));
        assert_eq!(options.timeout(), None);
        assert_eq!(options.redirect_policy(), RedirectPolicy::Limited(10));
        assert!(options.tls_verify());
        assert!(options.http_errors_enabled());
        assert!(options.user_agent().starts_with("curlstack/"));
    }

    #[test]
    fn test_merge_scalar_request_wins() {
        let defaults = RequestOptions::new()
            .with_timeout(Duration::from_secs(5))
            .with_http_errors(false);
        let merged = RequestOptions::new()
            .with_timeout(Duration::from_secs(1))
            .merge_over(&defaults);
        assert_eq!(merged.timeout(), Some(Duration::from_secs(1)));
        assert!(!merged.http_errors_enabled());
    }

    #[test]
    fn test_merge_header_name_override() {
        let defaults = RequestOptions::new()
            .with_header("X-Env", "prod")
            .with_header("Accept", "application/json");
        let merged = RequestOptions::new()
            .with_header("x-env", "staging")
            .merge_over(&defaults);

        let names: Vec<&str> =
            merged.headers().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Accept", "x-env"]);
        assert_eq!(merged.headers()[1].1, "staging");
    }

    #[test]
    fn test_merge_query_concatenates_defaults_first() {
        let defaults = RequestOptions::new().with_query("page", "1");
        let merged = RequestOptions::new()
            .with_query("limit", "50")
            .merge_over(&defaults);
        assert_eq!(
            merged.query(),
            &[
                ("page".to_string(), "1".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn test_body_source_count() {
        let options = RequestOptions::new()
            .with_body("x")
            .with_form([("a", "b")]);
        assert_eq!(options.body_source_count(), 2);
    }

    #[test]
    fn test_auth_debug_redacts() {
        let auth = Auth::Basic {
            user: "svc".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{:?}", auth);
        assert!(debug.contains("svc"));
        assert!(!debug.contains("hunter2"));
    }
}
