//! The high level client: URL resolution, request shaping, dispatch.

use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{Method, Request, Response};
use url::Url;

use crate::batch::Batch;
use crate::body::Body;
use crate::error::Error;
use crate::exchange::Exchange;
use crate::middleware;
use crate::options::RequestOptions;
use crate::stack::{HandlerStack, Middleware};
use crate::transport::curl_transport;

/// A synchronous HTTP client over a middleware stack.
///
/// Every dispatch runs the request through the client's
/// [`HandlerStack`]; the stack's terminal handler performs the transfer
/// with libcurl. A fresh client carries the curl transport plus the
/// [`http_errors`](crate::middleware::http_errors) layer.
///
/// The client is single threaded, like the easy handles it wraps.
/// Create one client per thread.
///
/// ```no_run
/// # fn main() -> Result<(), curlstack::Error> {
/// use curlstack::{Client, RequestOptions};
///
/// let client = Client::builder()
///     .with_base_url("http://api.example.com/v1/")
///     .build()?;
///
/// let response = client.get("status")?;
/// println!("{}", response.body().text());
/// # Ok(())
/// # }
/// ```
pub struct Client {
    stack: HandlerStack,
    base_url: Option<Url>,
    defaults: RequestOptions,
}

impl Client {
    /// A client with the default stack and no base URL.
    pub fn new() -> Self {
        Self {
            stack: default_stack(),
            base_url: None,
            defaults: RequestOptions::new(),
        }
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Dispatches a GET and waits for the response.
    pub fn get(&self, url: impl AsRef<str>) -> Result<Response<Body>, Error> {
        self.request(Method::GET, url, RequestOptions::new())
    }

    pub fn head(&self, url: impl AsRef<str>) -> Result<Response<Body>, Error> {
        self.request(Method::HEAD, url, RequestOptions::new())
    }

    pub fn delete(&self, url: impl AsRef<str>) -> Result<Response<Body>, Error> {
        self.request(Method::DELETE, url, RequestOptions::new())
    }

    pub fn options(&self, url: impl AsRef<str>) -> Result<Response<Body>, Error> {
        self.request(Method::OPTIONS, url, RequestOptions::new())
    }

    pub fn post(
        &self,
        url: impl AsRef<str>,
        options: RequestOptions,
    ) -> Result<Response<Body>, Error> {
        self.request(Method::POST, url, options)
    }

    pub fn put(
        &self,
        url: impl AsRef<str>,
        options: RequestOptions,
    ) -> Result<Response<Body>, Error> {
        self.request(Method::PUT, url, options)
    }

    pub fn patch(
        &self,
        url: impl AsRef<str>,
        options: RequestOptions,
    ) -> Result<Response<Body>, Error> {
        self.request(Method::PATCH, url, options)
    }

    /// Dispatches a request with any method and the full option set.
    pub fn request(
        &self,
        method: Method,
        url: impl AsRef<str>,
        options: RequestOptions,
    ) -> Result<Response<Body>, Error> {
        let exchange = self.prepare(method, url.as_ref(), options)?;
        self.dispatch(exchange)
    }

    /// Dispatches an already built request with default options.
    ///
    /// The message is sent as-is: no base URL resolution and no body
    /// shaping happen here. See [`Client::send_with`].
    pub fn send(&self, request: Request<Body>) -> Result<Response<Body>, Error> {
        self.send_with(request, RequestOptions::new())
    }

    /// Dispatches an already built request with explicit options.
    ///
    /// Only the transport side of `options` applies (timeouts,
    /// redirects, TLS, proxy, auth, user agent, `http_errors`). Header,
    /// query and body options are ignored; the message already carries
    /// those.
    pub fn send_with(
        &self,
        request: Request<Body>,
        options: RequestOptions,
    ) -> Result<Response<Body>, Error> {
        let options = options.merge_over(&self.defaults);
        self.dispatch(Exchange::new(request, options))
    }

    /// Starts an empty batch bound to this client's stack.
    pub fn batch(&self) -> Batch<'_> {
        Batch::new(self)
    }

    /// Resolves the URL, shapes the message and merges the defaults
    /// into one dispatchable exchange.
    pub(crate) fn prepare(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<Exchange, Error> {
        let options = options.merge_over(&self.defaults);
        let resolved = self.resolve_url(url, &options)?;
        let request = shape_request(method, &resolved, &options)?;
        Ok(Exchange::new(request, options))
    }

    pub(crate) fn stack(&self) -> &HandlerStack {
        &self.stack
    }

    pub(crate) fn defaults(&self) -> &RequestOptions {
        &self.defaults
    }

    fn dispatch(&self, exchange: Exchange) -> Result<Response<Body>, Error> {
        self.stack.handle(exchange)?.wait()
    }

    /// Joins `url` against the base URL and appends the query pairs
    /// from the options to whatever query the URL already has.
    fn resolve_url(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<Url, Error> {
        let mut resolved = match &self.base_url {
            Some(base) => base.join(url).map_err(|e| {
                Error::builder(format!("could not resolve {url:?}: {e}"))
            })?,
            None => Url::parse(url).map_err(|e| {
                Error::builder(format!("invalid URL {url:?}: {e}"))
            })?,
        };

        if !options.query().is_empty() {
            let mut pairs = resolved.query_pairs_mut();
            for (name, value) in options.query() {
                pairs.append_pair(name, value);
            }
        }
        Ok(resolved)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}

/// Configures a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    defaults: RequestOptions,
    stack: Option<HandlerStack>,
    middleware: Vec<(Middleware, String)>,
}

impl ClientBuilder {
    /// Base URL that relative request URLs are joined against.
    ///
    /// Joining follows RFC 3986, so the trailing slash matters:
    /// `"users"` against `http://h/api/` resolves to `/api/users`, but
    /// against `http://h/api` it resolves to `/users`.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Options merged under every request's own options.
    #[must_use]
    pub fn with_defaults(mut self, options: RequestOptions) -> Self {
        self.defaults = options;
        self
    }

    /// Replaces the default handler stack entirely. A stack without a
    /// transport gets the curl terminal installed at build time.
    #[must_use]
    pub fn with_stack(mut self, stack: HandlerStack) -> Self {
        self.stack = Some(stack);
        self
    }

    /// Pushes a middleware onto the stack the client will use.
    #[must_use]
    pub fn with_middleware(
        mut self,
        middleware: Middleware,
        name: impl Into<String>,
    ) -> Self {
        self.middleware.push((middleware, name.into()));
        self
    }

    pub fn build(self) -> Result<Client, Error> {
        let base_url = self
            .base_url
            .map(|raw| {
                Url::parse(&raw).map_err(|e| {
                    Error::builder(format!("invalid base URL {raw:?}: {e}"))
                })
            })
            .transpose()?;

        let mut stack = self.stack.unwrap_or_else(default_stack);
        if !stack.has_transport() {
            stack.set_transport(curl_transport());
        }
        for (middleware, name) in self.middleware {
            stack.push(middleware, name);
        }

        Ok(Client {
            stack,
            base_url,
            defaults: self.defaults,
        })
    }
}

/// The stack a plain client runs: curl transport with status checking.
fn default_stack() -> HandlerStack {
    let mut stack = HandlerStack::with_transport(curl_transport());
    stack.push(middleware::http_errors(), "http_errors");
    stack
}

/// Builds the message: method and URL onto the request line, option
/// headers folded in, exactly one body source expanded.
fn shape_request(
    method: Method,
    url: &Url,
    options: &RequestOptions,
) -> Result<Request<Body>, Error> {
    if options.body_source_count() > 1 {
        return Err(Error::builder(
            "body, json and form options are mutually exclusive",
        ));
    }

    let mut body = options.body_ref().cloned();
    let mut content_type = None;

    if body.is_none() {
        if let Some(pairs) = options.form_ref() {
            body = Some(Body::from(encode_form(pairs)));
            content_type = Some("application/x-www-form-urlencoded");
        }
    }
    #[cfg(feature = "json")]
    if body.is_none() {
        if let Some(value) = options.json_ref() {
            let bytes = serde_json::to_vec(value).map_err(|e| {
                Error::builder(format!("could not serialize json body: {e}"))
            })?;
            body = Some(Body::from(bytes));
            content_type = Some("application/json");
        }
    }

    let mut request = Request::builder()
        .method(method)
        .uri(url.as_str())
        .body(body.unwrap_or_default())
        .map_err(|e| Error::builder(format!("invalid request: {e}")))?;

    for (name, value) in options.headers() {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            Error::builder(format!("invalid header name {name:?}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            Error::builder(format!("invalid value for header {name}"))
        })?;
        request.headers_mut().append(name, value);
    }

    if let Some(content_type) = content_type {
        if !request.headers().contains_key(CONTENT_TYPE) {
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }

    Ok(request)
}

fn encode_form(pairs: &[(String, String)]) -> Vec<u8> {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        serializer.append_pair(name, value);
    }
    serializer.finish().into_bytes()
}
