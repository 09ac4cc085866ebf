//! Maps a typed request onto a curl easy handle.

use curl::easy::{Easy2, List};
use http::{Method, Request};

use super::collect::Collector;
use crate::body::Body;
use crate::error::Error;
use crate::options::{Auth, RedirectPolicy, RequestOptions};

/// Applies the request line, headers, body and transport options to
/// `easy`. The request is expected to be fully shaped: URL resolved,
/// body chosen, option headers already folded into the message.
pub(crate) fn apply(
    easy: &mut Easy2<Collector>,
    request: &Request<Body>,
    options: &RequestOptions,
) -> Result<(), Error> {
    easy.url(&request.uri().to_string()).map_err(setup)?;
    apply_method(easy, request).map_err(setup)?;

    let mut list = List::new();
    for line in header_lines(request, options)? {
        list.append(&line).map_err(setup)?;
    }
    easy.http_headers(list).map_err(setup)?;

    easy.useragent(options.user_agent()).map_err(setup)?;
    easy.signal(false).map_err(setup)?;

    if let Some(timeout) = options.timeout() {
        easy.timeout(timeout).map_err(setup)?;
    }
    easy.connect_timeout(options.connect_timeout()).map_err(setup)?;

    match options.redirect_policy() {
        RedirectPolicy::None => easy.follow_location(false).map_err(setup)?,
        RedirectPolicy::Limited(max) => {
            easy.follow_location(true).map_err(setup)?;
            easy.max_redirections(max).map_err(setup)?;
        }
    }

    if !options.tls_verify() {
        easy.ssl_verify_peer(false).map_err(setup)?;
        easy.ssl_verify_host(false).map_err(setup)?;
    }
    if let Some(path) = options.ca_bundle() {
        easy.cainfo(path).map_err(setup)?;
    }
    if let Some(proxy) = options.proxy() {
        easy.proxy(proxy).map_err(setup)?;
    }
    if let Some(Auth::Basic { user, password }) = options.auth() {
        easy.username(user).map_err(setup)?;
        easy.password(password).map_err(setup)?;
    }

    Ok(())
}

/// Chooses the libcurl verb options for the method and body.
///
/// Any request with a body goes through POSTFIELDS so libcurl sends a
/// Content-Length; the method is then forced back with CUSTOMREQUEST
/// where it is not POST.
fn apply_method(
    easy: &mut Easy2<Collector>,
    request: &Request<Body>,
) -> Result<(), curl::Error> {
    let method = request.method();
    let body = request.body();

    if !body.is_empty() {
        easy.post(true)?;
        easy.post_fields_copy(body.bytes())?;
        match *method {
            Method::POST => {}
            Method::HEAD => {
                easy.nobody(true)?;
                easy.custom_request("HEAD")?;
            }
            _ => easy.custom_request(method.as_str())?,
        }
    } else {
        match *method {
            Method::GET => easy.get(true)?,
            Method::HEAD => easy.nobody(true)?,
            Method::POST => {
                easy.post(true)?;
                easy.post_fields_copy(&[])?;
            }
            _ => easy.custom_request(method.as_str())?,
        }
    }
    Ok(())
}

/// Builds the outgoing header list from the message headers plus the
/// auth option.
///
/// libcurl conventions apply: a bare `Name;` sends an empty value, and
/// an `Expect:` entry suppresses the automatic `Expect: 100-continue`
/// unless the caller set their own.
pub(crate) fn header_lines(
    request: &Request<Body>,
    options: &RequestOptions,
) -> Result<Vec<String>, Error> {
    let mut lines = Vec::new();
    let mut saw_expect = false;

    for (name, value) in request.headers() {
        let text = value.to_str().map_err(|_| {
            Error::builder(format!("header {name} has a non-text value"))
        })?;
        if *name == http::header::EXPECT {
            saw_expect = true;
        }
        if *name == http::header::AUTHORIZATION && options.auth().is_some() {
            continue;
        }
        if text.is_empty() {
            lines.push(format!("{name};"));
        } else {
            lines.push(format!("{name}: {text}"));
        }
    }

    if let Some(Auth::Bearer { token }) = options.auth() {
        lines.push(format!("Authorization: Bearer {token}"));
    }
    if !saw_expect {
        lines.push("Expect:".to_string());
    }

    Ok(lines)
}

fn setup(source: curl::Error) -> Error {
    Error::builder(format!("curl rejected a transfer option: {source}"))
}
