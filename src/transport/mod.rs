//! The terminal handler: where exchanges become libcurl transfers.
//!
//! [`curl_transport`] is what a default [`HandlerStack`](crate::HandlerStack)
//! has at its bottom. It runs in one of two modes decided by the
//! exchange itself: a plain dispatch performs the transfer inline on a
//! fresh easy handle and returns a settled delivery, while an exchange
//! tagged by the batch runner is attached to that batch's multi driver
//! and returns a pending delivery instead.

pub(crate) mod collect;
pub(crate) mod configure;
pub(crate) mod multi;
pub(crate) mod parse;

use std::rc::Rc;
use std::time::Duration;

use curl::easy::Easy2;
use http::{Method, Request, Response};

use self::collect::Collector;
use self::multi::MultiDriver;
use crate::body::Body;
use crate::delivery::Delivery;
use crate::error::Error;
use crate::exchange::Exchange;
use crate::options::RequestOptions;
use crate::stack::Handler;

/// Transfer facts reported by libcurl, attached to every response as an
/// extension.
///
/// ```no_run
/// # fn main() -> Result<(), curlstack::Error> {
/// use curlstack::{Client, TransferInfo};
///
/// let client = Client::new();
/// let response = client.get("http://example.com/")?;
/// if let Some(info) = response.extensions().get::<TransferInfo>() {
///     println!("{} after {} redirects", info.effective_url, info.redirect_count);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct TransferInfo {
    /// Final URL after any redirects libcurl followed.
    pub effective_url: String,
    /// Number of redirect hops taken.
    pub redirect_count: u32,
    /// Total transfer time as measured by libcurl.
    pub total_time: Duration,
}

impl TransferInfo {
    fn read(easy: &mut Easy2<Collector>, requested_url: &str) -> Self {
        let effective_url = match easy.effective_url() {
            Ok(Some(url)) => url.to_string(),
            _ => requested_url.to_string(),
        };
        Self {
            effective_url,
            redirect_count: easy.redirect_count().unwrap_or(0),
            total_time: easy.total_time().unwrap_or(Duration::ZERO),
        }
    }
}

/// The libcurl terminal handler.
pub fn curl_transport() -> Handler {
    Rc::new(|mut exchange: Exchange| {
        let driver = exchange.take_driver();
        let (request, options) = exchange.into_parts();
        match driver {
            Some(driver) => dispatch_multi(&driver, request, options),
            None => Delivery::ready(dispatch_blocking(request, options)),
        }
    })
}

fn dispatch_blocking(
    request: Request<Body>,
    options: RequestOptions,
) -> Result<Response<Body>, Error> {
    let method = request.method().clone();
    let url = request.uri().to_string();

    #[cfg(feature = "tracing")]
    tracing::trace!(%method, %url, "performing blocking transfer");

    let mut easy = Easy2::new(Collector::new());
    configure::apply(&mut easy, &request, &options)?;
    match easy.perform() {
        Ok(()) => finish(&mut easy, &method, &url),
        Err(source) => Err(Error::from_curl(method, url, source)),
    }
}

fn dispatch_multi(
    driver: &Rc<MultiDriver>,
    request: Request<Body>,
    options: RequestOptions,
) -> Delivery {
    let method = request.method().clone();
    let url = request.uri().to_string();

    let mut easy = Easy2::new(Collector::new());
    if let Err(err) = configure::apply(&mut easy, &request, &options) {
        return Delivery::ready(Err(err));
    }
    driver.enqueue(easy, method, url)
}

/// Builds the typed response out of a completed easy handle.
pub(crate) fn finish(
    easy: &mut Easy2<Collector>,
    method: &Method,
    url: &str,
) -> Result<Response<Body>, Error> {
    let info = TransferInfo::read(easy, url);
    let (head, body) = easy.get_mut().take();

    let parsed = parse::parse_head(&head).map_err(|message| Error::Protocol {
        method: method.clone(),
        url: url.to_string(),
        message,
    })?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = parsed.status;
    *response.version_mut() = parsed.version;
    *response.headers_mut() = parsed.headers;
    response.extensions_mut().insert(info);
    Ok(response)
}
