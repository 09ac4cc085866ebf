//! Concurrent dispatch of many requests over one multi handle.
//!
//! A batch collects request descriptions, then drives them through the
//! owning client's handler stack with the curl multi interface doing the
//! actual transfers. Everything runs on the calling thread: the batch
//! interleaves socket work across transfers instead of spawning
//! anything.

use std::rc::Rc;

use http::{Method, Request, Response};

use crate::body::Body;
use crate::client::Client;
use crate::delivery::Delivery;
use crate::error::Error;
use crate::exchange::Exchange;
use crate::options::RequestOptions;
use crate::transport::multi::MultiDriver;

/// How many transfers a batch keeps in flight unless told otherwise.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

type ResponseCallback<'a> = Box<dyn FnMut(usize, &Response<Body>) + 'a>;
type ErrorCallback<'a> = Box<dyn FnMut(usize, &Error) + 'a>;

/// One queued request: either a description the client still has to
/// resolve and shape, or a finished message sent as-is.
enum Entry {
    Described {
        method: Method,
        url: String,
        options: RequestOptions,
    },
    Prepared {
        request: Request<Body>,
        options: RequestOptions,
    },
}

/// A set of requests executed concurrently through one client.
///
/// Results come back in the order the requests were added, regardless
/// of completion order. At most [`concurrency`](Batch::with_concurrency)
/// transfers are active at a time; the rest wait their turn.
///
/// ```no_run
/// # fn main() -> Result<(), curlstack::Error> {
/// use curlstack::Client;
///
/// let client = Client::new();
/// let mut batch = client.batch().with_concurrency(4);
/// for page in 1..=20 {
///     batch.get(format!("http://example.com/page/{page}"));
/// }
/// for result in batch.run()? {
///     let response = result?;
///     println!("{}", response.status());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Batch<'a> {
    client: &'a Client,
    concurrency: usize,
    entries: Vec<Entry>,
    on_response: Option<ResponseCallback<'a>>,
    on_error: Option<ErrorCallback<'a>>,
}

impl<'a> Batch<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self {
            client,
            concurrency: DEFAULT_BATCH_CONCURRENCY,
            entries: Vec::new(),
            on_response: None,
            on_error: None,
        }
    }

    /// Caps the number of simultaneously active transfers. Zero is
    /// treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Called as each transfer succeeds, with the request's position in
    /// the batch.
    #[must_use]
    pub fn on_response<F>(mut self, callback: F) -> Self
    where
        F: FnMut(usize, &Response<Body>) + 'a,
    {
        self.on_response = Some(Box::new(callback));
        self
    }

    /// Called as each transfer fails, with the request's position in
    /// the batch.
    #[must_use]
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnMut(usize, &Error) + 'a,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Adds a request to the batch.
    pub fn add(
        &mut self,
        method: Method,
        url: impl Into<String>,
        options: RequestOptions,
    ) {
        self.entries.push(Entry::Described {
            method,
            url: url.into(),
            options,
        });
    }

    /// Adds a plain GET.
    pub fn get(&mut self, url: impl Into<String>) {
        self.add(Method::GET, url, RequestOptions::new());
    }

    /// Adds an already built request.
    ///
    /// As with [`Client::send_with`], the message goes out untouched:
    /// no base URL resolution, no body shaping, and only the transport
    /// side of `options` applies.
    pub fn add_request(
        &mut self,
        request: Request<Body>,
        options: RequestOptions,
    ) {
        self.entries.push(Entry::Prepared { request, options });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every request to completion and returns one result per
    /// request, in insertion order.
    ///
    /// Per-transfer failures land in their slot of the returned vector;
    /// the outer `Err` is reserved for the multi interface itself
    /// failing, which abandons the whole batch.
    pub fn run(self) -> Result<Vec<Result<Response<Body>, Error>>, Error> {
        self.execute(true)
            .map(|results| results.unwrap_or_default())
    }

    /// Runs every request, reporting outcomes only through the
    /// callbacks.
    pub fn for_each(self) -> Result<(), Error> {
        self.execute(false).map(|_| ())
    }

    fn execute(
        mut self,
        collect: bool,
    ) -> Result<Option<Vec<Result<Response<Body>, Error>>>, Error> {
        let driver = Rc::new(MultiDriver::new());
        let total = self.entries.len();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            total,
            concurrency = self.concurrency,
            "running batch"
        );

        let mut slots: Vec<Option<Result<Response<Body>, Error>>> = if collect {
            (0..total).map(|_| None).collect()
        } else {
            Vec::new()
        };

        let mut queue = std::mem::take(&mut self.entries).into_iter().enumerate();
        let mut outstanding: Vec<(usize, Delivery)> = Vec::new();
        let mut remaining = total;

        while remaining > 0 {
            while outstanding.len() < self.concurrency {
                let Some((index, entry)) = queue.next() else {
                    break;
                };
                let delivery = self.start(&driver, entry);
                outstanding.push((index, delivery));
            }

            // Drain whatever is already settled before going back to the
            // sockets; middleware can settle a delivery without any
            // transfer happening.
            let mut position = 0;
            while position < outstanding.len() {
                let taken = outstanding[position].1.try_take();
                match taken {
                    Some(result) => {
                        let (index, _) = outstanding.swap_remove(position);
                        self.report(index, &result);
                        if collect {
                            slots[index] = Some(result);
                        }
                        remaining -= 1;
                    }
                    None => position += 1,
                }
            }

            if !outstanding.is_empty() {
                if let Err(source) = driver.tick() {
                    driver.abandon(&source);
                    return Err(Error::Multi { source });
                }
            }
        }

        Ok(collect.then(|| {
            slots
                .into_iter()
                .map(|slot| {
                    slot.unwrap_or_else(|| {
                        Err(Error::builder("batch slot never settled"))
                    })
                })
                .collect()
        }))
    }

    /// Prepares one entry and dispatches it through the stack with the
    /// batch's driver attached. Shaping failures become settled
    /// deliveries so they occupy their result slot like any other
    /// outcome.
    fn start(&self, driver: &Rc<MultiDriver>, entry: Entry) -> Delivery {
        let mut exchange = match entry {
            Entry::Described {
                method,
                url,
                options,
            } => match self.client.prepare(method, &url, options) {
                Ok(exchange) => exchange,
                Err(err) => return Delivery::ready(Err(err)),
            },
            Entry::Prepared { request, options } => {
                Exchange::new(request, options.merge_over(self.client.defaults()))
            }
        };
        exchange.set_driver(Rc::clone(driver));
        match self.client.stack().handle(exchange) {
            Ok(delivery) => delivery,
            Err(err) => Delivery::ready(Err(err.into())),
        }
    }

    fn report(&mut self, index: usize, result: &Result<Response<Body>, Error>) {
        match result {
            Ok(response) => {
                if let Some(callback) = &mut self.on_response {
                    callback(index, response);
                }
            }
            Err(error) => {
                if let Some(callback) = &mut self.on_error {
                    callback(index, error);
                }
            }
        }
    }
}

impl std::fmt::Debug for Batch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("requests", &self.entries.len())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}
