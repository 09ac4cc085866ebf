use std::fmt;
use std::rc::Rc;

use http::Request;

use crate::body::Body;
use crate::options::RequestOptions;
use crate::transport::multi::MultiDriver;

/// One request travelling down the handler stack, paired with its
/// resolved options.
///
/// When the exchange belongs to a batch it carries a handle to the multi
/// driver; the terminal handler uses that to register the transfer with
/// the multi interface instead of performing it inline.
pub struct Exchange {
    pub request: Request<Body>,
    pub options: RequestOptions,
    driver: Option<Rc<MultiDriver>>,
}

impl Exchange {
    pub fn new(request: Request<Body>, options: RequestOptions) -> Self {
        Self {
            request,
            options,
            driver: None,
        }
    }

    /// Applies a transform to the request, keeping options and routing.
    pub fn map_request<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Request<Body>) -> Request<Body>,
    {
        self.request = f(self.request);
        self
    }

    pub(crate) fn set_driver(&mut self, driver: Rc<MultiDriver>) {
        self.driver = Some(driver);
    }

    pub(crate) fn take_driver(&mut self) -> Option<Rc<MultiDriver>> {
        self.driver.take()
    }

    pub(crate) fn into_parts(self) -> (Request<Body>, RequestOptions) {
        (self.request, self.options)
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("batched", &self.driver.is_some())
            .finish_non_exhaustive()
    }
}
