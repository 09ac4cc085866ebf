//! Drives concurrent transfers over the curl multi interface.
//!
//! A [`MultiDriver`] owns one `Multi` handle and the set of transfers
//! currently attached to it. Everything is single threaded: progress
//! happens only when someone calls [`MultiDriver::tick`], which the
//! pending [`Delivery`](crate::Delivery) values do from `wait` and the
//! batch runner does from its drain loop.

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;
use std::time::Duration;

use curl::easy::Easy2;
use curl::multi::{Easy2Handle, Multi};
use http::Method;

use super::collect::Collector;
use super::finish;
use crate::delivery::Delivery;
use crate::error::Error;

const TICK_WAIT: Duration = Duration::from_millis(50);

struct ActiveTransfer {
    handle: Easy2Handle<Collector>,
    delivery: Delivery,
    method: Method,
    url: String,
}

pub(crate) struct MultiDriver {
    multi: Multi,
    active: RefCell<Vec<ActiveTransfer>>,
}

impl MultiDriver {
    pub(crate) fn new() -> Self {
        Self {
            multi: Multi::new(),
            active: RefCell::new(Vec::new()),
        }
    }

    /// Attaches a configured handle to the multi stack and returns the
    /// delivery that will settle when the transfer finishes.
    pub(crate) fn enqueue(
        self: &Rc<Self>,
        easy: Easy2<Collector>,
        method: Method,
        url: String,
    ) -> Delivery {
        let handle = match self.multi.add2(easy) {
            Ok(handle) => handle,
            Err(source) => return Delivery::ready(Err(Error::Multi { source })),
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(%method, %url, "transfer attached to multi driver");

        let delivery = Delivery::pending(Rc::clone(self));
        self.active.borrow_mut().push(ActiveTransfer {
            handle,
            delivery: delivery.clone(),
            method,
            url,
        });
        delivery
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.active.borrow().len()
    }

    /// Advances every attached transfer: performs pending socket work,
    /// settles whatever finished, then sleeps in `multi.wait` if
    /// transfers remain. One call never blocks longer than the wait
    /// window.
    pub(crate) fn tick(&self) -> Result<(), curl::MultiError> {
        self.multi.perform()?;

        let mut finished: Vec<(usize, Result<(), curl::Error>)> = Vec::new();
        {
            let active = self.active.borrow();
            self.multi.messages(|message| {
                for (index, transfer) in active.iter().enumerate() {
                    if let Some(result) = message.result_for2(&transfer.handle) {
                        finished.push((index, result));
                        break;
                    }
                }
            });
        }

        // Detach back to front so earlier indices stay valid, and settle
        // outside any borrow of the active list.
        finished.sort_by(|a, b| b.0.cmp(&a.0));
        for (index, result) in finished {
            let transfer = self.active.borrow_mut().swap_remove(index);
            let mut easy = self.multi.remove2(transfer.handle)?;
            let outcome = match result {
                Ok(()) => finish(&mut easy, &transfer.method, &transfer.url),
                Err(source) => {
                    Err(Error::from_curl(transfer.method, transfer.url, source))
                }
            };

            #[cfg(feature = "tracing")]
            match &outcome {
                Ok(response) => tracing::trace!(
                    status = %response.status(),
                    "transfer settled"
                ),
                Err(error) => tracing::trace!(%error, "transfer settled"),
            }

            transfer.delivery.settle(outcome);
        }

        if !self.active.borrow().is_empty() {
            self.multi.wait(&mut [], TICK_WAIT)?;
        }
        Ok(())
    }

    /// Detaches every remaining transfer and settles its delivery with
    /// the multi error. Called when a tick fails and the batch gives up;
    /// the settled deliveries release their driver handles, so nothing
    /// keeps the driver alive past the batch.
    pub(crate) fn abandon(&self, source: &curl::MultiError) {
        let orphaned = mem::take(&mut *self.active.borrow_mut());

        #[cfg(feature = "tracing")]
        if !orphaned.is_empty() {
            tracing::trace!(
                abandoned = orphaned.len(),
                %source,
                "detaching transfers after multi failure"
            );
        }

        for transfer in orphaned {
            let _ = self.multi.remove2(transfer.handle);
            transfer.delivery.settle(Err(Error::Multi {
                source: source.clone(),
            }));
        }
    }
}

impl std::fmt::Debug for MultiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiDriver")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
