//! Transfer outcomes that may still be in flight.
//!
//! A [`Delivery`] is what a handler returns: either already settled (the
//! blocking transport performs the transfer inline) or pending on the
//! curl multi driver (batch dispatch). Response-phase middleware attaches
//! through [`Delivery::then`]; pending transforms run on the driver tick
//! that finishes the transfer, in attachment order.
//!
//! Everything here is single threaded: transfers are resolved by
//! cooperatively polling the multi handle, never by other threads.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use http::Response;

use crate::body::Body;
use crate::error::Error;
use crate::transport::multi::MultiDriver;

type TransferResult = Result<Response<Body>, Error>;
type ThenFn = Box<dyn FnOnce(TransferResult) -> TransferResult>;

enum State {
    Pending {
        driver: Rc<MultiDriver>,
        callbacks: Vec<ThenFn>,
    },
    /// Mid-settlement: transforms attached now join the running fold.
    Settling { queued: Vec<ThenFn> },
    /// `None` once the result has been taken.
    Settled(Option<TransferResult>),
}

/// A settled-or-pending transfer outcome.
///
/// Settles exactly once; the first settlement wins and later ones are
/// ignored.
pub struct Delivery {
    state: Rc<RefCell<State>>,
}

impl Clone for Delivery {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl Delivery {
    /// An already-settled outcome.
    pub fn ready(result: TransferResult) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Settled(Some(result)))),
        }
    }

    /// An outcome that settles when `driver` finishes the transfer.
    pub(crate) fn pending(driver: Rc<MultiDriver>) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Pending {
                driver,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Appends a transform over the eventual result.
    ///
    /// Runs immediately when the delivery is already settled, otherwise on
    /// the driver tick that settles it. A transform attached from inside
    /// another transform of the same delivery joins the end of the
    /// running fold.
    #[must_use]
    pub fn then<F>(self, f: F) -> Self
    where
        F: FnOnce(TransferResult) -> TransferResult + 'static,
    {
        {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    callbacks.push(Box::new(f));
                }
                State::Settling { queued } => {
                    queued.push(Box::new(f));
                }
                State::Settled(slot) => {
                    if let Some(result) = slot.take() {
                        *slot = Some(f(result));
                    }
                }
            }
        }
        self
    }

    /// Settles the delivery, folding the result through the queued
    /// transforms. A second settlement is ignored.
    pub(crate) fn settle(&self, result: TransferResult) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    let callbacks = mem::take(callbacks);
                    *state = State::Settling { queued: Vec::new() };
                    callbacks
                }
                State::Settling { .. } | State::Settled(_) => return,
            }
        };

        let mut result = result;
        for callback in callbacks {
            result = callback(result);
        }

        // Keep folding until the callbacks stop attaching new transforms.
        loop {
            let queued = {
                let mut state = self.state.borrow_mut();
                match &mut *state {
                    State::Settling { queued } if queued.is_empty() => {
                        *state = State::Settled(Some(result));
                        return;
                    }
                    State::Settling { queued } => mem::take(queued),
                    State::Pending { .. } | State::Settled(_) => return,
                }
            };
            for callback in queued {
                result = callback(result);
            }
        }
    }

    /// Takes the result if the transfer has finished.
    pub fn try_take(&self) -> Option<TransferResult> {
        match &mut *self.state.borrow_mut() {
            State::Settled(slot) => slot.take(),
            State::Pending { .. } | State::Settling { .. } => None,
        }
    }

    /// Blocks until the transfer settles, pumping the multi driver.
    pub fn wait(self) -> TransferResult {
        loop {
            if let Some(result) = self.try_take() {
                return result;
            }
            let driver = match &*self.state.borrow() {
                State::Pending { driver, .. } => Rc::clone(driver),
                State::Settling { .. } => {
                    return Err(Error::builder(
                        "cannot wait on a delivery from inside its own transform",
                    ));
                }
                // Settled with the result already taken; nothing sane to
                // return twice.
                State::Settled(_) => {
                    return Err(Error::builder(
                        "delivery result was already taken",
                    ));
                }
            };
            if let Err(source) = driver.tick() {
                driver.abandon(&source);
                return Err(Error::Multi { source });
            }
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &*self.state.borrow() {
            State::Pending { callbacks, .. } => {
                return write!(f, "Delivery::Pending({} transforms)", callbacks.len());
            }
            State::Settling { queued } => {
                return write!(f, "Delivery::Settling({} queued)", queued.len());
            }
            State::Settled(Some(Ok(_))) => "Delivery::Settled(Ok)",
            State::Settled(Some(Err(_))) => "Delivery::Settled(Err)",
            State::Settled(None) => "Delivery::Taken",
        };
        f.write_str(label)
    }
}
