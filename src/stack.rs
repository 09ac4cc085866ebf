//! Middleware composition around a terminal transport handler.
//!
//! A handler turns an [`Exchange`] into a [`Delivery`]; middleware are
//! decorators over handlers. The stack keeps middleware as named layers
//! and composes them around the transport on demand: the first layer
//! pushed sits outermost, seeing the request first and the response last.
//! The composed handler is cached until the stack is mutated.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::delivery::Delivery;
use crate::exchange::Exchange;

/// A request handler: terminal transport or composed stack.
pub type Handler = Rc<dyn Fn(Exchange) -> Delivery>;

/// A decorator over a handler.
pub type Middleware = Rc<dyn Fn(Handler) -> Handler>;

/// Stack setup errors, distinct from transfer errors: these mean the
/// stack itself is malformed, not that a request failed.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum StackError {
    #[error("handler stack has no transport handler")]
    MissingTransport,

    #[error("no middleware named {0:?} in the stack")]
    NotFound(String),
}

#[derive(Default)]
pub struct HandlerStack {
    transport: Option<Handler>,
    layers: Vec<(Middleware, String)>,
    composed: RefCell<Option<Handler>>,
}

impl HandlerStack {
    /// An empty stack: no transport, no middleware.
    pub fn new() -> Self {
        Self::default()
    }

    /// A stack with `transport` as its terminal handler.
    pub fn with_transport(transport: Handler) -> Self {
        Self {
            transport: Some(transport),
            layers: Vec::new(),
            composed: RefCell::new(None),
        }
    }

    pub fn set_transport(&mut self, transport: Handler) {
        self.transport = Some(transport);
        self.invalidate();
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Appends a layer; it will sit closest to the transport so far.
    pub fn push(&mut self, middleware: Middleware, name: impl Into<String>) {
        self.layers.push((middleware, name.into()));
        self.invalidate();
    }

    /// Prepends a layer; it becomes the outermost.
    pub fn unshift(&mut self, middleware: Middleware, name: impl Into<String>) {
        self.layers.insert(0, (middleware, name.into()));
        self.invalidate();
    }

    /// Inserts a layer outside the named one (it runs earlier on the
    /// request path).
    pub fn before(
        &mut self,
        existing: &str,
        middleware: Middleware,
        name: impl Into<String>,
    ) -> Result<(), StackError> {
        let index = self.position(existing)?;
        self.layers.insert(index, (middleware, name.into()));
        self.invalidate();
        Ok(())
    }

    /// Inserts a layer inside the named one (it runs later on the request
    /// path).
    pub fn after(
        &mut self,
        existing: &str,
        middleware: Middleware,
        name: impl Into<String>,
    ) -> Result<(), StackError> {
        let index = self.position(existing)?;
        self.layers.insert(index + 1, (middleware, name.into()));
        self.invalidate();
        Ok(())
    }

    /// Removes every layer with this name. Returns whether anything was
    /// removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.layers.len();
        self.layers.retain(|(_, n)| n != name);
        let removed = self.layers.len() != before;
        if removed {
            self.invalidate();
        }
        removed
    }

    /// Names of the layers, outermost first.
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|(_, n)| n.as_str()).collect()
    }

    /// Composes (or returns the cached) handler chain.
    pub fn resolve(&self) -> Result<Handler, StackError> {
        if let Some(handler) = &*self.composed.borrow() {
            return Ok(Rc::clone(handler));
        }

        let transport = self
            .transport
            .clone()
            .ok_or(StackError::MissingTransport)?;

        let mut handler = transport;
        for (layer, _) in self.layers.iter().rev() {
            handler = layer(handler);
        }

        *self.composed.borrow_mut() = Some(Rc::clone(&handler));
        Ok(handler)
    }

    /// Dispatches an exchange through the composed chain.
    pub fn handle(&self, exchange: Exchange) -> Result<Delivery, StackError> {
        Ok(self.resolve()?(exchange))
    }

    fn position(&self, name: &str) -> Result<usize, StackError> {
        self.layers
            .iter()
            .position(|(_, n)| n == name)
            .ok_or_else(|| StackError::NotFound(name.to_string()))
    }

    fn invalidate(&mut self) {
        self.composed.borrow_mut().take();
    }
}

impl From<StackError> for crate::Error {
    fn from(err: StackError) -> Self {
        crate::Error::builder(err.to_string())
    }
}

impl fmt::Debug for HandlerStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerStack")
            .field("transport", &self.transport.is_some())
            .field("layers", &self.layer_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, Response, StatusCode};

    use crate::body::Body;
    use crate::options::RequestOptions;

    type Trace = Rc<RefCell<Vec<&'static str>>>;

    fn terminal(trace: Trace) -> Handler {
        Rc::new(move |_exchange: Exchange| {
            trace.borrow_mut().push("transport");
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::OK;
            Delivery::ready(Ok(response))
        })
    }

    fn tracing_layer(trace: Trace, label: &'static str) -> Middleware {
        Rc::new(move |next: Handler| -> Handler {
            let trace = Rc::clone(&trace);
            Rc::new(move |exchange: Exchange| {
                trace.borrow_mut().push(label);
                next(exchange)
            })
        })
    }

    fn exchange() -> Exchange {
        Exchange::new(Request::new(Body::empty()), RequestOptions::new())
    }

    fn dispatch(stack: &HandlerStack) {
        stack
            .handle(exchange())
            .unwrap()
            .try_take()
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_first_pushed_runs_first() {
        let trace: Trace = Rc::default();
        let mut stack = HandlerStack::with_transport(terminal(trace.clone()));
        stack.push(tracing_layer(trace.clone(), "outer"), "outer");
        stack.push(tracing_layer(trace.clone(), "inner"), "inner");

        dispatch(&stack);
        assert_eq!(*trace.borrow(), vec!["outer", "inner", "transport"]);
    }

    #[test]
    fn test_unshift_becomes_outermost() {
        let trace: Trace = Rc::default();
        let mut stack = HandlerStack::with_transport(terminal(trace.clone()));
        stack.push(tracing_layer(trace.clone(), "a"), "a");
        stack.unshift(tracing_layer(trace.clone(), "first"), "first");

        dispatch(&stack);
        assert_eq!(*trace.borrow(), vec!["first", "a", "transport"]);
    }

    #[test]
    fn test_before_and_after_anchor_on_names() {
        let trace: Trace = Rc::default();
        let mut stack = HandlerStack::with_transport(terminal(trace.clone()));
        stack.push(tracing_layer(trace.clone(), "anchor"), "anchor");
        stack
            .before("anchor", tracing_layer(trace.clone(), "pre"), "pre")
            .unwrap();
        stack
            .after("anchor", tracing_layer(trace.clone(), "post"), "post")
            .unwrap();

        dispatch(&stack);
        assert_eq!(
            *trace.borrow(),
            vec!["pre", "anchor", "post", "transport"]
        );
    }

    #[test]
    fn test_before_unknown_name_errors() {
        let trace: Trace = Rc::default();
        let mut stack = HandlerStack::with_transport(terminal(trace.clone()));
        let err = stack
            .before("ghost", tracing_layer(trace, "x"), "x")
            .unwrap_err();
        assert_eq!(err, StackError::NotFound("ghost".to_string()));
    }

    #[test]
    fn test_remove_by_name() {
        let trace: Trace = Rc::default();
        let mut stack = HandlerStack::with_transport(terminal(trace.clone()));
        stack.push(tracing_layer(trace.clone(), "keep"), "keep");
        stack.push(tracing_layer(trace.clone(), "drop"), "drop");

        assert!(stack.remove("drop"));
        assert!(!stack.remove("drop"));

        dispatch(&stack);
        assert_eq!(*trace.borrow(), vec!["keep", "transport"]);
    }

    #[test]
    fn test_resolve_without_transport() {
        let stack = HandlerStack::new();
        assert_eq!(
            stack.resolve().map(|_| ()).unwrap_err(),
            StackError::MissingTransport
        );
    }

    #[test]
    fn test_mutation_invalidates_composed_chain() {
        let trace: Trace = Rc::default();
        let mut stack = HandlerStack::with_transport(terminal(trace.clone()));
        dispatch(&stack);
        assert_eq!(*trace.borrow(), vec!["transport"]);

        stack.push(tracing_layer(trace.clone(), "late"), "late");
        dispatch(&stack);
        assert_eq!(*trace.borrow(), vec!["transport", "late", "transport"]);
    }

    #[test]
    fn test_resolved_chain_is_cached() {
        let trace: Trace = Rc::default();
        let stack = HandlerStack::with_transport(terminal(trace));
        let first = stack.resolve().unwrap();
        let second = stack.resolve().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }
}
