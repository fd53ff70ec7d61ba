//! Single-outcome shorthands over [`Promise::then`] and [`Promise::on`].
use crate::{Error, Handler, Promise};

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static + From<Error>,
{
    /// `then(Some(on_fulfilled), None)`
    pub fn done(&self, on_fulfilled: Handler<T, T, E>) -> Promise<T, E> {
        self.then(Some(on_fulfilled), None)
    }

    /// `then(None, Some(on_rejected))`
    pub fn fail(&self, on_rejected: Handler<E, T, E>) -> Promise<T, E> {
        self.then(None, Some(on_rejected))
    }

    /// One handler for either outcome, given the outcome as a `Result`.
    pub fn always<U>(&self, handler: Handler<Result<T, E>, U, E>) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
    {
        self.react(self.queue(), Box::new(move |outcome| handler.call(outcome)))
    }

    /// `on(Some(on_fulfilled), None)`
    pub fn on_resolve(&self, on_fulfilled: Handler<T, (), E>) -> Promise<T, E> {
        self.on(Some(on_fulfilled), None)
    }

    /// `on(None, Some(on_rejected))`
    pub fn on_reject(&self, on_rejected: Handler<E, (), E>) -> Promise<T, E> {
        self.on(None, Some(on_rejected))
    }

    pub fn on_any(&self, handler: Handler<Result<T, E>, (), E>) -> Promise<T, E> {
        self.observe(Box::new(move |outcome| handler.call(outcome)))
    }
}
