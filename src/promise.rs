//! The promise handle and its resolution procedure.
use crate::{
    handler::{Handler, Outcome, Resolution},
    panic_message,
    queue::Queue,
    state::{Cell, Delivery, Observer, PromiseState},
    Error, Thenable,
};
use parking_lot::Mutex;
use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

/// Runs once per registration with the parent's outcome and decides how the
/// derived promise resolves.
pub(crate) type Reaction<T, E, U> = Box<dyn FnOnce(Result<T, E>) -> Outcome<U, E> + Send>;

/// The eventual outcome of an operation, fulfilled with a `T` or rejected with
/// an `E`.
///
/// Cloning a promise clones the handle, not the result. Every handle can both
/// settle the promise and observe it.
///
/// # Examples
///
/// ```
/// use promise_aplus::{Error, Handler, ManualQueue, Promise};
///
/// let queue = ManualQueue::new();
/// let promise = Promise::<i32, Error>::new(&queue.queue());
/// let recovered = promise
///     .done(Handler::value(|v| Ok(v + 1)))
///     .fail(Handler::value(|_| Ok(0)));
///
/// promise.reject("boom".into()).unwrap();
/// queue.run_until_idle();
/// assert_eq!(recovered.value(), Some(0));
/// ```
pub struct Promise<T, E> {
    inner: Arc<Inner<T, E>>,
}

struct Inner<T, E> {
    cell: Mutex<Cell<T, E>>,
    queue: Queue,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Promise<T, E> {
    fn with_cell(queue: &Queue, cell: Cell<T, E>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cell: Mutex::new(cell),
                queue: queue.clone(),
            }),
        }
    }

    /// Identity shared by every clone of this handle.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// The queue this promise delivers its handlers on.
    pub fn queue(&self) -> &Queue {
        &self.inner.queue
    }

    pub fn state(&self) -> PromiseState {
        self.inner.cell.lock().state()
    }

    /// True until the promise settles, including while it waits on an adopted
    /// thenable.
    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static + From<Error>,
{
    /// A pending promise whose handlers run on `queue`.
    pub fn new(queue: &Queue) -> Self {
        Self::with_cell(queue, Cell::pending())
    }

    pub fn resolved(queue: &Queue, value: T) -> Self {
        Self::with_cell(queue, Cell::settled(Ok(value)))
    }

    pub fn rejected(queue: &Queue, reason: E) -> Self {
        Self::with_cell(queue, Cell::settled(Err(reason)))
    }

    pub fn value(&self) -> Option<T> {
        self.inner.cell.lock().outcome().and_then(Result::ok)
    }

    pub fn reason(&self) -> Option<E> {
        self.inner.cell.lock().outcome().and_then(Result::err)
    }

    /// Fulfills the promise with `value`.
    ///
    /// Fails with [`Error::AlreadySettled`] if the promise has settled or is
    /// waiting on an adopted thenable; the existing outcome is kept.
    pub fn resolve(&self, value: T) -> Result<(), Error> {
        self.report(self.settle(Ok(value), false))
    }

    /// Rejects the promise with `reason`, taken as is.
    pub fn reject(&self, reason: E) -> Result<(), Error> {
        self.report(self.settle(Err(reason), false))
    }

    /// Resolves the promise with another pending result: it stays pending
    /// until `thenable` settles and then takes on the same outcome.
    ///
    /// Adopting the promise itself rejects it with [`Error::SelfResolution`].
    pub fn adopt(&self, thenable: impl Thenable<T, E>) -> Result<(), Error> {
        self.report(self.follow(Box::new(thenable)))
    }

    /// Runs the resolution procedure for either form of [`Resolution`].
    pub fn resolve_with(&self, resolution: Resolution<T, E>) -> Result<(), Error> {
        self.report(self.apply(resolution))
    }

    /// Registers handlers for either outcome and returns the derived promise.
    ///
    /// A missing handler passes the parent's outcome through unchanged. The
    /// handler's result is fed back into the derived promise's resolution
    /// procedure, so returning a pending promise makes the chain wait on it.
    pub fn then(
        &self,
        on_fulfilled: Option<Handler<T, T, E>>,
        on_rejected: Option<Handler<E, T, E>>,
    ) -> Promise<T, E> {
        self.queued_then(&self.inner.queue, on_fulfilled, on_rejected)
    }

    /// [`Promise::then`], delivering on `queue` instead of the promise's own
    /// queue. The derived promise is bound to `queue` as well.
    pub fn queued_then(
        &self,
        queue: &Queue,
        on_fulfilled: Option<Handler<T, T, E>>,
        on_rejected: Option<Handler<E, T, E>>,
    ) -> Promise<T, E> {
        self.react(
            queue,
            Box::new(move |outcome| match outcome {
                Ok(value) => match on_fulfilled {
                    Some(handler) => handler.call(value),
                    None => Ok(Resolution::Value(value)),
                },
                Err(reason) => match on_rejected {
                    Some(handler) => handler.call(reason),
                    None => Err(reason),
                },
            }),
        )
    }

    /// A `then` that changes the value type. A fulfilment handler is required
    /// because a `T` cannot pass through into a `Promise<U, E>`; rejections
    /// still pass through when `on_rejected` is `None`.
    pub fn chain<U>(
        &self,
        on_fulfilled: Handler<T, U, E>,
        on_rejected: Option<Handler<E, U, E>>,
    ) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
    {
        self.queued_chain(&self.inner.queue, on_fulfilled, on_rejected)
    }

    pub fn queued_chain<U>(
        &self,
        queue: &Queue,
        on_fulfilled: Handler<T, U, E>,
        on_rejected: Option<Handler<E, U, E>>,
    ) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
    {
        self.react(
            queue,
            Box::new(move |outcome| match outcome {
                Ok(value) => on_fulfilled.call(value),
                Err(reason) => match on_rejected {
                    Some(handler) => handler.call(reason),
                    None => Err(reason),
                },
            }),
        )
    }

    /// Observes the promise in place: handlers run once as usual, but nothing
    /// is derived from them and this promise's outcome is never affected.
    /// Returns a handle to this same promise.
    pub fn on(
        &self,
        on_fulfilled: Option<Handler<T, (), E>>,
        on_rejected: Option<Handler<E, (), E>>,
    ) -> Promise<T, E> {
        self.observe(Box::new(move |outcome| match outcome {
            Ok(value) => match on_fulfilled {
                Some(handler) => handler.call(value),
                None => Ok(Resolution::Value(())),
            },
            Err(reason) => match on_rejected {
                Some(handler) => handler.call(reason),
                None => Ok(Resolution::Value(())),
            },
        }))
    }

    /// Registers `reaction` on `queue` and returns the promise it resolves.
    pub(crate) fn react<U>(&self, queue: &Queue, reaction: Reaction<T, E, U>) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
    {
        let child = Promise::<U, E>::new(queue);
        tracing::trace!(parent = self.id(), child = child.id(), queue = queue.label(), "promise.then");
        let target = child.clone();
        self.register(
            queue,
            Box::new(move |outcome| {
                let settled = match guarded(move || reaction(outcome)) {
                    Ok(resolution) => target.apply(resolution),
                    Err(reason) => target.settle(Err(reason), false),
                };
                if let Err(error) = settled {
                    tracing::debug!(promise = target.id(), %error, "derived promise settled before its handler ran");
                }
            }),
        );
        child
    }

    /// Registers a side-effecting reaction on this promise's own queue.
    pub(crate) fn observe(&self, reaction: Reaction<T, E, ()>) -> Promise<T, E> {
        let id = self.id();
        tracing::trace!(promise = id, "promise.on");
        self.register(
            &self.inner.queue,
            Box::new(move |outcome| {
                if guarded(move || reaction(outcome)).is_err() {
                    tracing::debug!(promise = id, "observer handler failed");
                }
            }),
        );
        self.clone()
    }

    pub(crate) fn register(&self, queue: &Queue, deliver: Delivery<T, E>) {
        self.inner
            .cell
            .lock()
            .register(Observer::new(queue.clone(), deliver));
    }

    pub(crate) fn apply(&self, resolution: Resolution<T, E>) -> Result<(), Error> {
        match resolution {
            Resolution::Value(value) => self.settle(Ok(value), false),
            Resolution::Adopt(thenable) => self.follow(thenable),
        }
    }

    pub(crate) fn settle(&self, outcome: Result<T, E>, adopted: bool) -> Result<(), Error> {
        let fulfilled = outcome.is_ok();
        let scheduled = self.inner.cell.lock().settle(outcome, adopted)?;
        tracing::trace!(promise = self.id(), fulfilled, observers = scheduled, "promise.settle");
        Ok(())
    }

    fn follow(&self, thenable: Box<dyn Thenable<T, E>>) -> Result<(), Error> {
        if thenable.identity() == Some(self.id()) {
            tracing::debug!(promise = self.id(), "promise resolved with itself");
            return self.settle(Err(E::from(Error::SelfResolution)), false);
        }
        self.inner.cell.lock().lock_in()?;
        tracing::trace!(promise = self.id(), source = ?thenable.identity(), "promise.adopt");
        let target = self.clone();
        let subscribed = panic::catch_unwind(AssertUnwindSafe(|| {
            thenable.subscribe(Box::new(move |outcome| {
                if let Err(error) = target.settle(outcome, true) {
                    tracing::debug!(promise = target.id(), %error, "adopted outcome discarded");
                }
            }))
        }));
        if let Err(payload) = subscribed {
            let message = panic_message(&*payload);
            tracing::debug!(promise = self.id(), %message, "thenable panicked on subscribe");
            // A subscription that delivered before panicking has already
            // settled us; the first outcome stands.
            if let Err(error) = self.settle(Err(E::from(Error::HandlerPanicked(message))), true) {
                tracing::debug!(promise = self.id(), %error, "subscribe panic discarded");
            }
        }
        Ok(())
    }

    fn report(&self, result: Result<(), Error>) -> Result<(), Error> {
        if let Err(error) = &result {
            tracing::warn!(promise = self.id(), %error, "promise settlement refused");
        }
        result
    }
}

impl<T, E> Thenable<T, E> for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static + From<Error>,
{
    fn subscribe(&self, observer: Box<dyn FnOnce(Result<T, E>) + Send>) {
        self.register(&self.inner.queue, observer);
    }

    fn identity(&self) -> Option<usize> {
        Some(self.id())
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.inner.cell.lock();
        f.debug_struct("Promise")
            .field("id", &self.id())
            .field("state", &cell.state())
            .field("observers", &cell.observer_count())
            .field("queue", &self.inner.queue.label())
            .finish()
    }
}

/// Runs a handler, turning a panic into a rejection reason.
fn guarded<R, E>(f: impl FnOnce() -> Result<R, E>) -> Result<R, E>
where
    E: From<Error>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(E::from(Error::HandlerPanicked(panic_message(&*payload)))),
    }
}
