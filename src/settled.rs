//! Awaiting a promise.
//!
//! A [`Settled`] future registers an ordinary observer on the promise, so it
//! is woken from the promise's queue once the outcome is delivered.
use crate::{Error, Promise};
use parking_lot::Mutex;
use std::{
    future::{Future, IntoFuture},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

/// Future resolving to a promise's outcome.
///
/// If every handle to a pending promise is dropped, the future completes with
/// [`Error::Abandoned`].
///
/// # Examples
///
/// ```
/// use promise_aplus::{Error, Promise, Queue};
/// use futures::executor::block_on;
/// use std::thread;
///
/// let (promise, consumer) = {
///     let promise = Promise::<(), Error>::new(&Queue::main());
///     (promise.clone(), promise)
/// };
/// let task1 = thread::spawn(move || block_on(async {
///     println!("Received {:?}", consumer.await);
/// }));
/// promise.reject(Error::from("💥")).unwrap();
/// task1.join().expect("The task1 thread has panicked.");
/// ```
#[derive(Debug)]
pub struct Settled<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

#[derive(Debug)]
struct Slot<T, E> {
    outcome: Option<Result<T, E>>,
    waker: Result<Waker, WakerState>,
}

/// Owned by the registered observer. Dropping it, delivered or not, taints the
/// slot and wakes the waiting task.
struct Notify<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

impl<T, E> Notify<T, E> {
    fn deliver(self, outcome: Result<T, E>) {
        self.slot.lock().outcome = Some(outcome);
    }
}

impl<T, E> Drop for Notify<T, E> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if let Ok(waker) = std::mem::replace(&mut slot.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl<T, E> Future for Settled<T, E>
where
    E: From<Error>,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.lock();
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => match std::mem::replace(&mut slot.waker, Ok(cx.waker().clone())) {
                Err(WakerState::Tainted) => Poll::Ready(Err(E::from(Error::Abandoned))),
                _ => Poll::Pending,
            },
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static + From<Error>,
{
    /// A future that completes with this promise's outcome.
    pub fn settled(&self) -> Settled<T, E> {
        let slot = Arc::new(Mutex::new(Slot {
            outcome: None,
            waker: Err(WakerState::Fresh),
        }));
        let notify = Notify { slot: slot.clone() };
        self.register(self.queue(), Box::new(move |outcome| notify.deliver(outcome)));
        Settled { slot }
    }
}

impl<T, E> IntoFuture for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static + From<Error>,
{
    type Output = Result<T, E>;
    type IntoFuture = Settled<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        self.settled()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, ManualQueue, Promise, Queue};
    use futures::{executor::block_on, FutureExt};
    use std::thread;

    #[test]
    fn test_settled_resolves() {
        let (op, op_a) = {
            let promise = Promise::<String, Error>::new(&Queue::main());
            (promise.clone(), promise)
        };
        let task1 = thread::spawn(move || block_on(async { op_a.await }));
        let task2 = thread::spawn(move || op.resolve(String::from("🍓")));
        task2.join().expect("The task2 thread has panicked").unwrap();
        assert_eq!(
            task1.join().expect("The task1 thread has panicked"),
            Ok("🍓".to_string())
        );
    }

    #[test]
    fn test_settled_rejects() {
        let (a, b) = {
            let promise = Promise::<String, Error>::new(&Queue::main());
            (promise.clone(), promise)
        };
        let task1 = thread::spawn(move || block_on(b.settled()));
        let task2 = thread::spawn(move || a.reject("reject!!".into()));
        task2.join().expect("The task2 thread has panicked").unwrap();
        assert_eq!(
            task1.join().expect("The task1 thread has panicked"),
            Err(Error::from("reject!!"))
        );
    }

    #[test]
    fn test_settled_waits_for_queue() {
        let manual = ManualQueue::new();
        let promise = Promise::<i32, Error>::resolved(&manual.queue(), 3);
        let mut settled = promise.settled();
        assert_eq!((&mut settled).now_or_never(), None);
        manual.run_until_idle();
        assert_eq!(settled.now_or_never(), Some(Ok(3)));
    }

    #[test]
    fn test_settled_reports_abandoned_promise() {
        let manual = ManualQueue::new();
        let promise = Promise::<i32, Error>::new(&manual.queue());
        let settled = promise.settled();
        drop(promise);
        assert_eq!(block_on(settled), Err(Error::Abandoned));
    }
}
