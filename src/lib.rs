//! Promises/A+ style promises for Rust.
//!
//! A [`Promise`] stands for the eventual outcome of an operation: either a
//! value (fulfilled) or a reason (rejected). Any number of observers may be
//! attached with [`Promise::then`] at any time; each one is delivered exactly
//! once, in registration order, on the [`Queue`] it was registered with and
//! never inline with the call that triggered it.
//!
//! # Examples
//!
//! ```
//! use promise_aplus::{Error, Handler, ManualQueue, Promise};
//!
//! let queue = ManualQueue::new();
//! let promise = Promise::<i32, Error>::new(&queue.queue());
//! let doubled = promise.chain(Handler::value(|v: i32| Ok(v * 2)), None);
//!
//! promise.resolve(21).unwrap();
//! assert!(doubled.is_pending());
//!
//! queue.run_until_idle();
//! assert_eq!(doubled.value(), Some(42));
//! ```
//!
//! Across threads a promise can simply be awaited:
//!
//! ```
//! use promise_aplus::{Error, Promise, Queue};
//! use futures::executor::block_on;
//! use std::thread;
//!
//! let promise = Promise::<String, Error>::new(&Queue::main());
//! let producer = promise.clone();
//! let task = thread::spawn(move || producer.resolve("Hi".into()));
//! assert_eq!(block_on(promise.settled()), Ok("Hi".to_string()));
//! task.join().expect("The producer thread has panicked.").unwrap();
//! ```
use std::any::Any;

mod extra;
mod handler;
mod promise;
mod queue;
mod settled;
mod state;
mod when;

pub use handler::{Handler, Outcome, Resolution};
pub use promise::Promise;
pub use queue::{Dispatcher, Job, ManualQueue, Queue, SerialQueueBuilder};
pub use settled::Settled;
pub use state::PromiseState;

/// Conditions surfaced by the promise machinery.
///
/// Reason types used with [`Promise`] must be constructible from this enum so
/// that self-resolution and panicking handlers can be reported as ordinary
/// rejections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// `resolve`, `adopt` or `reject` was called on a promise that is already
    /// settled, or is locked in to adopting another result.
    #[error("promise has already been settled")]
    AlreadySettled,
    #[error("promise cannot be resolved with itself")]
    SelfResolution,
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),
    /// Every handle to a pending promise was dropped before it settled.
    #[error("promise was dropped before it settled")]
    Abandoned,
    #[error("dispatch queue `{0}` is closed")]
    QueueClosed(String),
    /// A free-form rejection reason.
    #[error("{0}")]
    Reason(String),
}

impl From<&str> for Error {
    fn from(reason: &str) -> Self {
        Error::Reason(reason.to_owned())
    }
}

/// A pending async result that a promise can adopt.
///
/// Resolving a promise with a thenable does not settle it; the promise waits
/// for the thenable and then mirrors its outcome.
pub trait Thenable<T, E>: Send + 'static {
    /// Registers `observer` to be called exactly once with the eventual
    /// outcome.
    fn subscribe(&self, observer: Box<dyn FnOnce(Result<T, E>) + Send>);

    /// Identity used to detect a promise being resolved with itself.
    fn identity(&self) -> Option<usize> {
        None
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
