use crate::Thenable;
use std::fmt;

/// What a handler produces: a resolution for the derived promise, or a
/// reason to reject it with.
pub type Outcome<U, E> = Result<Resolution<U, E>, E>;

/// The argument to the resolution procedure.
///
/// A plain value settles a promise directly; a thenable makes the promise wait
/// for it and then mirror its outcome.
pub enum Resolution<T, E> {
    Value(T),
    Adopt(Box<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn adopt(thenable: impl Thenable<T, E>) -> Self {
        Resolution::Adopt(Box::new(thenable))
    }
}

impl<T: fmt::Debug + 'static, E: 'static> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Adopt(thenable) => f
                .debug_tuple("Adopt")
                .field(&thenable.identity())
                .finish(),
        }
    }
}

/// A callback attached to a promise, taking either the settled value (or
/// reason) or nothing at all.
///
/// Returning `Err` from a handler, or panicking in one, rejects the derived
/// promise.
pub enum Handler<A, U, E> {
    TakesValue(Box<dyn FnOnce(A) -> Outcome<U, E> + Send>),
    TakesNothing(Box<dyn FnOnce() -> Outcome<U, E> + Send>),
}

impl<A, U, E> Handler<A, U, E>
where
    A: 'static,
    U: 'static,
    E: 'static,
{
    /// A handler mapping its argument to a plain value.
    ///
    /// ```
    /// use promise_aplus::{Error, Handler};
    /// let _parse: Handler<String, i32, Error> =
    ///     Handler::value(|s: String| s.parse().map_err(|_| Error::from("not a number")));
    /// ```
    pub fn value<F>(f: F) -> Self
    where
        F: FnOnce(A) -> Result<U, E> + Send + 'static,
    {
        Handler::TakesValue(Box::new(move |arg| f(arg).map(Resolution::Value)))
    }

    /// A handler returning another pending result; the derived promise waits
    /// for it.
    pub fn adopt<F, X>(f: F) -> Self
    where
        F: FnOnce(A) -> Result<X, E> + Send + 'static,
        X: Thenable<U, E>,
    {
        Handler::TakesValue(Box::new(move |arg| {
            f(arg).map(|thenable| Resolution::adopt(thenable))
        }))
    }

    pub fn resolution<F>(f: F) -> Self
    where
        F: FnOnce(A) -> Outcome<U, E> + Send + 'static,
    {
        Handler::TakesValue(Box::new(f))
    }

    /// A handler that ignores its argument.
    pub fn action<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<U, E> + Send + 'static,
    {
        Handler::TakesNothing(Box::new(move || f().map(Resolution::Value)))
    }

    pub(crate) fn call(self, arg: A) -> Outcome<U, E> {
        match self {
            Handler::TakesValue(f) => f(arg),
            Handler::TakesNothing(f) => f(),
        }
    }
}

impl<A, U, E> fmt::Debug for Handler<A, U, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::TakesValue(_) => f.write_str("Handler::TakesValue"),
            Handler::TakesNothing(_) => f.write_str("Handler::TakesNothing"),
        }
    }
}
