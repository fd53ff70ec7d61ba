//! Aggregating many results into one.
use crate::{handler::Resolution, panic_message, queue::Queue, Error, Promise, Thenable};
use parking_lot::Mutex;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

struct Gather<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static + From<Error>,
{
    /// A promise fulfilled with every input's value, in input order, once all
    /// of them have fulfilled.
    ///
    /// The first input to reject rejects the aggregate with its reason. The
    /// remaining inputs keep running; whatever they produce afterwards is
    /// discarded. An empty input fulfills with an empty vector.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_aplus::{Error, ManualQueue, Promise, Resolution};
    ///
    /// let manual = ManualQueue::new();
    /// let queue = manual.queue();
    /// let pending = Promise::<i32, Error>::new(&queue);
    /// let all = Promise::<i32, Error>::when(
    ///     &queue,
    ///     vec![Resolution::Value(1), Resolution::adopt(pending.clone())],
    /// );
    /// pending.resolve(2).unwrap();
    /// manual.run_until_idle();
    /// assert_eq!(all.value(), Some(vec![1, 2]));
    /// ```
    pub fn when<I>(queue: &Queue, inputs: I) -> Promise<Vec<T>, E>
    where
        I: IntoIterator<Item = Resolution<T, E>>,
    {
        let inputs: Vec<_> = inputs.into_iter().collect();
        let aggregate = Promise::<Vec<T>, E>::new(queue);
        tracing::trace!(promise = aggregate.id(), inputs = inputs.len(), "promise.when");
        if inputs.is_empty() {
            if let Err(error) = aggregate.settle(Ok(Vec::new()), false) {
                tracing::debug!(%error, "empty aggregate already settled");
            }
            return aggregate;
        }

        let gather = Arc::new(Mutex::new(Gather {
            values: vec![None; inputs.len()],
            remaining: inputs.len(),
        }));
        for (index, input) in inputs.into_iter().enumerate() {
            match input {
                Resolution::Value(value) => record(&aggregate, &gather, index, Ok(value)),
                Resolution::Adopt(thenable) => {
                    let (target, shared) = (aggregate.clone(), gather.clone());
                    let subscribed = panic::catch_unwind(AssertUnwindSafe(|| {
                        thenable.subscribe(Box::new(move |outcome| {
                            record(&target, &shared, index, outcome)
                        }))
                    }));
                    if let Err(payload) = subscribed {
                        let reason = Error::HandlerPanicked(panic_message(&*payload));
                        record(&aggregate, &gather, index, Err(E::from(reason)));
                    }
                }
            }
        }
        aggregate
    }

    /// [`Promise::when`] over promises only.
    pub fn all<I>(queue: &Queue, promises: I) -> Promise<Vec<T>, E>
    where
        I: IntoIterator<Item = Promise<T, E>>,
    {
        Self::when(queue, promises.into_iter().map(|promise| Resolution::adopt(promise)))
    }
}

fn record<T, E>(
    aggregate: &Promise<Vec<T>, E>,
    gather: &Mutex<Gather<T>>,
    index: usize,
    outcome: Result<T, E>,
) where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static + From<Error>,
{
    let settled = match outcome {
        Ok(value) => {
            let complete = {
                let mut gather = gather.lock();
                gather.values[index] = Some(value);
                gather.remaining -= 1;
                if gather.remaining == 0 {
                    Some(gather.values.drain(..).flatten().collect())
                } else {
                    None
                }
            };
            match complete {
                Some(values) => aggregate.settle(Ok(values), false),
                None => Ok(()),
            }
        }
        Err(reason) => aggregate.settle(Err(reason), false),
    };
    if let Err(error) = settled {
        tracing::trace!(promise = aggregate.id(), index, %error, "late aggregate input discarded");
    }
}
