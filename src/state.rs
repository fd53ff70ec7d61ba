//! The settlement cell: a promise's state plus the observers waiting on it.
//!
//! The cell holds no lock of its own; [`crate::Promise`] guards it with a
//! mutex and every method here runs inside that critical section. Observers
//! are only ever *scheduled* from here. Running them is the queue's job.
use crate::{queue::Queue, Error};

/// Public view of where a promise is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

pub(crate) type Delivery<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

/// A registration waiting for the cell to settle, together with the queue it
/// must be delivered on.
pub(crate) struct Observer<T, E> {
    queue: Queue,
    deliver: Delivery<T, E>,
}

impl<T, E> Observer<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(queue: Queue, deliver: Delivery<T, E>) -> Self {
        Self { queue, deliver }
    }

    /// Hands the delivery over to the queue. Never runs it inline.
    fn schedule(self, outcome: Result<T, E>) {
        let Observer { queue, deliver } = self;
        queue.dispatch(Box::new(move || deliver(outcome)));
    }
}

enum Slot<T, E> {
    /// `locked` is set once the cell has committed to mirroring a thenable.
    Pending {
        observers: Vec<Observer<T, E>>,
        locked: bool,
    },
    Fulfilled(T),
    Rejected(E),
}

pub(crate) struct Cell<T, E> {
    slot: Slot<T, E>,
}

impl<T, E> Cell<T, E> {
    pub(crate) fn pending() -> Self {
        Self {
            slot: Slot::Pending {
                observers: Vec::new(),
                locked: false,
            },
        }
    }

    pub(crate) fn settled(outcome: Result<T, E>) -> Self {
        let slot = match outcome {
            Ok(value) => Slot::Fulfilled(value),
            Err(reason) => Slot::Rejected(reason),
        };
        Self { slot }
    }

    pub(crate) fn state(&self) -> PromiseState {
        match self.slot {
            Slot::Pending { .. } => PromiseState::Pending,
            Slot::Fulfilled(_) => PromiseState::Fulfilled,
            Slot::Rejected(_) => PromiseState::Rejected,
        }
    }

    pub(crate) fn observer_count(&self) -> usize {
        match &self.slot {
            Slot::Pending { observers, .. } => observers.len(),
            _ => 0,
        }
    }

    /// Commits a pending cell to adopting a thenable. Afterwards only
    /// `settle(.., true)` can settle it.
    pub(crate) fn lock_in(&mut self) -> Result<(), Error> {
        match &mut self.slot {
            Slot::Pending { locked, .. } if !*locked => {
                *locked = true;
                Ok(())
            }
            _ => Err(Error::AlreadySettled),
        }
    }
}

impl<T, E> Cell<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub(crate) fn outcome(&self) -> Option<Result<T, E>> {
        match &self.slot {
            Slot::Pending { .. } => None,
            Slot::Fulfilled(value) => Some(Ok(value.clone())),
            Slot::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    /// Settles the cell and schedules every queued observer in registration
    /// order. `adopted` must match whether the cell was locked in: a locked
    /// cell only accepts the outcome of the thenable it adopted.
    ///
    /// Returns the number of observers scheduled.
    pub(crate) fn settle(&mut self, outcome: Result<T, E>, adopted: bool) -> Result<usize, Error> {
        let observers = match &mut self.slot {
            Slot::Pending { observers, locked } if *locked == adopted => std::mem::take(observers),
            _ => return Err(Error::AlreadySettled),
        };
        let scheduled = observers.len();
        for observer in observers {
            observer.schedule(outcome.clone());
        }
        self.slot = match outcome {
            Ok(value) => Slot::Fulfilled(value),
            Err(reason) => Slot::Rejected(reason),
        };
        Ok(scheduled)
    }

    /// Queues `observer` while pending, or schedules it straight away once
    /// settled.
    pub(crate) fn register(&mut self, observer: Observer<T, E>) {
        match &mut self.slot {
            Slot::Pending { observers, .. } => observers.push(observer),
            Slot::Fulfilled(value) => observer.schedule(Ok(value.clone())),
            Slot::Rejected(reason) => observer.schedule(Err(reason.clone())),
        }
    }
}
