//! Work dispatch.
//!
//! A [`Dispatcher`] is one logical queue: it runs submitted jobs later, never
//! inline, in submission order. Promises only ever talk to dispatchers
//! through the cloneable [`Queue`] handle.
use crate::{panic_message, Error};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        mpsc::{channel, Receiver, Sender},
        Arc, OnceLock,
    },
    thread,
};

/// A unit of work handed to a dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs later, in the order they were submitted.
///
/// Implementations must never run a job inside `dispatch` itself: promises
/// dispatch while holding their own lock, so an inline dispatcher deadlocks
/// the first time a job reads or registers on the promise that scheduled it.
/// For synchronous, deterministic delivery use [`ManualQueue`] and drain it
/// with [`ManualQueue::run_until_idle`] after settling.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(&self, job: Job);
}

/// Labelled, cloneable handle to a dispatcher.
#[derive(Clone)]
pub struct Queue {
    label: Arc<str>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Queue {
    pub fn new(label: impl Into<Arc<str>>, dispatcher: impl Dispatcher) -> Self {
        Self {
            label: label.into(),
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// The process-wide serial queue labelled `main`, started on first use.
    ///
    /// This is the conventional default target. Promises never fall back to
    /// it on their own; pass it to a constructor explicitly.
    pub fn main() -> Queue {
        static MAIN: OnceLock<Queue> = OnceLock::new();
        MAIN.get_or_init(|| {
            SerialQueueBuilder::new()
                .name("main")
                .spawn()
                .expect("failed to spawn the main queue thread")
        })
        .clone()
    }

    /// A queue backed by a dedicated worker thread.
    pub fn serial() -> SerialQueueBuilder {
        SerialQueueBuilder::new()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn dispatch(&self, job: Job) {
        tracing::trace!(queue = %self.label, "queue.dispatch");
        self.dispatcher.dispatch(job);
    }

    /// Whether both handles submit to the same dispatcher.
    pub fn same_queue(&self, other: &Queue) -> bool {
        Arc::ptr_eq(&self.dispatcher, &other.dispatcher)
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue").field("label", &self.label).finish()
    }
}

struct SerialQueue {
    label: Arc<str>,
    sender: Sender<Job>,
}

impl Dispatcher for SerialQueue {
    fn dispatch(&self, job: Job) {
        if self.sender.send(job).is_err() {
            let error = Error::QueueClosed(self.label.to_string());
            tracing::warn!(queue = %self.label, %error, "job dropped");
        }
    }
}

/// Configures a queue served by its own named worker thread.
#[derive(Debug, Default)]
pub struct SerialQueueBuilder {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl SerialQueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names both the queue label and the worker thread.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Starts the worker. It exits once every handle to the queue is gone
    /// and the backlog has drained.
    pub fn spawn(self) -> std::io::Result<Queue> {
        let label: Arc<str> = self.name.unwrap_or_else(|| "serial".to_owned()).into();
        let (sender, receiver) = channel();
        let mut builder = thread::Builder::new().name(label.to_string());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        let worker_label = label.clone();
        builder.spawn(move || run_serial(&worker_label, receiver))?;
        tracing::debug!(queue = %label, "serial queue started");
        Ok(Queue {
            label: label.clone(),
            dispatcher: Arc::new(SerialQueue { label, sender }),
        })
    }
}

fn run_serial(label: &str, receiver: Receiver<Job>) {
    for job in receiver {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::warn!(queue = label, panic = %panic_message(&*payload), "job panicked");
        }
    }
    tracing::debug!(queue = label, "serial queue stopped");
}

/// A queue that only runs jobs when told to. Useful for deterministic tests.
///
/// # Examples
///
/// ```
/// use promise_aplus::ManualQueue;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let manual = ManualQueue::new();
/// let count = Arc::new(AtomicUsize::new(0));
/// let seen = count.clone();
/// manual.queue().dispatch(Box::new(move || {
///     seen.fetch_add(1, Ordering::SeqCst);
/// }));
/// assert_eq!(count.load(Ordering::SeqCst), 0);
/// assert_eq!(manual.run_until_idle(), 1);
/// assert_eq!(count.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone, Default)]
pub struct ManualQueue {
    jobs: Arc<Mutex<VecDeque<Job>>>,
}

impl ManualQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A [`Queue`] handle that submits to this backlog.
    pub fn queue(&self) -> Queue {
        Queue::new("manual", self.clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Runs the oldest job, if any. The backlog is unlocked while it runs, so
    /// the job may dispatch more work.
    pub fn run_one(&self) -> bool {
        let job = self.jobs.lock().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Runs jobs, including ones they dispatch, until the backlog is empty.
    /// Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }
}

impl Dispatcher for ManualQueue {
    fn dispatch(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }
}

impl fmt::Debug for ManualQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualQueue").field("backlog", &self.len()).finish()
    }
}
