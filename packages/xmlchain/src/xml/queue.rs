//! Process-wide single-concurrency queue for parse passes.
//!
//! The streaming parser must never be entered twice at the same time, nor
//! re-entered from one of its own callbacks. Every pass is therefore handed
//! to one dedicated worker thread and executed there in submission order.
//! Callers wait for their own pass only; other work keeps running.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Sender};
use std::sync::OnceLock;
use std::thread;

use crate::error::{ResolveError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Name of the worker thread, visible in debuggers and panic messages.
const WORKER_THREAD_NAME: &str = "xmlchain-parse";

thread_local! {
    static ON_QUEUE_WORKER: Cell<bool> = const { Cell::new(false) };
}

static GLOBAL_QUEUE: OnceLock<ParseQueue> = OnceLock::new();

/// A queue with exactly one worker.
///
/// Only [`ParseQueue::global`] hands one out, so the whole process shares a
/// single worker.
pub struct ParseQueue {
    sender: Sender<Job>,
}

impl ParseQueue {
    /// Start a queue with its own worker thread.
    fn start() -> Result<Self> {
        let (sender, receiver) = channel::<Job>();
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                ON_QUEUE_WORKER.with(|flag| flag.set(true));
                while let Ok(job) = receiver.recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!("parse pass panicked; queue worker continues");
                    }
                }
                tracing::debug!("parse queue closed");
            })
            .map_err(|e| {
                tracing::error!(error = %e, "failed to start parse queue worker");
                ResolveError::QueueUnavailable
            })?;

        Ok(Self { sender })
    }

    /// The queue shared by the whole process.
    ///
    /// # Panics
    /// Panics if the operating system refuses to start the worker thread.
    #[allow(clippy::expect_used)] // No parse can ever run without the worker
    pub fn global() -> &'static Self {
        GLOBAL_QUEUE.get_or_init(|| Self::start().expect("parse queue worker thread"))
    }

    /// Whether the current thread is this process's parse worker.
    #[must_use]
    pub fn is_worker_thread() -> bool {
        ON_QUEUE_WORKER.with(Cell::get)
    }

    /// Enqueue a job. It runs after every previously submitted job finished.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        self.sender
            .send(Box::new(job))
            .map_err(|_| ResolveError::QueueUnavailable)
    }
}

impl std::fmt::Debug for ParseQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseQueue").finish_non_exhaustive()
    }
}
