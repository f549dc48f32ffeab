//! Serial execution queue for asynchronous completions
//!
//! One process-wide serial queue services every callback for every session
//! created by this backend. Jobs run on a single named worker thread in
//! FIFO submission order, so callbacks for one session never run
//! concurrently with each other; callbacks for different sessions may
//! interleave on the shared queue in unspecified order.
//!
//! The shared instance is installed by [`init`] at backend-library startup
//! and torn down by [`cleanup`]. Accessing it outside that window is a
//! configuration error, never a panic.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

/// Thread name of the shared queue worker
const QUEUE_LABEL: &str = "seclink-io";

type Job = Box<dyn FnOnce() + Send + 'static>;

static SHARED: Mutex<Option<Arc<SerialQueue>>> = Mutex::new(None);

/// Install the process-wide shared queue. Idempotent.
pub fn init() -> Result<()> {
    let mut shared = SHARED.lock();
    if shared.is_none() {
        *shared = Some(SerialQueue::spawn(QUEUE_LABEL)?);
        debug!("Queue: shared execution queue initialized");
    }
    Ok(())
}

/// Tear down the process-wide shared queue.
///
/// Sessions still holding a reference keep their queue alive until they
/// are released; only the shared registration is dropped here.
pub fn cleanup() {
    if SHARED.lock().take().is_some() {
        debug!("Queue: shared execution queue released");
    }
}

/// Borrow the shared queue installed by [`init`].
pub fn shared() -> Result<Arc<SerialQueue>> {
    SHARED
        .lock()
        .clone()
        .ok_or_else(|| Error::Config("Shared execution queue not initialized".into()))
}

/// A serial execution queue backed by one named worker thread.
pub struct SerialQueue {
    label: String,
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl SerialQueue {
    /// Spawn a new queue with its own worker thread.
    pub fn spawn(label: &str) -> Result<Arc<Self>> {
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(label.to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
            })
            .map_err(|e| Error::Config(format!("Failed to spawn queue worker: {}", e)))?;

        Ok(Arc::new(Self {
            label: label.to_string(),
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// Submit a job to run after all previously submitted jobs.
    ///
    /// Jobs submitted after the queue has shut down are silently dropped.
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(Box::new(job));
        }
    }

    /// Label the worker thread was spawned with
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain remaining jobs and exit
        self.tx.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            // A queue must never join itself
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendezvous;

    #[test]
    fn test_jobs_run_in_submission_order() {
        let queue = SerialQueue::spawn("test-order").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (waiter, completer) = rendezvous::pair::<()>();

        for i in 0..100 {
            let seen = Arc::clone(&seen);
            queue.dispatch(move || seen.lock().push(i));
        }
        queue.dispatch(move || {
            completer.complete(());
        });

        waiter.wait();
        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_drop_drains_pending_jobs() {
        let queue = SerialQueue::spawn("test-drain").unwrap();
        let seen = Arc::new(Mutex::new(0u32));

        for _ in 0..10 {
            let seen = Arc::clone(&seen);
            queue.dispatch(move || *seen.lock() += 1);
        }

        drop(queue);
        assert_eq!(*seen.lock(), 10);
    }

    #[test]
    fn test_init_is_idempotent() {
        init().unwrap();
        let first = shared().unwrap();
        init().unwrap();
        let second = shared().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_queue_label() {
        let queue = SerialQueue::spawn("test-label").unwrap();
        assert_eq!(queue.label(), "test-label");
    }
}
