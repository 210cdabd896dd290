//! The task queue and graceful-shutdown wrapper around tokio's own
//! multiplexer.
//!
//! The original design is a single OS thread running a selector loop
//! plus a FIFO of pending tasks; here tokio's runtime already *is* that
//! multiplexer (each `ReactorClient` gets its own spawned task rather
//! than being polled from a central `select()`), so `Reactor` only
//! needs to model the two things that don't fall out of that for free:
//! a place for other threads to post work, and a single shutdown
//! signal every spawned task observes.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Owns the task queue and the shutdown signal shared by every client
/// spawned through it. Dropping a `Reactor` does not itself stop
/// anything; call [`Reactor::shutdown`] to signal a drain-then-exit.
pub struct Reactor {
    task_tx: mpsc::UnboundedSender<Task>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Arc<tokio::sync::Mutex<JoinSet<()>>>,
}

impl Reactor {
    /// Starts the reactor's internal task-queue drain loop on the
    /// current tokio runtime and returns a handle.
    pub fn start() -> Reactor {
        let (task_tx, mut task_rx) = mpsc::unbounded_channel::<Task>();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let tasks = Arc::new(tokio::sync::Mutex::new(JoinSet::new()));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!("reactor task queue draining remaining tasks before exit");
                            while let Ok(task) = task_rx.try_recv() {
                                task();
                            }
                            return;
                        }
                    }
                    task = task_rx.recv() => {
                        match task {
                            Some(task) => task(),
                            None => return,
                        }
                    }
                }
            }
        });

        Reactor {
            task_tx,
            shutdown_tx,
            tasks,
        }
    }

    /// Enqueues a task to run on the reactor's queue-drain loop. Used
    /// by callers on other threads/tasks that need a state mutation
    /// serialized with the reactor's own bookkeeping (registering a new
    /// client, for instance).
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        let _ = self.task_tx.send(Box::new(task));
    }

    /// Tracks a spawned client task's `JoinHandle` so `shutdown` can
    /// wait for every client to finish unwinding before returning.
    pub async fn track(&self, future: impl std::future::Future<Output = ()> + Send + 'static) {
        self.tasks.lock().await.spawn(future);
    }

    /// A receiver every spawned client task should select on to learn
    /// when the reactor wants the connection to wind down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Flips the shutdown flag, wakes every client task waiting on
    /// [`Reactor::shutdown_signal`], and waits for all tracked client
    /// tasks to finish.
    pub async fn shutdown(&self) {
        info!("reactor shutting down");
        let _ = self.shutdown_tx.send(true);
        let mut tasks = self.tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Reactor::start()
    }
}
