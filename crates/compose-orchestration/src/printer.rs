//! Lifecycle event coordinator.
//!
//! Container watchers run concurrently and push [`ContainerEvent`]s into an
//! unbounded queue; a single [`LogPrinter`] drains it in arrival order,
//! drives the [`LogConsumer`] and decides the exit code of the run. All
//! coordinator state lives inside [`LogPrinter::run`], so nothing is shared.
//!
//! The queue is unbounded so that a watcher never waits on the coordinator
//! while the coordinator waits on a stop callback that needs the watchers
//! to make progress.

use async_channel::{Receiver, Sender};
use compose_api::{ContainerEvent, LogConsumer, Result};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Producer side of the coordinator queue, cloned into every watcher
#[derive(Clone)]
pub struct EventQueue {
    sender: Sender<ContainerEvent>,
}

impl EventQueue {
    /// Enqueue an event; never waits
    pub fn handle_event(&self, event: ContainerEvent) {
        if self.sender.try_send(event).is_err() {
            debug!("Coordinator is gone, dropping container event");
        }
    }

    /// Enqueue a user interrupt
    pub fn cancel(&self) {
        self.handle_event(ContainerEvent::UserCancel);
    }
}

/// Serial consumer of container lifecycle events
pub struct LogPrinter {
    queue: Receiver<ContainerEvent>,
    consumer: Arc<dyn LogConsumer>,
}

impl LogPrinter {
    /// Create a coordinator and the queue its producers write to
    pub fn new(consumer: Arc<dyn LogConsumer>) -> (Self, EventQueue) {
        let (sender, queue) = async_channel::unbounded();
        (Self { queue, consumer }, EventQueue { sender })
    }

    /// Process events until the last known container exits
    ///
    /// With `cascade_stop`, the first exit invokes `stop` once; a failing
    /// `stop` ends the run with its error. The exit code of
    /// `exit_code_from`, or of the first exiting service when unset, becomes
    /// the result. Without `cascade_stop` the result is 0. The run also
    /// ends when every producer handle has been dropped.
    pub async fn run<F, Fut>(
        self,
        cascade_stop: bool,
        exit_code_from: Option<String>,
        mut stop: F,
    ) -> Result<i32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut aborting = false;
        let mut exit_code = 0;
        let mut exit_code_from = exit_code_from;
        let mut containers: HashSet<String> = HashSet::new();

        while let Ok(event) = self.queue.recv().await {
            match event {
                ContainerEvent::UserCancel => {
                    debug!("User cancelled, suppressing further output");
                    aborting = true;
                }
                ContainerEvent::Attach { container, .. } => {
                    if containers.contains(&container) {
                        continue;
                    }
                    self.consumer.register(&container);
                    containers.insert(container);
                }
                ContainerEvent::Exit {
                    container,
                    service,
                    exit_code: code,
                    restarting,
                } => {
                    if !restarting {
                        containers.remove(&container);
                    }
                    if !aborting {
                        self.consumer
                            .status(&container, &format!("exited with code {}", code));
                    }
                    if cascade_stop {
                        if !aborting {
                            aborting = true;
                            info!("Aborting on container exit...");
                            stop().await?;
                        }
                        let source = exit_code_from.get_or_insert_with(|| service.clone());
                        if *source == service {
                            exit_code = code;
                        }
                    }
                    if containers.is_empty() {
                        // Last container terminated, done
                        return Ok(exit_code);
                    }
                }
                ContainerEvent::Log {
                    container,
                    service,
                    line,
                } => {
                    if !aborting {
                        self.consumer.log(&container, &service, &line);
                    }
                }
            }
        }

        debug!("All container watchers are gone");
        Ok(exit_code)
    }
}
