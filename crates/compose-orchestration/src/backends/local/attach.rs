//! Container watchers feeding the lifecycle event coordinator

use crate::engine::{ContainerEngine, EngineContainer};
use crate::printer::EventQueue;
use compose_api::ContainerEvent;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const RESTART_BACKOFF: Duration = Duration::from_millis(500);

/// Spawn one watcher per container
///
/// Every container is attached before any watcher runs, so no exit can
/// reach the coordinator ahead of a sibling's attach. Dropping the returned
/// tasks cancels the watchers.
pub(crate) fn watch_containers(
    engine: &Arc<dyn ContainerEngine>,
    containers: Vec<EngineContainer>,
    queue: &EventQueue,
) -> Vec<smol::Task<()>> {
    for container in &containers {
        queue.handle_event(ContainerEvent::attach(&container.name, container.service()));
    }
    containers
        .into_iter()
        .map(|container| smol::spawn(watch(engine.clone(), container, queue.clone())))
        .collect()
}

/// Forward a container's output and exit to the queue until it stops for good
async fn watch(engine: Arc<dyn ContainerEngine>, container: EngineContainer, queue: EventQueue) {
    let name = container.name.clone();
    let service = container.service().to_string();

    // Only the first pass replays earlier output.
    let mut tail = None;
    loop {
        match engine.container_logs(&container.id, true, tail).await {
            Ok(mut lines) => {
                while let Some(line) = lines.next().await {
                    match line {
                        Ok(line) => {
                            queue.handle_event(ContainerEvent::log(&name, &service, line))
                        }
                        Err(e) => {
                            debug!("Log stream of {} ended: {}", name, e);
                            break;
                        }
                    }
                }
            }
            Err(e) => warn!("Failed to read logs of {}: {}", name, e),
        }

        let exit_code = match engine.wait_container(&container.id).await {
            Ok(code) => code,
            Err(e) => {
                warn!("Failed to wait for {}: {}", name, e);
                -1
            }
        };
        let restarting = engine
            .inspect_container(&container.id)
            .await
            .map(|state| state.restarting)
            .unwrap_or(false);
        queue.handle_event(ContainerEvent::exit(&name, &service, exit_code, restarting));

        if !restarting {
            return;
        }
        tail = Some(0);
        smol::Timer::after(RESTART_BACKOFF).await;
    }
}
