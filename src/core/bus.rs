use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::config::{ExponentialBackoff, ReconnectionConfig};
use crate::core::event::Event;
use crate::core::middleware::{Middleware, Verdict};
use crate::core::service::{Service, ServiceId};

// A service that stayed up this long is considered to have recovered
const RECOVERY_THRESHOLD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SendDirectMessage { service_id: ServiceId, user_id: String, body: String },
    SendRoomMessage { service_id: ServiceId, room_id: String, body: String },
}

impl Command {
    pub fn service_id(&self) -> &ServiceId {
        match self {
            Command::SendDirectMessage { service_id, .. } => service_id,
            Command::SendRoomMessage { service_id, .. } => service_id,
        }
    }
}

struct ServiceState {
    backoff: ExponentialBackoff,
    attempt_count: u32,
    connection_start: Instant,
}

impl ServiceState {
    fn new(reconnect_config: ReconnectionConfig) -> Self {
        Self {
            backoff: ExponentialBackoff::new(reconnect_config),
            attempt_count: 0,
            connection_start: Instant::now(),
        }
    }
}

pub struct Bus {
    // Receive events from services
    evt_rx: Receiver<Event>,

    // Receive commands from middlewares
    cmd_rx: Receiver<Command>,

    services: HashMap<ServiceId, Arc<dyn Service>>,

    // Per-service middleware pipelines
    service_middlewares: HashMap<ServiceId, Vec<Arc<dyn Middleware>>>,

    // Per-service state tracking for reconnection
    service_state: HashMap<ServiceId, ServiceState>,
}

impl Bus {
    pub fn new(
        evt_rx: Receiver<Event>,
        cmd_rx: Receiver<Command>,
        services: HashMap<ServiceId, Arc<dyn Service>>,
        service_middlewares: HashMap<ServiceId, Vec<Arc<dyn Middleware>>>,
        reconnect_config: ReconnectionConfig,
    ) -> Self {
        let service_state = services
            .keys()
            .map(|id| (id.clone(), ServiceState::new(reconnect_config.clone())))
            .collect();

        Self { evt_rx, cmd_rx, services, service_middlewares, service_state }
    }

    fn spawn_service(
        &mut self,
        service_id: &ServiceId,
        service_tasks: &mut JoinSet<(ServiceId, anyhow::Result<()>)>,
        cancel: &CancellationToken,
    ) {
        self.spawn_service_after(service_id, Duration::ZERO, service_tasks, cancel);
    }

    /// Schedules a run of the service once `delay` has passed, without blocking the bus loop.
    fn spawn_service_after(
        &mut self,
        service_id: &ServiceId,
        delay: Duration,
        service_tasks: &mut JoinSet<(ServiceId, anyhow::Result<()>)>,
        cancel: &CancellationToken,
    ) {
        let Some(service) = self.services.get(service_id) else { return };
        let child_token = cancel.child_token();
        let service_clone = service.clone();
        let id = service_id.clone();

        service_tasks.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = child_token.cancelled() => {
                        info!(service_id=%id, "cancellation during backoff, not restarting");
                        return (id, Ok(()));
                    }
                    _ = tokio::time::sleep(delay) => {
                        info!(service_id=%id, "service restarted");
                    }
                }
            }
            let result = service_clone.run(child_token).await;
            (id, result)
        });

        if let Some(state) = self.service_state.get_mut(service_id) {
            state.connection_start = Instant::now() + delay;
        }
    }

    /// Runs one event through its service's pipeline until a middleware stops it.
    fn dispatch_event(&self, evt: &Event) -> anyhow::Result<()> {
        let Some(pipeline) = self.service_middlewares.get(&evt.service_id) else {
            debug!(service_id=%evt.service_id, "no middleware pipeline configured for service");
            return Ok(());
        };
        for mw in pipeline {
            match mw.on_event(evt)? {
                Verdict::Continue => {}
                Verdict::Stop => break,
            }
        }
        Ok(())
    }

    pub async fn run(&mut self, cancel: CancellationToken) -> anyhow::Result<()> {
        // Owned by the bus so tasks stop even when the loop ends because a channel closed
        let tasks_cancel = cancel.child_token();

        info!("starting services with supervision...");
        let mut service_tasks: JoinSet<(ServiceId, anyhow::Result<()>)> = JoinSet::new();

        let service_ids: Vec<ServiceId> = self.services.keys().cloned().collect();
        for service_id in &service_ids {
            self.spawn_service(service_id, &mut service_tasks, &tasks_cancel);
        }

        // Start all middlewares (collect unique instances across all services)
        info!("starting middlewares...");
        let mut middleware_handles = Vec::new();
        let mut started_middlewares: Vec<Arc<dyn Middleware>> = Vec::new();

        for pipeline in self.service_middlewares.values() {
            for middleware in pipeline {
                let already_started =
                    started_middlewares.iter().any(|started| Arc::ptr_eq(started, middleware));

                if !already_started {
                    started_middlewares.push(middleware.clone());
                    let child_token = tasks_cancel.child_token();
                    let middleware_clone = middleware.clone();
                    middleware_handles
                        .push(tokio::spawn(async move { middleware_clone.run(child_token).await }));
                }
            }
        }

        info!("starting event bus...");

        loop {
            tokio::select! {
                Some(Ok((completed_service_id, result))) = service_tasks.join_next() => {
                    if cancel.is_cancelled() {
                        info!(service_id=%completed_service_id, "service exited during shutdown");
                        continue;
                    }

                    if let Err(e) = &result {
                        tracing::warn!(service_id=%completed_service_id, error=%e, "service failed");
                    }

                    let Some(state) = self.service_state.get_mut(&completed_service_id) else {
                        continue;
                    };

                    if state.connection_start.elapsed() > RECOVERY_THRESHOLD && state.attempt_count > 0 {
                        info!(
                            service_id=%completed_service_id,
                            total_attempts=%state.attempt_count,
                            "service recovered after previous failures"
                        );
                        state.backoff.reset();
                        state.attempt_count = 0;
                    }

                    state.attempt_count += 1;
                    let delay = state.backoff.next_delay();

                    tracing::warn!(
                        service_id=%completed_service_id,
                        attempt=%state.attempt_count,
                        delay_secs=%delay.as_secs(),
                        "service exited unexpectedly, will reconnect"
                    );

                    self.spawn_service_after(&completed_service_id, delay, &mut service_tasks, &tasks_cancel);
                }
                _ = cancel.cancelled() => {
                    info!("shutdown signal received");
                    break;
                }
                maybe_evt = self.evt_rx.recv() => {
                    let Some(evt) = maybe_evt else { break };
                    debug!(event=%evt, "event received");
                    if let Err(e) = self.dispatch_event(&evt) {
                        tracing::error!(service_id=%evt.service_id, error=%e, "middleware failed to handle event");
                    }
                }
                maybe_cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = maybe_cmd else { break };
                    debug!(command=?cmd, "command received");

                    let service_id = cmd.service_id().clone();
                    if let Some(service) = self.services.get(&service_id) {
                        if let Err(e) = service.handle_command(cmd).await {
                            tracing::error!(service_id=%service_id, error=%e, "failed to handle command");
                        }
                    } else {
                        tracing::warn!(service_id=%service_id, "command sent to unknown service");
                    }
                }
            }
        }

        tasks_cancel.cancel();
        while service_tasks.join_next().await.is_some() {}
        for handle in middleware_handles {
            if let Ok(Err(e)) = handle.await {
                tracing::warn!(error=%e, "middleware exited with error");
            }
        }

        info!("exited event bus");
        Ok(())
    }
}

// A small helper to make a Command channel pair available to middlewares.
pub fn create_command_channel(cap: usize) -> (Sender<Command>, Receiver<Command>) {
    tokio::sync::mpsc::channel(cap)
}

// A small helper to make an Event channel pair available to services.
pub fn create_event_channel(cap: usize) -> (Sender<Event>, Receiver<Event>) {
    tokio::sync::mpsc::channel(cap)
}
