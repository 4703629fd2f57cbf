//! The onebox host: starts the three services in dependency order and stops
//! them together.
//!
//! Startup:
//! ```text
//! membership directory → wave 0 (Matching ∥ History) → barrier
//!                      → wave 1 (Frontend)           → barrier
//!                      → readiness probe → settle period → RUNNING
//! ```
//! Shutdown:
//! ```text
//! stop handlers (Frontend, History, Matching) → cancel → shutdown barrier → join
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::host::barrier::PhaseBarrier;
use crate::host::context::ServiceContext;
use crate::host::handler::HandlerConstructor;
use crate::host::membership::{Endpoint, MembershipDirectory};
use crate::host::slot::{ServiceSlot, SlotSignals};
use crate::host::state::RuntimeState;
use crate::observability::MetricsScope;
use crate::transport::{RpcClient, HEALTH_PING, HEALTH_SERVICE};
use crate::types::{Error, HostConfig, ReadinessConfig, Result, ServiceKind, TransportConfig};

/// Order handlers are stopped in.
const STOP_ORDER: [ServiceKind; 3] = [
    ServiceKind::Frontend,
    ServiceKind::History,
    ServiceKind::Matching,
];

/// Handler constructors for the three hosted services.
#[derive(Debug, Clone)]
pub struct ServiceConstructors {
    pub frontend: Arc<dyn HandlerConstructor>,
    pub matching: Arc<dyn HandlerConstructor>,
    pub history: Arc<dyn HandlerConstructor>,
}

impl ServiceConstructors {
    /// Use the same constructor for every service.
    pub fn uniform(constructor: Arc<dyn HandlerConstructor>) -> Self {
        Self {
            frontend: constructor.clone(),
            matching: constructor.clone(),
            history: constructor,
        }
    }

    fn for_kind(&self, kind: ServiceKind) -> Arc<dyn HandlerConstructor> {
        match kind {
            ServiceKind::Frontend => self.frontend.clone(),
            ServiceKind::Matching => self.matching.clone(),
            ServiceKind::History => self.history.clone(),
        }
    }
}

/// Point-in-time view of one slot.
#[derive(Debug, Clone, Serialize)]
pub struct SlotStatus {
    pub kind: ServiceKind,
    pub name: String,
    pub address: String,
    pub running: bool,
}

/// Point-in-time view of the host.
#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    pub state: RuntimeState,
    pub started_at: Option<DateTime<Utc>>,
    pub services: Vec<SlotStatus>,
}

/// Hosts the frontend, matching and history services in one process.
#[derive(Debug)]
pub struct Onebox {
    config: HostConfig,
    membership: MembershipDirectory,
    metrics: MetricsScope,
    slots: Vec<ServiceSlot>,
    state: RuntimeState,
    cancel: CancellationToken,
    shutdown: Arc<PhaseBarrier>,
    started_at: Option<DateTime<Utc>>,
}

impl Onebox {
    pub fn new(config: HostConfig, constructors: ServiceConstructors) -> Result<Self> {
        config.validate()?;
        let membership = MembershipDirectory::from_addresses(&config.services);
        let slots = ServiceKind::ALL
            .iter()
            .map(|&kind| {
                let endpoint = Endpoint::new(kind, config.services.address_of(kind));
                ServiceSlot::new(endpoint, constructors.for_kind(kind))
            })
            .collect();
        Ok(Self {
            config,
            membership,
            metrics: MetricsScope::root("onebox"),
            slots,
            state: RuntimeState::NotStarted,
            cancel: CancellationToken::new(),
            shutdown: Arc::new(PhaseBarrier::new("shutdown", 0)),
            started_at: None,
        })
    }

    pub fn frontend_address(&self) -> &str {
        self.config.services.address_of(ServiceKind::Frontend)
    }

    pub fn matching_service_address(&self) -> &str {
        self.config.services.address_of(ServiceKind::Matching)
    }

    pub fn history_service_address(&self) -> &str {
        self.config.services.address_of(ServiceKind::History)
    }

    pub fn address_of(&self, kind: ServiceKind) -> &str {
        self.config.services.address_of(kind)
    }

    pub fn membership(&self) -> &MembershipDirectory {
        &self.membership
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn status(&self) -> HostStatus {
        HostStatus {
            state: self.state,
            started_at: self.started_at,
            services: self
                .slots
                .iter()
                .map(|slot| SlotStatus {
                    kind: slot.kind(),
                    name: slot.endpoint().name.clone(),
                    address: slot.endpoint().address.clone(),
                    running: slot.is_running(),
                })
                .collect(),
        }
    }

    /// Start every service and return once all of them are serving and the
    /// settle period has elapsed.
    ///
    /// On failure every service that did come up is stopped again, its port
    /// released, and the host ends in `Stopped`.
    pub async fn start(&mut self) -> Result<()> {
        self.state.transition(RuntimeState::Starting)?;
        tracing::info!(
            hosts = ?self.membership.hosts(),
            num_history_shards = self.config.num_history_shards,
            "starting onebox"
        );

        if let Err(e) = self.start_waves().await {
            return Err(self.abort_start(e).await);
        }
        if self.config.readiness.enabled {
            if let Err(e) = probe_members(
                &self.membership,
                &self.config.readiness,
                &self.config.transport,
            )
            .await
            {
                return Err(self.abort_start(e).await);
            }
        }

        // Fixed wait for peer state inside the services to converge.
        tracing::info!(settle_period = ?self.config.settle_period, "all services serving, settling");
        tokio::time::sleep(self.config.settle_period).await;

        self.state.transition(RuntimeState::Running)?;
        self.started_at = Some(Utc::now());
        self.metrics.gauge("running_services").set(self.slots.len() as f64);
        tracing::info!("onebox running");
        Ok(())
    }

    /// Stop every service and wait for all slot workers to exit.
    ///
    /// Only acts on a running host. Any other state (never started, failed
    /// start, already stopped) makes this a no-op.
    pub async fn stop(&mut self) {
        if self.state != RuntimeState::Running {
            tracing::warn!(state = %self.state, "stop ignored: onebox is not running");
            return;
        }
        if let Err(e) = self.state.transition(RuntimeState::Stopping) {
            tracing::error!(error = %e, "cannot enter stopping state");
            return;
        }
        tracing::info!("stopping onebox");

        for kind in STOP_ORDER {
            if let Some(slot) = self.slots.iter().find(|s| s.kind() == kind) {
                slot.stop_handler().await;
            }
        }
        self.cancel.cancel();
        self.join_workers().await;

        self.finish_stop();
        tracing::info!("onebox stopped");
    }

    async fn start_waves(&mut self) -> Result<()> {
        let waves: BTreeSet<usize> = self.slots.iter().map(|s| s.kind().startup_wave()).collect();
        for wave in waves {
            let members: Vec<usize> = (0..self.slots.len())
                .filter(|&i| self.slots[i].kind().startup_wave() == wave)
                .collect();
            let startup = Arc::new(PhaseBarrier::new(
                format!("startup-wave-{}", wave),
                members.len(),
            ));

            for &i in &members {
                let ctx = ServiceContext::new(
                    self.slots[i].kind(),
                    self.membership.clone(),
                    self.config.num_history_shards,
                    self.metrics.clone(),
                    self.config.transport.clone(),
                )?;
                self.shutdown.add(1);
                let signals = SlotSignals {
                    startup: startup.clone(),
                    shutdown: self.shutdown.clone(),
                    cancel: self.cancel.clone(),
                };
                if let Err(e) = self.slots[i].launch(ctx, signals) {
                    self.shutdown.arrive();
                    return Err(e);
                }
            }

            if let Err(e) = startup.wait().await {
                let typed = members.iter().find_map(|&i| self.slots[i].take_failure());
                return Err(typed.unwrap_or(e));
            }
            let services: Vec<&str> = members
                .iter()
                .map(|&i| self.slots[i].kind().service_name())
                .collect();
            tracing::info!(wave, ?services, "startup wave serving");
        }
        Ok(())
    }

    /// Roll back a failed start. Returns the error to hand to the caller.
    async fn abort_start(&mut self, err: Error) -> Error {
        tracing::error!(error = %err, "onebox failed to start, rolling back");
        if let Err(e) = self.state.transition(RuntimeState::Stopping) {
            tracing::error!(error = %e, "cannot enter stopping state");
        }

        // Workers still bringing their handler up finish before they observe
        // the cancellation, so handlers are stopped only after every worker
        // has left.
        self.cancel.cancel();
        self.join_workers().await;
        for slot in &self.slots {
            slot.stop_handler().await;
        }

        self.finish_stop();
        err
    }

    async fn join_workers(&mut self) {
        if let Err(e) = self
            .shutdown
            .wait_timeout(self.config.shutdown_timeout)
            .await
        {
            tracing::error!(error = %e, "slot workers did not exit in time, aborting them");
            for slot in &self.slots {
                slot.abort_worker();
            }
        }

        let workers: Vec<_> = self.slots.iter_mut().filter_map(ServiceSlot::take_worker).collect();
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "slot worker ended abnormally");
                }
            }
        }
    }

    fn finish_stop(&mut self) {
        if let Err(e) = self.state.transition(RuntimeState::Stopped) {
            tracing::error!(error = %e, "cannot enter stopped state");
        }
        self.metrics.gauge("running_services").set(0.0);
    }
}

impl Drop for Onebox {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Ping every member's health service until it answers, with bounded backoff.
async fn probe_members(
    membership: &MembershipDirectory,
    readiness: &ReadinessConfig,
    transport: &TransportConfig,
) -> Result<()> {
    let probes = membership
        .endpoints()
        .iter()
        .map(|endpoint| probe(endpoint, readiness, transport));
    futures::future::try_join_all(probes).await?;
    tracing::debug!("every member answered its readiness probe");
    Ok(())
}

async fn probe(
    endpoint: &Endpoint,
    readiness: &ReadinessConfig,
    transport: &TransportConfig,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        let outcome = match RpcClient::connect(&endpoint.address, transport).await {
            Ok(mut client) => client
                .call(HEALTH_SERVICE, HEALTH_PING, serde_json::Value::Null)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= readiness.max_attempts => {
                return Err(Error::startup(
                    "readiness",
                    format!(
                        "{} at {} not ready after {} attempt(s): {}",
                        endpoint.name, endpoint.address, attempt, e
                    ),
                ));
            }
            Err(e) => {
                let delay = readiness.backoff_for(attempt);
                tracing::debug!(
                    service = %endpoint.name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "readiness probe failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
