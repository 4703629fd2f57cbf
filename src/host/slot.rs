//! Service slots: one hosted service plus the worker task that runs it.
//!
//! The worker constructs the handler, starts it, reports to the startup
//! barrier, then parks on the host's cancellation token. Once cancelled it
//! reports to the shutdown barrier and exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::host::barrier::PhaseBarrier;
use crate::host::context::ServiceContext;
use crate::host::handler::{HandlerConstructor, ServiceHandler};
use crate::host::membership::Endpoint;
use crate::types::{Error, Result, ServiceKind};

/// One hosted service and its lifecycle.
#[derive(Debug)]
pub struct ServiceSlot {
    endpoint: Endpoint,
    constructor: Arc<dyn HandlerConstructor>,
    /// Written once by the worker, right after construction.
    handler: Arc<OnceLock<Arc<dyn ServiceHandler>>>,
    running: Arc<AtomicBool>,
    outcome: Option<oneshot::Receiver<Error>>,
    worker: Option<JoinHandle<()>>,
}

/// Coordination handles a worker needs from the host.
#[derive(Debug, Clone)]
pub(crate) struct SlotSignals {
    pub startup: Arc<PhaseBarrier>,
    pub shutdown: Arc<PhaseBarrier>,
    pub cancel: CancellationToken,
}

impl ServiceSlot {
    pub fn new(endpoint: Endpoint, constructor: Arc<dyn HandlerConstructor>) -> Self {
        Self {
            endpoint,
            constructor,
            handler: Arc::new(OnceLock::new()),
            running: Arc::new(AtomicBool::new(false)),
            outcome: None,
            worker: None,
        }
    }

    pub fn kind(&self) -> ServiceKind {
        self.endpoint.kind
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Handler started and not yet released by shutdown.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the worker. The caller must have added one arrival to
    /// `signals.shutdown` for it.
    pub(crate) fn launch(&mut self, ctx: ServiceContext, signals: SlotSignals) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::state_transition(format!(
                "{} was already launched",
                self.endpoint.name
            )));
        }
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let span = ctx.logger().clone();
        let worker = run_slot(
            self.constructor.clone(),
            ctx,
            self.handler.clone(),
            self.running.clone(),
            outcome_tx,
            signals,
        );
        self.outcome = Some(outcome_rx);
        self.worker = Some(tokio::spawn(worker.instrument(span)));
        Ok(())
    }

    /// Error the worker reported, if startup failed.
    pub(crate) fn take_failure(&mut self) -> Option<Error> {
        self.outcome.as_mut().and_then(|rx| rx.try_recv().ok())
    }

    /// Ask the handler to stop accepting RPCs.
    pub async fn stop_handler(&self) {
        if let Some(handler) = self.handler.get() {
            handler.stop().await;
            tracing::info!(service = %self.endpoint.name, "handler stopped");
        }
    }

    pub(crate) fn abort_worker(&self) {
        if let Some(worker) = &self.worker {
            worker.abort();
        }
    }

    pub(crate) fn take_worker(&mut self) -> Option<JoinHandle<()>> {
        self.worker.take()
    }
}

async fn run_slot(
    constructor: Arc<dyn HandlerConstructor>,
    ctx: ServiceContext,
    handler_cell: Arc<OnceLock<Arc<dyn ServiceHandler>>>,
    running: Arc<AtomicBool>,
    outcome: oneshot::Sender<Error>,
    signals: SlotSignals,
) {
    let started = Instant::now();
    let name = ctx.service_name().to_string();
    let metrics = ctx.metrics().clone();

    match bring_up(constructor, ctx, &handler_cell).await {
        Ok(()) => {
            running.store(true, Ordering::Release);
            metrics.counter("slot_starts_total").increment(1);
            metrics
                .histogram("slot_start_seconds")
                .record(started.elapsed().as_secs_f64());
            tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "service serving");
            signals.startup.arrive();
        }
        Err(e) => {
            tracing::error!(error = %e, "service failed to start");
            let reason = e.to_string();
            let _ = outcome.send(e);
            signals.startup.fail(reason);
            signals.shutdown.arrive();
            return;
        }
    }

    signals.cancel.cancelled().await;
    running.store(false, Ordering::Release);
    tracing::debug!(service = %name, "slot worker exiting");
    signals.shutdown.arrive();
}

async fn bring_up(
    constructor: Arc<dyn HandlerConstructor>,
    ctx: ServiceContext,
    handler_cell: &OnceLock<Arc<dyn ServiceHandler>>,
) -> Result<()> {
    let name = ctx.service_name().to_string();
    let (handler, registrations) = constructor.construct(ctx).await.map_err(|e| {
        if e.is_startup_failure() {
            e
        } else {
            Error::construction(&name, e.to_string())
        }
    })?;

    if handler_cell.set(handler.clone()).is_err() {
        return Err(Error::state_transition(format!(
            "{} handler was already constructed",
            name
        )));
    }

    handler.start(registrations).await.map_err(|e| {
        if e.is_startup_failure() {
            e
        } else {
            Error::handler_start(&name, e.to_string())
        }
    })
}
