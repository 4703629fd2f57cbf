//! Contracts between the host and the services it runs.
//!
//! A [`HandlerConstructor`] turns a [`ServiceContext`] into a handler plus the
//! RPC capabilities it wants served. The host then calls
//! [`ServiceHandler::start`] with those registrations and, at shutdown,
//! [`ServiceHandler::stop`].

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::host::context::ServiceContext;
use crate::transport::{Registrations, Transport};
use crate::types::{Error, Result};

/// A constructed handler and the capabilities it asks to serve.
pub type Constructed = (Arc<dyn ServiceHandler>, Registrations);

/// A running service as seen by the host.
#[async_trait]
pub trait ServiceHandler: Send + Sync + std::fmt::Debug {
    /// Begin serving `registrations`. Returns once RPCs are being accepted.
    async fn start(&self, registrations: Registrations) -> Result<()>;

    /// Stop accepting RPCs. Called once per successful start; must tolerate
    /// being called on a handler that never finished starting.
    async fn stop(&self);
}

/// Builds one service's handler from its runtime context.
#[async_trait]
pub trait HandlerConstructor: Send + Sync + std::fmt::Debug {
    async fn construct(&self, ctx: ServiceContext) -> Result<Constructed>;
}

/// Handler that binds its context's address on start and closes it on stop.
///
/// Business handlers that need nothing beyond serving their registrations can
/// use this directly.
#[derive(Debug)]
pub struct TransportHandler {
    ctx: ServiceContext,
    transport: Mutex<Option<Transport>>,
}

impl TransportHandler {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            ctx,
            transport: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    /// Whether the transport is currently accepting.
    pub async fn is_serving(&self) -> bool {
        self.transport
            .lock()
            .await
            .as_ref()
            .is_some_and(Transport::is_serving)
    }
}

#[async_trait]
impl ServiceHandler for TransportHandler {
    async fn start(&self, registrations: Registrations) -> Result<()> {
        let mut slot = self.transport.lock().await;
        if slot.is_some() {
            return Err(Error::state_transition(format!(
                "{} is already serving",
                self.ctx.service_name()
            )));
        }
        *slot = Some(self.ctx.bind(registrations).await?);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(mut transport) = self.transport.lock().await.take() {
            transport.shutdown().await;
        }
    }
}
