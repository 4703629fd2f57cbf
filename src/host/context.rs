//! Runtime context injected into every handler constructor.

use tracing::Span;

use crate::host::membership::{Endpoint, MembershipDirectory};
use crate::observability::MetricsScope;
use crate::transport::{self, Registrations, RpcClient, Transport};
use crate::types::{Error, Result, ServiceKind, TransportConfig};

/// Everything a hosted service gets to know about the runtime.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    endpoint: Endpoint,
    membership: MembershipDirectory,
    num_history_shards: u32,
    metrics: MetricsScope,
    span: Span,
    transport: TransportConfig,
}

impl ServiceContext {
    pub fn new(
        kind: ServiceKind,
        membership: MembershipDirectory,
        num_history_shards: u32,
        metrics: MetricsScope,
        transport: TransportConfig,
    ) -> Result<Self> {
        let endpoint = membership
            .resolve(kind)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("{} is not a member", kind)))?;
        Ok(Self {
            span: tracing::info_span!("service", service = kind.service_name()),
            metrics: metrics.scoped(kind),
            endpoint,
            membership,
            num_history_shards,
            transport,
        })
    }

    pub fn kind(&self) -> ServiceKind {
        self.endpoint.kind
    }

    pub fn service_name(&self) -> &str {
        &self.endpoint.name
    }

    /// Address this service binds.
    pub fn address(&self) -> &str {
        &self.endpoint.address
    }

    pub fn membership(&self) -> &MembershipDirectory {
        &self.membership
    }

    pub fn num_history_shards(&self) -> u32 {
        self.num_history_shards
    }

    pub fn metrics(&self) -> &MetricsScope {
        &self.metrics
    }

    /// Span every log line of this service is recorded under.
    pub fn logger(&self) -> &Span {
        &self.span
    }

    pub fn transport_config(&self) -> &TransportConfig {
        &self.transport
    }

    /// Bind this service's address and serve `registrations` on it.
    pub async fn bind(&self, registrations: Registrations) -> Result<Transport> {
        transport::bind(
            self.service_name(),
            self.address(),
            registrations,
            &self.transport,
            self.metrics.clone(),
        )
        .await
    }

    /// Open a client to a peer listed in the membership directory.
    pub async fn connect(&self, peer: ServiceKind) -> Result<RpcClient> {
        let endpoint = self
            .membership
            .resolve(peer)
            .ok_or_else(|| Error::not_found(format!("{} is not a member", peer)))?;
        RpcClient::connect(&endpoint.address, &self.transport).await
    }
}
