//! Transport factory. Binds a service's listener and registers its handlers.
//!
//! Binding is synchronous from the caller's point of view: when [`bind`]
//! returns, the listener is accepting. The accept loop runs on its own task,
//! owned by the returned [`Transport`].

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::observability::MetricsScope;
use crate::transport::router::{Registrations, Router};
use crate::transport::server::RpcServer;
use crate::types::{Error, Result, TransportConfig};

/// A live listener plus the RPC server bound to it.
#[derive(Debug)]
pub struct Transport {
    service_name: String,
    local_addr: SocketAddr,
    server: Arc<RpcServer>,
    accept_loop: Option<JoinHandle<()>>,
}

impl Transport {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Names of the capabilities registered on this transport.
    pub fn registered_services(&self) -> Vec<String> {
        self.server.router().service_names()
    }

    pub fn is_serving(&self) -> bool {
        self.accept_loop
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop accepting, release the listener and wait for every open
    /// connection to finish its in-flight request and close.
    ///
    /// Idempotent.
    pub async fn shutdown(&mut self) {
        self.server.cancellation().cancel();
        if let Some(handle) = self.accept_loop.take() {
            if let Err(e) = handle.await {
                tracing::warn!(service = %self.service_name, error = %e, "accept loop ended abnormally");
            }
            self.server.drain().await;
            tracing::info!(service = %self.service_name, address = %self.local_addr, "transport closed");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.server.cancellation().cancel();
    }
}

/// Bind `address` for `service_name` and serve `registrations` on it.
///
/// Every registration is added before the first connection is accepted.
/// A duplicate registration name is rejected rather than shadowed.
pub async fn bind(
    service_name: &str,
    address: &str,
    registrations: Registrations,
    config: &TransportConfig,
    metrics: MetricsScope,
) -> Result<Transport> {
    let addr = address.parse::<SocketAddr>().map_err(|e| {
        Error::bind(
            service_name,
            address,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
        )
    })?;

    let mut router = Router::new(service_name);
    for registration in registrations {
        let name = registration.name().to_string();
        if !router.register(registration) {
            return Err(Error::validation(format!(
                "{}: duplicate or reserved registration {}",
                service_name, name
            )));
        }
    }

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::bind(service_name, address, e))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| Error::bind(service_name, address, e))?;

    let server = Arc::new(RpcServer::new(router, config.clone(), metrics));
    tracing::info!(
        service = %service_name,
        address = %local_addr,
        registrations = ?server.router().service_names(),
        max_connections = config.max_connections,
        "transport listening"
    );
    let accept_loop = tokio::spawn(server.clone().serve(listener));

    Ok(Transport {
        service_name: service_name.to_string(),
        local_addr,
        server,
        accept_loop: Some(accept_loop),
    })
}
