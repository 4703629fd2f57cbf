//! Built-in service used when no business handler is plugged in.
//!
//! Each instance registers one capability, named after its service, that can
//! describe its runtime context and reach its peers through the membership
//! directory.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::host::context::ServiceContext;
use crate::host::handler::{Constructed, HandlerConstructor, ServiceHandler, TransportHandler};
use crate::transport::{RpcService, HEALTH_PING, HEALTH_SERVICE};
use crate::types::{Error, Result};

/// Describe this service's context.
pub const METHOD_DESCRIBE: &str = "Describe";
/// Ping every peer and report which ones answered.
pub const METHOD_PEERS: &str = "Peers";

/// Constructor for [`StandaloneService`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StandaloneConstructor;

#[async_trait]
impl HandlerConstructor for StandaloneConstructor {
    async fn construct(&self, ctx: ServiceContext) -> Result<Constructed> {
        let service: Arc<dyn RpcService> = Arc::new(StandaloneService { ctx: ctx.clone() });
        let handler: Arc<dyn ServiceHandler> = Arc::new(TransportHandler::new(ctx));
        Ok((handler, vec![service]))
    }
}

/// RPC capability exposed by the standalone service.
#[derive(Debug)]
pub struct StandaloneService {
    ctx: ServiceContext,
}

impl StandaloneService {
    fn describe(&self) -> Value {
        json!({
            "service": self.ctx.service_name(),
            "address": self.ctx.address(),
            "num_history_shards": self.ctx.num_history_shards(),
            "membership": self.ctx.membership().hosts(),
        })
    }

    async fn peers(&self) -> Value {
        let mut report = serde_json::Map::new();
        for peer in self.ctx.membership().peers_of(self.ctx.kind()) {
            let reachable = match self.ctx.connect(peer.kind).await {
                Ok(mut client) => client
                    .call(HEALTH_SERVICE, HEALTH_PING, Value::Null)
                    .await
                    .is_ok(),
                Err(e) => {
                    tracing::debug!(peer = %peer.name, error = %e, "peer unreachable");
                    false
                }
            };
            report.insert(peer.name.clone(), Value::Bool(reachable));
        }
        Value::Object(report)
    }
}

#[async_trait]
impl RpcService for StandaloneService {
    fn name(&self) -> &str {
        self.ctx.service_name()
    }

    async fn call(&self, method: &str, _body: Value) -> Result<Value> {
        match method {
            METHOD_DESCRIBE => Ok(self.describe()),
            METHOD_PEERS => Ok(self.peers().await),
            _ => Err(Error::not_found(format!(
                "Unknown method: {}.{}",
                self.ctx.service_name(),
                method
            ))),
        }
    }
}
