//! Service registrations and request routing.
//!
//! A hosted service exposes one or more [`RpcService`] capabilities. The
//! handler constructor hands them back as [`Registrations`], and the transport
//! factory registers every one on the server before it accepts connections.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{Error, Result};

/// Reserved service answered by every transport.
pub const HEALTH_SERVICE: &str = "health";
/// Liveness method of [`HEALTH_SERVICE`].
pub const HEALTH_PING: &str = "Ping";

/// One RPC capability registered on a transport.
#[async_trait]
pub trait RpcService: Send + Sync + std::fmt::Debug {
    /// Service name requests are routed by.
    fn name(&self) -> &str;

    /// Handle a single request.
    async fn call(&self, method: &str, body: Value) -> Result<Value>;
}

/// Capabilities a handler asks its transport to serve.
pub type Registrations = Vec<Arc<dyn RpcService>>;

/// Routes requests by service name to registered capabilities.
#[derive(Debug, Default)]
pub struct Router {
    owner: String,
    services: HashMap<String, Arc<dyn RpcService>>,
}

impl Router {
    /// Empty router for the transport owned by `owner`.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            services: HashMap::new(),
        }
    }

    /// Register a capability. Returns false if the name is taken or reserved.
    pub fn register(&mut self, service: Arc<dyn RpcService>) -> bool {
        let name = service.name().to_string();
        if name == HEALTH_SERVICE || self.services.contains_key(&name) {
            return false;
        }
        self.services.insert(name, service);
        true
    }

    /// Registered service names, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Route a request to the matching capability.
    pub async fn route(&self, service: &str, method: &str, body: Value) -> Result<Value> {
        if service == HEALTH_SERVICE {
            return self.health(method);
        }
        let target = self
            .services
            .get(service)
            .ok_or_else(|| Error::not_found(format!("Unknown service: {}", service)))?;
        target.call(method, body).await
    }

    fn health(&self, method: &str) -> Result<Value> {
        match method {
            HEALTH_PING => Ok(serde_json::json!({
                "owner": self.owner,
                "services": self.service_names(),
            })),
            _ => Err(Error::not_found(format!("Unknown method: health.{}", method))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Echo;

    #[async_trait]
    impl RpcService for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn call(&self, method: &str, body: Value) -> Result<Value> {
            match method {
                "Echo" => body
                    .get("text")
                    .and_then(Value::as_str)
                    .map(|text| Value::String(text.to_string()))
                    .ok_or_else(|| Error::validation("Missing required field: text")),
                _ => Err(Error::not_found(method.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_routes_to_registered_service() {
        let mut router = Router::new("onebox-frontend");
        assert!(router.register(Arc::new(Echo)));
        let out = router
            .route("echo", "Echo", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(out, Value::String("hi".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_service_is_not_found() {
        let router = Router::new("onebox-frontend");
        let err = router
            .route("nonexistent", "Foo", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.to_wire_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_missing_field_is_validation_error() {
        let mut router = Router::new("onebox-frontend");
        router.register(Arc::new(Echo));
        let err = router
            .route("echo", "Echo", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_health_ping_lists_services() {
        let mut router = Router::new("onebox-matching");
        router.register(Arc::new(Echo));
        assert!(!router.register(Arc::new(Echo)));
        let out = router.route(HEALTH_SERVICE, HEALTH_PING, Value::Null).await.unwrap();
        assert_eq!(out["owner"], "onebox-matching");
        assert_eq!(out["services"], serde_json::json!(["echo"]));
    }
}
