//! Core types for the onebox host.
//!
//! - **Service**: identities of the hosted services and their startup waves
//! - **IDs**: strongly-typed identifiers
//! - **Errors**: application error types with thiserror derives
//! - **Config**: host, transport, readiness and observability configuration

mod config;
mod errors;
mod ids;
mod service;

pub use config::{
    HostConfig, ObservabilityConfig, ReadinessConfig, ServiceAddresses, TransportConfig,
};
pub use errors::{Error, Result};
pub use ids::RequestId;
pub use service::ServiceKind;
