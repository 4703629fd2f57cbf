//! Static membership directory.
//!
//! The directory is assembled once, before any handler is constructed, and
//! shared read-only by every service afterwards.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::{ServiceAddresses, ServiceKind};

/// A named service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub kind: ServiceKind,
    pub name: String,
    pub address: String,
}

impl Endpoint {
    pub fn new(kind: ServiceKind, address: impl Into<String>) -> Self {
        Self {
            kind,
            name: kind.service_name().to_string(),
            address: address.into(),
        }
    }
}

/// Ordered, immutable list of every hosted service's endpoint.
///
/// Cloning shares the underlying list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipDirectory {
    endpoints: Arc<[Endpoint]>,
}

impl MembershipDirectory {
    /// Build the directory in Frontend, Matching, History order.
    pub fn from_addresses(addresses: &ServiceAddresses) -> Self {
        let endpoints: Vec<Endpoint> = ServiceKind::ALL
            .iter()
            .map(|&kind| Endpoint::new(kind, addresses.address_of(kind)))
            .collect();
        Self {
            endpoints: endpoints.into(),
        }
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoint of a service.
    pub fn resolve(&self, kind: ServiceKind) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.kind == kind)
    }

    /// Endpoints of every service except `kind`.
    pub fn peers_of(&self, kind: ServiceKind) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter().filter(move |e| e.kind != kind)
    }

    /// Plain `host:port` list, in directory order.
    pub fn hosts(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.address.clone()).collect()
    }
}
