//! TCP+msgpack RPC transport.
//!
//! Each hosted service gets its own [`Transport`]: a listener bound to the
//! service's address plus a server that routes requests to the capabilities
//! the service registered. Peers talk to each other through [`RpcClient`].

pub mod client;
pub mod codec;
pub mod factory;
pub mod router;
pub mod server;

pub use client::RpcClient;
pub use factory::{bind, Transport};
pub use router::{Registrations, Router, RpcService, HEALTH_PING, HEALTH_SERVICE};
pub use server::RpcServer;
