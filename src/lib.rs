//! # Onebox Core - In-Process Multi-Service Host
//!
//! Runs several independently addressable RPC services in one process:
//! - Static membership directory shared by every hosted service
//! - Dependency-ordered startup that blocks until every service is serving
//! - Synchronized shutdown that returns only after every worker has exited
//! - TCP+msgpack transport with per-service handler registrations
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────────────────┐
//!   caller  →    │            Onebox                │
//!                │  ┌───────────┐  ┌────────────┐   │
//!                │  │Membership │  │   Phase    │   │
//!                │  │ Directory │  │  Barriers  │   │
//!                │  └───────────┘  └────────────┘   │
//!                │  ┌───────────┐  ┌────────────┐   │
//!                │  │  Service  │→ │ Transport  │   │
//!                │  │   Slots   │  │  Factory   │   │
//!                │  └───────────┘  └────────────┘   │
//!                └──────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod host;
pub mod transport;
pub mod types;

// Internal utilities
pub mod observability;

pub use host::{Onebox, RuntimeState, ServiceConstructors};
pub use types::{Error, HostConfig, Result, ServiceKind};
