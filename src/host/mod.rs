//! Multi-service host.
//!
//! Runs the frontend, matching and history services in one process:
//! ```text
//!                 ┌────────────────────────────────────────┐
//!   start() ───→  │ Onebox                                 │
//!                 │   MembershipDirectory (static, shared) │
//!                 │   ┌──────────┐ ┌──────────┐            │
//!                 │   │ Matching │ │ History  │  wave 0    │
//!                 │   └──────────┘ └──────────┘            │
//!                 │   ┌──────────┐                         │
//!                 │   │ Frontend │              wave 1     │
//!                 │   └──────────┘                         │
//!                 └────────────────────────────────────────┘
//! ```
//! Every slot runs on its own worker task. The host blocks on phase
//! barriers between steps and never polls.

pub mod barrier;
pub mod context;
pub mod handler;
pub mod membership;
pub mod orchestrator;
pub mod slot;
pub mod standalone;
pub mod state;

pub use barrier::PhaseBarrier;
pub use context::ServiceContext;
pub use handler::{Constructed, HandlerConstructor, ServiceHandler, TransportHandler};
pub use membership::{Endpoint, MembershipDirectory};
pub use orchestrator::{HostStatus, Onebox, ServiceConstructors, SlotStatus};
pub use slot::ServiceSlot;
pub use standalone::{StandaloneConstructor, StandaloneService};
pub use state::RuntimeState;
