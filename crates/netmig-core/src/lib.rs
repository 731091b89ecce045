//! # netmig – VM network migration core
//!
//! Moves a cluster's VM network adapters between a distributed switch and
//! host-local standard vSwitches, creating the standard-side port groups
//! and switches the move needs.
//!
//! ## Modules
//!
//! - **types** — Inventory handles, device backings, mutation specs, resolved attachments
//! - **error** — Crate-specific error types
//! - **fabric** — `Fabric` trait consumed from the management-plane client
//! - **simulated** — In-memory `Fabric` over a JSON / YAML inventory snapshot
//! - **task** — Polling of asynchronous fabric tasks
//! - **catalog** — Point-in-time index of host and distributed port groups
//! - **resolver** — Per-VM network identity resolution
//! - **planner** — Port group planning and creation on every host
//! - **switch** — Standard vSwitch creation on every host
//! - **migration** — Per-VM rewiring in both directions
//! - **report** — Per-entity outcomes and operation reports
//! - **abort** — Operator interrupt flag
//! - **config** — Run configuration
//! - **service** — Aggregate facade dispatching the operations

pub mod types;
pub mod error;
pub mod fabric;
pub mod simulated;
pub mod task;
pub mod catalog;
pub mod resolver;
pub mod planner;
pub mod switch;
pub mod migration;
pub mod report;
pub mod abort;
pub mod config;
pub mod service;
