//! Governance-proposal and chain-upgrade monitoring for Cosmos SDK chains.
//!
//! Two periodic schedulers drive the crate: the [`ProposalPoller`] diffs each
//! monitored chain's governance proposals against known state and raises
//! status-change events, and the [`UpgradeTracker`] estimates the wall-clock
//! arrival of pending upgrade heights and escalates reminder notifications as
//! the deadline nears. Delivery and persistence stay behind the
//! [`NotificationSink`] and [`Store`] traits.

pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod health;
pub mod model;
pub mod poller;
pub mod registry;
pub mod retry;
pub mod schedule;
pub mod store;
pub mod telemetry;
pub mod tracker;
pub mod wire;

#[cfg(test)]
mod tests;

pub use config::MonitorConfig;
pub use error::{Error, Result};
pub use events::{LogSink, NotificationSink};
pub use fetch::{ClientPool, HeaderSource, RestHeaderSource, RpcHeaderSource};
pub use poller::ProposalPoller;
pub use registry::RegistryRefresher;
pub use store::{MemStore, Store, StoreTxn};
pub use tracker::UpgradeTracker;
