//! Multi-node convergence engine.
//!
//! Drives a fleet of immutable-OS nodes toward a desired configuration over
//! their remote management API. Each invocation is a single run:
//!
//! ```text
//! gather ──▶ preflight ──▶ apply | upgrade | reset ──▶ stabilize
//!                            └──▶ bootstrap (optional, after apply)
//! ```
//!
//! - [`gather`] reads every configured node concurrently; failures stay with
//!   the node they happened on.
//! - [`preflight`] narrows the gathered set per operation, or aborts.
//! - [`apply`], [`upgrade`] and [`reset`] walk the eligible nodes strictly in
//!   configuration order.
//! - [`stabilize`] waits for a continuous healthy window after a change.
//! - [`bootstrap`] initializes etcd on the first control-plane node, once.
//!
//! Everything a component needs is carried by [`RunContext`]; the node
//! transport sits behind the [`NodeApi`] and [`Connector`] traits so the
//! orchestration can run against an in-memory node in tests.

pub mod api;
pub mod apply;
pub mod bootstrap;
pub mod cluster;
pub mod connect;
pub mod context;
pub mod error;
pub mod gather;
pub mod node;
pub mod preflight;
pub mod prompt;
pub mod render;
pub mod reset;
pub mod secrets;
pub mod stabilize;
pub mod transport;
pub mod upgrade;

pub use api::{Connector, NodeApi};
pub use cluster::{ClusterParams, NodeSpec, Role};
pub use context::RunContext;
pub use error::{ApiError, Error, Result};
pub use node::{MachineStage, MachineStatus, Node, Readiness, UnmetCondition};
pub use preflight::Operation;
