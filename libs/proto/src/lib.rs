//! Node management API bindings.
//!
//! Only the subset of the machine and resource-state services used by the
//! orchestrator is declared here. Message layouts mirror the upstream
//! `machine.proto`, `common.proto` and `cosi/resource/state.proto` field
//! numbers, so unknown fields sent by newer nodes are skipped by prost.

pub mod common;
pub mod machine;
pub mod resource;

pub use machine::MachineServiceClient;
pub use resource::StateClient;

/// Type URL suffix of machine status events carried in `Event.data`.
pub const MACHINE_STATUS_EVENT_TYPE: &str = "machine.MachineStatusEvent";
