//! `machine.MachineService` messages and client.

use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{IntoRequest, Response, Status};

use crate::common::Metadata;

// =============================================================================
// ApplyConfiguration
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplyConfigurationRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub data: ::prost::alloc::vec::Vec<u8>,

    #[prost(enumeration = "apply_configuration_request::Mode", tag = "4")]
    pub mode: i32,

    #[prost(bool, tag = "5")]
    pub dry_run: bool,
}

pub mod apply_configuration_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Mode {
        Reboot = 0,
        Auto = 1,
        NoReboot = 2,
        Staged = 3,
        Try = 4,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplyConfiguration {
    #[prost(message, optional, tag = "1")]
    pub metadata: ::core::option::Option<Metadata>,

    #[prost(string, repeated, tag = "2")]
    pub warnings: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,

    #[prost(enumeration = "apply_configuration_request::Mode", tag = "3")]
    pub mode: i32,

    #[prost(string, tag = "4")]
    pub mode_details: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplyConfigurationResponse {
    #[prost(message, repeated, tag = "1")]
    pub messages: ::prost::alloc::vec::Vec<ApplyConfiguration>,
}

// =============================================================================
// Bootstrap
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BootstrapRequest {
    #[prost(bool, tag = "1")]
    pub recover_etcd: bool,

    #[prost(bool, tag = "2")]
    pub recover_skip_hash_check: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Bootstrap {
    #[prost(message, optional, tag = "1")]
    pub metadata: ::core::option::Option<Metadata>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BootstrapResponse {
    #[prost(message, repeated, tag = "1")]
    pub messages: ::prost::alloc::vec::Vec<Bootstrap>,
}

// =============================================================================
// Reset
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResetPartitionSpec {
    #[prost(string, tag = "1")]
    pub label: ::prost::alloc::string::String,

    #[prost(bool, tag = "2")]
    pub wipe: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResetRequest {
    #[prost(bool, tag = "1")]
    pub graceful: bool,

    #[prost(bool, tag = "2")]
    pub reboot: bool,

    /// Empty means "wipe everything".
    #[prost(message, repeated, tag = "3")]
    pub system_partitions_to_wipe: ::prost::alloc::vec::Vec<ResetPartitionSpec>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Reset {
    #[prost(message, optional, tag = "1")]
    pub metadata: ::core::option::Option<Metadata>,

    #[prost(string, tag = "2")]
    pub actor_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResetResponse {
    #[prost(message, repeated, tag = "1")]
    pub messages: ::prost::alloc::vec::Vec<Reset>,
}

// =============================================================================
// Upgrade
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpgradeRequest {
    #[prost(string, tag = "1")]
    pub image: ::prost::alloc::string::String,

    #[prost(bool, tag = "2")]
    pub preserve: bool,

    #[prost(bool, tag = "3")]
    pub stage: bool,

    #[prost(bool, tag = "4")]
    pub force: bool,

    #[prost(enumeration = "upgrade_request::RebootMode", tag = "5")]
    pub reboot_mode: i32,
}

pub mod upgrade_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum RebootMode {
        Default = 0,
        Powercycle = 1,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Upgrade {
    #[prost(message, optional, tag = "1")]
    pub metadata: ::core::option::Option<Metadata>,

    #[prost(string, tag = "2")]
    pub ack: ::prost::alloc::string::String,

    #[prost(string, tag = "3")]
    pub actor_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpgradeResponse {
    #[prost(message, repeated, tag = "1")]
    pub messages: ::prost::alloc::vec::Vec<Upgrade>,
}

// =============================================================================
// Etcd members
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EtcdMemberListRequest {
    #[prost(bool, tag = "1")]
    pub query_local: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EtcdMember {
    #[prost(uint64, tag = "2")]
    pub id: u64,

    #[prost(string, tag = "3")]
    pub hostname: ::prost::alloc::string::String,

    #[prost(string, repeated, tag = "4")]
    pub peer_urls: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,

    #[prost(string, repeated, tag = "5")]
    pub client_urls: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,

    #[prost(bool, tag = "6")]
    pub is_learner: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EtcdMembers {
    #[prost(message, optional, tag = "1")]
    pub metadata: ::core::option::Option<Metadata>,

    #[prost(message, repeated, tag = "3")]
    pub members: ::prost::alloc::vec::Vec<EtcdMember>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EtcdMemberListResponse {
    #[prost(message, repeated, tag = "1")]
    pub messages: ::prost::alloc::vec::Vec<EtcdMembers>,
}

// =============================================================================
// Services
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceInfo {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,

    #[prost(string, tag = "2")]
    pub state: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceList {
    #[prost(message, optional, tag = "1")]
    pub metadata: ::core::option::Option<Metadata>,

    #[prost(message, repeated, tag = "2")]
    pub services: ::prost::alloc::vec::Vec<ServiceInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceListResponse {
    #[prost(message, repeated, tag = "1")]
    pub messages: ::prost::alloc::vec::Vec<ServiceList>,
}

// =============================================================================
// Events
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventsRequest {
    #[prost(int32, tag = "1")]
    pub tail_events: i32,

    #[prost(string, tag = "2")]
    pub tail_id: ::prost::alloc::string::String,

    #[prost(int32, tag = "3")]
    pub tail_seconds: i32,

    #[prost(string, tag = "4")]
    pub with_actor_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Event {
    #[prost(message, optional, tag = "1")]
    pub metadata: ::core::option::Option<Metadata>,

    #[prost(message, optional, tag = "2")]
    pub data: ::core::option::Option<::prost_types::Any>,

    #[prost(string, tag = "3")]
    pub id: ::prost::alloc::string::String,

    #[prost(string, tag = "4")]
    pub actor_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MachineStatusEvent {
    #[prost(enumeration = "machine_status_event::MachineStage", tag = "1")]
    pub stage: i32,

    #[prost(message, optional, tag = "2")]
    pub status: ::core::option::Option<machine_status_event::MachineStatus>,
}

pub mod machine_status_event {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum MachineStage {
        Unknown = 0,
        Booting = 1,
        Installing = 2,
        Maintenance = 3,
        Running = 4,
        Rebooting = 5,
        ShuttingDown = 6,
        Resetting = 7,
        Upgrading = 8,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MachineStatus {
        #[prost(bool, tag = "1")]
        pub ready: bool,

        #[prost(message, repeated, tag = "2")]
        pub unmet_conditions: ::prost::alloc::vec::Vec<machine_status::UnmetCondition>,
    }

    pub mod machine_status {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct UnmetCondition {
            #[prost(string, tag = "1")]
            pub name: ::prost::alloc::string::String,

            #[prost(string, tag = "2")]
            pub reason: ::prost::alloc::string::String,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

macro_rules! unary {
    ($(#[$doc:meta])* $name:ident, $path:literal, $req:ty => $resp:ty) => {
        $(#[$doc])*
        pub async fn $name(
            &mut self,
            request: impl IntoRequest<$req>,
        ) -> Result<Response<$resp>, Status> {
            self.ready().await?;
            self.inner
                .unary(
                    request.into_request(),
                    PathAndQuery::from_static($path),
                    ProstCodec::default(),
                )
                .await
        }
    };
}

/// Client for `machine.MachineService`.
#[derive(Debug, Clone)]
pub struct MachineServiceClient {
    inner: tonic::client::Grpc<Channel>,
}

impl MachineServiceClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    async fn ready(&mut self) -> Result<(), Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {e}")))
    }

    unary!(
        /// Submit a machine configuration (optionally as a dry run).
        apply_configuration,
        "/machine.MachineService/ApplyConfiguration",
        ApplyConfigurationRequest => ApplyConfigurationResponse
    );

    unary!(
        /// Initialize the etcd cluster on this node.
        bootstrap,
        "/machine.MachineService/Bootstrap",
        BootstrapRequest => BootstrapResponse
    );

    unary!(
        reset,
        "/machine.MachineService/Reset",
        ResetRequest => ResetResponse
    );

    unary!(
        upgrade,
        "/machine.MachineService/Upgrade",
        UpgradeRequest => UpgradeResponse
    );

    unary!(
        etcd_member_list,
        "/machine.MachineService/EtcdMemberList",
        EtcdMemberListRequest => EtcdMemberListResponse
    );

    unary!(
        service_list,
        "/machine.MachineService/ServiceList",
        () => ServiceListResponse
    );

    /// Subscribe to the node's runtime event stream.
    pub async fn events(
        &mut self,
        request: impl IntoRequest<EventsRequest>,
    ) -> Result<Response<Streaming<Event>>, Status> {
        self.ready().await?;
        self.inner
            .server_streaming(
                request.into_request(),
                PathAndQuery::from_static("/machine.MachineService/Events"),
                ProstCodec::default(),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn test_machine_status_event_decodes() {
        let event = MachineStatusEvent {
            stage: machine_status_event::MachineStage::Running as i32,
            status: Some(machine_status_event::MachineStatus {
                ready: false,
                unmet_conditions: vec![machine_status_event::machine_status::UnmetCondition {
                    name: "nodeReady".to_string(),
                    reason: "node not ready".to_string(),
                }],
            }),
        };

        let decoded = MachineStatusEvent::decode(event.encode_to_vec().as_slice()).unwrap();
        assert_eq!(
            decoded.stage(),
            machine_status_event::MachineStage::Running
        );
        assert_eq!(decoded.status.unwrap().unmet_conditions[0].name, "nodeReady");
    }

    #[test]
    fn test_apply_request_mode_accessor() {
        let mut request = ApplyConfigurationRequest {
            data: b"version: v1alpha1".to_vec(),
            dry_run: true,
            ..Default::default()
        };
        request.set_mode(apply_configuration_request::Mode::Auto);

        assert_eq!(request.mode, 1);
        assert_eq!(request.mode(), apply_configuration_request::Mode::Auto);
    }
}
