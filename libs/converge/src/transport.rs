//! gRPC-backed [`NodeApi`].

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use herd_proto::machine::{
    self, apply_configuration_request, machine_status_event, upgrade_request,
};
use herd_proto::resource::{
    self, GetRequest, ListRequest, Resource, EXTENSION_STATUS_TYPE, MACHINE_STATUS_ID,
    MACHINE_STATUS_TYPE, RUNTIME_NAMESPACE, VERSION_TYPE,
};
use herd_proto::{MachineServiceClient, StateClient, MACHINE_STATUS_EVENT_TYPE};
use prost::Message;
use serde::Deserialize;
use tonic::transport::Channel;

use crate::api::{
    ApplyRequest, ApplyResponse, EventStream, Extension, NodeApi, NodeEvent, RebootMode,
    ResetRequest, UpgradeRequest,
};
use crate::error::ApiError;
use crate::node::{MachineStage, MachineStatus, Readiness, UnmetCondition};

/// Client for one node over an established channel.
#[derive(Debug, Clone)]
pub struct GrpcNode {
    machine: MachineServiceClient,
    state: StateClient,
}

impl GrpcNode {
    pub fn new(channel: Channel) -> Self {
        Self {
            machine: MachineServiceClient::new(channel.clone()),
            state: StateClient::new(channel),
        }
    }

    async fn get_resource(&self, r#type: &str, id: &str) -> Result<Resource, ApiError> {
        let response = self
            .state
            .clone()
            .get(GetRequest {
                namespace: RUNTIME_NAMESPACE.to_string(),
                r#type: r#type.to_string(),
                id: id.to_string(),
            })
            .await?;
        response
            .into_inner()
            .resource
            .ok_or_else(|| ApiError::decode("resource", format!("{} {id} missing from response", r#type)))
    }

    async fn list_resources(&self, r#type: &str) -> Result<Vec<Resource>, ApiError> {
        let stream = self
            .state
            .clone()
            .list(ListRequest {
                namespace: RUNTIME_NAMESPACE.to_string(),
                r#type: r#type.to_string(),
            })
            .await?
            .into_inner();

        let responses: Vec<resource::ListResponse> = stream.try_collect().await?;
        Ok(responses.into_iter().filter_map(|r| r.resource).collect())
    }
}

// =============================================================================
// Resource specs
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachineStatusSpec {
    #[serde(default)]
    stage: String,
    #[serde(default)]
    status: StatusSpec,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusSpec {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    unmet_conditions: Vec<ConditionSpec>,
}

#[derive(Deserialize)]
struct ConditionSpec {
    #[serde(default)]
    name: String,
    #[serde(default)]
    reason: String,
}

#[derive(Deserialize)]
struct ExtensionSpec {
    metadata: ExtensionMetadata,
}

#[derive(Deserialize)]
struct ExtensionMetadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
}

#[derive(Deserialize)]
struct VersionSpec {
    version: String,
}

fn decode_yaml<T: for<'de> Deserialize<'de>>(
    what: &'static str,
    resource: &Resource,
) -> Result<T, ApiError> {
    serde_yaml::from_str(resource.yaml()).map_err(|e| ApiError::decode(what, e))
}

fn machine_status_from_spec(spec: MachineStatusSpec) -> MachineStatus {
    let stage: MachineStage = spec.stage.parse().unwrap_or_default();
    let readiness = Readiness {
        ready: spec.status.ready,
        unmet_conditions: spec
            .status
            .unmet_conditions
            .into_iter()
            .map(|c| UnmetCondition::new(c.name, c.reason))
            .collect(),
    };
    MachineStatus::new(stage, readiness)
}

// =============================================================================
// Events
// =============================================================================

fn stage_from_proto(stage: machine_status_event::MachineStage) -> MachineStage {
    use machine_status_event::MachineStage as Proto;

    match stage {
        Proto::Unknown => MachineStage::Unknown,
        Proto::Booting => MachineStage::Booting,
        Proto::Installing => MachineStage::Installing,
        Proto::Maintenance => MachineStage::Maintenance,
        Proto::Running => MachineStage::Running,
        Proto::Rebooting => MachineStage::Rebooting,
        Proto::ShuttingDown => MachineStage::ShuttingDown,
        Proto::Resetting => MachineStage::Resetting,
        Proto::Upgrading => MachineStage::Upgrading,
    }
}

/// Decode one entry of the event stream.
pub fn decode_event(event: machine::Event) -> Result<NodeEvent, ApiError> {
    let Some(data) = event.data else {
        return Ok(NodeEvent::Other {
            type_url: String::new(),
        });
    };
    if !data.type_url.ends_with(MACHINE_STATUS_EVENT_TYPE) {
        return Ok(NodeEvent::Other {
            type_url: data.type_url,
        });
    }

    let payload = machine::MachineStatusEvent::decode(data.value.as_slice())
        .map_err(|e| ApiError::decode("machine status event", e))?;
    let stage = stage_from_proto(payload.stage());
    let status = payload.status.unwrap_or_default();

    Ok(NodeEvent::MachineStatus(MachineStatus::new(
        stage,
        Readiness {
            ready: status.ready,
            unmet_conditions: status
                .unmet_conditions
                .into_iter()
                .map(|c| UnmetCondition::new(c.name, c.reason))
                .collect(),
        },
    )))
}

#[async_trait]
impl NodeApi for GrpcNode {
    async fn machine_status(&self) -> Result<MachineStatus, ApiError> {
        let resource = self
            .get_resource(MACHINE_STATUS_TYPE, MACHINE_STATUS_ID)
            .await?;
        let spec: MachineStatusSpec = decode_yaml("machine status", &resource)?;
        Ok(machine_status_from_spec(spec))
    }

    async fn extensions(&self) -> Result<Vec<Extension>, ApiError> {
        self.list_resources(EXTENSION_STATUS_TYPE)
            .await?
            .into_iter()
            .map(|resource| {
                let spec: ExtensionSpec = decode_yaml("extension status", &resource)?;
                Ok(Extension {
                    name: spec.metadata.name,
                    version: spec.metadata.version,
                })
            })
            .collect()
    }

    async fn os_version(&self) -> Result<String, ApiError> {
        let resources = self.list_resources(VERSION_TYPE).await?;
        let resource = resources
            .first()
            .ok_or_else(|| ApiError::decode("version", "no version resource"))?;
        let spec: VersionSpec = decode_yaml("version", resource)?;
        Ok(spec.version.trim_start_matches('v').to_string())
    }

    async fn apply_configuration(&self, request: ApplyRequest) -> Result<ApplyResponse, ApiError> {
        let mut message = machine::ApplyConfigurationRequest {
            data: request.data,
            dry_run: request.dry_run,
            ..Default::default()
        };
        message.set_mode(apply_configuration_request::Mode::Auto);

        let response = self
            .machine
            .clone()
            .apply_configuration(message)
            .await?
            .into_inner();
        let reply = response
            .messages
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::decode("apply response", "empty response"))?;

        Ok(ApplyResponse {
            mode: mode_name(reply.mode()).to_string(),
            mode_details: reply.mode_details,
            warnings: reply.warnings,
        })
    }

    async fn bootstrap(&self) -> Result<(), ApiError> {
        self.machine
            .clone()
            .bootstrap(machine::BootstrapRequest::default())
            .await?;
        Ok(())
    }

    async fn reset(&self, request: ResetRequest) -> Result<(), ApiError> {
        let message = machine::ResetRequest {
            graceful: request.graceful,
            reboot: request.reboot,
            system_partitions_to_wipe: request
                .partitions
                .into_iter()
                .map(|p| machine::ResetPartitionSpec {
                    label: p.label,
                    wipe: p.wipe,
                })
                .collect(),
        };
        self.machine.clone().reset(message).await?;
        Ok(())
    }

    async fn upgrade(&self, request: UpgradeRequest) -> Result<(), ApiError> {
        let mut message = machine::UpgradeRequest {
            image: request.image,
            preserve: request.preserve,
            force: request.force,
            ..Default::default()
        };
        message.set_reboot_mode(match request.reboot_mode {
            RebootMode::Default => upgrade_request::RebootMode::Default,
            RebootMode::Powercycle => upgrade_request::RebootMode::Powercycle,
        });
        self.machine.clone().upgrade(message).await?;
        Ok(())
    }

    async fn etcd_member_count(&self) -> Result<usize, ApiError> {
        let response = self
            .machine
            .clone()
            .etcd_member_list(machine::EtcdMemberListRequest { query_local: false })
            .await?
            .into_inner();
        Ok(response.messages.iter().map(|m| m.members.len()).sum())
    }

    async fn service_state(&self, service: &str) -> Result<Option<String>, ApiError> {
        let response = self.machine.clone().service_list(()).await?.into_inner();
        Ok(response
            .messages
            .into_iter()
            .flat_map(|list| list.services)
            .find(|info| info.id == service)
            .map(|info| info.state))
    }

    async fn watch_events(&self) -> Result<EventStream, ApiError> {
        let stream = self
            .machine
            .clone()
            .events(machine::EventsRequest::default())
            .await?
            .into_inner();

        Ok(Box::pin(stream.map(|item| match item {
            Ok(event) => decode_event(event),
            Err(status) => Err(ApiError::from(status)),
        })))
    }
}

fn mode_name(mode: apply_configuration_request::Mode) -> &'static str {
    use apply_configuration_request::Mode;

    match mode {
        Mode::Reboot => "reboot",
        Mode::Auto => "auto",
        Mode::NoReboot => "no_reboot",
        Mode::Staged => "staged",
        Mode::Try => "try",
    }
}
