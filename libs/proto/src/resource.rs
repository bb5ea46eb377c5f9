//! `cosi.resource.State` messages and client.
//!
//! Resource specs are carried as YAML; callers deserialize [`Spec::yaml_spec`]
//! into whatever shape the resource type defines.

use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{IntoRequest, Response, Status};

/// Namespace holding the runtime resources we read.
pub const RUNTIME_NAMESPACE: &str = "runtime";

/// Resource type of the machine status singleton.
pub const MACHINE_STATUS_TYPE: &str = "MachineStatuses.runtime.talos.dev";

/// Id of the machine status singleton.
pub const MACHINE_STATUS_ID: &str = "machine";

/// Resource type listing installed system extensions.
pub const EXTENSION_STATUS_TYPE: &str = "ExtensionStatuses.runtime.talos.dev";

/// Resource type holding the running OS version.
pub const VERSION_TYPE: &str = "Versions.runtime.talos.dev";

/// Id of the version singleton.
pub const VERSION_ID: &str = "version";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metadata {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,

    #[prost(string, tag = "2")]
    pub r#type: ::prost::alloc::string::String,

    #[prost(string, tag = "3")]
    pub id: ::prost::alloc::string::String,

    #[prost(string, tag = "4")]
    pub version: ::prost::alloc::string::String,

    #[prost(string, tag = "5")]
    pub owner: ::prost::alloc::string::String,

    #[prost(string, tag = "6")]
    pub phase: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Spec {
    #[prost(bytes = "vec", tag = "1")]
    pub proto_spec: ::prost::alloc::vec::Vec<u8>,

    #[prost(string, tag = "2")]
    pub yaml_spec: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Resource {
    #[prost(message, optional, tag = "1")]
    pub metadata: ::core::option::Option<Metadata>,

    #[prost(message, optional, tag = "2")]
    pub spec: ::core::option::Option<Spec>,
}

impl Resource {
    /// YAML body of the resource spec, empty when absent.
    pub fn yaml(&self) -> &str {
        self.spec.as_ref().map(|s| s.yaml_spec.as_str()).unwrap_or_default()
    }

    /// Resource id, empty when metadata is missing.
    pub fn id(&self) -> &str {
        self.metadata.as_ref().map(|m| m.id.as_str()).unwrap_or_default()
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRequest {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,

    #[prost(string, tag = "2")]
    pub r#type: ::prost::alloc::string::String,

    #[prost(string, tag = "3")]
    pub id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResponse {
    #[prost(message, optional, tag = "1")]
    pub resource: ::core::option::Option<Resource>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListRequest {
    #[prost(string, tag = "1")]
    pub namespace: ::prost::alloc::string::String,

    #[prost(string, tag = "2")]
    pub r#type: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListResponse {
    #[prost(message, optional, tag = "1")]
    pub resource: ::core::option::Option<Resource>,
}

/// Client for `cosi.resource.State`.
#[derive(Debug, Clone)]
pub struct StateClient {
    inner: tonic::client::Grpc<Channel>,
}

impl StateClient {
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

    /// Fetch one resource by namespace, type and id.
    pub async fn get(
        &mut self,
        request: impl IntoRequest<GetRequest>,
    ) -> Result<Response<GetResponse>, Status> {
        self.ready().await?;
        self.inner
            .unary(
                request.into_request(),
                PathAndQuery::from_static("/cosi.resource.State/Get"),
                ProstCodec::default(),
            )
            .await
    }

    /// Stream every resource of a type.
    pub async fn list(
        &mut self,
        request: impl IntoRequest<ListRequest>,
    ) -> Result<Response<Streaming<ListResponse>>, Status> {
        self.ready().await?;
        self.inner
            .server_streaming(
                request.into_request(),
                PathAndQuery::from_static("/cosi.resource.State/List"),
                ProstCodec::default(),
            )
            .await
    }
}
