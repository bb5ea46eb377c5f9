//! Shared message types.

/// Per-node response metadata attached to every proxied reply.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metadata {
    /// Hostname of the node that produced the reply.
    #[prost(string, tag = "1")]
    pub hostname: ::prost::alloc::string::String,

    /// Error reported by the node when proxying failed.
    #[prost(string, tag = "2")]
    pub error: ::prost::alloc::string::String,
}
