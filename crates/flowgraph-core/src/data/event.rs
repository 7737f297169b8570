use flowgraph_types::{Dict, Id, Pod};

use crate::data::ids::{EndpointId, EndpointLinkId, EndpointStreamId, GlobalId, LinkId, NodeId, ResourceId, SessionId};
use crate::data::permission::Permission;
use crate::error::ErrorCode;

/// Outbound notifications the core produces (spec §6.1's event vocabulary,
/// kept at a domain level). `flowgraph-proto` maps these onto the actual
/// wire event shapes for whichever resource is listening; this crate
/// doesn't know about message framing.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// A Global became visible to this client (registry `global`).
    RegistryGlobal {
        id: GlobalId,
        type_id: Id,
        version: u32,
        props: Dict,
        permission: Permission,
    },
    /// A Global stopped being visible to this client (registry `global_remove`).
    RegistryGlobalRemove { id: GlobalId },
    /// Echoes the sequence number driving a client's `sync` (Core `done`).
    Done { resource_id: ResourceId, seq: u32 },
    Ping { resource_id: ResourceId, seq: u32 },
    Error {
        resource_id: ResourceId,
        code: ErrorCode,
        message: String,
    },
    /// A Resource the client held was destroyed server-side.
    RemoveId { resource_id: ResourceId },
    /// A client-chosen new_id was bound to a server-assigned Global id.
    BoundId {
        resource_id: ResourceId,
        global_id: GlobalId,
    },
    NodeInfo { node_id: NodeId },
    NodeParam {
        resource_id: ResourceId,
        seq: u32,
        param_id: Id,
        index: u32,
        next: u32,
        pod: Pod,
    },
    LinkInfo { link_id: LinkId },
    /// Session-manager extension `info` events (spec §6.1). Like
    /// `NodeInfo`/`LinkInfo`, never constructed by `Core` itself — built in
    /// `flowgraph-serverd::dispatch` where the request context (which
    /// resource asked) already lives.
    SessionInfo { session_id: SessionId },
    EndpointInfo { endpoint_id: EndpointId },
    EndpointStreamInfo { stream_id: EndpointStreamId },
    EndpointLinkInfo { link_id: EndpointLinkId },
}
