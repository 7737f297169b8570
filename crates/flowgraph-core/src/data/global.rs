use flowgraph_types::{Dict, Id};

use crate::data::ids::{ClientId, EndpointId, EndpointLinkId, EndpointStreamId, GlobalId, LinkId, NodeId, PortId, SessionId};

/// What a Global actually refers to. Spec §3.2 describes `bind` as "a
/// function-pointer ... that creates a Resource when a client requests
/// it"; since every object kind the core itself creates is known ahead of
/// time (Node/Port/Link/NodeFactory/Core/Registry), binding here is a pure
/// function of this tag rather than a per-global closure — the per-kind
/// method dispatch tables live in [`crate::core::Core`]'s resource
/// handling, not on the Global itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalTarget {
    Core,
    Registry,
    Node(NodeId),
    Port(NodeId, PortId),
    Link(LinkId),
    NodeFactory,
    /// Session-manager extension objects (spec §6.1): the core only
    /// proxies these — creates/destroys them and fans them out through the
    /// registry like any other Global — policy (what a Session groups,
    /// which Endpoint is a default, how an EndpointLink actually routes
    /// media) lives entirely in the external process that publishes them.
    Session(SessionId),
    Endpoint(EndpointId),
    EndpointStream(EndpointStreamId),
    EndpointLink(EndpointLinkId),
}

/// A publicly-advertised object (spec §3.2).
#[derive(Debug, Clone)]
pub struct Global {
    pub id: GlobalId,
    pub owner: Option<ClientId>,
    /// Denormalized from the owner's credentials at Global-creation time so
    /// the permission filter doesn't need a client lookup for every check;
    /// `None` for server-owned (ownerless) globals.
    pub owner_uid: Option<u32>,
    pub type_id: Id,
    pub version: u32,
    pub props: Dict,
    pub target: GlobalTarget,
}

impl Global {
    pub fn new(id: GlobalId, type_id: Id, version: u32, props: Dict, target: GlobalTarget) -> Self {
        Self {
            id,
            owner: None,
            owner_uid: None,
            type_id,
            version,
            props,
            target,
        }
    }

    pub fn with_owner(mut self, owner: ClientId, owner_uid: u32) -> Self {
        self.owner = Some(owner);
        self.owner_uid = Some(owner_uid);
        self
    }
}
