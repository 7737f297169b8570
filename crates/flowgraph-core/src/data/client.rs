use flowgraph_types::{Dict, TypeMap};

use crate::data::ids::{ClientId, ResourceId};

/// Credentials captured at socket accept (spec §3.2). The transport that
/// captures these is out of scope; the core only ever reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
}

/// A connected peer (spec §3.2).
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub credentials: Credentials,
    pub props: Dict,
    pub core_resource: Option<ResourceId>,
    pub resources: Vec<ResourceId>,
    /// This client's local view of the type-id namespace, built up as it
    /// announces `update_types` (spec §3.1, §6.1).
    pub type_map: TypeMap,
}

impl Client {
    pub fn new(id: ClientId, credentials: Credentials) -> Self {
        Self {
            id,
            credentials,
            props: Dict::new(),
            core_resource: None,
            resources: Vec::new(),
            type_map: TypeMap::new(),
        }
    }

    pub fn add_resource(&mut self, id: ResourceId) {
        self.resources.push(id);
    }

    pub fn remove_resource(&mut self, id: ResourceId) {
        self.resources.retain(|r| *r != id);
    }
}
