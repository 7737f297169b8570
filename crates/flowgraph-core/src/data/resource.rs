use crate::data::event::CoreEvent;
use crate::data::global::GlobalTarget;
use crate::data::ids::{ClientId, GlobalId, ResourceId};
use crate::data::permission::Permission;

/// A Client's view of a Global (spec §3.2). `target` mirrors the bound
/// Global's kind at bind time so method dispatch doesn't need a Global
/// lookup on every call.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: ResourceId,
    pub client: ClientId,
    pub global: GlobalId,
    pub permissions: Permission,
    pub version: u32,
    pub target: GlobalTarget,
}

impl Resource {
    pub fn new(id: ResourceId, client: ClientId, global: GlobalId, permissions: Permission, version: u32, target: GlobalTarget) -> Self {
        Self {
            id,
            client,
            global,
            permissions,
            version,
            target,
        }
    }
}

/// Where a client's outbound events go. The core emits [`CoreEvent`]s
/// against a `ResourceId`; whatever sits on the other end of this trait
/// (owned by `flowgraph-proto`/`flowgraph-serverd`) is responsible for
/// framing and delivery order — out of scope here beyond spec §6.1's
/// ordering invariants, which the core itself upholds by emitting in call
/// order.
pub trait ClientChannel: Send {
    fn send_event(&self, event: CoreEvent);
}

/// A channel that drops everything, useful for tests and for clients that
/// have already disconnected but whose teardown hasn't finished.
pub struct NullChannel;

impl ClientChannel for NullChannel {
    fn send_event(&self, _event: CoreEvent) {}
}
