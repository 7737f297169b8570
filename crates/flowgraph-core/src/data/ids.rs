use std::fmt;

macro_rules! object_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl From<u32> for $name {
            fn from(v: u32) -> Self {
                $name(v)
            }
        }

        impl From<$name> for u32 {
            fn from(v: $name) -> Self {
                v.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// Ids allocated from the Core's shared small-int allocator (spec §3.2,
// §4.3): "the Core holds a shared id-map (small-int allocator with
// free-list)". Exactly one Global has id 0 — the Core singleton itself.
object_id!(GlobalId);

// Client-chosen: a Resource's id lives in the owning Client's id-space, not
// the Core's (spec §3.2: "id (unique within the Client's id-space; the
// Client chose it)").
object_id!(ResourceId);

object_id!(ClientId);
object_id!(NodeId);
object_id!(PortId);
object_id!(LinkId);

// Session-manager extension objects (spec §6.1): same allocator pattern as
// Node/Link, just owned by whichever client hosts the policy process
// instead of a media client.
object_id!(SessionId);
object_id!(EndpointId);
object_id!(EndpointStreamId);
object_id!(EndpointLinkId);

pub const CORE_GLOBAL_ID: GlobalId = GlobalId(0);
