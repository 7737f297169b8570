use crate::data::client::Client;
use crate::data::global::Global;

/// A Resource's permission bitmask (spec §4.3): `{R, W, X, L}` — see,
/// modify, execute methods, create links involving this object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permission {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub link: bool,
}

impl Permission {
    pub const NONE: Permission = Permission {
        read: false,
        write: false,
        execute: false,
        link: false,
    };

    pub const ALL: Permission = Permission {
        read: true,
        write: true,
        execute: true,
        link: true,
    };

    pub fn read_only() -> Self {
        Permission {
            read: true,
            ..Permission::NONE
        }
    }

    pub fn allows(&self, required: Permission) -> bool {
        (!required.read || self.read)
            && (!required.write || self.write)
            && (!required.execute || self.execute)
            && (!required.link || self.link)
    }
}

/// The Core's pluggable global permission function (spec §4.3): invoked
/// whenever a Global is first exposed to a Client or the client's
/// properties change.
pub type PermissionFn = Box<dyn Fn(&Global, &Client) -> Permission + Send>;

/// Grants every permission to every client. The Core's default policy.
pub fn default_allow(_global: &Global, _client: &Client) -> Permission {
    Permission::ALL
}

/// Restricts clients to Globals owned by the same uid, matching spec
/// §4.3's "sandboxing policy restricts clients to seeing Globals whose
/// owner belongs to the same uid". Globals with no owner (server-internal)
/// are always visible.
pub fn same_uid_sandbox(global: &Global, client: &Client) -> Permission {
    match global.owner_uid {
        Some(owner_uid) if owner_uid != client.credentials.uid => Permission::NONE,
        _ => Permission::ALL,
    }
}

/// Grants read-only access regardless of ownership, letting an external
/// session manager elevate specific clients (spec §4.3's "network-origin
/// policy").
pub fn read_only_policy(_global: &Global, _client: &Client) -> Permission {
    Permission::read_only()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_checks_each_required_bit() {
        let p = Permission {
            read: true,
            write: false,
            execute: true,
            link: false,
        };
        assert!(p.allows(Permission::read_only()));
        assert!(!p.allows(Permission {
            write: true,
            ..Permission::NONE
        }));
    }
}
