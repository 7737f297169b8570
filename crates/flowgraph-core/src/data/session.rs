//! Session-manager extension objects (spec §6.1, §1's "policy is delegated
//! to an external session manager"): `Session`/`Endpoint`/`EndpointStream`/
//! `EndpointLink` exist purely so that external process has something to
//! publish and bind to through the same Global/Resource/registry machinery
//! every other object uses. The core stores them, fans out their create/
//! destroy through the registry, and proxies a plain property bag — it
//! never interprets what an Endpoint's props mean, picks a default device,
//! or routes anything (spec §1's Non-goals: "any policy decision ...
//! policy is delegated to an external session manager").

use flowgraph_types::{Dict, Pod};

use crate::data::ids::{ClientId, EndpointId, EndpointLinkId, EndpointStreamId, SessionId};

/// An `EndpointLink`'s progress, reported through `request_state` (spec
/// §6.1). Unlike a media [`crate::graph::link::Link`], the core never
/// drives this transition itself — the session manager requests a state
/// and the core just records it, leaving the actual work (asking the two
/// Endpoints' own streams to negotiate) to the policy process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointLinkState {
    Negotiating,
    Active,
    Paused,
    Error,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub owner: Option<ClientId>,
    pub props: Dict,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: EndpointId,
    pub session: SessionId,
    pub owner: Option<ClientId>,
    pub props: Dict,
}

#[derive(Debug, Clone)]
pub struct EndpointStream {
    pub id: EndpointStreamId,
    pub endpoint: EndpointId,
    pub owner: Option<ClientId>,
    pub props: Dict,
}

#[derive(Debug, Clone)]
pub struct EndpointLink {
    pub id: EndpointLinkId,
    pub session: SessionId,
    pub output_endpoint: EndpointId,
    pub input_endpoint: EndpointId,
    pub owner: Option<ClientId>,
    pub state: EndpointLinkState,
    pub props: Dict,
}

/// Encode a [`Dict`] as the `Props` param candidate `enum_params` returns
/// for a session-manager object: a flat array of `(key, value)` pairs, POD-
/// wrapped so property access rides the same `enum_params`/`set_param`
/// wire path Node/Port already use instead of a bespoke shape (spec §6.1's
/// "same events/methods pattern").
pub fn props_to_pod(props: &Dict) -> Pod {
    Pod::Array(props.iter().map(|(k, v)| Pod::Struct(vec![Pod::String(k.to_string()), Pod::String(v.to_string())])).collect())
}

/// Inverse of [`props_to_pod`]; malformed entries are skipped rather than
/// failing the whole `set_param` (a session manager updating one key
/// shouldn't be able to corrupt the rest by sending a partial shape).
pub fn pod_to_props(pod: &Pod) -> Dict {
    let mut dict = Dict::new();
    if let Pod::Array(items) = pod {
        for item in items {
            if let Pod::Struct(pair) = item {
                if let [Pod::String(k), Pod::String(v)] = pair.as_slice() {
                    dict.insert(k.clone(), v.clone());
                }
            }
        }
    }
    dict
}
