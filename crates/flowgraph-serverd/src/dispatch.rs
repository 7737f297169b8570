//! Translates wire `ClientMessage`s into `flowgraph-core` mutations and
//! back into the direct-reply half of the wire vocabulary (spec §6.1).
//! Everything `Core` already pushes through a client's `ClientChannel`
//! (registry fan-out, `bound_id`, `remove_id`) arrives independently of this
//! module, via `channel::WireChannel`; `handle` only returns the replies
//! that have no other path to the caller (`done`, `param`, `error`, ...).

use flowgraph_core::core::Core;
use flowgraph_core::data::global::GlobalTarget;
use flowgraph_core::data::ids::{ClientId, GlobalId, NodeId, PortId, ResourceId};
use flowgraph_core::data::session::{self, EndpointLinkState};
use flowgraph_core::error::{CoreError, ErrorCode};
use flowgraph_core::node::node_impl::{AsyncStatus, Command, ParamId};
use flowgraph_proto::{ClientMessage, ServerMessage};
use flowgraph_types::dict::keys;
use flowgraph_types::{Dict, Id, Pod};

/// A `CreateObject` request naming this factory is synthesized into
/// `Core::create_link`/`negotiate_link` instead of `create_node`: the wire
/// vocabulary has no dedicated link-creation method, so link creation rides
/// the generic "create an object from a named factory" method the same way
/// `pw_core.create_object(type=Link, factory="link-factory")` does.
const LINK_FACTORY: &str = "link-factory";

/// Session-manager extension factories (spec §6.1): `Session`/`Endpoint`/
/// `EndpointStream` creation also rides the generic `create_object`, since
/// the only thing each needs beyond a type name is a parent id carried in
/// props (`ENDPOINT_SESSION`, `ENDPOINT_STREAM_ENDPOINT`) — the same
/// "parent id lives in props" pattern `LINK_FACTORY` uses. `EndpointLink`
/// is the one exception: the original gives it its own `create_link` method
/// on `Endpoint` (two parents, not one), so it has a dedicated
/// `ClientMessage::EndpointCreateLink` instead of a factory name.
const SESSION_FACTORY: &str = "session-factory";
const ENDPOINT_FACTORY: &str = "endpoint-factory";
const ENDPOINT_STREAM_FACTORY: &str = "endpoint-stream-factory";

fn endpoint_link_state_from_wire(state: &str) -> Option<EndpointLinkState> {
    match state {
        "negotiating" => Some(EndpointLinkState::Negotiating),
        "active" => Some(EndpointLinkState::Active),
        "paused" => Some(EndpointLinkState::Paused),
        "error" => Some(EndpointLinkState::Error),
        _ => None,
    }
}

/// The well-known, fixed set of parameter kinds a resource's params are
/// addressed by over the wire (spec §4.4). Unlike type ids, which resolve
/// against the core's `TypeMap`, these never need runtime registration —
/// this is the complete list `ParamId` defines.
fn param_id_from_wire(id: Id) -> Option<ParamId> {
    match id.0 {
        0 => Some(ParamId::EnumFormat),
        1 => Some(ParamId::Format),
        2 => Some(ParamId::Buffers),
        3 => Some(ParamId::Meta),
        4 => Some(ParamId::IoSlots),
        5 => Some(ParamId::Props),
        _ => None,
    }
}

fn command_from_pod(pod: &Pod) -> Option<Command> {
    match pod {
        Pod::String(s) => match s.as_str() {
            "start" => Some(Command::Start),
            "pause" => Some(Command::Pause),
            "flush" => Some(Command::Flush),
            "suspend" => Some(Command::Suspend),
            _ => None,
        },
        _ => None,
    }
}

fn error_reply(resource_id: u32, err: CoreError) -> ServerMessage {
    ServerMessage::Error {
        resource_id,
        code: err.code.to_string(),
        message: err.message,
    }
}

fn resource_target(core: &Core, client_id: ClientId, resource_id: u32) -> Result<GlobalTarget, CoreError> {
    core.resource(client_id, ResourceId::from(resource_id))
        .map(|r| r.target.clone())
        .ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such resource"))
}

pub fn handle(core: &mut Core, client_id: ClientId, msg: ClientMessage) -> Vec<ServerMessage> {
    match msg {
        ClientMessage::Hello { version } => vec![ServerMessage::Info { resource_id: 0, cookie: version }],
        ClientMessage::Sync { seq } => vec![ServerMessage::Done { resource_id: 0, seq }],
        ClientMessage::UpdateTypes { first_id: _, names } => {
            core.update_client_types(client_id, &names);
            vec![]
        }
        ClientMessage::GetRegistry { new_id } => match core.get_registry(client_id, ResourceId::from(new_id)) {
            Ok(()) => vec![],
            Err(e) => vec![error_reply(new_id, e)],
        },
        ClientMessage::CreateObject { factory, type_name: _, version, props, new_id } => {
            create_object(core, client_id, &factory, version, props, new_id)
        }
        ClientMessage::Destroy { id } => destroy(core, client_id, id),
        ClientMessage::ClientUpdate { props } => {
            core.update_client_props(client_id, &props);
            vec![]
        }
        ClientMessage::Pong { seq } => {
            log::debug!("client {client_id} pong seq={seq}");
            vec![]
        }
        ClientMessage::ErrorReport { target, code, message } => {
            log::warn!("client {client_id} reported error on resource {target}: {code}: {message}");
            vec![]
        }
        ClientMessage::Bind { id, type_name: _, version, new_id } => {
            match core.bind(client_id, GlobalId::from(id), ResourceId::from(new_id), version) {
                Ok(()) => vec![],
                Err(e) => vec![error_reply(new_id, e)],
            }
        }
        ClientMessage::RegistryDestroy { id } => registry_destroy(core, client_id, id),
        // No per-client subscription table exists yet: a subscribed client
        // must re-poll via `enum_params` after a `set_param` rather than
        // being pushed an unsolicited `param` event.
        ClientMessage::SubscribeParams { .. } => vec![],
        ClientMessage::EnumParams { resource_id, seq, id, start, num, filter } => {
            enum_params(core, client_id, resource_id, seq, id, start, num, filter)
        }
        ClientMessage::SetParam { resource_id, id, flags: _, pod } => set_param(core, client_id, resource_id, id, pod),
        ClientMessage::SendCommand { resource_id, pod } => send_command(core, client_id, resource_id, pod),
        ClientMessage::EndpointCreateLink { resource_id, session, other_endpoint, props, new_id, version } => {
            endpoint_create_link(core, client_id, resource_id, session, other_endpoint, props, new_id, version)
        }
        ClientMessage::EndpointLinkRequestState { resource_id, state } => endpoint_link_request_state(core, client_id, resource_id, state),
    }
}

fn create_object(core: &mut Core, client_id: ClientId, factory: &str, version: u32, props: Dict, new_id: u32) -> Vec<ServerMessage> {
    if factory == LINK_FACTORY {
        return create_link_object(core, client_id, props, version, new_id);
    }
    if factory == SESSION_FACTORY {
        let session_id = core.create_session(Some(client_id), props);
        return bind_new_global(core, client_id, core.global_id_for_session(session_id), version, new_id);
    }
    if factory == ENDPOINT_FACTORY {
        let Some(session) = props.get(keys::ENDPOINT_SESSION).and_then(|v| v.parse::<u32>().ok()) else {
            return vec![error_reply(new_id, CoreError::new(ErrorCode::BadArgument, "endpoint-factory requires an endpoint.session prop"))];
        };
        let session_id = match core.global(GlobalId::from(session)).map(|g| g.target.clone()) {
            Some(GlobalTarget::Session(id)) => id,
            _ => return vec![error_reply(new_id, CoreError::new(ErrorCode::BadArgument, "no such session"))],
        };
        let endpoint_id = match core.create_endpoint(Some(client_id), session_id, props) {
            Ok(id) => id,
            Err(e) => return vec![error_reply(new_id, e)],
        };
        return bind_new_global(core, client_id, core.global_id_for_endpoint(endpoint_id), version, new_id);
    }
    if factory == ENDPOINT_STREAM_FACTORY {
        let Some(endpoint) = props.get(keys::ENDPOINT_STREAM_ENDPOINT).and_then(|v| v.parse::<u32>().ok()) else {
            return vec![error_reply(new_id, CoreError::new(ErrorCode::BadArgument, "endpoint-stream-factory requires an endpoint-stream.endpoint prop"))];
        };
        let endpoint_id = match core.global(GlobalId::from(endpoint)).map(|g| g.target.clone()) {
            Some(GlobalTarget::Endpoint(id)) => id,
            _ => return vec![error_reply(new_id, CoreError::new(ErrorCode::BadArgument, "no such endpoint"))],
        };
        let stream_id = match core.create_endpoint_stream(Some(client_id), endpoint_id, props) {
            Ok(id) => id,
            Err(e) => return vec![error_reply(new_id, e)],
        };
        return bind_new_global(core, client_id, core.global_id_for_endpoint_stream(stream_id), version, new_id);
    }
    match core.create_node(client_id, factory, props) {
        Ok(node_id) => {
            if let Some(global_id) = core.global_id_for_node(node_id) {
                if let Err(e) = core.bind(client_id, global_id, ResourceId::from(new_id), version) {
                    return vec![error_reply(new_id, e)];
                }
            }
            vec![]
        }
        Err(e) => vec![error_reply(new_id, e)],
    }
}

/// Bind a freshly-created Global to the caller's requested `new_id`, the
/// shared tail end of every `create_object` branch.
fn bind_new_global(core: &mut Core, client_id: ClientId, global_id: Option<GlobalId>, version: u32, new_id: u32) -> Vec<ServerMessage> {
    if let Some(global_id) = global_id {
        if let Err(e) = core.bind(client_id, global_id, ResourceId::from(new_id), version) {
            return vec![error_reply(new_id, e)];
        }
    }
    vec![]
}

fn create_link_object(core: &mut Core, client_id: ClientId, props: Dict, version: u32, new_id: u32) -> Vec<ServerMessage> {
    let parse = |k: &str| props.get(k).and_then(|v| v.parse::<u32>().ok());
    let (Some(out_node), Some(out_port), Some(in_node), Some(in_port)) = (
        parse(keys::LINK_OUTPUT_NODE),
        parse(keys::LINK_OUTPUT_PORT),
        parse(keys::LINK_INPUT_NODE),
        parse(keys::LINK_INPUT_PORT),
    ) else {
        return vec![error_reply(
            new_id,
            CoreError::new(ErrorCode::BadArgument, "link-factory requires output/input node and port props"),
        )];
    };
    let passive = props.get_bool(keys::LINK_PASSIVE).unwrap_or(false);

    let link_id = match core.create_link(NodeId(out_node), PortId(out_port), NodeId(in_node), PortId(in_port), passive) {
        Ok(id) => id,
        Err(e) => return vec![error_reply(new_id, e)],
    };
    if let Err(e) = core.negotiate_link(link_id) {
        core.destroy_link(link_id);
        return vec![error_reply(new_id, e)];
    }
    if let Some(global_id) = core.global_id_for_link(link_id) {
        if let Err(e) = core.bind(client_id, global_id, ResourceId::from(new_id), version) {
            return vec![error_reply(new_id, e)];
        }
    }
    vec![]
}

/// `pw_endpoint_proxy_methods.create_link` (spec §6.1): `resource_id`
/// addresses the output-side Endpoint resource; `session`/`other_endpoint`
/// are wire `GlobalId`s the caller already holds from the registry.
#[allow(clippy::too_many_arguments)]
fn endpoint_create_link(
    core: &mut Core,
    client_id: ClientId,
    resource_id: u32,
    session: u32,
    other_endpoint: u32,
    props: Dict,
    new_id: u32,
    version: u32,
) -> Vec<ServerMessage> {
    let target = match resource_target(core, client_id, resource_id) {
        Ok(t) => t,
        Err(e) => return vec![error_reply(new_id, e)],
    };
    let GlobalTarget::Endpoint(output_endpoint) = target else {
        return vec![error_reply(new_id, CoreError::new(ErrorCode::NotSupported, "create_link only targets an endpoint"))];
    };
    let session_id = match core.global(GlobalId::from(session)).map(|g| g.target.clone()) {
        Some(GlobalTarget::Session(id)) => id,
        _ => return vec![error_reply(new_id, CoreError::new(ErrorCode::BadArgument, "no such session"))],
    };
    let input_endpoint = match core.global(GlobalId::from(other_endpoint)).map(|g| g.target.clone()) {
        Some(GlobalTarget::Endpoint(id)) => id,
        _ => return vec![error_reply(new_id, CoreError::new(ErrorCode::BadArgument, "no such endpoint"))],
    };
    let link_id = match core.create_endpoint_link(Some(client_id), session_id, output_endpoint, input_endpoint, props) {
        Ok(id) => id,
        Err(e) => return vec![error_reply(new_id, e)],
    };
    bind_new_global(core, client_id, core.global_id_for_endpoint_link(link_id), version, new_id)
}

/// `pw_endpoint_link_proxy_methods.request_state` (spec §6.1): a plain state
/// record, never validated or driven by the core itself.
fn endpoint_link_request_state(core: &mut Core, client_id: ClientId, resource_id: u32, state: String) -> Vec<ServerMessage> {
    let target = match resource_target(core, client_id, resource_id) {
        Ok(t) => t,
        Err(e) => return vec![error_reply(resource_id, e)],
    };
    let GlobalTarget::EndpointLink(link_id) = target else {
        return vec![error_reply(resource_id, CoreError::new(ErrorCode::NotSupported, "request_state only targets an endpoint link"))];
    };
    let Some(state) = endpoint_link_state_from_wire(&state) else {
        return vec![error_reply(resource_id, CoreError::new(ErrorCode::BadArgument, "unrecognized endpoint link state"))];
    };
    match core.endpoint_link_request_state(link_id, state) {
        Ok(()) => vec![],
        Err(e) => vec![error_reply(resource_id, e)],
    }
}

fn destroy(core: &mut Core, client_id: ClientId, id: u32) -> Vec<ServerMessage> {
    match resource_target(core, client_id, id) {
        Ok(GlobalTarget::Node(node_id)) => {
            core.destroy_node(node_id);
            vec![]
        }
        Ok(GlobalTarget::Link(link_id)) => {
            core.destroy_link(link_id);
            vec![]
        }
        Ok(GlobalTarget::Session(session_id)) => {
            core.destroy_session(session_id);
            vec![]
        }
        Ok(GlobalTarget::Endpoint(endpoint_id)) => {
            core.destroy_endpoint(endpoint_id);
            vec![]
        }
        Ok(GlobalTarget::EndpointStream(stream_id)) => {
            core.destroy_endpoint_stream(stream_id);
            vec![]
        }
        Ok(GlobalTarget::EndpointLink(link_id)) => {
            core.destroy_endpoint_link(link_id);
            vec![]
        }
        Ok(_) => vec![error_reply(id, CoreError::new(ErrorCode::NotSupported, "resource kind cannot be destroyed directly"))],
        Err(e) => vec![error_reply(id, e)],
    }
}

fn registry_destroy(core: &mut Core, client_id: ClientId, id: u32) -> Vec<ServerMessage> {
    let global_id = GlobalId::from(id);
    let Some(global) = core.global(global_id) else {
        return vec![error_reply(0, CoreError::new(ErrorCode::BadArgument, "no such global"))];
    };
    if global.owner != Some(client_id) {
        return vec![error_reply(0, CoreError::new(ErrorCode::Permission, "only a global's owner may destroy it"))];
    }
    match global.target.clone() {
        GlobalTarget::Node(node_id) => {
            core.destroy_node(node_id);
        }
        GlobalTarget::Link(link_id) => {
            core.destroy_link(link_id);
        }
        GlobalTarget::Session(session_id) => {
            core.destroy_session(session_id);
        }
        GlobalTarget::Endpoint(endpoint_id) => {
            core.destroy_endpoint(endpoint_id);
        }
        GlobalTarget::EndpointStream(stream_id) => {
            core.destroy_endpoint_stream(stream_id);
        }
        GlobalTarget::EndpointLink(link_id) => {
            core.destroy_endpoint_link(link_id);
        }
        _ => {
            core.remove_global(global_id);
        }
    }
    vec![]
}

#[allow(clippy::too_many_arguments)]
fn enum_params(core: &mut Core, client_id: ClientId, resource_id: u32, seq: u32, id: Id, start: u32, num: u32, filter: Option<Pod>) -> Vec<ServerMessage> {
    let target = match resource_target(core, client_id, resource_id) {
        Ok(t) => t,
        Err(e) => return vec![error_reply(resource_id, e)],
    };
    let Some(param_id) = param_id_from_wire(id) else {
        return vec![error_reply(resource_id, CoreError::new(ErrorCode::BadArgument, "unknown param id"))];
    };
    let results = match target {
        GlobalTarget::Node(node_id) => match core.nodes.get(&node_id) {
            Some(node) => node.impl_.enum_params(param_id, start, filter.as_ref()),
            None => return vec![error_reply(resource_id, CoreError::new(ErrorCode::BadArgument, "no such node"))],
        },
        GlobalTarget::Port(node_id, port_id) => match core.nodes.get(&node_id) {
            Some(node) => node.impl_.port_enum_params(port_id.0, param_id, start, filter.as_ref()),
            None => return vec![error_reply(resource_id, CoreError::new(ErrorCode::BadArgument, "no such node"))],
        },
        // Session-manager extension objects only ever carry one param kind:
        // their whole props bag, enumerated as a single `Props` candidate
        // (spec §6.1 reuses the shared param protocol rather than defining a
        // bespoke "get props" method).
        GlobalTarget::Session(id) if param_id == ParamId::Props => match core.sessions.get(&id) {
            Some(s) => vec![session::props_to_pod(&s.props)],
            None => return vec![error_reply(resource_id, CoreError::new(ErrorCode::BadArgument, "no such session"))],
        },
        GlobalTarget::Endpoint(id) if param_id == ParamId::Props => match core.endpoints.get(&id) {
            Some(e) => vec![session::props_to_pod(&e.props)],
            None => return vec![error_reply(resource_id, CoreError::new(ErrorCode::BadArgument, "no such endpoint"))],
        },
        GlobalTarget::EndpointStream(id) if param_id == ParamId::Props => match core.endpoint_streams.get(&id) {
            Some(s) => vec![session::props_to_pod(&s.props)],
            None => return vec![error_reply(resource_id, CoreError::new(ErrorCode::BadArgument, "no such endpoint stream"))],
        },
        GlobalTarget::EndpointLink(id) if param_id == ParamId::Props => match core.endpoint_links.get(&id) {
            Some(l) => vec![session::props_to_pod(&l.props)],
            None => return vec![error_reply(resource_id, CoreError::new(ErrorCode::BadArgument, "no such endpoint link"))],
        },
        _ => return vec![error_reply(resource_id, CoreError::new(ErrorCode::NotSupported, "resource kind has no params"))],
    };
    results
        .into_iter()
        .take(num.max(1) as usize)
        .enumerate()
        .map(|(i, pod)| {
            let index = start + i as u32;
            ServerMessage::Param { resource_id, seq, id, index, next: index + 1, pod }
        })
        .collect()
}

fn set_param(core: &mut Core, client_id: ClientId, resource_id: u32, id: Id, pod: Pod) -> Vec<ServerMessage> {
    let target = match resource_target(core, client_id, resource_id) {
        Ok(t) => t,
        Err(e) => return vec![error_reply(resource_id, e)],
    };
    let Some(param_id) = param_id_from_wire(id) else {
        return vec![error_reply(resource_id, CoreError::new(ErrorCode::BadArgument, "unknown param id"))];
    };
    let result = match target {
        GlobalTarget::Node(node_id) => core
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such node"))
            .and_then(|n| n.impl_.set_param(param_id, pod)),
        GlobalTarget::Port(node_id, port_id) => core
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such node"))
            .and_then(|n| n.impl_.port_set_param(port_id.0, param_id, pod)),
        GlobalTarget::Session(id) if param_id == ParamId::Props => match core.sessions.get_mut(&id) {
            Some(s) => {
                s.props = session::pod_to_props(&pod);
                Ok(AsyncStatus::Sync)
            }
            None => Err(CoreError::new(ErrorCode::BadArgument, "no such session")),
        },
        GlobalTarget::Endpoint(id) if param_id == ParamId::Props => match core.endpoints.get_mut(&id) {
            Some(e) => {
                e.props = session::pod_to_props(&pod);
                Ok(AsyncStatus::Sync)
            }
            None => Err(CoreError::new(ErrorCode::BadArgument, "no such endpoint")),
        },
        GlobalTarget::EndpointStream(id) if param_id == ParamId::Props => match core.endpoint_streams.get_mut(&id) {
            Some(s) => {
                s.props = session::pod_to_props(&pod);
                Ok(AsyncStatus::Sync)
            }
            None => Err(CoreError::new(ErrorCode::BadArgument, "no such endpoint stream")),
        },
        GlobalTarget::EndpointLink(id) if param_id == ParamId::Props => match core.endpoint_links.get_mut(&id) {
            Some(l) => {
                l.props = session::pod_to_props(&pod);
                Ok(AsyncStatus::Sync)
            }
            None => Err(CoreError::new(ErrorCode::BadArgument, "no such endpoint link")),
        },
        _ => Err(CoreError::new(ErrorCode::NotSupported, "resource kind has no params")),
    };
    match result {
        Ok(AsyncStatus::Sync | AsyncStatus::Async(_)) => vec![],
        Err(e) => vec![error_reply(resource_id, e)],
    }
}

fn send_command(core: &mut Core, client_id: ClientId, resource_id: u32, pod: Pod) -> Vec<ServerMessage> {
    let target = match resource_target(core, client_id, resource_id) {
        Ok(t) => t,
        Err(e) => return vec![error_reply(resource_id, e)],
    };
    let GlobalTarget::Node(node_id) = target else {
        return vec![error_reply(resource_id, CoreError::new(ErrorCode::NotSupported, "commands only target nodes"))];
    };
    let Some(command) = command_from_pod(&pod) else {
        return vec![error_reply(resource_id, CoreError::new(ErrorCode::BadArgument, "unrecognized command"))];
    };
    // `Core::send_command` also flips `active` and tries to bring any
    // `Paused` Link touching this Node to `Active` (spec §4.6.5, §4.5.6).
    match core.send_command(node_id, command) {
        Ok(_) => vec![],
        Err(e) => vec![error_reply(resource_id, e)],
    }
}
