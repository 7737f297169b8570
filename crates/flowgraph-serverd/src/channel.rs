use std::sync::mpsc::Sender;

use flowgraph_core::core::type_names;
use flowgraph_core::data::event::CoreEvent;
use flowgraph_core::data::resource::ClientChannel;
use flowgraph_types::Id;
use flowgraph_proto::{ServerMessage, WirePermissions};

use crate::listener::{ConnId, WriterCommand};

/// The fixed, startup-interned order `Core::with_permission_fn` assigns type
/// ids in (core.rs's `type_names` module); every `Global` the core ever
/// publishes carries one of these, so a connection never needs its own copy
/// of the core's `TypeMap` just to resolve a wire `type_name`.
const WELL_KNOWN_TYPES: [&str; 11] = [
    type_names::CORE,
    type_names::REGISTRY,
    type_names::NODE,
    type_names::PORT,
    type_names::LINK,
    type_names::NODE_FACTORY,
    type_names::CLIENT,
    type_names::SESSION,
    type_names::ENDPOINT,
    type_names::ENDPOINT_STREAM,
    type_names::ENDPOINT_LINK,
];

fn type_name_for(id: Id) -> String {
    WELL_KNOWN_TYPES.get(id.0 as usize).copied().unwrap_or("flowgraph:unknown").to_string()
}

/// A `ClientChannel` that turns `CoreEvent`s into framed `ServerMessage`s and
/// hands them to the writer thread for `conn` (spec §6.1's server -> client
/// event path). `flowgraph-core` only ever calls `send_event` from within a
/// `&mut Core` method, so delivery here always happens in call order.
pub struct WireChannel {
    pub conn: ConnId,
    pub writer_tx: Sender<WriterCommand>,
}

impl WireChannel {
    fn send(&self, msg: ServerMessage) {
        if let Ok(frame) = flowgraph_proto::serialize_frame(&msg) {
            let _ = self.writer_tx.send(WriterCommand::SendTo { conn: self.conn, frame });
        }
    }
}

impl ClientChannel for WireChannel {
    fn send_event(&self, event: CoreEvent) {
        match event {
            CoreEvent::RegistryGlobal { id, type_id, version, props, permission } => {
                self.send(ServerMessage::Global {
                    id: id.0,
                    type_name: type_name_for(type_id),
                    version,
                    permissions: WirePermissions {
                        read: permission.read,
                        write: permission.write,
                        execute: permission.execute,
                        link: permission.link,
                    },
                    props,
                });
            }
            CoreEvent::RegistryGlobalRemove { id } => self.send(ServerMessage::GlobalRemove { id: id.0 }),
            CoreEvent::Done { resource_id, seq } => self.send(ServerMessage::Done { resource_id: resource_id.0, seq }),
            CoreEvent::Ping { resource_id, seq } => self.send(ServerMessage::Ping { resource_id: resource_id.0, seq }),
            CoreEvent::Error { resource_id, code, message } => {
                self.send(ServerMessage::Error { resource_id: resource_id.0, code: code.to_string(), message })
            }
            CoreEvent::RemoveId { resource_id } => self.send(ServerMessage::RemoveId { resource_id: resource_id.0 }),
            CoreEvent::BoundId { resource_id, global_id } => {
                self.send(ServerMessage::BoundId { resource_id: resource_id.0, global_id: global_id.0 })
            }
            // Never emitted by `Core` today (no resource-addressed caller
            // context to attach); the equivalent wire replies are built
            // directly in `dispatch` instead, which does have that context.
            CoreEvent::NodeInfo { .. }
            | CoreEvent::NodeParam { .. }
            | CoreEvent::LinkInfo { .. }
            | CoreEvent::SessionInfo { .. }
            | CoreEvent::EndpointInfo { .. }
            | CoreEvent::EndpointStreamInfo { .. }
            | CoreEvent::EndpointLinkInfo { .. } => {
                log::debug!("dropping {event:?}: no resource-addressed push path yet");
            }
        }
    }
}
