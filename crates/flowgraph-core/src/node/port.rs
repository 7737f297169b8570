use std::collections::HashMap;

use flowgraph_types::Pod;

use crate::data::ids::{LinkId, NodeId, PortId};
use crate::error::{CoreError, ErrorCode};
use crate::node::node_impl::Direction;

/// Port state machine (spec §4.4). `Error` is reachable from any state on
/// contract violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Init,
    Configure,
    Ready,
    Paused,
    Streaming,
    Error,
}

impl PortState {
    /// Applies the §4.4 transition table; returns `Err` (leaving state
    /// unchanged) for any transition not listed there.
    fn advance(self, to: PortState) -> Result<PortState, CoreError> {
        use PortState::*;
        let allowed = matches!(
            (self, to),
            (Init, Configure) | (Configure, Ready) | (Ready, Paused) | (Paused, Streaming) | (_, Error)
        );
        if allowed {
            Ok(to)
        } else {
            Err(CoreError::new(
                ErrorCode::Protocol,
                format!("invalid port transition {self:?} -> {to:?}"),
            ))
        }
    }
}

/// A typed connection point on a Node (spec §3.2).
#[derive(Debug, Clone)]
pub struct Port {
    pub node: NodeId,
    pub port_id: PortId,
    pub direction: Direction,
    pub state: PortState,
    pub links: Vec<LinkId>,
    pub format: Option<Pod>,
    pub buffer_count: Option<u32>,
    pub buffer_size: Option<u32>,
    /// Per-link mix-port sub-handles for a fan-in Input port (spec §4.4):
    /// link -> synthetic port id the NodeImpl was told about via `add_port`.
    pub mix_ports: HashMap<LinkId, u32>,
    next_mix_port_id: u32,
}

impl Port {
    pub fn new(node: NodeId, port_id: PortId, direction: Direction) -> Self {
        Self {
            node,
            port_id,
            direction,
            state: PortState::Init,
            links: Vec::new(),
            format: None,
            buffer_count: None,
            buffer_size: None,
            mix_ports: HashMap::new(),
            // Synthetic ids are derived from the primary port id but must
            // stay distinguishable from real port ids in the NodeImpl's own
            // numbering; offsetting into a high range is the simplest
            // collision-free scheme without needing NodeImpl cooperation.
            next_mix_port_id: 0x8000_0000 | port_id.0,
        }
    }

    pub fn set_state(&mut self, to: PortState) -> Result<(), CoreError> {
        self.state = self.state.advance(to)?;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> CoreError {
        self.state = PortState::Error;
        CoreError::new(ErrorCode::Protocol, reason)
    }

    /// Tear the port's buffer pool down and drop it back to `Ready` (spec
    /// §4.6.5's `Suspend`). Unlike [`Port::set_state`] this isn't a forward
    /// transition in the §4.4 state table — `Suspend` is the one command
    /// that explicitly walks a port backwards.
    pub fn suspend(&mut self) {
        self.state = PortState::Ready;
        self.buffer_count = None;
        self.buffer_size = None;
    }

    /// Allocate (or return the existing) mix-port sub-handle for `link`.
    pub fn mix_port_for(&mut self, link: LinkId) -> u32 {
        if let Some(id) = self.mix_ports.get(&link) {
            return *id;
        }
        let id = self.next_mix_port_id;
        self.next_mix_port_id += 1;
        self.mix_ports.insert(link, id);
        id
    }

    pub fn remove_mix_port(&mut self, link: LinkId) {
        self.mix_ports.remove(&link);
    }
}
