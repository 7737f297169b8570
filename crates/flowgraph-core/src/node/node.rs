use std::collections::HashMap;
use std::sync::Arc;

use crate::data::ids::{ClientId, NodeId, PortId};
use crate::error::{CoreError, ErrorCode};
use crate::graph::activation::{Activation, ClockRecord, PositionRecord};
use crate::node::node_impl::{AsyncStatus, Command, Direction, NodeImpl};
use crate::node::port::{Port, PortState};

/// A processing unit owned by a Client, or by the server for built-in
/// factories (spec §3.2).
pub struct Node {
    pub id: NodeId,
    pub owner: Option<ClientId>,
    pub impl_: Box<dyn NodeImpl>,
    pub ports: HashMap<PortId, Port>,
    pub driver: Option<NodeId>,
    pub active: bool,
    pub runnable: bool,
    pub added: bool,
    pub n_ready_input_ports: u32,
    pub n_ready_output_ports: u32,
    pub position: PositionRecord,
    pub clock: ClockRecord,
    pub activation: Arc<Activation>,
    pub target_list: Vec<NodeId>,
    pub realtime_priority: i32,
    pub priority_driver: i32,
}

impl Node {
    pub fn new(id: NodeId, owner: Option<ClientId>, impl_: Box<dyn NodeImpl>) -> std::io::Result<Self> {
        Ok(Self {
            id,
            owner,
            impl_,
            ports: HashMap::new(),
            driver: None,
            active: false,
            runnable: false,
            added: false,
            n_ready_input_ports: 0,
            n_ready_output_ports: 0,
            position: PositionRecord::default(),
            clock: ClockRecord::default(),
            activation: Activation::new()?,
            target_list: Vec::new(),
            realtime_priority: 0,
            priority_driver: 0,
        })
    }

    pub fn is_driver(&self) -> bool {
        self.driver == Some(self.id)
    }

    /// Whether this Node advertises the `Driver` capability at all (spec
    /// §4.6.1): a node with `priority_driver <= 0` never participates in
    /// the driver election.
    pub fn can_drive(&self) -> bool {
        self.priority_driver > 0
    }

    fn ports_in_direction(&self, direction: Direction) -> u32 {
        self.ports.values().filter(|p| p.direction == direction).count() as u32
    }

    /// Add a Port, enforcing the `NodeImpl`'s own advertised port ceiling
    /// (spec §8's boundary behavior: "a node with `max_input_ports = 0`
    /// rejects `add_port(Input)` with `NotSupported`") before ever asking
    /// the implementation to allocate one — the cap is a contract the core
    /// owns, not something every `NodeImpl` must re-check itself.
    pub fn add_port(&mut self, direction: Direction) -> Result<PortId, CoreError> {
        let info = self.impl_.get_info();
        let max = match direction {
            Direction::Input => info.max_input_ports,
            Direction::Output => info.max_output_ports,
        };
        if self.ports_in_direction(direction) >= max {
            return Err(CoreError::new(ErrorCode::NotSupported, format!("node has no spare {direction:?} ports (max {max})")));
        }
        let raw = self.impl_.add_port(direction)?;
        let port_id = PortId(raw);
        self.ports.insert(port_id, Port::new(self.id, port_id, direction));
        Ok(port_id)
    }

    pub fn remove_port(&mut self, port_id: PortId) -> Result<(), CoreError> {
        self.impl_.remove_port(port_id.0)?;
        self.ports.remove(&port_id);
        Ok(())
    }

    pub fn port(&self, port_id: PortId) -> Option<&Port> {
        self.ports.get(&port_id)
    }

    pub fn port_mut(&mut self, port_id: PortId) -> Option<&mut Port> {
        self.ports.get_mut(&port_id)
    }

    /// Forward a command to the `NodeImpl` and apply its Node/Port-level
    /// side effects (spec §4.6.5): `Start` flips `active` and advances any
    /// already-`Paused` port to `Streaming`; `Pause` drops `active` without
    /// touching port state (format/buffers survive a pause); `Suspend`
    /// additionally tears every port back down to `Ready`.
    pub fn send_command(&mut self, cmd: Command) -> Result<AsyncStatus, CoreError> {
        let status = self.impl_.send_command(cmd)?;
        match cmd {
            Command::Start => {
                self.active = true;
                for port in self.ports.values_mut() {
                    if port.state == PortState::Paused {
                        let _ = port.set_state(PortState::Streaming);
                    }
                }
            }
            Command::Pause => {
                self.active = false;
            }
            Command::Suspend => {
                self.active = false;
                for port in self.ports.values_mut() {
                    port.suspend();
                }
            }
            Command::Flush => {}
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::node_impl::{AsyncStatus as AS, NodeInfo, ParamId};
    use flowgraph_types::{Dict, Pod};

    struct NoInputs;
    impl NodeImpl for NoInputs {
        fn get_info(&self) -> NodeInfo {
            NodeInfo {
                max_input_ports: 0,
                max_output_ports: 1,
                props: Dict::new(),
            }
        }
        fn enum_params(&self, _id: ParamId, _start: u32, _filter: Option<&Pod>) -> Vec<Pod> {
            vec![]
        }
        fn set_param(&mut self, _id: ParamId, _pod: Pod) -> Result<AS, CoreError> {
            Ok(AS::Sync)
        }
        fn set_io(&mut self, _id: crate::node::node_impl::IoType, _ptr: *mut u8, _size: usize) -> Result<(), CoreError> {
            Ok(())
        }
        fn send_command(&mut self, _cmd: Command) -> Result<AS, CoreError> {
            Ok(AS::Sync)
        }
        fn add_port(&mut self, _direction: Direction) -> Result<u32, CoreError> {
            Ok(0)
        }
        fn remove_port(&mut self, _port_id: u32) -> Result<(), CoreError> {
            Ok(())
        }
        fn port_enum_params(&self, _port_id: u32, _id: ParamId, _start: u32, _filter: Option<&Pod>) -> Vec<Pod> {
            vec![]
        }
        fn port_set_param(&mut self, _port_id: u32, _id: ParamId, _pod: Pod) -> Result<AS, CoreError> {
            Ok(AS::Sync)
        }
        fn port_set_io(&mut self, _port_id: u32, _id: crate::node::node_impl::IoType, _ptr: *mut u8, _size: usize) -> Result<(), CoreError> {
            Ok(())
        }
        fn port_use_buffers(&mut self, _port_id: u32, _buffer_count: u32, _buffer_size: u32) -> Result<AS, CoreError> {
            Ok(AS::Sync)
        }
        fn port_alloc_buffers(&mut self, _port_id: u32, _buffer_count: u32, _buffer_size: u32) -> Result<AS, CoreError> {
            Ok(AS::Sync)
        }
        fn port_reuse_buffer(&mut self, _port_id: u32, _buffer_id: u32) {}
        fn process(&mut self) -> crate::node::node_impl::ProcessStatus {
            Default::default()
        }
    }

    #[test]
    fn add_port_rejects_a_direction_the_node_impl_has_no_room_for() {
        let mut node = Node::new(NodeId(1), None, Box::new(NoInputs)).unwrap();
        let err = node.add_port(Direction::Input).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotSupported);
        assert!(node.add_port(Direction::Output).is_ok());
        // A second Output port exceeds max_output_ports=1.
        assert!(node.add_port(Direction::Output).is_err());
    }

    #[test]
    fn start_then_pause_flip_active_without_resetting_port_state() {
        let mut node = Node::new(NodeId(1), None, Box::new(NoInputs)).unwrap();
        let port_id = node.add_port(Direction::Output).unwrap();
        {
            let port = node.port_mut(port_id).unwrap();
            port.set_state(PortState::Configure).unwrap();
            port.set_state(PortState::Ready).unwrap();
            port.set_state(PortState::Paused).unwrap();
        }
        node.send_command(Command::Start).unwrap();
        assert!(node.active);
        assert_eq!(node.port(port_id).unwrap().state, PortState::Streaming);

        node.send_command(Command::Pause).unwrap();
        assert!(!node.active);
        // Pause doesn't touch port state, only Suspend does.
        assert_eq!(node.port(port_id).unwrap().state, PortState::Streaming);

        node.send_command(Command::Suspend).unwrap();
        assert_eq!(node.port(port_id).unwrap().state, PortState::Ready);
    }
}
