//! End-to-end coverage for the parts that only show up once negotiation and
//! scheduling run together: a real two-node link through every negotiation
//! phase, and a driver that goes idle once its only remaining link is
//! passive.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, Ordering};

use flowgraph_core::data::client::Credentials;
use flowgraph_core::data::resource::NullChannel;
use flowgraph_core::error::CoreError;
use flowgraph_core::factories::NodeFactory;
use flowgraph_core::graph::link::LinkState;
use flowgraph_core::node::node_impl::{AsyncStatus, Command, Direction, IoType, NodeImpl, NodeInfo, ParamId, ProcessStatus};
use flowgraph_core::Core;
use flowgraph_types::{Choice, Dict, Id, Pod};

static PROCESS_COUNT: AtomicU32 = AtomicU32::new(0);

fn rate_format(rate_choice: Pod) -> Pod {
    Pod::Object {
        type_id: Id(100),
        properties: vec![(Id(1), rate_choice)],
    }
}

fn buffers_param() -> Pod {
    use flowgraph_core::negotiate::buffers::prop;
    Pod::Object {
        type_id: Id(200),
        properties: vec![
            (
                prop::BUFFERS,
                Pod::Choice(Box::new(Choice::Range {
                    default: Pod::Int(2),
                    min: Pod::Int(1),
                    max: Pod::Int(8),
                })),
            ),
            (prop::SIZE, Pod::Int(4096)),
            (prop::DATA_TYPE, Pod::Int(0b1)),
        ],
    }
}

/// A minimal `NodeImpl` whose single port offers one format candidate and
/// one buffers candidate, driving real negotiation through `Core` instead of
/// a hand-rolled stub.
struct TestNode {
    direction: Direction,
    format_candidates: Vec<Pod>,
    accepted_format: RefCell<Option<Pod>>,
}

impl TestNode {
    fn new(direction: Direction, format_candidates: Vec<Pod>) -> Self {
        Self {
            direction,
            format_candidates,
            accepted_format: RefCell::new(None),
        }
    }
}

impl NodeImpl for TestNode {
    fn get_info(&self) -> NodeInfo {
        let (max_input_ports, max_output_ports) = match self.direction {
            Direction::Input => (1, 0),
            Direction::Output => (0, 1),
        };
        NodeInfo {
            max_input_ports,
            max_output_ports,
            props: Dict::new(),
        }
    }
    fn enum_params(&self, _id: ParamId, _start: u32, _filter: Option<&Pod>) -> Vec<Pod> {
        vec![]
    }
    fn set_param(&mut self, _id: ParamId, _pod: Pod) -> Result<AsyncStatus, CoreError> {
        Ok(AsyncStatus::Sync)
    }
    fn set_io(&mut self, _id: IoType, _ptr: *mut u8, _size: usize) -> Result<(), CoreError> {
        Ok(())
    }
    fn send_command(&mut self, _cmd: Command) -> Result<AsyncStatus, CoreError> {
        Ok(AsyncStatus::Sync)
    }
    fn add_port(&mut self, _direction: Direction) -> Result<u32, CoreError> {
        Ok(0)
    }
    fn remove_port(&mut self, _port_id: u32) -> Result<(), CoreError> {
        Ok(())
    }
    fn port_enum_params(&self, _port_id: u32, id: ParamId, start: u32, filter: Option<&Pod>) -> Vec<Pod> {
        match id {
            ParamId::EnumFormat => match filter {
                None => self.format_candidates.get(start as usize..).map(|s| s.to_vec()).unwrap_or_default(),
                Some(f) => self
                    .format_candidates
                    .iter()
                    .filter(|c| flowgraph_core::negotiate::param_filter::filter_pod(f, c).is_ok())
                    .cloned()
                    .collect(),
            },
            ParamId::Buffers if start == 0 => vec![buffers_param()],
            _ => vec![],
        }
    }
    fn port_set_param(&mut self, _port_id: u32, id: ParamId, pod: Pod) -> Result<AsyncStatus, CoreError> {
        if id == ParamId::Format {
            *self.accepted_format.borrow_mut() = Some(pod);
        }
        Ok(AsyncStatus::Sync)
    }
    fn port_set_io(&mut self, _port_id: u32, _id: IoType, _ptr: *mut u8, _size: usize) -> Result<(), CoreError> {
        Ok(())
    }
    fn port_use_buffers(&mut self, _port_id: u32, _buffer_count: u32, _buffer_size: u32) -> Result<AsyncStatus, CoreError> {
        Ok(AsyncStatus::Sync)
    }
    fn port_alloc_buffers(&mut self, _port_id: u32, _buffer_count: u32, _buffer_size: u32) -> Result<AsyncStatus, CoreError> {
        Ok(AsyncStatus::Sync)
    }
    fn port_reuse_buffer(&mut self, _port_id: u32, _buffer_id: u32) {}
    fn process(&mut self) -> ProcessStatus {
        PROCESS_COUNT.fetch_add(1, Ordering::SeqCst);
        ProcessStatus::default()
    }
}

fn exact_rate_source() -> NodeFactory {
    NodeFactory::new(
        "source",
        Box::new(|_: &Dict| {
            Ok(Box::new(TestNode::new(
                Direction::Output,
                vec![rate_format(Pod::Choice(Box::new(Choice::Range {
                    default: Pod::Int(44100),
                    min: Pod::Int(44100),
                    max: Pod::Int(192000),
                })))],
            )) as Box<dyn NodeImpl>)
        }),
    )
}

fn fixed_rate_sink(rate: i32) -> NodeFactory {
    NodeFactory::new(
        "sink",
        Box::new(move |_: &Dict| Ok(Box::new(TestNode::new(Direction::Input, vec![rate_format(Pod::Int(rate))])) as Box<dyn NodeImpl>)),
    )
}

#[test]
fn two_node_loopback_negotiates_a_format_and_activates_once_both_nodes_start() {
    let mut core = Core::new();
    core.register_factory(exact_rate_source());
    core.register_factory(fixed_rate_sink(48000));
    let client = core.add_client(Credentials { uid: 1, gid: 1, pid: 1 }, Box::new(NullChannel));

    let src = core.create_node(client, "source", Dict::new()).unwrap();
    let dst = core.create_node(client, "sink", Dict::new()).unwrap();
    let out_port = core.add_node_port(src, Direction::Output).unwrap();
    let in_port = core.add_node_port(dst, Direction::Input).unwrap();
    let link_id = core.create_link(src, out_port, dst, in_port, false).unwrap();

    core.negotiate_link(link_id).unwrap();
    assert_eq!(core.links[&link_id].state, LinkState::Paused);

    let fixed = core.links[&link_id].format.clone().unwrap();
    let (_, props) = fixed.as_object().unwrap();
    assert_eq!(props[0].1, Pod::Int(48000));

    // Negotiation alone doesn't activate the Link; it needs both endpoints
    // `active` first, via Start.
    core.send_command(src, Command::Start).unwrap();
    assert_eq!(core.links[&link_id].state, LinkState::Paused);
    core.send_command(dst, Command::Start).unwrap();
    assert_eq!(core.links[&link_id].state, LinkState::Active);
}

#[test]
fn incompatible_fixed_rates_fail_negotiation_with_format_incompatible() {
    let mut core = Core::new();
    core.register_factory(NodeFactory::new(
        "source44",
        Box::new(|_: &Dict| Ok(Box::new(TestNode::new(Direction::Output, vec![rate_format(Pod::Int(44100))])) as Box<dyn NodeImpl>)),
    ));
    core.register_factory(fixed_rate_sink(48000));
    let client = core.add_client(Credentials { uid: 1, gid: 1, pid: 1 }, Box::new(NullChannel));

    let src = core.create_node(client, "source44", Dict::new()).unwrap();
    let dst = core.create_node(client, "sink", Dict::new()).unwrap();
    let out_port = core.add_node_port(src, Direction::Output).unwrap();
    let in_port = core.add_node_port(dst, Direction::Input).unwrap();
    let link_id = core.create_link(src, out_port, dst, in_port, false).unwrap();

    let err = core.negotiate_link(link_id).unwrap_err();
    assert_eq!(err.code, flowgraph_core::error::ErrorCode::FormatIncompatible);
    assert_eq!(core.links[&link_id].state, LinkState::Error);
}

#[test]
fn a_driver_with_only_a_passive_link_left_is_not_scheduled() {
    PROCESS_COUNT.store(0, Ordering::SeqCst);

    let mut core = Core::new();
    core.register_factory(NodeFactory::new(
        "driver",
        Box::new(|_: &Dict| {
            Ok(Box::new(TestNode::new(
                Direction::Output,
                vec![rate_format(Pod::Choice(Box::new(Choice::Range {
                    default: Pod::Int(44100),
                    min: Pod::Int(44100),
                    max: Pod::Int(192000),
                })))],
            )) as Box<dyn NodeImpl>)
        }),
    ));
    core.register_factory(fixed_rate_sink(48000));
    let client = core.add_client(Credentials { uid: 1, gid: 1, pid: 1 }, Box::new(NullChannel));

    let driver = core.create_node(client, "driver", Dict::new()).unwrap();
    let monitor = core.create_node(client, "sink", Dict::new()).unwrap();
    let out_port = core.add_node_port(driver, Direction::Output).unwrap();
    let in_port = core.add_node_port(monitor, Direction::Input).unwrap();
    // A passive (monitor-tap) link: present, but shouldn't by itself keep
    // the driver's subgraph awake.
    let link_id = core.create_link(driver, out_port, monitor, in_port, true).unwrap();
    core.negotiate_link(link_id).unwrap();
    core.send_command(driver, Command::Start).unwrap();
    core.send_command(monitor, Command::Start).unwrap();
    core.nodes.get_mut(&driver).unwrap().priority_driver = 10;

    let reports = core.run_cycle(1024, 48000, 0);
    assert!(reports.is_empty());
    assert_eq!(PROCESS_COUNT.load(Ordering::SeqCst), 0);
}
