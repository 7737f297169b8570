use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::data::ids::{LinkId, NodeId};
use crate::graph::activation::ActivationState;
use crate::graph::link::{Link, LinkState};
use crate::node::node_impl::ProcessStatus;
use crate::node::node::Node;

/// Default cycle watchdog (spec §4.6.2's xrun detection): a driver cycle
/// that hasn't finished within this long after being signalled counts as
/// an xrun for every node still pending.
pub const DEFAULT_WATCHDOG: Duration = Duration::from_millis(50);

/// One driver and the followers reachable from it through non-passive
/// Links, topologically ordered so `process()` calls only ever see inputs
/// that already ran this cycle (spec §4.6.1).
#[derive(Debug, Clone)]
pub struct Subgraph {
    pub driver: NodeId,
    pub order: Vec<NodeId>,
}

/// Report produced by one `run_cycle` call.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub xrun: bool,
    pub ran: Vec<NodeId>,
}

/// Builds driver/follower subgraphs from the current Node/Link topology and
/// drives one cycle at a time (spec §4.6). Each Node hosts its own
/// `NodeImpl`; this type only owns the scheduling decision of *when* to call
/// `process()`, never the processing itself.
///
/// Simplification: a real per-process driver signals followers across
/// threads via each Activation's eventfd and waits on a set of read fds;
/// since individual Node-hosting processes are out of scope here, one cycle
/// runs every follower's `process()` synchronously in topological order on
/// the calling thread instead. The eventfd/wakeup bookkeeping on
/// [`crate::graph::activation::Activation`] is still recorded so a future
/// multi-threaded driver could reuse it unchanged.
pub struct GraphEngine {
    pub watchdog: Duration,
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self { watchdog: DEFAULT_WATCHDOG }
    }
}

impl GraphEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute every Node's elected driver and `runnable` flag from the
    /// current Link topology (spec §4.6.1's driver election, §4.5.6's
    /// "Passive links"). Subgraph membership is a weakly-connected component
    /// over every `Active` Link regardless of `passive` (a passive monitor
    /// tap still shares its driver's clock); a component is only scheduled
    /// (every member's `runnable` set) if it contains at least one `Active`,
    /// non-passive Link — a component joined solely by passive Links holds
    /// its negotiated state but the driver stops ticking it, which is what
    /// lets a disconnected non-passive consumer pause the driver even while
    /// a passive tap stays `Active` (spec §8 scenario 3).
    pub fn recompute_drivers(&self, nodes: &mut HashMap<NodeId, Node>, links: &[Link]) {
        let mut parent: HashMap<NodeId, NodeId> = nodes.keys().copied().map(|id| (id, id)).collect();

        fn find(parent: &mut HashMap<NodeId, NodeId>, x: NodeId) -> NodeId {
            let p = parent[&x];
            if p == x {
                x
            } else {
                let root = find(parent, p);
                parent.insert(x, root);
                root
            }
        }
        fn union(parent: &mut HashMap<NodeId, NodeId>, a: NodeId, b: NodeId) {
            let ra = find(parent, a);
            let rb = find(parent, b);
            if ra != rb {
                parent.insert(ra, rb);
            }
        }

        let active_links: Vec<&Link> = links
            .iter()
            .filter(|l| l.state == LinkState::Active && nodes.contains_key(&l.output_node) && nodes.contains_key(&l.input_node))
            .collect();
        for link in &active_links {
            union(&mut parent, link.output_node, link.input_node);
        }

        let mut has_nonpassive: HashSet<NodeId> = HashSet::new();
        for link in &active_links {
            if !link.passive {
                let root = find(&mut parent, link.output_node);
                has_nonpassive.insert(root);
            }
        }

        let mut components: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let ids: Vec<NodeId> = nodes.keys().copied().collect();
        for id in ids {
            let root = find(&mut parent, id);
            components.entry(root).or_default().push(id);
        }

        for (root, members) in components {
            let runnable = has_nonpassive.contains(&root);
            // Highest `priority_driver` wins; ties broken by lowest node id
            // (spec §4.6.1: "ties broken by node id").
            let driver = members
                .iter()
                .copied()
                .filter(|id| nodes[id].can_drive())
                .max_by_key(|id| (nodes[id].priority_driver, std::cmp::Reverse(*id)));
            for member in &members {
                if let Some(node) = nodes.get_mut(member) {
                    node.driver = driver;
                    node.runnable = runnable && driver.is_some();
                }
            }
        }
    }

    /// Partition nodes into driver-rooted subgraphs (spec §4.6.1). A node
    /// with `driver == Some(self.id)` roots its own subgraph; every other
    /// node belongs to the subgraph of the node its `driver` field points
    /// at. Nodes with no driver assigned yet are omitted.
    pub fn partition(&self, nodes: &HashMap<NodeId, Node>, links: &[Link]) -> Vec<Subgraph> {
        let mut members: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in nodes.values() {
            if let Some(driver) = node.driver {
                members.entry(driver).or_default().push(node.id);
            }
        }
        members
            .into_iter()
            .map(|(driver, mut ids)| {
                ids.sort_by_key(|id| id.0);
                Subgraph {
                    driver,
                    order: topo_sort(driver, &ids, links),
                }
            })
            .collect()
    }

    /// Run one cycle for `subgraph`: advance the driver's position, run
    /// every member's `process()` in topological order, and report whether
    /// the watchdog fired (spec §4.6.2, §4.6.5).
    pub fn run_cycle(&self, subgraph: &Subgraph, nodes: &mut HashMap<NodeId, Node>, quantum: u32, rate: u32, now_nsec: u64) -> CycleReport {
        if let Some(driver) = nodes.get_mut(&subgraph.driver) {
            driver.position.cycle += 1;
            driver.position.quantum = quantum;
            driver.position.rate = rate;
            driver.activation.record_signal_time(now_nsec);
            driver.activation.set_state(ActivationState::Triggered);
        }
        let position = nodes.get(&subgraph.driver).map(|d| d.position);

        let mut report = CycleReport::default();
        for &id in &subgraph.order {
            let Some(node) = nodes.get_mut(&id) else { continue };
            if let Some(position) = position {
                node.position = position;
            }
            node.activation.set_state(ActivationState::Triggered);
            let status: ProcessStatus = node.impl_.process();
            node.activation.record_finish_time(now_nsec);
            let elapsed = now_nsec.saturating_sub(node.activation.signal_time());
            if elapsed as u128 > self.watchdog.as_nanos() || (status.need_data && !status.have_data && !status.drained) {
                node.activation.record_xrun();
                report.xrun = true;
            }
            node.activation.set_state(ActivationState::Finished);
            report.ran.push(id);
        }

        for &id in &subgraph.order {
            if let Some(node) = nodes.get_mut(&id) {
                node.activation.set_state(ActivationState::NotTriggered);
            }
        }
        report
    }
}

/// Order `members` (plus `driver`) so every node's predecessors (by active,
/// non-passive Link) appear earlier. Falls back to id order for any cycle
/// the graph shouldn't have (defensive: `NodeImpl`s are untrusted).
fn topo_sort(driver: NodeId, members: &[NodeId], links: &[Link]) -> Vec<NodeId> {
    let set: HashSet<NodeId> = std::iter::once(driver).chain(members.iter().copied()).collect();
    let mut in_degree: HashMap<NodeId, u32> = set.iter().map(|&id| (id, 0)).collect();
    let mut edges: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for link in links {
        if link.state == LinkState::Error {
            continue;
        }
        if set.contains(&link.output_node) && set.contains(&link.input_node) {
            edges.entry(link.output_node).or_default().push(link.input_node);
            *in_degree.entry(link.input_node).or_insert(0) += 1;
        }
    }

    let mut ready: Vec<NodeId> = set.iter().copied().filter(|id| in_degree[id] == 0).collect();
    ready.sort_by_key(|id| id.0);
    let mut order = Vec::with_capacity(set.len());
    while let Some(id) = ready.pop() {
        order.push(id);
        if let Some(next) = edges.get(&id) {
            for &succ in next {
                let d = in_degree.get_mut(&succ).unwrap();
                *d -= 1;
                if *d == 0 {
                    ready.push(succ);
                }
            }
        }
        ready.sort_by_key(|id| id.0);
    }
    if order.len() != set.len() {
        // A cycle slipped through Link validation; fall back to id order
        // rather than drop nodes from the cycle.
        let mut rest: Vec<NodeId> = set.into_iter().filter(|id| !order.contains(id)).collect();
        rest.sort_by_key(|id| id.0);
        order.extend(rest);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ids::PortId;
    use crate::node::node_impl::{AsyncStatus, Command, Direction, IoType, NodeImpl, NodeInfo, ParamId};
    use flowgraph_types::{Dict, Pod};

    struct CountingNode(u32);
    impl NodeImpl for CountingNode {
        fn get_info(&self) -> NodeInfo {
            NodeInfo {
                max_input_ports: 1,
                max_output_ports: 1,
                props: Dict::default(),
            }
        }
        fn enum_params(&self, _id: ParamId, _start: u32, _filter: Option<&Pod>) -> Vec<Pod> {
            vec![]
        }
        fn set_param(&mut self, _id: ParamId, _pod: Pod) -> Result<AsyncStatus, crate::error::CoreError> {
            Ok(AsyncStatus::Sync)
        }
        fn set_io(&mut self, _id: IoType, _ptr: *mut u8, _size: usize) -> Result<(), crate::error::CoreError> {
            Ok(())
        }
        fn send_command(&mut self, _cmd: Command) -> Result<AsyncStatus, crate::error::CoreError> {
            Ok(AsyncStatus::Sync)
        }
        fn add_port(&mut self, _direction: Direction) -> Result<u32, crate::error::CoreError> {
            Ok(0)
        }
        fn remove_port(&mut self, _port_id: u32) -> Result<(), crate::error::CoreError> {
            Ok(())
        }
        fn port_enum_params(&self, _port_id: u32, _id: ParamId, _start: u32, _filter: Option<&Pod>) -> Vec<Pod> {
            vec![]
        }
        fn port_set_param(&mut self, _port_id: u32, _id: ParamId, _pod: Pod) -> Result<AsyncStatus, crate::error::CoreError> {
            Ok(AsyncStatus::Sync)
        }
        fn port_set_io(&mut self, _port_id: u32, _id: IoType, _ptr: *mut u8, _size: usize) -> Result<(), crate::error::CoreError> {
            Ok(())
        }
        fn port_use_buffers(&mut self, _port_id: u32, _buffer_count: u32, _buffer_size: u32) -> Result<AsyncStatus, crate::error::CoreError> {
            Ok(AsyncStatus::Sync)
        }
        fn port_alloc_buffers(&mut self, _port_id: u32, _buffer_count: u32, _buffer_size: u32) -> Result<AsyncStatus, crate::error::CoreError> {
            Ok(AsyncStatus::Sync)
        }
        fn port_reuse_buffer(&mut self, _port_id: u32, _buffer_id: u32) {}
        fn process(&mut self) -> ProcessStatus {
            self.0 += 1;
            ProcessStatus {
                have_data: true,
                need_data: false,
                drained: false,
            }
        }
    }

    fn node(id: u32, driver: u32) -> Node {
        let mut n = Node::new(NodeId(id), None, Box::new(CountingNode(0))).unwrap();
        n.driver = Some(NodeId(driver));
        n
    }

    fn driver_capable(id: u32, priority_driver: i32) -> Node {
        let mut n = Node::new(NodeId(id), None, Box::new(CountingNode(0))).unwrap();
        n.priority_driver = priority_driver;
        n
    }

    #[test]
    fn partition_groups_nodes_by_driver() {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId(1), node(1, 1));
        nodes.insert(NodeId(2), node(2, 1));
        nodes.insert(NodeId(3), node(3, 3));
        let engine = GraphEngine::new();
        let subgraphs = engine.partition(&nodes, &[]);
        assert_eq!(subgraphs.len(), 2);
        let driver1 = subgraphs.iter().find(|s| s.driver == NodeId(1)).unwrap();
        assert_eq!(driver1.order.len(), 2);
    }

    #[test]
    fn run_cycle_runs_every_member_and_advances_the_driver_position() {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId(1), node(1, 1));
        nodes.insert(NodeId(2), node(2, 1));
        let engine = GraphEngine::new();
        let subgraph = Subgraph {
            driver: NodeId(1),
            order: vec![NodeId(1), NodeId(2)],
        };
        let report = engine.run_cycle(&subgraph, &mut nodes, 1024, 48000, 1_000_000);
        assert_eq!(report.ran, vec![NodeId(1), NodeId(2)]);
        assert_eq!(nodes[&NodeId(1)].position.cycle, 1);
        assert!(!report.xrun);
    }

    #[test]
    fn passive_only_component_elects_a_driver_but_is_not_runnable() {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId(1), driver_capable(1, 10000));
        nodes.insert(NodeId(2), driver_capable(2, 0));
        let mut link = Link::new(LinkId(1), NodeId(1), PortId(0), NodeId(2), PortId(0), true);
        link.state = LinkState::Active;
        let engine = GraphEngine::new();
        engine.recompute_drivers(&mut nodes, std::slice::from_ref(&link));
        assert_eq!(nodes[&NodeId(1)].driver, Some(NodeId(1)));
        assert!(!nodes[&NodeId(1)].runnable);
        assert!(!nodes[&NodeId(2)].runnable);
    }

    #[test]
    fn a_single_nonpassive_link_makes_the_whole_component_runnable() {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId(1), driver_capable(1, 10000));
        nodes.insert(NodeId(2), driver_capable(2, 0));
        nodes.insert(NodeId(3), driver_capable(3, 0));
        let mut non_passive = Link::new(LinkId(1), NodeId(1), PortId(0), NodeId(2), PortId(0), false);
        non_passive.state = LinkState::Active;
        let mut passive = Link::new(LinkId(2), NodeId(1), PortId(1), NodeId(3), PortId(0), true);
        passive.state = LinkState::Active;
        let engine = GraphEngine::new();
        engine.recompute_drivers(&mut nodes, &[non_passive, passive]);
        for id in [NodeId(1), NodeId(2), NodeId(3)] {
            assert_eq!(nodes[&id].driver, Some(NodeId(1)));
            assert!(nodes[&id].runnable, "node {id} should be runnable");
        }
    }

    #[test]
    fn driver_election_prefers_highest_priority_then_lowest_id() {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId(2), driver_capable(2, 10000));
        nodes.insert(NodeId(1), driver_capable(1, 10000));
        nodes.insert(NodeId(3), driver_capable(3, 1));
        let mut link_a = Link::new(LinkId(1), NodeId(1), PortId(0), NodeId(2), PortId(0), false);
        link_a.state = LinkState::Active;
        let mut link_b = Link::new(LinkId(2), NodeId(2), PortId(1), NodeId(3), PortId(0), false);
        link_b.state = LinkState::Active;
        let engine = GraphEngine::new();
        engine.recompute_drivers(&mut nodes, &[link_a, link_b]);
        for id in [NodeId(1), NodeId(2), NodeId(3)] {
            assert_eq!(nodes[&id].driver, Some(NodeId(1)));
        }
    }

    #[test]
    fn topo_sort_respects_link_order() {
        let link = Link::new(LinkId(1), NodeId(2), PortId(0), NodeId(1), PortId(0), false);
        let order = topo_sort(NodeId(1), &[NodeId(1), NodeId(2)], std::slice::from_ref(&link));
        assert_eq!(order, vec![NodeId(2), NodeId(1)]);
    }
}
