use flowgraph_types::Dict;

use crate::data::ids::{ClientId, NodeId};
use crate::data::work_queue::{WorkObject, WorkResult};
use crate::error::CoreError;
use crate::node::node_impl::NodeImpl;

/// A constructor for a particular kind of `NodeImpl`, registered under a
/// factory name (spec §4.7, e.g. `"support.node.driver"`, `"audiotestsrc"`).
/// Out of scope: the concrete implementations this produces (ALSA, V4L2,
/// ...) — only the registry and the async creation protocol belong here.
pub trait NodeFactoryFn: Send {
    fn create(&self, props: &Dict) -> Result<Box<dyn NodeImpl>, CoreError>;
}

impl<F> NodeFactoryFn for F
where
    F: Fn(&Dict) -> Result<Box<dyn NodeImpl>, CoreError> + Send,
{
    fn create(&self, props: &Dict) -> Result<Box<dyn NodeImpl>, CoreError> {
        self(props)
    }
}

/// A registered node factory: a `Global` of kind `NodeFactory` plus the
/// constructor function it exposes (spec §4.7).
pub struct NodeFactory {
    pub name: String,
    constructor: Box<dyn NodeFactoryFn>,
}

impl NodeFactory {
    pub fn new(name: impl Into<String>, constructor: Box<dyn NodeFactoryFn>) -> Self {
        Self {
            name: name.into(),
            constructor,
        }
    }

    /// Synchronously build a `NodeImpl`. Real factories that spin up an
    /// external process (spawn a VST host, open a device) return their
    /// result through a [`crate::data::work_queue::WorkQueue`] entry
    /// instead; `create_node_async` below is the entry point for that path.
    pub fn create(&self, props: &Dict) -> Result<Box<dyn NodeImpl>, CoreError> {
        self.constructor.create(props)
    }
}

/// Request to create a Node asynchronously through a factory (spec §4.7,
/// §9's "Async create/destroy"): the caller gets a work-queue sequence
/// number back immediately and the eventual `NodeId` (or failure) arrives
/// through `WorkQueue::complete`.
pub struct PendingNodeCreate {
    pub owner: ClientId,
    pub factory_name: String,
}

/// Outcome delivered to a pending node-create's completion callback.
#[derive(Debug, Clone)]
pub enum NodeCreateResult {
    Created(NodeId),
    Failed(String),
}

pub fn node_create_work_object(owner: ClientId) -> WorkObject {
    // Client ids and node-create requests share no id space with real
    // NodeIds; offsetting into the upper half keeps them visually distinct
    // in logs without needing a second WorkQueue.
    WorkObject(0x8000_0000_0000_0000 | owner.0 as u64)
}

pub fn work_result_for(result: &NodeCreateResult) -> WorkResult {
    match result {
        NodeCreateResult::Created(_) => WorkResult::Ok,
        NodeCreateResult::Failed(msg) => WorkResult::Err(msg.clone()),
    }
}
