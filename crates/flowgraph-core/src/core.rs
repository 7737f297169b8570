use std::collections::HashMap;

use log::{debug, info};
use slab::Slab;

use flowgraph_mempool::MemPool;
use flowgraph_types::{Dict, Id, TypeMap};

use crate::data::client::{Client, Credentials};
use crate::data::event::CoreEvent;
use crate::data::global::{Global, GlobalTarget};
use crate::data::ids::{
    ClientId, EndpointId, EndpointLinkId, EndpointStreamId, GlobalId, LinkId, NodeId, PortId, ResourceId, SessionId, CORE_GLOBAL_ID,
};
use crate::data::permission::{default_allow, Permission, PermissionFn};
use crate::data::resource::{ClientChannel, NullChannel, Resource};
use crate::data::session::{Endpoint, EndpointLink, EndpointLinkState, EndpointStream, Session};
use crate::data::work_queue::WorkQueue;
use crate::error::{CoreError, ErrorCode};
use crate::factories::NodeFactory;
use crate::graph::engine::GraphEngine;
use crate::graph::link::{Link, LinkState};
use crate::node::node::Node;
use crate::node::node_impl::{Command, Direction, NodeImpl};
use crate::node::port::PortState;

/// The well-known type ids the core interns for itself at startup (spec
/// §3.1's "every object kind has a stable type name"). `flowgraph-proto`
/// interns the same strings against the same `TypeMap` so type ids agree
/// across the wire.
pub mod type_names {
    pub const CORE: &str = "flowgraph:core";
    pub const REGISTRY: &str = "flowgraph:registry";
    pub const NODE: &str = "flowgraph:node";
    pub const PORT: &str = "flowgraph:port";
    pub const LINK: &str = "flowgraph:link";
    pub const NODE_FACTORY: &str = "flowgraph:node-factory";
    pub const CLIENT: &str = "flowgraph:client";
    /// Session-manager extension object type names (spec §6.1), interned the
    /// same way as Node/Link so they get stable, wire-agreed type ids too.
    pub const SESSION: &str = "flowgraph:session";
    pub const ENDPOINT: &str = "flowgraph:endpoint";
    pub const ENDPOINT_STREAM: &str = "flowgraph:endpoint-stream";
    pub const ENDPOINT_LINK: &str = "flowgraph:endpoint-link";
}

/// The server-process singleton (spec §3.2, §4.3): owns every Global,
/// Client, Resource, Node and Link, the shared buffer pool, the work queue,
/// and the permission policy. A process hosts exactly one `Core`.
pub struct Core {
    pub type_map: TypeMap,
    globals: Slab<Global>,
    clients: Slab<Client>,
    client_ids: HashMap<ClientId, usize>,
    global_ids: HashMap<GlobalId, usize>,
    channels: HashMap<ClientId, Box<dyn ClientChannel>>,
    resources: HashMap<ClientId, HashMap<ResourceId, Resource>>,
    pub nodes: HashMap<NodeId, Node>,
    pub links: HashMap<LinkId, Link>,
    node_factories: HashMap<String, NodeFactory>,
    pub sessions: HashMap<SessionId, Session>,
    pub endpoints: HashMap<EndpointId, Endpoint>,
    pub endpoint_streams: HashMap<EndpointStreamId, EndpointStream>,
    pub endpoint_links: HashMap<EndpointLinkId, EndpointLink>,
    next_node_id: u32,
    next_link_id: u32,
    next_client_id: u32,
    next_session_id: u32,
    next_endpoint_id: u32,
    next_endpoint_stream_id: u32,
    next_endpoint_link_id: u32,
    pub pool: MemPool,
    pub work: WorkQueue,
    permission_fn: PermissionFn,
    pub engine: GraphEngine,
}

impl Core {
    pub fn new() -> Self {
        Self::with_permission_fn(Box::new(default_allow))
    }

    pub fn with_permission_fn(permission_fn: PermissionFn) -> Self {
        let mut type_map = TypeMap::new();
        let core_type = type_map.intern(type_names::CORE);
        type_map.intern(type_names::REGISTRY);
        type_map.intern(type_names::NODE);
        type_map.intern(type_names::PORT);
        type_map.intern(type_names::LINK);
        type_map.intern(type_names::NODE_FACTORY);
        type_map.intern(type_names::CLIENT);
        type_map.intern(type_names::SESSION);
        type_map.intern(type_names::ENDPOINT);
        type_map.intern(type_names::ENDPOINT_STREAM);
        type_map.intern(type_names::ENDPOINT_LINK);

        let mut globals = Slab::new();
        let mut global_ids = HashMap::new();
        // Insert the Core's own Global first so it lands at slab key 0,
        // matching CORE_GLOBAL_ID.
        let key = globals.insert(Global::new(CORE_GLOBAL_ID, core_type, 1, Dict::new(), GlobalTarget::Core));
        global_ids.insert(CORE_GLOBAL_ID, key);
        debug_assert_eq!(key, CORE_GLOBAL_ID.0 as usize);

        Self {
            type_map,
            globals,
            clients: Slab::new(),
            client_ids: HashMap::new(),
            global_ids,
            channels: HashMap::new(),
            resources: HashMap::new(),
            nodes: HashMap::new(),
            links: HashMap::new(),
            node_factories: HashMap::new(),
            sessions: HashMap::new(),
            endpoints: HashMap::new(),
            endpoint_streams: HashMap::new(),
            endpoint_links: HashMap::new(),
            next_node_id: 1,
            next_link_id: 1,
            next_client_id: 1,
            next_session_id: 1,
            next_endpoint_id: 1,
            next_endpoint_stream_id: 1,
            next_endpoint_link_id: 1,
            pool: MemPool::new(),
            work: WorkQueue::new(),
            permission_fn,
            engine: GraphEngine::new(),
        }
    }

    // -- Clients ----------------------------------------------------------

    pub fn add_client(&mut self, credentials: Credentials, channel: Box<dyn ClientChannel>) -> ClientId {
        let id = ClientId(self.next_client_id);
        self.next_client_id += 1;
        let key = self.clients.insert(Client::new(id, credentials));
        self.client_ids.insert(id, key);
        self.channels.insert(id, channel);
        self.resources.insert(id, HashMap::new());
        info!("client {id} connected uid={}", credentials.uid);
        id
    }

    /// Tear down a disconnected client: release every Resource it held,
    /// destroy any Node it owns, and forget its channel (spec §4.3's
    /// disconnect cleanup).
    pub fn remove_client(&mut self, id: ClientId) {
        self.resources.remove(&id);
        self.channels.remove(&id);

        let owned_nodes: Vec<NodeId> = self.nodes.values().filter(|n| n.owner == Some(id)).map(|n| n.id).collect();
        for node_id in owned_nodes {
            self.destroy_node(node_id);
        }

        let owned_sessions: Vec<SessionId> = self.sessions.values().filter(|s| s.owner == Some(id)).map(|s| s.id).collect();
        for session_id in owned_sessions {
            self.destroy_session(session_id);
        }
        let owned_endpoints: Vec<EndpointId> = self.endpoints.values().filter(|e| e.owner == Some(id)).map(|e| e.id).collect();
        for endpoint_id in owned_endpoints {
            self.destroy_endpoint(endpoint_id);
        }
        let owned_streams: Vec<EndpointStreamId> = self.endpoint_streams.values().filter(|s| s.owner == Some(id)).map(|s| s.id).collect();
        for stream_id in owned_streams {
            self.destroy_endpoint_stream(stream_id);
        }
        let owned_endpoint_links: Vec<EndpointLinkId> = self.endpoint_links.values().filter(|l| l.owner == Some(id)).map(|l| l.id).collect();
        for link_id in owned_endpoint_links {
            self.destroy_endpoint_link(link_id);
        }

        let owned_globals: Vec<GlobalId> = self.globals.iter().filter(|(_, g)| g.owner == Some(id)).map(|(_, g)| g.id).collect();
        for global_id in owned_globals {
            self.remove_global(global_id);
        }

        if let Some(key) = self.client_ids.remove(&id) {
            self.clients.remove(key);
        }
        info!("client {id} disconnected");
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.client_ids.get(&id).map(|&key| &self.clients[key])
    }

    fn client_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        let key = *self.client_ids.get(&id)?;
        Some(&mut self.clients[key])
    }

    // -- Globals / registry -------------------------------------------------

    /// Publish a new Global and fan out `RegistryGlobal` to every client the
    /// permission filter grants at least read access to (spec §4.3).
    pub fn add_global(&mut self, type_id: Id, version: u32, props: Dict, target: GlobalTarget, owner: Option<(ClientId, u32)>) -> GlobalId {
        let key = self.globals.vacant_key();
        let id = GlobalId(key as u32);
        let mut global = Global::new(id, type_id, version, props, target);
        if let Some((owner_id, owner_uid)) = owner {
            global = global.with_owner(owner_id, owner_uid);
        }
        let inserted_key = self.globals.insert(global);
        debug_assert_eq!(inserted_key, key);
        self.global_ids.insert(id, inserted_key);

        self.notify_registry_added(id);
        id
    }

    fn notify_registry_added(&self, id: GlobalId) {
        let Some(global) = self.global(id) else { return };
        for (&client_id, client_key) in &self.client_ids {
            let client = &self.clients[*client_key];
            let permission = (self.permission_fn)(global, client);
            if !permission.allows(Permission::read_only()) {
                continue;
            }
            if let Some(channel) = self.channels.get(&client_id) {
                channel.send_event(CoreEvent::RegistryGlobal {
                    id: global.id,
                    type_id: global.type_id,
                    version: global.version,
                    props: global.props.clone(),
                    permission,
                });
            }
        }
    }

    pub fn remove_global(&mut self, id: GlobalId) -> Option<Global> {
        let key = self.global_ids.remove(&id)?;
        let global = self.globals.try_remove(key);
        for (&client_id, resources) in &mut self.resources {
            let removed: Vec<ResourceId> = resources.values().filter(|r| r.global == id).map(|r| r.id).collect();
            for resource_id in removed {
                resources.remove(&resource_id);
                if let Some(channel) = self.channels.get(&client_id) {
                    channel.send_event(CoreEvent::RemoveId { resource_id });
                }
            }
        }
        if global.is_some() {
            for client_id in self.client_ids.keys() {
                if let Some(channel) = self.channels.get(client_id) {
                    channel.send_event(CoreEvent::RegistryGlobalRemove { id });
                }
            }
        }
        global
    }

    pub fn global(&self, id: GlobalId) -> Option<&Global> {
        let key = *self.global_ids.get(&id)?;
        self.globals.get(key)
    }

    /// Every Global currently visible to `client` (spec §4.3's initial
    /// registry sync on bind).
    pub fn visible_globals(&self, client_id: ClientId) -> Vec<&Global> {
        let Some(client_key) = self.client_ids.get(&client_id) else {
            return Vec::new();
        };
        let client = &self.clients[*client_key];
        self.globals
            .iter()
            .map(|(_, g)| g)
            .filter(|g| (self.permission_fn)(g, client).allows(Permission::read_only()))
            .collect()
    }

    /// Bind a Global to a client-chosen `new_id`, creating the Resource that
    /// represents the client's handle on it (spec §3.2, §4.3). Fails with
    /// `Permission` if the filter denies read access.
    pub fn bind(&mut self, client_id: ClientId, global_id: GlobalId, new_id: ResourceId, version: u32) -> Result<(), CoreError> {
        let global = self.global(global_id).ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such global"))?;
        let client_key = *self
            .client_ids
            .get(&client_id)
            .ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such client"))?;
        let client = &self.clients[client_key];
        let permission = (self.permission_fn)(global, client);
        if !permission.allows(Permission::read_only()) {
            return Err(CoreError::new(ErrorCode::Permission, "global not visible to this client"));
        }
        let resource = Resource::new(new_id, client_id, global_id, permission, version, global.target.clone());
        self.resources.entry(client_id).or_default().insert(new_id, resource);
        if let Some(client) = self.client_mut(client_id) {
            client.add_resource(new_id);
        }
        if let Some(channel) = self.channels.get(&client_id) {
            channel.send_event(CoreEvent::BoundId {
                resource_id: new_id,
                global_id,
            });
        }
        Ok(())
    }

    pub fn resource(&self, client_id: ClientId, resource_id: ResourceId) -> Option<&Resource> {
        self.resources.get(&client_id)?.get(&resource_id)
    }

    /// Bind the implicit Registry resource (spec §4.3's `Core::get_registry`).
    /// Unlike `bind`, there is no backing `Global` to look up — the Registry
    /// is a permanent per-client capability on the Core itself — so this
    /// skips the permission filter and immediately replays one
    /// `RegistryGlobal` per currently-visible Global as the initial sync
    /// (spec §8's "c observes global(g.id) strictly before ... global_remove").
    pub fn get_registry(&mut self, client_id: ClientId, new_id: ResourceId) -> Result<(), CoreError> {
        if !self.client_ids.contains_key(&client_id) {
            return Err(CoreError::new(ErrorCode::BadArgument, "no such client"));
        }
        let resource = Resource::new(new_id, client_id, CORE_GLOBAL_ID, Permission::ALL, 1, GlobalTarget::Registry);
        self.resources.entry(client_id).or_default().insert(new_id, resource);
        if let Some(client) = self.client_mut(client_id) {
            client.add_resource(new_id);
        }
        let client_key = *self.client_ids.get(&client_id).ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such client"))?;
        let client = &self.clients[client_key];
        let initial: Vec<(GlobalId, Id, u32, Dict, Permission)> = self
            .globals
            .iter()
            .map(|(_, g)| g)
            .filter_map(|g| {
                let permission = (self.permission_fn)(g, client);
                permission.allows(Permission::read_only()).then(|| (g.id, g.type_id, g.version, g.props.clone(), permission))
            })
            .collect();
        if let Some(channel) = self.channels.get(&client_id) {
            for (id, type_id, version, props, permission) in initial {
                channel.send_event(CoreEvent::RegistryGlobal { id, type_id, version, props, permission });
            }
        }
        Ok(())
    }

    /// Find the `GlobalId` a Node's own Global was published under (spec
    /// §4.7's `create_node_done` needs this to tell the caller which id its
    /// `new_id` got bound to).
    pub fn global_id_for_node(&self, node_id: NodeId) -> Option<GlobalId> {
        self.globals.iter().find(|(_, g)| g.target == GlobalTarget::Node(node_id)).map(|(_, g)| g.id)
    }

    pub fn global_id_for_link(&self, link_id: LinkId) -> Option<GlobalId> {
        self.globals.iter().find(|(_, g)| g.target == GlobalTarget::Link(link_id)).map(|(_, g)| g.id)
    }

    pub fn global_id_for_session(&self, id: SessionId) -> Option<GlobalId> {
        self.globals.iter().find(|(_, g)| g.target == GlobalTarget::Session(id)).map(|(_, g)| g.id)
    }

    pub fn global_id_for_endpoint(&self, id: EndpointId) -> Option<GlobalId> {
        self.globals.iter().find(|(_, g)| g.target == GlobalTarget::Endpoint(id)).map(|(_, g)| g.id)
    }

    pub fn global_id_for_endpoint_stream(&self, id: EndpointStreamId) -> Option<GlobalId> {
        self.globals.iter().find(|(_, g)| g.target == GlobalTarget::EndpointStream(id)).map(|(_, g)| g.id)
    }

    pub fn global_id_for_endpoint_link(&self, id: EndpointLinkId) -> Option<GlobalId> {
        self.globals.iter().find(|(_, g)| g.target == GlobalTarget::EndpointLink(id)).map(|(_, g)| g.id)
    }

    /// Record a peer's announced `first_id.. -> names[]` type-map update
    /// (spec §3.1, §6.1). Ids are process-local; this just keeps the
    /// client's own table in sync so later Pods it sends carrying those ids
    /// decode against the right names.
    pub fn update_client_types(&mut self, client_id: ClientId, names: &[String]) {
        if let Some(client) = self.client_mut(client_id) {
            for name in names {
                client.type_map.intern(name);
            }
        }
    }

    /// Merge a client's self-reported properties (spec §3.2's `client_update`).
    pub fn update_client_props(&mut self, client_id: ClientId, props: &Dict) {
        if let Some(client) = self.client_mut(client_id) {
            client.props.merge(props);
        }
    }

    // -- Node factories ------------------------------------------------------

    pub fn register_factory(&mut self, factory: NodeFactory) -> GlobalId {
        let name = factory.name.clone();
        let type_id = self.type_map.intern(type_names::NODE_FACTORY);
        let mut props = Dict::new();
        props.insert("factory.name", name.clone());
        let global_id = self.add_global(type_id, 1, props, GlobalTarget::NodeFactory, None);
        self.node_factories.insert(name, factory);
        global_id
    }

    /// Build a Node from a registered factory and publish its Global (spec
    /// §4.7). Real async factories (spawning a process) return through
    /// [`crate::factories::node_create_work_object`] instead; this path
    /// covers in-process constructors that never need the work queue.
    pub fn create_node(&mut self, owner: ClientId, factory_name: &str, props: Dict) -> Result<NodeId, CoreError> {
        let factory = self
            .node_factories
            .get(factory_name)
            .ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "unknown node factory"))?;
        let impl_ = factory.create(&props)?;
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        let node = Node::new(id, Some(owner), impl_).map_err(|e| CoreError::new(ErrorCode::Os, e.to_string()))?;
        self.nodes.insert(id, node);

        let type_id = self.type_map.intern(type_names::NODE);
        let owner_uid = self.client(owner).map(|c| c.credentials.uid);
        self.add_global(type_id, 1, props, GlobalTarget::Node(id), owner_uid.map(|uid| (owner, uid)));
        debug!("created node {id} via factory {factory_name}");
        Ok(id)
    }

    pub fn destroy_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&id)?;
        let dangling: Vec<LinkId> = self
            .links
            .values()
            .filter(|l| l.output_node == id || l.input_node == id)
            .map(|l| l.id)
            .collect();
        for link_id in dangling {
            self.destroy_link(link_id);
        }
        if let Some(global_id) = self.global_id_for_node(id) {
            self.remove_global(global_id);
        }
        let port_globals: Vec<GlobalId> = self
            .globals
            .iter()
            .filter(|(_, g)| matches!(g.target, GlobalTarget::Port(n, _) if n == id))
            .map(|(_, g)| g.id)
            .collect();
        for global_id in port_globals {
            self.remove_global(global_id);
        }
        Some(node)
    }

    /// Remove a Link and its published Global (spec §6.1's `registry_destroy`
    /// on a bound Link resource). Leaves both endpoint Nodes untouched.
    pub fn destroy_link(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.remove(&id)?;
        if let Some(global_id) = self.global_id_for_link(id) {
            self.remove_global(global_id);
        }
        Some(link)
    }

    // -- Session-manager extension objects (spec §6.1) ------------------------
    //
    // The core never interprets these beyond create/destroy/registry-fanout
    // and a proxied property bag — see `crate::data::session`'s module doc.
    // Ownership cascades the same way Node→Port does: destroying a Session
    // takes its Endpoints with it, destroying an Endpoint takes its Streams
    // and any EndpointLink naming it.

    pub fn create_session(&mut self, owner: Option<ClientId>, props: Dict) -> SessionId {
        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;
        self.sessions.insert(id, Session { id, owner, props: props.clone() });
        let type_id = self.type_map.intern(type_names::SESSION);
        let owner_pair = owner.and_then(|c| self.client(c).map(|client| (c, client.credentials.uid)));
        self.add_global(type_id, 1, props, GlobalTarget::Session(id), owner_pair);
        debug!("created session {id}");
        id
    }

    /// Destroy a Session and everything it owns: its Endpoints, and
    /// transitively their EndpointStreams and any EndpointLink touching one
    /// of those Endpoints.
    pub fn destroy_session(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        let owned_endpoints: Vec<EndpointId> = self.endpoints.values().filter(|e| e.session == id).map(|e| e.id).collect();
        for endpoint_id in owned_endpoints {
            self.destroy_endpoint(endpoint_id);
        }
        let dangling_links: Vec<EndpointLinkId> = self.endpoint_links.values().filter(|l| l.session == id).map(|l| l.id).collect();
        for link_id in dangling_links {
            self.destroy_endpoint_link(link_id);
        }
        if let Some(global_id) = self.global_id_for_session(id) {
            self.remove_global(global_id);
        }
        Some(session)
    }

    pub fn create_endpoint(&mut self, owner: Option<ClientId>, session: SessionId, props: Dict) -> Result<EndpointId, CoreError> {
        if !self.sessions.contains_key(&session) {
            return Err(CoreError::new(ErrorCode::BadArgument, "no such session"));
        }
        let id = EndpointId(self.next_endpoint_id);
        self.next_endpoint_id += 1;
        self.endpoints.insert(id, Endpoint { id, session, owner, props: props.clone() });
        let type_id = self.type_map.intern(type_names::ENDPOINT);
        let owner_pair = owner.and_then(|c| self.client(c).map(|client| (c, client.credentials.uid)));
        self.add_global(type_id, 1, props, GlobalTarget::Endpoint(id), owner_pair);
        debug!("created endpoint {id} on session {session}");
        Ok(id)
    }

    pub fn destroy_endpoint(&mut self, id: EndpointId) -> Option<Endpoint> {
        let endpoint = self.endpoints.remove(&id)?;
        let owned_streams: Vec<EndpointStreamId> = self.endpoint_streams.values().filter(|s| s.endpoint == id).map(|s| s.id).collect();
        for stream_id in owned_streams {
            self.destroy_endpoint_stream(stream_id);
        }
        let dangling_links: Vec<EndpointLinkId> = self
            .endpoint_links
            .values()
            .filter(|l| l.output_endpoint == id || l.input_endpoint == id)
            .map(|l| l.id)
            .collect();
        for link_id in dangling_links {
            self.destroy_endpoint_link(link_id);
        }
        if let Some(global_id) = self.global_id_for_endpoint(id) {
            self.remove_global(global_id);
        }
        Some(endpoint)
    }

    pub fn create_endpoint_stream(&mut self, owner: Option<ClientId>, endpoint: EndpointId, props: Dict) -> Result<EndpointStreamId, CoreError> {
        if !self.endpoints.contains_key(&endpoint) {
            return Err(CoreError::new(ErrorCode::BadArgument, "no such endpoint"));
        }
        let id = EndpointStreamId(self.next_endpoint_stream_id);
        self.next_endpoint_stream_id += 1;
        self.endpoint_streams.insert(id, EndpointStream { id, endpoint, owner, props: props.clone() });
        let type_id = self.type_map.intern(type_names::ENDPOINT_STREAM);
        let owner_pair = owner.and_then(|c| self.client(c).map(|client| (c, client.credentials.uid)));
        self.add_global(type_id, 1, props, GlobalTarget::EndpointStream(id), owner_pair);
        debug!("created endpoint stream {id} on endpoint {endpoint}");
        Ok(id)
    }

    pub fn destroy_endpoint_stream(&mut self, id: EndpointStreamId) -> Option<EndpointStream> {
        let stream = self.endpoint_streams.remove(&id)?;
        if let Some(global_id) = self.global_id_for_endpoint_stream(id) {
            self.remove_global(global_id);
        }
        Some(stream)
    }

    /// Create an `EndpointLink` joining two Endpoints of the same Session
    /// (original's `pw_endpoint_proxy_methods.create_link`). The two
    /// Endpoints need not belong to the same client — a session manager
    /// commonly runs as a separate process linking Endpoints owned by
    /// others — so this only checks that both exist under `session`, not
    /// ownership.
    pub fn create_endpoint_link(
        &mut self,
        owner: Option<ClientId>,
        session: SessionId,
        output_endpoint: EndpointId,
        input_endpoint: EndpointId,
        props: Dict,
    ) -> Result<EndpointLinkId, CoreError> {
        if !self.sessions.contains_key(&session) {
            return Err(CoreError::new(ErrorCode::BadArgument, "no such session"));
        }
        let output = self.endpoints.get(&output_endpoint).ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such output endpoint"))?;
        let input = self.endpoints.get(&input_endpoint).ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such input endpoint"))?;
        if output.session != session || input.session != session {
            return Err(CoreError::new(ErrorCode::BadArgument, "endpoints do not belong to this session"));
        }
        if output_endpoint == input_endpoint {
            return Err(CoreError::new(ErrorCode::BadArgument, "cannot link an endpoint to itself"));
        }
        let id = EndpointLinkId(self.next_endpoint_link_id);
        self.next_endpoint_link_id += 1;
        self.endpoint_links.insert(
            id,
            EndpointLink {
                id,
                session,
                output_endpoint,
                input_endpoint,
                owner,
                state: EndpointLinkState::Negotiating,
                props: props.clone(),
            },
        );
        let type_id = self.type_map.intern(type_names::ENDPOINT_LINK);
        let owner_pair = owner.and_then(|c| self.client(c).map(|client| (c, client.credentials.uid)));
        self.add_global(type_id, 1, props, GlobalTarget::EndpointLink(id), owner_pair);
        debug!("created endpoint link {id} ({output_endpoint} -> {input_endpoint})");
        Ok(id)
    }

    /// Record a session manager's `request_state` on an `EndpointLink`
    /// (original's `pw_endpoint_link_proxy_methods.request_state`). Purely a
    /// state record — the core does not drive or validate the transition,
    /// that policy lives in the external session manager.
    pub fn endpoint_link_request_state(&mut self, id: EndpointLinkId, state: EndpointLinkState) -> Result<(), CoreError> {
        let link = self.endpoint_links.get_mut(&id).ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such endpoint link"))?;
        link.state = state;
        Ok(())
    }

    pub fn destroy_endpoint_link(&mut self, id: EndpointLinkId) -> Option<EndpointLink> {
        let link = self.endpoint_links.remove(&id)?;
        if let Some(global_id) = self.global_id_for_endpoint_link(id) {
            self.remove_global(global_id);
        }
        Some(link)
    }

    pub fn add_node_port(&mut self, node_id: NodeId, direction: Direction) -> Result<PortId, CoreError> {
        let node = self.nodes.get_mut(&node_id).ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such node"))?;
        let port_id = node.add_port(direction)?;
        let type_id = self.type_map.intern(type_names::PORT);
        self.add_global(type_id, 1, Dict::new(), GlobalTarget::Port(node_id, port_id), None);
        Ok(port_id)
    }

    // -- Links ----------------------------------------------------------------

    pub fn create_link(&mut self, output_node: NodeId, output_port: PortId, input_node: NodeId, input_port: PortId, passive: bool) -> Result<LinkId, CoreError> {
        if output_node == input_node {
            return Err(CoreError::new(ErrorCode::BadArgument, "cannot link a node to itself"));
        }
        let id = LinkId(self.next_link_id);
        self.next_link_id += 1;
        let link = Link::new(id, output_node, output_port, input_node, input_port, passive);
        self.links.insert(id, link);
        let type_id = self.type_map.intern(type_names::LINK);
        self.add_global(type_id, 1, Dict::new(), GlobalTarget::Link(id), None);
        Ok(id)
    }

    /// Run a Link's five-phase negotiation. Both endpoints are temporarily
    /// removed from `self.nodes` so their `NodeImpl`s can be borrowed
    /// mutably at once without an unstable disjoint-borrow API; this relies
    /// on `output_node != input_node`, enforced by `create_link`.
    pub fn negotiate_link(&mut self, link_id: LinkId) -> Result<(), CoreError> {
        let (output_node, input_node) = {
            let link = self.links.get(&link_id).ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such link"))?;
            (link.output_node, link.input_node)
        };
        let (output_port, input_port) = {
            let link = self.links.get(&link_id).unwrap();
            (link.output_port, link.input_port)
        };
        let mut output = self.nodes.remove(&output_node).ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such output node"))?;
        let mut input = match self.nodes.remove(&input_node) {
            Some(node) => node,
            None => {
                self.nodes.insert(output_node, output);
                return Err(CoreError::new(ErrorCode::BadArgument, "no such input node"));
            }
        };

        // Spec §4.4's Port state machine: a port enters `Configure` the
        // moment negotiation starts enumerating its `EnumFormat` offers.
        if let Some(port) = output.port_mut(output_port) {
            let _ = port.set_state(PortState::Configure);
        }
        if let Some(port) = input.port_mut(input_port) {
            let _ = port.set_state(PortState::Configure);
        }

        let outcome = {
            let link = self.links.get_mut(&link_id).unwrap();
            link.negotiate(output.impl_.as_mut(), input.impl_.as_mut(), &self.pool)
        };

        match &outcome {
            Ok(()) => {
                // `Link::negotiate` only returns `Ok` once both ports have a
                // fixated format and an installed buffer pool, i.e. already
                // past `Configure`/`Ready` — walk the Port state machine
                // through both intermediate states up to `Paused` in one go.
                for (node, port_id) in [(&mut output, output_port), (&mut input, input_port)] {
                    if let Some(port) = node.port_mut(port_id) {
                        let _ = port.set_state(PortState::Ready);
                        let _ = port.set_state(PortState::Paused);
                    }
                }
                // A Link only reaches `Active` once both owning Nodes are
                // themselves `active` (spec §4.5.6) — that requires a prior
                // `Start` command, so a fresh negotiation stays `Paused`
                // until one arrives (see `send_command`'s activation pass).
                if output.active && input.active {
                    if let Some(link) = self.links.get_mut(&link_id) {
                        let _ = link.activate();
                    }
                }
            }
            Err(_) => {
                for (node, port_id) in [(&mut output, output_port), (&mut input, input_port)] {
                    if let Some(port) = node.port_mut(port_id) {
                        port.state = PortState::Error;
                    }
                }
            }
        }

        self.nodes.insert(output_node, output);
        self.nodes.insert(input_node, input);
        outcome
    }

    // -- Node commands ----------------------------------------------------

    /// Forward a command to a Node and apply its Link-activation side
    /// effects (spec §4.6.5). `Start` tries to bring any `Paused` Link
    /// touching this Node to `Active` now that it's a candidate (it only
    /// succeeds once *both* endpoints are active); `Pause`/`Suspend` drop
    /// every `Active` Link touching this Node back to `Paused`.
    pub fn send_command(&mut self, node_id: NodeId, cmd: Command) -> Result<crate::node::node_impl::AsyncStatus, CoreError> {
        let status = {
            let node = self.nodes.get_mut(&node_id).ok_or_else(|| CoreError::new(ErrorCode::BadArgument, "no such node"))?;
            node.send_command(cmd)?
        };
        match cmd {
            Command::Start => self.try_activate_links_touching(node_id),
            Command::Pause | Command::Suspend => self.deactivate_links_touching(node_id),
            Command::Flush => {}
        }
        Ok(status)
    }

    fn try_activate_links_touching(&mut self, node_id: NodeId) {
        let candidates: Vec<LinkId> = self
            .links
            .values()
            .filter(|l| l.state == LinkState::Paused && (l.output_node == node_id || l.input_node == node_id))
            .map(|l| l.id)
            .collect();
        for id in candidates {
            let Some(link) = self.links.get(&id) else { continue };
            let both_active = self.nodes.get(&link.output_node).map(|n| n.active).unwrap_or(false)
                && self.nodes.get(&link.input_node).map(|n| n.active).unwrap_or(false);
            if both_active {
                if let Some(link) = self.links.get_mut(&id) {
                    let _ = link.activate();
                }
            }
        }
    }

    fn deactivate_links_touching(&mut self, node_id: NodeId) {
        for link in self.links.values_mut() {
            if link.state == LinkState::Active && (link.output_node == node_id || link.input_node == node_id) {
                link.state = LinkState::Paused;
            }
        }
    }

    // -- Graph cycle ------------------------------------------------------

    pub fn run_cycle(&mut self, quantum: u32, rate: u32, now_nsec: u64) -> Vec<crate::graph::engine::CycleReport> {
        // GraphEngine::partition takes a link slice by value because its
        // Subgraph ordering must be stable for the duration of run_cycle,
        // which also needs &mut self.nodes; cloning the (small) Link structs
        // sidesteps holding an immutable borrow of self.links across that.
        let links_owned: Vec<Link> = self
            .links
            .values()
            .map(|l| Link {
                id: l.id,
                output_node: l.output_node,
                output_port: l.output_port,
                input_node: l.input_node,
                input_port: l.input_port,
                passive: l.passive,
                state: l.state,
                format: l.format.clone(),
                mem_block: l.mem_block,
                maps: l.maps.clone(),
            })
            .collect();
        self.engine.recompute_drivers(&mut self.nodes, &links_owned);
        let subgraphs = self.engine.partition(&self.nodes, &links_owned);
        let mut reports = Vec::with_capacity(subgraphs.len());
        for subgraph in &subgraphs {
            // A subgraph whose driver isn't `runnable` (spec §4.5.6's
            // passive-link holdoff: no non-passive consumer needs it this
            // cycle) is paced but not ticked — skip it entirely rather than
            // running a driver nothing downstream is waiting on.
            let runnable = self.nodes.get(&subgraph.driver).map(|d| d.runnable).unwrap_or(false);
            if !runnable {
                continue;
            }
            reports.push(self.engine.run_cycle(subgraph, &mut self.nodes, quantum, rate, now_nsec));
        }
        reports
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}

/// A `ClientChannel` that just drops the event; used before a real
/// transport is wired up (tests, the bootstrap window before accept).
pub fn null_channel() -> Box<dyn ClientChannel> {
    Box::new(NullChannel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::node_impl::{AsyncStatus, Command, IoType, NodeInfo, ParamId, ProcessStatus};
    use flowgraph_types::Pod;

    struct Stub;
    impl NodeImpl for Stub {
        fn get_info(&self) -> NodeInfo {
            NodeInfo {
                max_input_ports: 1,
                max_output_ports: 1,
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
        fn port_enum_params(&self, _port_id: u32, _id: ParamId, _start: u32, _filter: Option<&Pod>) -> Vec<Pod> {
            vec![]
        }
        fn port_set_param(&mut self, _port_id: u32, _id: ParamId, _pod: Pod) -> Result<AsyncStatus, CoreError> {
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
            ProcessStatus::default()
        }
    }

    fn factory() -> NodeFactory {
        NodeFactory::new("test.node", Box::new(|_: &Dict| Ok(Box::new(Stub) as Box<dyn NodeImpl>)))
    }

    #[test]
    fn core_global_is_id_zero() {
        let core = Core::new();
        assert_eq!(core.global(CORE_GLOBAL_ID).unwrap().target, GlobalTarget::Core);
    }

    #[test]
    fn add_client_then_bind_creates_a_resource() {
        let mut core = Core::new();
        let client = core.add_client(Credentials { uid: 1, gid: 1, pid: 1 }, null_channel());
        core.bind(client, CORE_GLOBAL_ID, ResourceId(0), 1).unwrap();
        assert!(core.resource(client, ResourceId(0)).is_some());
    }

    #[test]
    fn remove_client_tears_down_its_nodes() {
        let mut core = Core::new();
        core.register_factory(factory());
        let client = core.add_client(Credentials { uid: 1, gid: 1, pid: 1 }, null_channel());
        let node_id = core.create_node(client, "test.node", Dict::new()).unwrap();
        core.remove_client(client);
        assert!(!core.nodes.contains_key(&node_id));
    }

    #[test]
    fn same_uid_sandbox_hides_foreign_globals() {
        let mut core = Core::with_permission_fn(Box::new(crate::data::permission::same_uid_sandbox));
        core.register_factory(factory());
        let owner = core.add_client(Credentials { uid: 1, gid: 1, pid: 1 }, null_channel());
        let stranger = core.add_client(Credentials { uid: 2, gid: 2, pid: 2 }, null_channel());
        let _ = core.create_node(owner, "test.node", Dict::new()).unwrap();
        let visible_to_owner = core.visible_globals(owner).len();
        let visible_to_stranger = core.visible_globals(stranger).len();
        assert!(visible_to_owner > visible_to_stranger);
    }

    #[test]
    fn create_link_rejects_self_loop() {
        let mut core = Core::new();
        core.register_factory(factory());
        let client = core.add_client(Credentials { uid: 1, gid: 1, pid: 1 }, null_channel());
        let node_id = core.create_node(client, "test.node", Dict::new()).unwrap();
        let port = core.add_node_port(node_id, Direction::Output).unwrap();
        assert!(core.create_link(node_id, port, node_id, port, false).is_err());
    }

    #[test]
    fn destroy_node_drops_its_links() {
        let mut core = Core::new();
        core.register_factory(factory());
        let client = core.add_client(Credentials { uid: 1, gid: 1, pid: 1 }, null_channel());
        let a = core.create_node(client, "test.node", Dict::new()).unwrap();
        let b = core.create_node(client, "test.node", Dict::new()).unwrap();
        let out = core.add_node_port(a, Direction::Output).unwrap();
        let inp = core.add_node_port(b, Direction::Input).unwrap();
        let link_id = core.create_link(a, out, b, inp, false).unwrap();
        core.destroy_node(a);
        assert!(!core.links.contains_key(&link_id));
    }

    #[test]
    fn get_registry_replays_every_currently_visible_global() {
        let mut core = Core::new();
        core.register_factory(factory());
        let client = core.add_client(Credentials { uid: 1, gid: 1, pid: 1 }, null_channel());
        let _ = core.create_node(client, "test.node", Dict::new()).unwrap();
        // CORE_GLOBAL_ID, the factory's own NodeFactory global, and the Node
        // itself are all visible under the default-allow policy.
        assert!(core.get_registry(client, ResourceId(1)).is_ok());
        assert!(core.resource(client, ResourceId(1)).is_some());
    }

    #[test]
    fn global_id_for_node_resolves_the_published_global() {
        let mut core = Core::new();
        core.register_factory(factory());
        let client = core.add_client(Credentials { uid: 1, gid: 1, pid: 1 }, null_channel());
        let node_id = core.create_node(client, "test.node", Dict::new()).unwrap();
        let global_id = core.global_id_for_node(node_id).unwrap();
        assert_eq!(core.global(global_id).unwrap().target, GlobalTarget::Node(node_id));
    }
}
