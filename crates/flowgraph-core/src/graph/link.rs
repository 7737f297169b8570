use flowgraph_mempool::{AllocFlags, BlockType, MemMap, MemPool};
use flowgraph_types::Pod;

use crate::data::ids::{LinkId, NodeId, PortId};
use crate::error::{CoreError, ErrorCode};
use crate::negotiate::buffers::{apply_buffers, filter_buffers, request_from_pod};
use crate::negotiate::format::{fixate, negotiate_format};
use crate::negotiate::layout::{pack_pool, PoolFlags, PoolLayout};
use crate::node::node_impl::{NodeImpl, ParamId};

/// A Link's progress through the five-phase negotiation (spec §4.5.6).
/// `Error` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Init,
    Negotiating,
    Allocating,
    Paused,
    Active,
    Error,
}

/// A connection between an Output port and an Input port (spec §3.2). A
/// `passive` Link does not by itself keep its driver's subgraph awake when
/// otherwise idle (spec §4.6.1); the Graph Engine consults this flag when
/// computing a driver's follower set.
pub struct Link {
    pub id: LinkId,
    pub output_node: NodeId,
    pub output_port: PortId,
    pub input_node: NodeId,
    pub input_port: PortId,
    pub passive: bool,
    pub state: LinkState,
    pub format: Option<Pod>,
    pub mem_block: Option<u32>,
    pub maps: Vec<MemMap>,
}

impl Link {
    pub fn new(id: LinkId, output_node: NodeId, output_port: PortId, input_node: NodeId, input_port: PortId, passive: bool) -> Self {
        Self {
            id,
            output_node,
            output_port,
            input_node,
            input_port,
            passive,
            state: LinkState::Init,
            format: None,
            mem_block: None,
            maps: Vec::new(),
        }
    }

    fn fail(&mut self, code: ErrorCode, message: impl Into<String>) -> CoreError {
        self.state = LinkState::Error;
        CoreError::new(code, message)
    }

    /// Run all five negotiation phases against the two endpoints' `NodeImpl`
    /// (spec §4.5): format intersection and fixation, buffer parameter
    /// intersection, pool layout packing, pool allocation, and I/O slot
    /// installation. Leaves the Link in `Active` on success or `Error` on
    /// failure; any rejection along the way surfaces the concrete
    /// `ErrorCode` the spec assigns to that phase.
    pub fn negotiate(
        &mut self,
        output: &mut dyn NodeImpl,
        input: &mut dyn NodeImpl,
        pool: &MemPool,
    ) -> Result<(), CoreError> {
        self.state = LinkState::Negotiating;

        // Phase 1 + 2: format.
        let combined = match negotiate_format(input, self.input_port.0, output, self.output_port.0) {
            Ok(pod) => pod,
            Err(e) => return Err(self.fail(e.code, e.message)),
        };
        let fixed = fixate(&combined);
        if let Err(e) = input.port_set_param(self.input_port.0, ParamId::Format, fixed.clone()) {
            return Err(self.fail(ErrorCode::FormatNotAccepted, e.message));
        }
        if let Err(e) = output.port_set_param(self.output_port.0, ParamId::Format, fixed.clone()) {
            return Err(self.fail(ErrorCode::FormatNotAccepted, e.message));
        }
        self.format = Some(fixed);

        // Phase 3: buffer parameters.
        let input_offer = input
            .port_enum_params(self.input_port.0, ParamId::Buffers, 0, None)
            .into_iter()
            .find_map(|p| request_from_pod(&p))
            .ok_or_else(|| self.fail(ErrorCode::BufferNotAccepted, "input port offered no usable Buffers param"))?;
        let output_offer = output
            .port_enum_params(self.output_port.0, ParamId::Buffers, 0, None)
            .into_iter()
            .find_map(|p| request_from_pod(&p))
            .ok_or_else(|| self.fail(ErrorCode::BufferNotAccepted, "output port offered no usable Buffers param"))?;
        let params = match filter_buffers(&output_offer, &input_offer) {
            Ok(p) => p,
            Err(e) => return Err(self.fail(e.code, e.message)),
        };

        // Phase 4: pool layout.
        self.state = LinkState::Allocating;
        let flags = PoolFlags {
            shared: true,
            no_mem: false,
            r#async: self.passive || input_offer.is_async || output_offer.is_async,
            dynamic: false,
        };
        let layout: PoolLayout = pack_pool(&params, &[], flags);

        // Allocate and map the pool, then hand each side its own mapping
        // (independently refcounted, same underlying block).
        let block = pool
            .alloc(AllocFlags::rw(), BlockType::MemFd, layout.total_size())
            .map_err(|e| self.fail(ErrorCode::NoMemory, e.to_string()))?;
        let map = pool
            .map(block.id, 0, layout.total_size())
            .map_err(|e| self.fail(ErrorCode::NoMemory, e.to_string()))?;
        self.mem_block = Some(block.id);

        apply_buffers(input, self.input_port.0, output, self.output_port.0, params).map_err(|e| self.fail(e.code, e.message))?;

        // Phase 5: install the Buffers I/O slot on both ports.
        //
        // Safety: `map` stays alive for this Link's lifetime (held in
        // `self.maps`), so the pointer handed to each NodeImpl remains valid
        // for as long as the slot stays installed.
        unsafe {
            input
                .port_set_io(self.input_port.0, crate::node::node_impl::IoType::Buffers, map.as_ptr(), map.len())
                .map_err(|e| self.fail(e.code, e.message))?;
            output
                .port_set_io(self.output_port.0, crate::node::node_impl::IoType::Buffers, map.as_ptr(), map.len())
                .map_err(|e| self.fail(e.code, e.message))?;
        }
        self.maps.push(map);

        self.state = LinkState::Paused;
        Ok(())
    }

    pub fn activate(&mut self) -> Result<(), CoreError> {
        if self.state != LinkState::Paused {
            return Err(self.fail(ErrorCode::SchedulingError, "activate called outside Paused"));
        }
        self.state = LinkState::Active;
        Ok(())
    }
}
