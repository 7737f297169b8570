use flowgraph_types::{Dict, Pod};

use crate::error::CoreError;

/// Parameter kinds a `NodeImpl` enumerates/accepts (spec §4.4, §4.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    EnumFormat,
    Format,
    Buffers,
    Meta,
    IoSlots,
    Props,
}

/// Shared-memory slot kinds installed via `set_io`/`port_set_io` (spec
/// §4.4, §4.6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoType {
    Buffers,
    Position,
    Clock,
    Control,
    RateMatch,
}

/// Commands sent to a running node (spec §4.4, §4.6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Flush,
    Suspend,
}

/// A node operation either completed synchronously or will complete later
/// through the work queue under this sequence number (spec §9's "Async
/// create/destroy").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncStatus {
    Sync,
    Async(u32),
}

/// The result bitmask `process()` returns (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessStatus {
    pub have_data: bool,
    pub need_data: bool,
    pub drained: bool,
}

/// A Port direction (spec §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// Node-level introspection returned by `get_info` (spec §4.4).
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub max_input_ports: u32,
    pub max_output_ports: u32,
    pub props: Dict,
}

/// The polymorphic processing-unit contract (spec §4.4's "NodeImpl
/// capability"). Individual implementations (ALSA, V4L2, resamplers, RTP,
/// ...) are out of scope — this crate only defines and schedules against
/// the contract. Rust's `dyn NodeImpl` already is a vtable (the method
/// table spec §9 asks implementers to model by hand in languages without
/// one); `process` is the only method called from the realtime cycle and
/// must not allocate or block.
pub trait NodeImpl: Send {
    fn get_info(&self) -> NodeInfo;

    /// Enumerate parameter candidates for `id`, optionally narrowed by
    /// `filter` (spec §4.4, §4.5.1). Implementations may legitimately
    /// return an empty vec to signal exhaustion.
    fn enum_params(&self, id: ParamId, start: u32, filter: Option<&Pod>) -> Vec<Pod>;

    fn set_param(&mut self, id: ParamId, pod: Pod) -> Result<AsyncStatus, CoreError>;

    /// # Safety
    /// `ptr` must stay valid and correctly sized for as long as this slot
    /// stays installed; callers install it from a `MemMap` kept alive by
    /// the owning `Link`/`Node`.
    fn set_io(&mut self, id: IoType, ptr: *mut u8, size: usize) -> Result<(), CoreError>;

    fn send_command(&mut self, cmd: Command) -> Result<AsyncStatus, CoreError>;

    fn add_port(&mut self, direction: Direction) -> Result<u32, CoreError>;
    fn remove_port(&mut self, port_id: u32) -> Result<(), CoreError>;

    fn port_enum_params(&self, port_id: u32, id: ParamId, start: u32, filter: Option<&Pod>) -> Vec<Pod>;
    fn port_set_param(&mut self, port_id: u32, id: ParamId, pod: Pod) -> Result<AsyncStatus, CoreError>;
    /// # Safety
    /// Same obligation as [`NodeImpl::set_io`], scoped to `port_id`.
    fn port_set_io(&mut self, port_id: u32, id: IoType, ptr: *mut u8, size: usize) -> Result<(), CoreError>;
    fn port_use_buffers(&mut self, port_id: u32, buffer_count: u32, buffer_size: u32) -> Result<AsyncStatus, CoreError>;
    fn port_alloc_buffers(&mut self, port_id: u32, buffer_count: u32, buffer_size: u32) -> Result<AsyncStatus, CoreError>;
    fn port_reuse_buffer(&mut self, port_id: u32, buffer_id: u32);

    /// One realtime cycle: consume inputs, produce outputs, read/write IO
    /// slots (spec §4.6.2).
    fn process(&mut self) -> ProcessStatus;
}
