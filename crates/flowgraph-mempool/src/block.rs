use std::os::fd::RawFd;

/// How a `MemBlock`'s bytes are backed (spec §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// Anonymous `memfd_create` file, sealable, shareable by fd.
    MemFd,
    /// Imported dma-buf fd; this pool never allocates one directly, only imports.
    DmaBuf,
    /// Process-local allocation with no fd; never shareable across processes.
    MemPtr,
    /// POSIX shared-memory segment (`shm_open`).
    ShmFd,
}

/// Allocation request flags (spec §4.1: `{Readable, Writable, Seal, Map}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocFlags {
    pub readable: bool,
    pub writable: bool,
    /// Seal the backing fd against further grow/shrink once written. Only
    /// meaningful for `MemFd`.
    pub seal: bool,
    /// Map the block into this process's address space immediately as part
    /// of `alloc`/`import`.
    pub map: bool,
}

impl AllocFlags {
    pub fn rw() -> Self {
        Self {
            readable: true,
            writable: true,
            seal: false,
            map: false,
        }
    }
}

/// A block's state as seen from outside the pool once it's been sealed
/// (spec §4.1: "sealed against further grow/shrink before being shared").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealState {
    Unsealed,
    Sealed,
}

/// A refcounted shared-memory region (spec §3.2). The pool keeps the
/// refcount and id-map; this is the metadata handle callers pass around.
#[derive(Debug, Clone, Copy)]
pub struct MemBlock {
    pub id: u32,
    pub block_type: BlockType,
    pub flags: AllocFlags,
    pub seal_state: SealState,
    pub fd: Option<RawFd>,
    pub offset: u64,
    pub size: u64,
}

impl MemBlock {
    pub fn is_shareable(&self) -> bool {
        self.fd.is_some()
    }
}
