use std::collections::HashMap;
use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Mutex};

use log::{debug, trace};
use memmap2::MmapOptions;
use nix::fcntl::{fcntl, FcntlArg, OFlag, SealFlag};
use nix::sys::memfd::{memfd_create, MFdFlags};
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;

use crate::block::{AllocFlags, BlockType, MemBlock, SealState};
use crate::error::{MemPoolError, Result};
use crate::map::{HeapBuf, MemMap, Storage};

fn page_size() -> u64 {
    // SC_PAGESIZE is effectively constant for the process lifetime.
    nix::unistd::sysconf(nix::unistd::SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .map(|v| v as u64)
        .unwrap_or(4096)
}

fn round_to_page(size: u64) -> u64 {
    let page = page_size();
    size.div_ceil(page) * page
}

struct MapEntry {
    backing_len: usize,
    refcount: u32,
}

struct BlockEntry {
    block: MemBlock,
    refcount: u32,
    storage: Storage,
    maps: HashMap<u32, (MemMap, MapEntry)>,
    next_map_id: u32,
}

struct PoolState {
    blocks: HashMap<u32, BlockEntry>,
    next_block_id: u32,
}

/// Allocates, tracks, shares, and maps memory that participates in the
/// zero-copy graph (spec §4.1). One pool per server process; ids are unique
/// within it for a block's lifetime.
pub struct MemPool {
    state: Mutex<PoolState>,
}

impl MemPool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState {
                blocks: HashMap::new(),
                next_block_id: 1,
            }),
        }
    }

    pub fn alloc(&self, flags: AllocFlags, block_type: BlockType, size: u64) -> Result<MemBlock> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_block_id;
        state.next_block_id = state.next_block_id.checked_add(1).ok_or(MemPoolError::OutOfMemory)?;

        let (fd, storage, actual_size) = match block_type {
            BlockType::MemFd => {
                let size = round_to_page(size).max(page_size());
                let mut create_flags = MFdFlags::MFD_CLOEXEC;
                if flags.seal {
                    create_flags |= MFdFlags::MFD_ALLOW_SEALING;
                }
                let owned: OwnedFd = memfd_create(&format!("flowgraph-pool-{id}")[..], create_flags)?;
                ftruncate(&owned, size as i64)?;
                if flags.seal {
                    fcntl(
                        owned.as_raw_fd(),
                        FcntlArg::F_ADD_SEALS(SealFlag::F_SEAL_SHRINK | SealFlag::F_SEAL_GROW),
                    )?;
                }
                let raw = owned.as_raw_fd();
                let file = File::from(owned);
                (Some(raw), Storage::File(file), size)
            }
            BlockType::ShmFd => {
                let size = round_to_page(size).max(page_size());
                let name = format!("/flowgraph-pool-{id}");
                let owned = shm_open(
                    name.as_str(),
                    OFlag::O_CREAT | OFlag::O_RDWR | OFlag::O_EXCL,
                    Mode::S_IRUSR | Mode::S_IWUSR,
                )?;
                let _ = shm_unlink(name.as_str());
                ftruncate(&owned, size as i64)?;
                let raw = owned.as_raw_fd();
                let file = File::from(owned);
                (Some(raw), Storage::File(file), size)
            }
            BlockType::MemPtr => {
                let heap = HeapBuf::new(size as usize);
                (None, Storage::Heap(heap), size)
            }
            BlockType::DmaBuf => return Err(MemPoolError::NoSupport),
        };

        let block = MemBlock {
            id,
            block_type,
            flags,
            seal_state: if flags.seal { SealState::Sealed } else { SealState::Unsealed },
            fd,
            offset: 0,
            size: actual_size,
        };
        debug!("allocated block {id} type={block_type:?} size={actual_size}");
        state.blocks.insert(
            id,
            BlockEntry {
                block,
                refcount: 1,
                storage,
                maps: HashMap::new(),
                next_map_id: 1,
            },
        );
        Ok(block)
    }

    /// Import a block a peer has shared, taking ownership of `fd`.
    pub fn import(
        &self,
        fd: OwnedFd,
        block_type: BlockType,
        flags: AllocFlags,
        offset: u64,
        size: u64,
    ) -> Result<MemBlock> {
        let file = File::from(fd);
        let file_len = file.metadata()?.len();
        if offset.checked_add(size).map(|end| end > file_len).unwrap_or(true) {
            return Err(MemPoolError::BadArgument);
        }
        let mut state = self.state.lock().unwrap();
        let id = state.next_block_id;
        state.next_block_id = state.next_block_id.checked_add(1).ok_or(MemPoolError::OutOfMemory)?;
        let raw = file.as_raw_fd();
        let block = MemBlock {
            id,
            block_type,
            flags,
            seal_state: SealState::Unsealed,
            fd: Some(raw),
            offset,
            size,
        };
        debug!("imported block {id} fd={raw} type={block_type:?} size={size}");
        state.blocks.insert(
            id,
            BlockEntry {
                block,
                refcount: 1,
                storage: Storage::File(file),
                maps: HashMap::new(),
                next_map_id: 1,
            },
        );
        Ok(block)
    }

    /// Map `size` bytes at `offset` into this block. Each call produces an
    /// independently refcounted map even when the same block is mapped
    /// again (spec §3.2).
    pub fn map(&self, block_id: u32, offset: u64, size: u64) -> Result<MemMap> {
        let mut state = self.state.lock().unwrap();
        let entry = state.blocks.get_mut(&block_id).ok_or(MemPoolError::BadArgument)?;
        if offset.checked_add(size).map(|end| end > entry.block.size).unwrap_or(true) {
            return Err(MemPoolError::BadArgument);
        }
        let map_id = entry.next_map_id;
        entry.next_map_id += 1;
        let handle = match &entry.storage {
            Storage::File(file) => {
                let mmap = unsafe {
                    MmapOptions::new()
                        .offset(offset)
                        .len(size as usize)
                        .map_mut(file)?
                };
                MemMap::from_file(map_id, block_id, mmap, 0, size as usize)
            }
            Storage::Heap(heap) => MemMap::from_heap(map_id, block_id, Arc::clone(heap), offset as usize, size as usize),
        };
        trace!("mapped block {block_id} map {map_id} offset={offset} size={size}");
        let entry_clone = handle.clone_handle();
        entry.maps.insert(
            map_id,
            (
                handle,
                MapEntry {
                    backing_len: size as usize,
                    refcount: 1,
                },
            ),
        );
        Ok(entry_clone)
    }

    /// Take another reference to an already-mapped window.
    pub fn ref_map(&self, block_id: u32, map_id: u32) -> Option<MemMap> {
        let mut state = self.state.lock().unwrap();
        let entry = state.blocks.get_mut(&block_id)?;
        let (map, map_entry) = entry.maps.get_mut(&map_id)?;
        map_entry.refcount += 1;
        Some(map.clone_handle())
    }

    pub fn unref_map(&self, block_id: u32, map_id: u32) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.blocks.get_mut(&block_id) {
            let mut drop_it = false;
            if let Some((_, map_entry)) = entry.maps.get_mut(&map_id) {
                map_entry.refcount = map_entry.refcount.saturating_sub(1);
                drop_it = map_entry.refcount == 0;
            }
            if drop_it {
                entry.maps.remove(&map_id);
                trace!("unmapped block {block_id} map {map_id}");
            }
        }
    }

    /// Unconditionally remove a block regardless of outstanding refcount.
    pub fn free(&self, block_id: u32) {
        let mut state = self.state.lock().unwrap();
        if state.blocks.remove(&block_id).is_some() {
            debug!("freed block {block_id}");
        }
    }

    /// Drop one reference; the last `unref` removes the block from the
    /// id-map before its fd (if any) is closed by `Drop`.
    pub fn unref(&self, block_id: u32) {
        let mut state = self.state.lock().unwrap();
        let mut drop_it = false;
        if let Some(entry) = state.blocks.get_mut(&block_id) {
            entry.refcount = entry.refcount.saturating_sub(1);
            drop_it = entry.refcount == 0;
        }
        if drop_it {
            state.blocks.remove(&block_id);
            debug!("last unref freed block {block_id}");
        }
    }

    pub fn find_id(&self, block_id: u32) -> Option<MemBlock> {
        self.state.lock().unwrap().blocks.get(&block_id).map(|e| e.block)
    }

    pub fn find_fd(&self, fd: RawFd) -> Option<MemBlock> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .values()
            .map(|e| e.block)
            .find(|b| b.fd == Some(fd))
    }
}

impl Default for MemPool {
    fn default() -> Self {
        Self::new()
    }
}
