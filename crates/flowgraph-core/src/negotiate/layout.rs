use crate::negotiate::buffers::BufferParams;

/// Behavioural flags a negotiated buffer pool carries (spec §3.3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolFlags {
    /// The pool's `MemBlock`s are shared (mapped) across processes rather
    /// than private to the allocating side.
    pub shared: bool,
    /// Data segments are not backed by pool memory at all; the producer
    /// supplies pointers out of band (e.g. an import buffer from a capture
    /// device) and the pool only carries metadata.
    pub no_mem: bool,
    /// The link is asynchronous: producer and consumer run on different
    /// cycles, so buffers must tolerate being held past one cycle.
    pub r#async: bool,
    /// Buffer count/size may change at runtime without renegotiating the
    /// whole Link (spec §4.5.3's "Dynamic" escape hatch).
    pub dynamic: bool,
}

/// A byte range within one buffer's backing `MemMap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub offset: u32,
    pub size: u32,
}

/// The packed skeleton for a single buffer: metadata segments first, then
/// one segment per data block, each aligned to `BufferParams::align`
/// (spec §3.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSkeleton {
    pub metas: Vec<Segment>,
    pub datas: Vec<Segment>,
    pub total_size: u32,
}

/// The full pool layout: one identical skeleton repeated `buffers` times,
/// plus the flags governing how the pool is allocated and shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolLayout {
    pub skeleton: BufferSkeleton,
    pub buffer_count: u32,
    pub stride: u32,
    pub flags: PoolFlags,
}

impl PoolLayout {
    pub fn total_size(&self) -> u64 {
        self.stride as u64 * self.buffer_count as u64
    }
}

fn align_up(offset: u32, align: u32) -> u32 {
    if align == 0 {
        return offset;
    }
    (offset + align - 1) / align * align
}

/// Pack one buffer's meta segments (fixed `meta_sizes`, in order) followed
/// by `params.blocks` data segments of `params.size` bytes each, every
/// segment aligned to `params.align` (spec §3.3). The packed size is then
/// rounded up to `params.stride` (or to alignment if the negotiated stride
/// is smaller than the natural packed size).
pub fn pack_buffer(params: &BufferParams, meta_sizes: &[u32]) -> BufferSkeleton {
    let mut cursor = 0u32;
    let mut metas = Vec::with_capacity(meta_sizes.len());
    for &size in meta_sizes {
        let offset = align_up(cursor, params.align);
        metas.push(Segment { offset, size });
        cursor = offset + size;
    }

    let mut datas = Vec::with_capacity(params.blocks as usize);
    for _ in 0..params.blocks {
        let offset = align_up(cursor, params.align);
        datas.push(Segment {
            offset,
            size: params.size,
        });
        cursor = offset + params.size;
    }

    let natural = align_up(cursor, params.align);
    let total_size = natural.max(params.stride);
    BufferSkeleton { metas, datas, total_size }
}

/// Pack the whole pool: `buffers` identical skeletons back to back, each
/// buffer's stride taken from the single packed skeleton size.
pub fn pack_pool(params: &BufferParams, meta_sizes: &[u32], flags: PoolFlags) -> PoolLayout {
    let skeleton = pack_buffer(params, meta_sizes);
    PoolLayout {
        stride: skeleton.total_size,
        buffer_count: params.buffers,
        skeleton,
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BufferParams {
        BufferParams {
            buffers: 4,
            blocks: 1,
            size: 4096,
            stride: 0,
            align: 16,
            data_type: 1,
            meta_type: 0,
        }
    }

    #[test]
    fn meta_and_data_segments_are_aligned_and_non_overlapping() {
        let skeleton = pack_buffer(&params(), &[24]);
        assert_eq!(skeleton.metas[0], Segment { offset: 0, size: 24 });
        // next segment starts at the next 16-byte boundary after 24 bytes.
        assert_eq!(skeleton.datas[0].offset, 32);
        assert_eq!(skeleton.datas[0].size, 4096);
        assert_eq!(skeleton.total_size, 32 + 4096);
    }

    #[test]
    fn negotiated_stride_wins_when_larger_than_the_packed_size() {
        let mut p = params();
        p.stride = 8192;
        let skeleton = pack_buffer(&p, &[]);
        assert_eq!(skeleton.total_size, 8192);
    }

    #[test]
    fn pool_total_size_is_stride_times_buffer_count() {
        let layout = pack_pool(&params(), &[], PoolFlags::default());
        assert_eq!(layout.total_size(), layout.stride as u64 * 4);
    }

    #[test]
    fn multiple_data_blocks_each_get_their_own_aligned_segment() {
        let mut p = params();
        p.blocks = 3;
        p.size = 100;
        let skeleton = pack_buffer(&p, &[]);
        assert_eq!(skeleton.datas.len(), 3);
        for d in &skeleton.datas {
            assert_eq!(d.offset % p.align, 0);
        }
    }
}
