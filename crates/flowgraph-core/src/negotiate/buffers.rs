use flowgraph_types::{Choice, Id, Pod};

use crate::error::{CoreError, ErrorCode};
use crate::node::node_impl::AsyncStatus;

/// Well-known property ids within a `Buffers` param object (spec §4.5.3).
/// Defined here rather than left to each `NodeImpl` to invent, the same way
/// [`crate::data::ids`] fixes `GlobalId(0)` as the Core.
pub mod prop {
    use flowgraph_types::Id;

    pub const BUFFERS: Id = Id(1);
    pub const BLOCKS: Id = Id(2);
    pub const SIZE: Id = Id(3);
    pub const STRIDE: Id = Id(4);
    pub const ALIGN: Id = Id(5);
    pub const DATA_TYPE: Id = Id(6);
    pub const META_TYPE: Id = Id(7);
    pub const ASYNC: Id = Id(8);
}

/// Server-wide ceilings spec §4.5.3 names: a Link never negotiates more
/// buffers or data-blocks than these even if both peers would accept more.
pub const LINK_MAX_BUFFERS: u32 = 64;
pub const LINK_MAX_BLOCKS: u32 = 256;
/// Minimum hardware/CPU alignment every negotiated buffer must satisfy.
pub const CPU_MAX_ALIGN: u32 = 16;

/// Whether a Link's two endpoints can exchange buffers without an
/// intermediate copy at all (spec §4.5.3): `Async` ports need at least two
/// buffers in flight so the writer never blocks on the reader.
pub fn min_buffers(is_async: bool) -> u32 {
    if is_async {
        2
    } else {
        1
    }
}

/// The negotiated buffer parameters for a Link (spec §4.5.3, phase 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferParams {
    pub buffers: u32,
    pub blocks: u32,
    pub size: u32,
    pub stride: u32,
    pub align: u32,
    pub data_type: u32,
    pub meta_type: u32,
}

/// One endpoint's buffer requirements/offer, as reported by its
/// `NodeImpl::enum_params(Buffers, ...)` negotiation.
#[derive(Debug, Clone, Copy)]
pub struct BufferRequest {
    pub min_buffers: u32,
    pub max_buffers: u32,
    pub blocks: u32,
    pub size: u32,
    pub stride: u32,
    pub align: u32,
    pub data_type: u32,
    pub meta_type: u32,
    pub is_async: bool,
}

/// Intersect both endpoints' buffer requests into the single `BufferParams`
/// the pool layout packer will use (spec §4.5.3). The negotiated count is
/// the highest both sides and the link can support (`ceil`), clamped by
/// `LINK_MAX_BUFFERS`, *not* the lowest either side is willing to accept —
/// scenario 1 expects a 64-buffer pool, not a 1-buffer one, when both sides
/// can go that high. `raw_floor` (each side's own declared `min_buffers`) is
/// a hard requirement: if it exceeds `ceil` the endpoints are genuinely
/// incompatible and negotiation fails. The systemic `Async` minimum is
/// softer — per spec §8's boundary case ("max_buffers = 1 and Async = true
/// must return min_buffers = 2 ... the negotiation floor overrides the
/// advertised ceiling"), when only that minimum (not either side's own
/// declared `min_buffers`) pushes the floor above `ceil`, the floor wins
/// instead of failing. `data_type` is a bitmask and must have at least one
/// bit in common; `meta_type` is a union since either side may want
/// metadata the other doesn't produce but can ignore.
pub fn filter_buffers(a: &BufferRequest, b: &BufferRequest) -> Result<BufferParams, CoreError> {
    let raw_floor = a.min_buffers.max(b.min_buffers);
    let ceil = a.max_buffers.min(b.max_buffers).min(LINK_MAX_BUFFERS);
    if raw_floor > ceil {
        return Err(CoreError::new(ErrorCode::BufferNotAccepted, "no buffer count satisfies both endpoints"));
    }
    let async_floor = min_buffers(a.is_async || b.is_async);
    let buffers = async_floor.max(ceil);

    let blocks = a.blocks.max(b.blocks).min(LINK_MAX_BLOCKS);
    let size = a.size.max(b.size);
    let stride = a.stride.max(b.stride);
    let align = a.align.max(b.align).max(CPU_MAX_ALIGN);

    let data_type = a.data_type & b.data_type;
    if data_type == 0 {
        return Err(CoreError::new(ErrorCode::BufferNotAccepted, "no shared data type"));
    }
    let meta_type = a.meta_type | b.meta_type;

    Ok(BufferParams {
        buffers,
        blocks,
        size,
        stride,
        align,
        data_type,
        meta_type,
    })
}

fn prop_u32(properties: &[(Id, Pod)], id: Id) -> Option<u32> {
    properties.iter().find(|(pid, _)| *pid == id).and_then(|(_, v)| v.as_i64()).map(|v| v as u32)
}

fn prop_range(properties: &[(Id, Pod)], id: Id) -> Option<(u32, u32)> {
    let (_, v) = properties.iter().find(|(pid, _)| *pid == id)?;
    match v {
        Pod::Choice(c) => match c.as_ref() {
            Choice::Range { min, max, .. } => Some((min.as_i64()? as u32, max.as_i64()? as u32)),
            Choice::None(p) => {
                let n = p.as_i64()? as u32;
                Some((n, n))
            }
            _ => None,
        },
        other => {
            let n = other.as_i64()? as u32;
            Some((n, n))
        }
    }
}

/// Parse a `NodeImpl::port_enum_params(Buffers, ...)` candidate into a
/// [`BufferRequest`], reading the well-known `prop::*` property ids.
/// Returns `None` if the candidate is missing a required property.
pub fn request_from_pod(pod: &Pod) -> Option<BufferRequest> {
    let (_, properties) = pod.as_object()?;
    let (min_buffers, max_buffers) = prop_range(properties, prop::BUFFERS)?;
    Some(BufferRequest {
        min_buffers,
        max_buffers,
        blocks: prop_u32(properties, prop::BLOCKS).unwrap_or(1),
        size: prop_u32(properties, prop::SIZE)?,
        stride: prop_u32(properties, prop::STRIDE).unwrap_or(0),
        align: prop_u32(properties, prop::ALIGN).unwrap_or(CPU_MAX_ALIGN),
        data_type: prop_u32(properties, prop::DATA_TYPE)?,
        meta_type: prop_u32(properties, prop::META_TYPE).unwrap_or(0),
        is_async: prop_u32(properties, prop::ASYNC).unwrap_or(0) != 0,
    })
}

/// Apply the negotiated parameters to both endpoints via `port_use_buffers`
/// once a pool has been allocated and mapped (spec §4.5.3/§4.5.4 boundary).
pub fn apply_buffers(
    input: &mut dyn crate::node::node_impl::NodeImpl,
    input_port: u32,
    output: &mut dyn crate::node::node_impl::NodeImpl,
    output_port: u32,
    params: BufferParams,
) -> Result<(AsyncStatus, AsyncStatus), CoreError> {
    let a = input.port_use_buffers(input_port, params.buffers, params.size)?;
    let b = output.port_use_buffers(output_port, params.buffers, params.size)?;
    Ok((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> BufferRequest {
        BufferRequest {
            min_buffers: 1,
            max_buffers: 8,
            blocks: 1,
            size: 4096,
            stride: 4096,
            align: 16,
            data_type: 0b0011,
            meta_type: 0,
            is_async: false,
        }
    }

    #[test]
    fn async_minimum_overrides_a_lower_advertised_ceiling() {
        // Spec §8's boundary case: max_buffers = 1 with Async = true must
        // still return 2, the systemic async floor overriding the ceiling
        // both sides otherwise capped themselves to.
        let mut a = req();
        a.min_buffers = 1;
        a.max_buffers = 1;
        let mut b = req();
        b.min_buffers = 1;
        b.max_buffers = 1;
        b.is_async = true;
        let params = filter_buffers(&a, &b).unwrap();
        assert_eq!(params.buffers, 2);
    }

    #[test]
    fn negotiated_count_is_the_shared_ceiling_not_the_floor() {
        let a = req();
        let mut b = req();
        b.is_async = true;
        let params = filter_buffers(&a, &b).unwrap();
        assert_eq!(params.buffers, 8);
    }

    #[test]
    fn size_and_align_take_the_max_of_both_sides() {
        let a = req();
        let mut b = req();
        b.size = 8192;
        b.align = 64;
        let params = filter_buffers(&a, &b).unwrap();
        assert_eq!(params.size, 8192);
        assert_eq!(params.align, 64);
    }

    #[test]
    fn disjoint_data_types_are_rejected() {
        let a = req();
        let mut b = req();
        b.data_type = 0b1100;
        assert_eq!(filter_buffers(&a, &b).unwrap_err().code, ErrorCode::BufferNotAccepted);
    }

    #[test]
    fn buffer_count_never_exceeds_the_link_ceiling() {
        let mut a = req();
        a.max_buffers = 1000;
        let mut b = req();
        b.max_buffers = 1000;
        let params = filter_buffers(&a, &b).unwrap();
        assert_eq!(params.buffers, LINK_MAX_BUFFERS);
    }

    #[test]
    fn request_from_pod_reads_the_well_known_properties() {
        let pod = Pod::Object {
            type_id: Id(1),
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
                (prop::DATA_TYPE, Pod::Int(0b0011)),
            ],
        };
        let req = request_from_pod(&pod).unwrap();
        assert_eq!(req.min_buffers, 1);
        assert_eq!(req.max_buffers, 8);
        assert_eq!(req.size, 4096);
        assert_eq!(req.align, CPU_MAX_ALIGN);
        assert!(!req.is_async);
    }

    #[test]
    fn incompatible_buffer_count_ranges_fail() {
        let mut a = req();
        a.min_buffers = 1;
        a.max_buffers = 2;
        let mut b = req();
        b.min_buffers = 5;
        b.max_buffers = 8;
        assert_eq!(filter_buffers(&a, &b).unwrap_err().code, ErrorCode::BufferNotAccepted);
    }
}
