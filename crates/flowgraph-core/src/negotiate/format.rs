use flowgraph_types::{Choice, Pod};

use crate::error::{CoreError, ErrorCode};
use crate::negotiate::param_filter::filter_pod;
use crate::node::node_impl::{NodeImpl, ParamId};

/// Enumerate candidates from the Input port (index 0, 1, 2, ...); for each,
/// enumerate the Output side filtered by it; return the first
/// filter-of-filters that succeeds (spec §4.5.1's "consumer-filtered-
/// producer" sequencing). An empty output enumeration for a given input
/// candidate just moves on to the next candidate; exhausting the input
/// side with zero results across the board is `FormatIncompatible`.
pub fn negotiate_format(
    input: &dyn NodeImpl,
    input_port_id: u32,
    output: &dyn NodeImpl,
    output_port_id: u32,
) -> Result<Pod, CoreError> {
    let mut start = 0u32;
    loop {
        let input_candidates = input.port_enum_params(input_port_id, ParamId::EnumFormat, start, None);
        if input_candidates.is_empty() {
            return Err(CoreError::new(ErrorCode::FormatIncompatible, "input EnumFormat exhausted with no match"));
        }
        for candidate in &input_candidates {
            let output_results = output.port_enum_params(output_port_id, ParamId::EnumFormat, 0, Some(candidate));
            for result in &output_results {
                if let Ok(combined) = filter_pod(candidate, result) {
                    return Ok(combined);
                }
            }
        }
        start += input_candidates.len() as u32;
    }
}

/// Phase 2 (spec §4.5.2): reduce every property's `Choice` to a single
/// concrete value. Ranges without a declared in-priority preference pick
/// `max` (the spec's stated default, typical for sample rate); enums pick
/// their first surviving alternative; flags fixate to the union of
/// surviving bits.
pub fn fixate(pod: &Pod) -> Pod {
    match pod {
        Pod::Object { type_id, properties } => Pod::Object {
            type_id: *type_id,
            properties: properties.iter().map(|(id, v)| (*id, fixate_value(v))).collect(),
        },
        other => fixate_value(other),
    }
}

fn fixate_value(v: &Pod) -> Pod {
    match v {
        Pod::Choice(c) => match c.as_ref() {
            Choice::None(val) => val.clone(),
            Choice::Range { max, .. } => max.clone(),
            Choice::Enum { alternatives, default } => alternatives.first().cloned().unwrap_or_else(|| default.clone()),
            Choice::Flags { flags, default } => {
                if flags.is_empty() {
                    return default.clone();
                }
                let bits = flags.iter().fold(0i64, |acc, f| acc | f.as_i64().unwrap_or(0));
                flags[0].from_f64_like(bits as f64)
            }
            // Step never survives phase 1 (always rejected by the param
            // filter); fall back to its declared default defensively.
            Choice::Step { default, .. } => default.clone(),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_types::Id;
    use std::cell::RefCell;

    struct StubPort {
        candidates: Vec<Pod>,
    }

    struct StubNode {
        input: RefCell<StubPort>,
        output: RefCell<StubPort>,
    }

    impl crate::node::node_impl::NodeImpl for StubNode {
        fn get_info(&self) -> crate::node::node_impl::NodeInfo {
            unimplemented!()
        }
        fn enum_params(&self, _id: ParamId, _start: u32, _filter: Option<&Pod>) -> Vec<Pod> {
            vec![]
        }
        fn set_param(&mut self, _id: ParamId, _pod: Pod) -> Result<crate::node::node_impl::AsyncStatus, CoreError> {
            unimplemented!()
        }
        fn set_io(&mut self, _id: crate::node::node_impl::IoType, _ptr: *mut u8, _size: usize) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn send_command(&mut self, _cmd: crate::node::node_impl::Command) -> Result<crate::node::node_impl::AsyncStatus, CoreError> {
            unimplemented!()
        }
        fn add_port(&mut self, _direction: crate::node::node_impl::Direction) -> Result<u32, CoreError> {
            unimplemented!()
        }
        fn remove_port(&mut self, _port_id: u32) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn port_enum_params(&self, port_id: u32, id: ParamId, start: u32, filter: Option<&Pod>) -> Vec<Pod> {
            assert_eq!(id, ParamId::EnumFormat);
            let port = if port_id == 0 { &self.input } else { &self.output };
            if filter.is_some() {
                // producer side: only ever called with start=0 per the algorithm.
                assert_eq!(start, 0);
            }
            let candidates = &port.borrow().candidates;
            match filter {
                None => candidates.get(start as usize..).map(|s| s.to_vec()).unwrap_or_default(),
                Some(f) => candidates.iter().filter(|c| filter_pod(f, c).is_ok()).cloned().collect(),
            }
        }
        fn port_set_param(&mut self, _port_id: u32, _id: ParamId, _pod: Pod) -> Result<crate::node::node_impl::AsyncStatus, CoreError> {
            unimplemented!()
        }
        fn port_set_io(&mut self, _port_id: u32, _id: crate::node::node_impl::IoType, _ptr: *mut u8, _size: usize) -> Result<(), CoreError> {
            unimplemented!()
        }
        fn port_use_buffers(&mut self, _port_id: u32, _buffer_count: u32, _buffer_size: u32) -> Result<crate::node::node_impl::AsyncStatus, CoreError> {
            unimplemented!()
        }
        fn port_alloc_buffers(&mut self, _port_id: u32, _buffer_count: u32, _buffer_size: u32) -> Result<crate::node::node_impl::AsyncStatus, CoreError> {
            unimplemented!()
        }
        fn port_reuse_buffer(&mut self, _port_id: u32, _buffer_id: u32) {}
        fn process(&mut self) -> crate::node::node_impl::ProcessStatus {
            Default::default()
        }
    }

    fn rate_obj(rate: Pod) -> Pod {
        Pod::Object {
            type_id: Id(1),
            properties: vec![(Id(1), rate)],
        }
    }

    #[test]
    fn negotiation_picks_first_viable_candidate_and_fixates_to_max_rate() {
        let driver_offer = rate_obj(Pod::Choice(Box::new(Choice::Range {
            default: Pod::Int(44100),
            min: Pod::Int(44100),
            max: Pod::Int(192000),
        })));
        let node = StubNode {
            input: RefCell::new(StubPort {
                candidates: vec![rate_obj(Pod::Int(48000))],
            }),
            output: RefCell::new(StubPort {
                candidates: vec![driver_offer],
            }),
        };
        let combined = negotiate_format(&node, 0, &node, 1).unwrap();
        let fixed = fixate(&combined);
        let (_, props) = fixed.as_object().unwrap();
        assert_eq!(props[0].1, Pod::Int(48000));
    }

    #[test]
    fn exhausted_enumeration_is_format_incompatible() {
        let node = StubNode {
            input: RefCell::new(StubPort { candidates: vec![] }),
            output: RefCell::new(StubPort { candidates: vec![] }),
        };
        let err = negotiate_format(&node, 0, &node, 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::FormatIncompatible);
    }
}
