//! Format and buffer negotiation (spec §4.5): the param filter intersection
//! algorithm, the four-phase Link negotiation it drives, and the buffer
//! pool layout packer.

pub mod buffers;
pub mod format;
pub mod layout;
pub mod param_filter;
