//! Length-prefixed framing for the Unix domain socket transport.
//!
//! Wire format: `[u32 length (big-endian)][JSON payload]`. File descriptors
//! (pool blocks) travel out of band via `SCM_RIGHTS` ancillary data on the
//! same socket, keyed by the sequence number carried in the accompanying
//! message — out of scope here, owned by `flowgraph-serverd`'s socket
//! plumbing.

use std::io::{self, Read, Write};

use serde::{de::DeserializeOwned, Serialize};

/// Reject messages larger than this; a well-formed client never needs to
/// send more than a handful of kilobytes in one frame.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub fn write_message<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> io::Result<()> {
    let payload = serde_json::to_vec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()
}

pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("frame too large: {len} bytes")));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    serde_json::from_slice(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Serialize to a length-prefixed byte buffer without writing to a stream,
/// for callers (the broadcast/fanout path) that build a frame once and hand
/// it to several sockets.
pub fn serialize_frame<T: Serialize>(msg: &T) -> io::Result<Vec<u8>> {
    let payload = serde_json::to_vec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}
