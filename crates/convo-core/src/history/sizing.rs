//! Byte-cost estimation for stored message records
//!
//! The estimate is computed once per insertion and cached alongside the
//! slot, so memory-budget checks never re-serialize a record.

use crate::error::Result;
use crate::message::Message;

/// Fixed bookkeeping overhead charged per stored entry, in bytes
///
/// Approximates the slot, cached size, and allocation headers that
/// accompany every record beyond its encoded payload.
pub const ENTRY_OVERHEAD_BYTES: u64 = 256;

/// Additional overhead charged per identifier-index entry, in bytes
pub const INDEX_ENTRY_OVERHEAD_BYTES: u64 = 64;

/// Estimate the memory cost of a message record
///
/// Deterministic and side-effect free: canonical encoding length plus
/// [`ENTRY_OVERHEAD_BYTES`], plus the identifier-index entry cost when
/// indexing is enabled. An encoding failure propagates unchanged and
/// aborts the enclosing insertion before any mutation occurs.
pub fn estimate_size(msg: &dyn Message, indexing_enabled: bool) -> Result<u64> {
    let encoded = msg.to_json()?;

    let mut size = encoded.len() as u64 + ENTRY_OVERHEAD_BYTES;
    if indexing_enabled {
        size += msg.id().len() as u64 + INDEX_ENTRY_OVERHEAD_BYTES;
    }

    Ok(size)
}
