//! Probe-then-fetch buffer growth.
//!
//! Variable-length results (xattr values, link targets, pool names) are
//! fetched into a buffer whose required size may be unknown or may change
//! between a size lookup and the fetch. The helper retries on a
//! range-too-small signal: reallocating to the exact reported size when
//! the service knows it, doubling otherwise. Allocation failures classify
//! as out-of-memory; a loop that cannot converge classifies as io-failure.

use crate::error::{ClientError, Result};

/// Retry bound for a single fetch. A result that keeps growing faster
/// than the buffer for this many rounds is treated as an I/O failure.
const MAX_PROBE_ATTEMPTS: u32 = 32;

/// Calls `fetch` with a growing scratch buffer until it fits, returning
/// the filled prefix. `fetch` reports the number of bytes written, or
/// [`ClientError::RangeTooSmall`] when the buffer is undersized.
pub fn fetch_with_probe<F>(initial: usize, mut fetch: F) -> Result<Vec<u8>>
where
    F: FnMut(&mut [u8]) -> Result<usize>,
{
    let mut capacity = initial.max(1);
    for _ in 0..MAX_PROBE_ATTEMPTS {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| ClientError::OutOfMemory)?;
        buf.resize(capacity, 0);
        match fetch(&mut buf) {
            Ok(len) => {
                buf.truncate(len);
                return Ok(buf);
            }
            Err(ClientError::RangeTooSmall {
                needed: Some(needed),
            }) => {
                // exact size reported; one more round suffices unless the
                // result grows again underneath us
                capacity = needed.max(capacity + 1);
            }
            Err(ClientError::RangeTooSmall { needed: None }) => {
                capacity = capacity.checked_mul(2).ok_or(ClientError::OutOfMemory)?;
            }
            Err(e) => return Err(e),
        }
    }
    Err(ClientError::Io {
        msg: "result size kept growing during fetch".into(),
    })
}
