//! Chunk partitioning for distributed runs.
//!
//! A run over `total` independent work items is split across `size`
//! processes. Every rank receives a contiguous range; the first
//! `total % size` ranks take one extra item so that chunk lengths differ by
//! at most one. Ranks do not communicate: each accumulates its own partial
//! result and the caller reduces them.

use std::ops::Range;

use crate::backend::ComputeError;

/// Contiguous share of `0..total` owned by `rank` out of `size` ranks.
pub fn chunk_range(total: usize, rank: usize, size: usize) -> Result<Range<usize>, ComputeError> {
    if size == 0 {
        return Err(ComputeError::Partition("number of ranks must be at least 1".into()));
    }
    if rank >= size {
        return Err(ComputeError::Partition(format!(
            "rank {rank} is out of range for {size} ranks"
        )));
    }
    let chunk = total / size;
    let left = total % size;
    let (start, len) = if rank < left {
        (rank * (chunk + 1), chunk + 1)
    } else {
        (left * (chunk + 1) + (rank - left) * chunk, chunk)
    };
    Ok(start..start + len)
}
