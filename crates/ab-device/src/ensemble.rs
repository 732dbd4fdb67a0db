//! Ensemble dispatch: one launch covering several simulation instances.
//!
//! Instance `i` owns threads `offsets[i]..offsets[i + 1]`.  Each thread
//! recovers its instance with a binary search over the offsets.

use ab_core::AbError;

/// Exclusive prefix sum of per-instance thread counts: `[0, n0, n0+n1, …]`.
///
/// The result has `counts.len() + 1` entries; the last is the total thread
/// count of the launch.  Fails with `InvalidArgument` if the total does not
/// fit a `u32` thread index.
pub fn instance_offsets(counts: &[u32]) -> Result<Vec<u32>, AbError> {
    let mut offsets = Vec::with_capacity(counts.len() + 1);
    let mut total = 0u32;
    offsets.push(total);
    for &n in counts {
        total = total.checked_add(n).ok_or_else(|| {
            AbError::InvalidArgument(format!("ensemble of {} instances exceeds {} threads", counts.len(), u32::MAX))
        })?;
        offsets.push(total);
    }
    Ok(offsets)
}

/// The instance owning `thread`: the smallest `min` with
/// `thread < offsets[min + 1]`.
///
/// Zero-length instances never own a thread.  `offsets` must come from
/// [`instance_offsets`] and `thread` must be below the total.
#[inline]
pub fn resolve_instance(offsets: &[u32], thread: u32) -> usize {
    let mut min = 0;
    let mut max = offsets.len().saturating_sub(1);
    while min + 1 < max {
        let val = min + (max - min) / 2;
        if thread < offsets[val] {
            max = val;
        } else {
            min = val;
        }
    }
    min
}
