//! Complexity-ordered batch partitioning.

use tracing::{debug, instrument};

use lessonforge_shared::{Batch, LessonForgeError, Result, TopicRecord};

/// Stable sort by complexity rank, simplest first. Records of equal rank
/// keep their catalog order.
pub fn order_by_complexity(mut records: Vec<TopicRecord>) -> Vec<TopicRecord> {
    records.sort_by_key(|r| r.complexity.rank());
    records
}

/// Sizes of `batch_count` contiguous slices over `total` records.
///
/// Every slice is `total / batch_count` long and the first
/// `total % batch_count` slices get one extra.
pub fn batch_sizes(total: usize, batch_count: usize) -> Vec<usize> {
    if batch_count == 0 {
        return Vec::new();
    }
    let base = total / batch_count;
    let remainder = total % batch_count;
    (0..batch_count)
        .map(|i| base + usize::from(i < remainder))
        .collect()
}

/// Split records into exactly `batch_count` batches (ids `1..=batch_count`).
///
/// Fewer records than batches yields trailing empty batches.
#[instrument(skip_all, fields(batch_count))]
pub fn partition(records: Vec<TopicRecord>, batch_count: usize) -> Result<Vec<Batch>> {
    if batch_count == 0 {
        return Err(LessonForgeError::validation("batch count must be at least 1"));
    }

    let total = records.len();
    let mut ordered = order_by_complexity(records).into_iter();

    let batches: Vec<Batch> = batch_sizes(total, batch_count)
        .into_iter()
        .enumerate()
        .map(|(i, size)| Batch {
            id: i + 1,
            records: ordered.by_ref().take(size).collect(),
        })
        .collect();

    debug!(total, batches = batches.len(), "partitioned topics");
    Ok(batches)
}
