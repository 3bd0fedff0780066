// [libs/domain/planner/src/rule_split.rs]
/*!
 * Rule-file slicing, the alternative to keyspace splitting for jobs with a
 * huge rule multiplier and a small base wordlist. Partitions
 * `[0, total_rule_lines)` into `slice_count` contiguous, near-equal index
 * ranges. The dispatcher pairs each slice with the *full* word range; only
 * the rule dimension is split.
 */

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSlice {
    pub rule_start_index: u32,
    pub rule_end_index: u32,
}

/// Splits `total_rule_lines` rule-file lines into `slice_count` contiguous
/// ranges, distributing the remainder across the first ranges one line at a
/// time so every slice differs in size by at most one line.
pub fn split_rule_indices(total_rule_lines: u32, slice_count: u32) -> Vec<RuleSlice> {
    if slice_count == 0 || total_rule_lines == 0 {
        return Vec::new();
    }
    let slice_count = slice_count.min(total_rule_lines);
    let base_size = total_rule_lines / slice_count;
    let remainder = total_rule_lines % slice_count;

    let mut slices = Vec::with_capacity(slice_count as usize);
    let mut cursor = 0u32;
    for i in 0..slice_count {
        let this_size = base_size + if i < remainder { 1 } else { 0 };
        slices.push(RuleSlice { rule_start_index: cursor, rule_end_index: cursor + this_size });
        cursor += this_size;
    }
    slices
}

/// Content-addressed path for a pre-materialized rule-chunk file, under the
/// file-sync server's `rule-chunks/{job_id}/{chunk_name}` category. The
/// coordinator writes the slice to this path; agents pull it lazily before
/// the chunk can transition past `assigned`.
pub fn rule_chunk_path(job_id: Uuid, chunk_number: u32) -> String {
    format!("rule-chunks/{job_id}/slice_{chunk_number:04}.rule")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_evenly_when_divisible() {
        let slices = split_rule_indices(100, 10);
        assert_eq!(slices.len(), 10);
        assert_eq!(slices[0], RuleSlice { rule_start_index: 0, rule_end_index: 10 });
        assert_eq!(slices[9], RuleSlice { rule_start_index: 90, rule_end_index: 100 });
    }

    #[test]
    fn distributes_remainder_across_leading_slices() {
        let slices = split_rule_indices(101, 10);
        assert_eq!(slices[0].rule_end_index - slices[0].rule_start_index, 11);
        assert_eq!(slices[9].rule_end_index - slices[9].rule_start_index, 10);
        // Contiguous, no gaps or overlaps.
        for window in slices.windows(2) {
            assert_eq!(window[0].rule_end_index, window[1].rule_start_index);
        }
        assert_eq!(slices.last().unwrap().rule_end_index, 101);
    }

    #[test]
    fn slice_count_capped_at_total_lines() {
        let slices = split_rule_indices(5, 1000);
        assert_eq!(slices.len(), 5);
        assert!(slices.iter().all(|s| s.rule_end_index - s.rule_start_index == 1));
    }

    #[test]
    fn empty_inputs_yield_no_slices() {
        assert!(split_rule_indices(0, 10).is_empty());
        assert!(split_rule_indices(10, 0).is_empty());
    }
}
