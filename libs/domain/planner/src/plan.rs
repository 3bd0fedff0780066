// [libs/domain/planner/src/plan.rs]
/*!
 * Job planner. Converts a job configuration into an ordered sequence of
 * chunks with keyspace windows and rule windows. Deterministic given
 * identical inputs and settings; does not consult agent state — dispatch
 * eligibility belongs to the dispatcher.
 */

use crate::errors::PlannerError;
use crate::rule_split::{rule_chunk_path, split_rule_indices};
use prospector_core_keyspace::{compute_chunk_windows, mask_keyspace};
use prospector_domain_models::{AttackConfig, AttackMode, SchedulerSettings};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChunk {
    pub chunk_number: u32,
    pub keyspace_start: u64,
    pub keyspace_end: u64,
    pub effective_keyspace_start: u64,
    pub effective_keyspace_end: u64,
    pub rule_start_index: Option<u32>,
    pub rule_end_index: Option<u32>,
    pub rule_chunk_path: Option<String>,
    pub is_rule_split_task: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    pub base_keyspace: u64,
    /// Naive effective keyspace = base * product(rule line counts). The
    /// true value is only known once the first chunk reports actual rule
    /// application counts; this is the estimate the planner works from
    /// until that correction arrives.
    pub naive_effective_keyspace: u64,
    pub rule_count: u64,
    pub uses_rule_splitting: bool,
    pub chunks: Vec<PlannedChunk>,
}

/// Everything the planner needs to size a job's chunks. Rates are expressed
/// in effective candidates/sec (what the engine itself reports); the
/// planner divides by the rule multiplier internally to get word-position
/// rates for chunk-window math, since `(skip, limit)` on the wire are
/// always in wordlist-word units.
#[derive(Debug, Clone)]
pub struct PlannerInput {
    pub job_id: Uuid,
    pub attack_mode: AttackMode,
    pub wordlist_word_counts: Vec<u64>,
    pub rule_line_counts: Vec<u64>,
    pub mask: Option<String>,
    pub custom_charsets: HashMap<char, String>,
    /// Aggregate effective rate across the whole fleet, used for the
    /// small-job guard and the rule-split threshold estimate.
    pub fleet_aggregate_rate_per_sec: u64,
    /// A representative single agent's effective rate, used to size
    /// keyspace-split chunk windows.
    pub reference_agent_rate_per_sec: u64,
    pub settings: SchedulerSettings,
}

fn base_keyspace(input: &PlannerInput) -> Result<u64, PlannerError> {
    match input.attack_mode {
        AttackMode::Dictionary => {
            if input.wordlist_word_counts.is_empty() {
                return Err(PlannerError::MissingWordlists(1));
            }
            Ok(input.wordlist_word_counts.iter().sum())
        }
        AttackMode::Combination => {
            if input.wordlist_word_counts.len() < 2 {
                return Err(PlannerError::MissingWordlists(2));
            }
            Ok(input.wordlist_word_counts[0].saturating_mul(input.wordlist_word_counts[1]))
        }
        AttackMode::Mask => {
            let mask = input.mask.as_deref().ok_or(PlannerError::MissingMask)?;
            let keyspace = mask_keyspace(mask, &input.custom_charsets)?;
            Ok(keyspace.min(u64::MAX as u128) as u64)
        }
        AttackMode::HybridWordlistMask | AttackMode::HybridMaskWordlist => {
            if input.wordlist_word_counts.is_empty() {
                return Err(PlannerError::MissingWordlists(1));
            }
            let mask = input.mask.as_deref().ok_or(PlannerError::MissingMask)?;
            let mask_size = mask_keyspace(mask, &input.custom_charsets)?;
            let words: u64 = input.wordlist_word_counts.iter().sum();
            let combined = (words as u128).saturating_mul(mask_size);
            Ok(combined.min(u64::MAX as u128) as u64)
        }
    }
}

fn naive_rule_multiplier(input: &PlannerInput) -> u64 {
    if input.rule_line_counts.is_empty() {
        return 1;
    }
    input.rule_line_counts.iter().fold(1u64, |acc, &c| acc.saturating_mul(c.max(1)))
}

fn total_rule_lines(input: &PlannerInput) -> u32 {
    input.rule_line_counts.iter().sum::<u64>().min(u32::MAX as u64) as u32
}

/// Expands a job configuration into a deterministic chunk plan.
pub fn plan_job(input: &PlannerInput) -> Result<ChunkPlan, PlannerError> {
    let base = base_keyspace(input)?;
    let rule_count = naive_rule_multiplier(input);
    let naive_effective = base.saturating_mul(rule_count);

    let target_duration = input
        .settings
        .clamped_chunk_duration(input.settings.default_chunk_duration_secs);

    let estimated_runtime_secs = naive_effective / input.fleet_aggregate_rate_per_sec.max(1);

    // Small-job guard: a job too small to be worth splitting runs as one chunk.
    if estimated_runtime_secs < input.settings.min_chunk_duration_secs as u64 {
        return Ok(ChunkPlan {
            base_keyspace: base,
            naive_effective_keyspace: naive_effective,
            rule_count,
            uses_rule_splitting: false,
            chunks: vec![PlannedChunk {
                chunk_number: 1,
                keyspace_start: 0,
                keyspace_end: base,
                effective_keyspace_start: 0,
                effective_keyspace_end: naive_effective,
                rule_start_index: None,
                rule_end_index: None,
                rule_chunk_path: None,
                is_rule_split_task: false,
            }],
        });
    }

    let rule_lines_total = total_rule_lines(input);
    let rule_split_eligible = input.settings.rule_split_enabled
        && rule_lines_total > input.settings.rule_split_min_rules
        && estimated_runtime_secs
            > (input.settings.rule_split_threshold * target_duration as f64) as u64;

    if rule_split_eligible {
        let desired_chunks = (estimated_runtime_secs as f64 / target_duration as f64).ceil() as u32;
        let slice_count = desired_chunks.clamp(1, input.settings.rule_split_max_chunks);
        let slices = split_rule_indices(rule_lines_total, slice_count);

        let chunks = slices
            .into_iter()
            .enumerate()
            .map(|(i, slice)| {
                let chunk_number = (i + 1) as u32;
                let rule_lines_in_slice = (slice.rule_end_index - slice.rule_start_index) as u64;
                let effective_size = base.saturating_mul(rule_lines_in_slice);
                PlannedChunk {
                    chunk_number,
                    keyspace_start: 0,
                    keyspace_end: base,
                    effective_keyspace_start: 0,
                    effective_keyspace_end: effective_size,
                    rule_start_index: Some(slice.rule_start_index),
                    rule_end_index: Some(slice.rule_end_index),
                    rule_chunk_path: Some(rule_chunk_path(input.job_id, chunk_number)),
                    is_rule_split_task: true,
                }
            })
            .collect();

        return Ok(ChunkPlan {
            base_keyspace: base,
            naive_effective_keyspace: naive_effective,
            rule_count,
            uses_rule_splitting: true,
            chunks,
        });
    }

    // Default: keyspace splitting. Word-position rate = effective rate / rule
    // multiplier, since one word produces `rule_count` candidates.
    let word_rate = (input.reference_agent_rate_per_sec / rule_count.max(1)).max(1);
    let windows = compute_chunk_windows(
        base,
        word_rate,
        target_duration as u64,
        input.settings.chunk_fluctuation_percentage,
    )?;

    let chunks = windows
        .into_iter()
        .enumerate()
        .map(|(i, window)| PlannedChunk {
            chunk_number: (i + 1) as u32,
            keyspace_start: window.skip,
            keyspace_end: window.end(),
            effective_keyspace_start: window.skip.saturating_mul(rule_count),
            effective_keyspace_end: window.end().saturating_mul(rule_count),
            rule_start_index: None,
            rule_end_index: None,
            rule_chunk_path: None,
            is_rule_split_task: false,
        })
        .collect();

    Ok(ChunkPlan {
        base_keyspace: base,
        naive_effective_keyspace: naive_effective,
        rule_count,
        uses_rule_splitting: false,
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_with(
        mode: AttackMode,
        wordlists: Vec<u64>,
        rules: Vec<u64>,
        mask: Option<&str>,
    ) -> PlannerInput {
        PlannerInput {
            job_id: Uuid::new_v4(),
            attack_mode: mode,
            wordlist_word_counts: wordlists,
            rule_line_counts: rules,
            mask: mask.map(String::from),
            custom_charsets: HashMap::new(),
            fleet_aggregate_rate_per_sec: 100_000,
            reference_agent_rate_per_sec: 100_000,
            settings: SchedulerSettings::default(),
        }
    }

    #[test]
    fn plain_dictionary_no_rules_ten_chunks() {
        let input = input_with(AttackMode::Dictionary, vec![1_000_000], vec![], None);
        let plan = plan_job(&input).unwrap();
        assert!(!plan.uses_rule_splitting);
        assert_eq!(plan.chunks.len(), 10);
        assert_eq!(plan.chunks[0].keyspace_end - plan.chunks[0].keyspace_start, 100_000);
        let total: u64 = plan.chunks.iter().map(|c| c.keyspace_end - c.keyspace_start).sum();
        assert_eq!(total, 1_000_000);
    }

    #[test]
    fn rule_multiplier_naive_effective_is_product() {
        let mut input = input_with(AttackMode::Dictionary, vec![100_000], vec![10], None);
        input.fleet_aggregate_rate_per_sec = 1000;
        input.reference_agent_rate_per_sec = 1000;
        let plan = plan_job(&input).unwrap();
        assert_eq!(plan.rule_count, 10);
        assert_eq!(plan.naive_effective_keyspace, 1_000_000);
    }

    #[test]
    fn small_job_guard_emits_single_chunk() {
        let input = input_with(AttackMode::Dictionary, vec![100], vec![], None);
        let plan = plan_job(&input).unwrap();
        assert_eq!(plan.chunks.len(), 1);
        assert_eq!(plan.chunks[0].keyspace_start, 0);
        assert_eq!(plan.chunks[0].keyspace_end, 100);
    }

    #[test]
    fn rule_split_job_produces_capped_slices() {
        let mut input = input_with(AttackMode::Dictionary, vec![10_000_000], vec![50_000], None);
        input.fleet_aggregate_rate_per_sec = 500_000;
        input.reference_agent_rate_per_sec = 500_000;
        let plan = plan_job(&input).unwrap();
        assert!(plan.uses_rule_splitting);
        assert!(plan.chunks.len() <= 1000);
        assert!(plan.chunks.iter().all(|c| c.is_rule_split_task));
        assert!(plan.chunks.iter().all(|c| c.rule_chunk_path.is_some()));
        // Full word range on every rule-split chunk.
        assert!(plan.chunks.iter().all(|c| c.keyspace_start == 0 && c.keyspace_end == 10_000_000));
    }

    #[test]
    fn combination_mode_multiplies_two_wordlists() {
        let input = input_with(AttackMode::Combination, vec![1000, 2000], vec![], None);
        let base = base_keyspace(&input).unwrap();
        assert_eq!(base, 2_000_000);
    }

    #[test]
    fn mask_mode_uses_mask_keyspace() {
        let input = input_with(AttackMode::Mask, vec![], vec![], Some("?d?d?d?d"));
        let base = base_keyspace(&input).unwrap();
        assert_eq!(base, 10_000);
    }

    #[test]
    fn mask_mode_without_mask_errors() {
        let input = input_with(AttackMode::Mask, vec![], vec![], None);
        assert_eq!(plan_job(&input).unwrap_err(), PlannerError::MissingMask);
    }

    #[test]
    fn combination_mode_needs_two_wordlists() {
        let input = input_with(AttackMode::Combination, vec![1000], vec![], None);
        assert_eq!(plan_job(&input).unwrap_err(), PlannerError::MissingWordlists(2));
    }

    #[test]
    fn plan_is_deterministic_across_identical_inputs() {
        let input = input_with(AttackMode::Dictionary, vec![500_000], vec![5], None);
        let plan_a = plan_job(&input).unwrap();
        let plan_b = plan_job(&input).unwrap();
        assert_eq!(plan_a, plan_b);
    }
}
