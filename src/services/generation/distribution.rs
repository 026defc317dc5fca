use crate::db::types::DifficultyLevel;

/// Remainders are handed out in this order when fractional parts tie.
const TIE_BREAK: [DifficultyLevel; 3] =
    [DifficultyLevel::Hard, DifficultyLevel::Medium, DifficultyLevel::Easy];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BucketShortage {
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) available: usize,
    pub(crate) required: u32,
}

/// Splits `total` across the easy/medium/hard buckets proportionally to
/// `weights / weight_sum`, using the largest-remainder method.
pub(crate) fn apportion(total: u32, weights: [u32; 3], weight_sum: u32) -> [u32; 3] {
    if weight_sum == 0 {
        return [0; 3];
    }

    let mut counts = [0u32; 3];
    let mut remainders = [0u64; 3];
    for difficulty in DifficultyLevel::ALL {
        let index = difficulty.index();
        let exact = u64::from(total) * u64::from(weights[index]);
        counts[index] = (exact / u64::from(weight_sum)) as u32;
        remainders[index] = exact % u64::from(weight_sum);
    }

    let mut order = TIE_BREAK;
    // Stable sort keeps the hard, medium, easy preference among equal remainders.
    order.sort_by(|left, right| remainders[right.index()].cmp(&remainders[left.index()]));

    let assigned: u32 = counts.iter().sum();
    let missing = total.saturating_sub(assigned) as usize;
    for difficulty in order.iter().cycle().take(missing) {
        counts[difficulty.index()] += 1;
    }

    counts
}

/// Per-bucket target counts for a requested total and percentage split.
pub(crate) fn bucket_counts(total: u32, percentages: [u32; 3]) -> [u32; 3] {
    apportion(total, percentages, 100)
}

/// Percentages implied by an explicit selection, summing to 100.
pub(crate) fn derive_percentages(counts: [u32; 3]) -> [u32; 3] {
    let total: u32 = counts.iter().sum();
    apportion(100, counts, total)
}

pub(crate) fn validate_percentages(percentages: [u32; 3]) -> Result<(), String> {
    if let Some(bad) = percentages.iter().find(|value| **value > 100) {
        return Err(format!("difficulty percentages must be between 0 and 100, got {bad}"));
    }

    let sum: u32 = percentages.iter().sum();
    if sum != 100 {
        return Err(format!("difficulty percentages must sum to 100, got {sum}"));
    }

    Ok(())
}

pub(crate) fn shortages(available: [usize; 3], required: [u32; 3]) -> Vec<BucketShortage> {
    DifficultyLevel::ALL
        .into_iter()
        .filter(|difficulty| available[difficulty.index()] < required[difficulty.index()] as usize)
        .map(|difficulty| BucketShortage {
            difficulty,
            available: available[difficulty.index()],
            required: required[difficulty.index()],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_split_has_no_remainder() {
        assert_eq!(bucket_counts(10, [30, 50, 20]), [3, 5, 2]);
    }

    #[test]
    fn remainder_goes_to_largest_fraction() {
        // 7 * [33, 33, 34] = [2.31, 2.31, 2.38]
        assert_eq!(bucket_counts(7, [33, 33, 34]), [2, 2, 3]);
        // 5 * [50, 30, 20] = [2.5, 1.5, 1.0]; the .5 tie prefers medium over easy.
        assert_eq!(bucket_counts(5, [50, 30, 20]), [2, 2, 1]);
    }

    #[test]
    fn ties_break_hard_then_medium_then_easy() {
        // 1 * [33, 33, 34]: remainders 33, 33, 34 -> hard
        assert_eq!(bucket_counts(1, [33, 33, 34]), [0, 0, 1]);
        // 1 * [50, 0, 50]: remainders 50, 0, 50 -> hard before easy
        assert_eq!(bucket_counts(1, [50, 0, 50]), [0, 0, 1]);
        // 2 * [34, 33, 33]: easy has the largest remainder, then hard wins the tie
        assert_eq!(bucket_counts(2, [34, 33, 33]), [1, 0, 1]);
    }

    #[test]
    fn counts_always_sum_to_total() {
        let splits = [[0, 0, 100], [1, 1, 98], [33, 33, 34], [10, 45, 45], [99, 0, 1], [20, 60, 20]];
        for total in 0..=60 {
            for split in splits {
                let counts = bucket_counts(total, split);
                assert_eq!(counts.iter().sum::<u32>(), total, "total {total} split {split:?}");
            }
        }
    }

    #[test]
    fn derived_percentages_sum_to_hundred() {
        assert_eq!(derive_percentages([1, 1, 1]), [33, 33, 34]);
        assert_eq!(derive_percentages([2, 0, 2]), [50, 0, 50]);
        assert_eq!(derive_percentages([0, 3, 0]), [0, 100, 0]);
    }

    #[test]
    fn percentages_must_sum_to_hundred() {
        assert!(validate_percentages([30, 40, 30]).is_ok());
        assert_eq!(
            validate_percentages([30, 40, 20]).unwrap_err(),
            "difficulty percentages must sum to 100, got 90"
        );
        assert!(validate_percentages([150, 0, 0]).is_err());
    }

    #[test]
    fn shortages_report_available_and_required() {
        let found = shortages([5, 1, 0], [3, 2, 0]);
        assert_eq!(
            found,
            vec![BucketShortage { difficulty: DifficultyLevel::Medium, available: 1, required: 2 }]
        );
    }
}
