use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::table::Dataset;
use crate::error::{GateError, GateResult};

/// Deterministic train/test partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    /// Training rows.
    pub train: Dataset,
    /// Held-out rows.
    pub test: Dataset,
}

impl Split {
    /// Shuffles row indices with a ChaCha8 stream seeded by `seed` and holds out
    /// `ceil(n * test_ratio)` rows (at least one row on each side).
    pub fn new(dataset: &Dataset, test_ratio: f64, seed: u64) -> GateResult<Self> {
        let (train_idx, test_idx) = partition_indices(dataset.len(), test_ratio, seed)?;
        Ok(Self {
            train: dataset.select(&train_idx),
            test: dataset.select(&test_idx),
        })
    }
}

/// Index form of [`Split::new`]: `(train, test)` row indices.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn partition_indices(
    rows: usize,
    test_ratio: f64,
    seed: u64,
) -> GateResult<(Vec<usize>, Vec<usize>)> {
    if rows < 2 {
        return Err(GateError::EmptySplit(rows));
    }
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(GateError::Config(format!(
            "test_ratio must be in (0, 1), got {test_ratio}"
        )));
    }
    let test_len = ((rows as f64 * test_ratio).ceil() as usize).clamp(1, rows - 1);
    let mut order: Vec<usize> = (0..rows).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let train = order.split_off(test_len);
    Ok((train, order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::synthetic_dataset;

    #[test]
    fn uses_eighty_twenty_proportion() {
        let (train, test) = partition_indices(891, 0.2, 42).unwrap();
        assert_eq!(test.len(), 179);
        assert_eq!(train.len(), 712);
        let mut all: Vec<_> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..891).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_same_membership() {
        let dataset = synthetic_dataset(200, 9);
        let a = Split::new(&dataset, 0.2, 42).unwrap();
        let b = Split::new(&dataset, 0.2, 42).unwrap();
        assert_eq!(a, b);
        let c = Split::new(&dataset, 0.2, 43).unwrap();
        assert_ne!(a.test, c.test);
    }

    #[test]
    fn tiny_datasets_keep_both_sides() {
        let (train, test) = partition_indices(2, 0.9, 1).unwrap();
        assert_eq!((train.len(), test.len()), (1, 1));
        assert!(matches!(
            partition_indices(1, 0.2, 1),
            Err(GateError::EmptySplit(1))
        ));
    }
}
