use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, Result};

/// Share of every class held out for validation by default.
pub const DEFAULT_VAL_FRACTION: f64 = 0.2;

/// Partition of sample indices into training and validation sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Splits samples into train/validation sets, preserving per-class proportions.
///
/// Every class gives `round(val_fraction * count)` samples to validation, clamped
/// so that it keeps at least one sample on each side. The partition only depends
/// on `targets`, `val_fraction` and `seed`.
///
/// # Example
///
/// ```
/// use asl_mlp::dataset::stratified_split;
///
/// let targets = [0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
/// let split = stratified_split(&targets, 0.2, 42).unwrap();
/// assert_eq!(split.train.len(), 8);
/// assert_eq!(split.validation.len(), 2);
/// assert_eq!(split, stratified_split(&targets, 0.2, 42).unwrap());
/// ```
pub fn stratified_split(targets: &[usize], val_fraction: f64, seed: u64) -> Result<Split> {
    if !(val_fraction > 0.0 && val_fraction < 1.0) {
        return Err(Error::config(format!(
            "validation fraction must be in (0, 1), got {}",
            val_fraction
        )));
    }

    let classes = targets.iter().copied().max().map_or(0, |m| m + 1);
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); classes];
    for (i, &t) in targets.iter().enumerate() {
        by_class[t].push(i);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(targets.len());
    let mut validation = Vec::new();

    for (class, mut indices) in by_class.into_iter().enumerate() {
        let count = indices.len();
        if count == 0 {
            continue;
        }
        if count < 2 {
            return Err(Error::data(format!(
                "class {} has only {} sample(s), cannot split it",
                class, count
            )));
        }

        indices.shuffle(&mut rng);
        let val_count = ((count as f64 * val_fraction).round() as usize).clamp(1, count - 1);
        validation.extend_from_slice(&indices[..val_count]);
        train.extend_from_slice(&indices[val_count..]);
    }

    train.shuffle(&mut rng);
    validation.shuffle(&mut rng);

    Ok(Split { train, validation })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn targets(counts: &[usize]) -> Vec<usize> {
        // Interleave classes so that the input order isn't grouped
        let mut out = Vec::new();
        let max = counts.iter().copied().max().unwrap_or(0);
        for round in 0..max {
            for (class, &count) in counts.iter().enumerate() {
                if round < count {
                    out.push(class);
                }
            }
        }
        out
    }

    #[test]
    fn partitions_every_index_exactly_once() {
        let t = targets(&[10, 7, 3]);
        let split = stratified_split(&t, 0.2, 42).unwrap();

        let mut all: Vec<usize> = split.train.iter().chain(&split.validation).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..t.len()).collect::<Vec<_>>());

        let train: BTreeSet<_> = split.train.iter().collect();
        assert!(split.validation.iter().all(|i| !train.contains(i)));
    }

    #[test]
    fn keeps_class_proportions() {
        let t = targets(&[10, 20, 5]);
        let split = stratified_split(&t, 0.2, 7).unwrap();
        let count = |set: &[usize], class| set.iter().filter(|&&i| t[i] == class).count();

        assert_eq!(count(&split.validation, 0), 2);
        assert_eq!(count(&split.validation, 1), 4);
        assert_eq!(count(&split.validation, 2), 1);
        assert_eq!(count(&split.train, 1), 16);
    }

    #[test]
    fn tiny_classes_land_on_both_sides() {
        let t = targets(&[2, 2]);
        let split = stratified_split(&t, 0.2, 1).unwrap();
        for class in 0..2 {
            assert_eq!(split.train.iter().filter(|&&i| t[i] == class).count(), 1);
            assert_eq!(split.validation.iter().filter(|&&i| t[i] == class).count(), 1);
        }
    }

    #[test]
    fn same_seed_same_partition() {
        let t = targets(&[12, 9, 15]);
        let a = stratified_split(&t, 0.2, 42).unwrap();
        let b = stratified_split(&t, 0.2, 42).unwrap();
        assert_eq!(a, b);

        let c = stratified_split(&t, 0.2, 43).unwrap();
        let set = |s: &Split| s.validation.iter().copied().collect::<BTreeSet<_>>();
        assert_ne!(set(&a), set(&c));
    }

    #[test]
    fn rejects_bad_fraction_and_singletons() {
        assert!(matches!(
            stratified_split(&[0, 0, 1, 1], 1.0, 0),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            stratified_split(&[0, 0, 1], 0.2, 0),
            Err(Error::Data(_))
        ));
    }
}
