use rand::seq::SliceRandom;
use rand::Rng;

/// Splits a fresh random permutation of `0..len` into consecutive batches of
/// `batch_size`; only the last batch may be shorter. Every index appears in
/// exactly one batch.
pub fn shuffled_batches<R: Rng + ?Sized>(len: usize, batch_size: usize, rng: &mut R) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(rng);
    sequential_batches(indices, batch_size)
}

/// Batches `indices` in order, without shuffling.
pub fn sequential_batches(indices: Vec<usize>, batch_size: usize) -> Vec<Vec<usize>> {
    let batch_size = batch_size.max(1);
    indices.chunks(batch_size).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn partitions_every_index_once() {
        let mut rng = StdRng::seed_from_u64(9);
        let batches = shuffled_batches(320, 32, &mut rng);
        assert_eq!(batches.len(), 10);
        assert!(batches.iter().all(|b| b.len() == 32));
        let mut seen: Vec<usize> = batches.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..320).collect::<Vec<_>>());
    }

    #[test]
    fn last_batch_keeps_the_remainder() {
        let batches = sequential_batches((0..70).collect(), 32);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![32, 32, 6]);
    }

    #[test]
    fn consecutive_epochs_differ() {
        let mut rng = StdRng::seed_from_u64(10);
        let a = shuffled_batches(100, 10, &mut rng);
        let b = shuffled_batches(100, 10, &mut rng);
        assert_ne!(a, b);
    }
}
