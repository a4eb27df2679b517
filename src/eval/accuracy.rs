use crate::data::dataset::Dataset;
use crate::data::loader::sequential_batches;
use crate::error::{FerError, Result};
use crate::math::matrix::Matrix;
use crate::network::network::Network;

/// Index of the largest score. Ties go to the lowest index and NaN never
/// wins; an empty slice yields 0.
pub fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate().skip(1) {
        if s > scores[best] || (scores[best].is_nan() && !s.is_nan()) {
            best = i;
        }
    }
    best
}

fn count_correct(scores: &Matrix, labels: &[usize]) -> Result<usize> {
    if scores.rows != labels.len() {
        return Err(FerError::computation(format!(
            "{} score rows for {} labels",
            scores.rows,
            labels.len()
        )));
    }
    Ok(scores
        .iter_rows()
        .zip(labels)
        .filter(|(row, label)| argmax(row) == **label)
        .count())
}

/// Fraction of rows whose arg-max equals the label, in `[0, 1]`.
pub fn accuracy(scores: &Matrix, labels: &[usize]) -> Result<f64> {
    if labels.is_empty() {
        return Err(FerError::computation("accuracy of an empty batch is undefined"));
    }
    let correct = count_correct(scores, labels)?;
    Ok(correct as f64 / labels.len() as f64)
}

/// Runs every sample of `dataset` through `network` and returns the
/// accuracy. Batching only bounds memory; the result covers the whole set.
pub fn dataset_accuracy(network: &Network, dataset: &Dataset, batch_size: usize) -> Result<f64> {
    if dataset.is_empty() {
        return Err(FerError::computation("accuracy of an empty dataset is undefined"));
    }
    let mut correct = 0;
    for batch in sequential_batches((0..dataset.len()).collect(), batch_size) {
        let (images, labels) = dataset.gather(&batch)?;
        let scores = network.forward(&images)?;
        correct += count_correct(&scores, &labels)?;
    }
    Ok(correct as f64 / dataset.len() as f64)
}
