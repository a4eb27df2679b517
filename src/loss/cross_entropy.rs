use crate::error::{FerError, Result};
use crate::math::matrix::Matrix;

/// Categorical cross-entropy over raw logits with integer class labels.
///
/// Softmax is folded into the loss, so the model's last layer stays linear.
pub struct CrossEntropyLoss;

impl CrossEntropyLoss {
    /// Mean over the batch of `-log softmax(logits)[label]`.
    ///
    /// Uses the log-sum-exp shift so large logits do not overflow. A
    /// non-finite result means training has diverged.
    pub fn loss(logits: &Matrix, labels: &[usize]) -> Result<f64> {
        check_batch(logits, labels)?;
        let mut total = 0.0;
        for (row, &label) in logits.iter_rows().zip(labels) {
            total += log_sum_exp(row) - row[label];
        }
        let loss = total / labels.len() as f64;
        if !loss.is_finite() {
            return Err(FerError::computation(format!("loss diverged to {}", loss)));
        }
        Ok(loss)
    }

    /// Gradient of the mean loss w.r.t. the logits:
    ///   ∂L/∂z_i = (softmax(z)_i - onehot_i) / batch
    pub fn derivative(logits: &Matrix, labels: &[usize]) -> Result<Matrix> {
        check_batch(logits, labels)?;
        let scale = 1.0 / labels.len() as f64;
        let mut grad = Matrix::zeros(logits.rows, logits.cols);
        for (b, &label) in labels.iter().enumerate() {
            let row = logits.row(b);
            let lse = log_sum_exp(row);
            for (j, g) in grad.row_mut(b).iter_mut().enumerate() {
                let p = (row[j] - lse).exp();
                *g = (p - if j == label { 1.0 } else { 0.0 }) * scale;
            }
        }
        Ok(grad)
    }
}

fn check_batch(logits: &Matrix, labels: &[usize]) -> Result<()> {
    if labels.is_empty() {
        return Err(FerError::computation("cross-entropy over an empty batch"));
    }
    if logits.rows != labels.len() {
        return Err(FerError::computation(format!(
            "{} score rows for {} labels",
            logits.rows,
            labels.len()
        )));
    }
    if let Some(&bad) = labels.iter().find(|&&l| l >= logits.cols) {
        return Err(FerError::computation(format!(
            "label {} out of range for {} classes",
            bad, logits.cols
        )));
    }
    Ok(())
}

fn log_sum_exp(row: &[f64]) -> f64 {
    let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    max + row.iter().map(|x| (x - max).exp()).sum::<f64>().ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_logits_give_log_c() {
        let logits = Matrix::from_rows(vec![vec![0.0, 0.0, 0.0]; 2]).unwrap();
        let loss = CrossEntropyLoss::loss(&logits, &[0, 2]).unwrap();
        assert!((loss - 3f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn stable_for_large_logits() {
        let logits = Matrix::from_rows(vec![vec![1000.0, 0.0]]).unwrap();
        let loss = CrossEntropyLoss::loss(&logits, &[0]).unwrap();
        assert!(loss >= 0.0 && loss < 1e-12);
    }

    #[test]
    fn derivative_rows_sum_to_zero_and_are_scaled() {
        let logits = Matrix::from_rows(vec![vec![1.0, 2.0, 3.0], vec![0.0, 0.0, 0.0]]).unwrap();
        let grad = CrossEntropyLoss::derivative(&logits, &[2, 1]).unwrap();
        for row in grad.iter_rows() {
            assert!(row.iter().sum::<f64>().abs() < 1e-12);
        }
        // Uniform row: (1/3 - 1) / 2 at the label.
        assert!((grad.row(1)[1] - (1.0 / 3.0 - 1.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let logits = Matrix::from_rows(vec![vec![0.3, -1.2, 0.8]]).unwrap();
        let grad = CrossEntropyLoss::derivative(&logits, &[1]).unwrap();
        let h = 1e-6;
        for j in 0..3 {
            let mut up = logits.clone();
            up.data[j] += h;
            let mut down = logits.clone();
            down.data[j] -= h;
            let numeric = (CrossEntropyLoss::loss(&up, &[1]).unwrap()
                - CrossEntropyLoss::loss(&down, &[1]).unwrap())
                / (2.0 * h);
            assert!((numeric - grad.data[j]).abs() < 1e-6);
        }
    }

    #[test]
    fn rejects_empty_and_mismatched_batches() {
        let logits = Matrix::from_rows(vec![vec![0.0, 1.0]]).unwrap();
        assert!(CrossEntropyLoss::loss(&logits, &[]).is_err());
        assert!(CrossEntropyLoss::loss(&logits, &[0, 1]).is_err());
        assert!(CrossEntropyLoss::loss(&logits, &[2]).is_err());
    }
}
