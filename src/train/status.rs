use std::fmt;

/// One status-interval report emitted by the trainer.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    /// 0-based epoch.
    pub epoch: usize,
    /// 0-based batch index within the epoch.
    pub batch: usize,
    /// Mean per-batch loss since the previous report.
    pub mean_loss: f64,
    /// Accuracy on the batch that triggered the report.
    pub train_accuracy: f64,
    /// Accuracy over the whole validation set.
    pub val_accuracy: f64,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {:5}] loss: {:.2} train acc: {:.2} val acc: {:.2}",
            self.epoch + 1,
            self.batch + 1,
            self.mean_loss,
            self.train_accuracy,
            self.val_accuracy
        )
    }
}

#[cfg(test)]
mod tests {
    use super::StatusReport;

    #[test]
    fn display_is_one_based() {
        let r = StatusReport {
            epoch: 0,
            batch: 99,
            mean_loss: 1.0986,
            train_accuracy: 0.5,
            val_accuracy: 0.4371,
        };
        assert_eq!(r.to_string(), "[1,   100] loss: 1.10 train acc: 0.50 val acc: 0.44");
    }
}
