use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::network::network::{ModelState, Network};
use crate::optim::sgd::{OptimizerState, Sgd};

/// Persisted training progress: the epoch to resume at, plus snapshots of
/// the model parameters and the optimizer's momentum buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// First epoch a resumed run executes.
    pub epoch: usize,
    pub model_state: ModelState,
    pub optimizer_state: OptimizerState,
}

impl CheckpointRecord {
    pub fn capture(epoch: usize, network: &Network, optimizer: &Sgd) -> CheckpointRecord {
        CheckpointRecord {
            epoch,
            model_state: network.state_dict(),
            optimizer_state: optimizer.state_dict(),
        }
    }

    /// Checks every tensor against `network`'s topology.
    pub fn validate(&self, network: &Network) -> Result<()> {
        network.check_state(&self.model_state)?;
        Sgd::check_state(&self.optimizer_state, network)
    }

    /// Seeds `network` and `optimizer` from this record. Both are validated
    /// before either is modified.
    pub fn restore(&self, network: &mut Network, optimizer: &mut Sgd) -> Result<()> {
        self.validate(network)?;
        network.load_state_dict(&self.model_state)?;
        optimizer.load_state_dict(&self.optimizer_state, network)
    }
}
