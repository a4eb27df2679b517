use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{FerError, Result};
use crate::math::tensor::Tensor;
use crate::network::network::{Gradients, Network};

/// Serializable optimizer snapshot stored alongside the model in checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub learning_rate: f64,
    pub momentum: f64,
    /// One velocity buffer per parameter that has taken at least one step.
    pub momentum_buffers: BTreeMap<String, Tensor>,
}

/// Stochastic gradient descent with classical momentum:
///
/// ```text
/// v ← μ·v + g
/// p ← p − lr·v
/// ```
///
/// Buffers start at zero, so the first step is plain SGD.
#[derive(Debug, Clone)]
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    buffers: BTreeMap<String, Tensor>,
}

impl Sgd {
    pub fn new(learning_rate: f64, momentum: f64) -> Sgd {
        Sgd { learning_rate, momentum, buffers: BTreeMap::new() }
    }

    /// Applies one update to every parameter of `network`.
    ///
    /// All gradients are validated before any parameter moves, so a rejected
    /// step leaves the network and the buffers as they were.
    pub fn step(&mut self, network: &mut Network, grads: &Gradients) -> Result<()> {
        for (name, param) in network.named_parameters() {
            let grad = grads
                .get(&name)
                .ok_or_else(|| FerError::computation(format!("no gradient for `{name}`")))?;
            if grad.shape != param.shape {
                return Err(FerError::computation(format!(
                    "gradient for `{name}` has shape {:?}, parameter has {:?}",
                    grad.shape, param.shape
                )));
            }
            if !grad.is_finite() {
                return Err(FerError::computation(format!("non-finite gradient for `{name}`")));
            }
        }

        for (name, param) in network.named_parameters_mut() {
            let grad = &grads[&name];
            let velocity = self
                .buffers
                .entry(name)
                .or_insert_with(|| Tensor::zeros(&param.shape));
            for ((p, v), g) in param.data.iter_mut().zip(velocity.data.iter_mut()).zip(&grad.data) {
                *v = self.momentum * *v + g;
                *p -= self.learning_rate * *v;
            }
        }
        Ok(())
    }

    pub fn state_dict(&self) -> OptimizerState {
        OptimizerState {
            learning_rate: self.learning_rate,
            momentum: self.momentum,
            momentum_buffers: self.buffers.clone(),
        }
    }

    /// Every buffer must name a parameter of `network` and share its shape.
    pub fn check_state(state: &OptimizerState, network: &Network) -> Result<()> {
        let params = network.named_parameters();
        for (name, buf) in &state.momentum_buffers {
            let Some((_, param)) = params.iter().find(|(n, _)| n == name) else {
                return Err(FerError::load(
                    "optimizer_state",
                    format!("momentum buffer for unknown parameter `{name}`"),
                ));
            };
            if buf.shape != param.shape || buf.data.len() != param.data.len() {
                return Err(FerError::ShapeMismatch {
                    name: name.clone(),
                    expected: param.shape.clone(),
                    found: buf.shape.clone(),
                });
            }
        }
        Ok(())
    }

    /// Restores momentum buffers. The configured learning rate and momentum
    /// stay in effect; a differing saved value is only reported.
    pub fn load_state_dict(&mut self, state: &OptimizerState, network: &Network) -> Result<()> {
        Sgd::check_state(state, network)?;
        if state.learning_rate != self.learning_rate || state.momentum != self.momentum {
            warn!(
                "checkpoint optimizer used lr={} momentum={}, continuing with lr={} momentum={}",
                state.learning_rate, state.momentum, self.learning_rate, self.momentum
            );
        }
        self.buffers = state.momentum_buffers.clone();
        Ok(())
    }
}
