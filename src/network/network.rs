use rand::Rng;
use std::collections::BTreeMap;

use crate::activation::activation::ActivationFunction;
use crate::error::{FerError, Result};
use crate::layers::{
    conv::{Conv2d, ConvCache},
    dense::{Dense, DenseCache},
    grads::LayerGrads,
    pool::{MaxPool2d, PoolCache},
};
use crate::math::{matrix::Matrix, tensor::Tensor, volume::Volume};
use crate::network::emotion::Emotion;

/// Side length of the square grayscale input images.
pub const INPUT_SIZE: usize = 48;
pub const NUM_CLASSES: usize = Emotion::ALL.len();

/// Snapshot of every learnable parameter, keyed by `<layer>.weight` /
/// `<layer>.bias`.
pub type ModelState = BTreeMap<String, Tensor>;

/// Gradients of the loss keyed like [`ModelState`].
pub type Gradients = BTreeMap<String, Tensor>;

/// Fixed-topology emotion classifier:
///
/// ```text
/// 1x48x48 ─conv5─ 6x44x44 ─pool─ 6x22x22 ─conv3─ 6x20x20 ─pool─ 6x10x10
///         ─conv3─ 16x8x8 ─pool─ 16x4x4 ─flatten─ 256 ─fc─ 120 ─fc─ 48 ─fc─ 3
/// ```
///
/// ReLU follows every convolution and the first two dense layers; the last
/// dense layer emits raw logits.
#[derive(Debug, Clone)]
pub struct Network {
    conv1: Conv2d,
    conv2: Conv2d,
    conv3: Conv2d,
    pool: MaxPool2d,
    fc1: Dense,
    fc2: Dense,
    fc3: Dense,
    flat_dims: (usize, usize, usize),
}

struct SampleTrace {
    conv: [(ConvCache, PoolCache); 3],
}

/// Intermediate values from [`Network::forward_train`], consumed by
/// [`Network::backward`].
pub struct ForwardTrace {
    samples: Vec<SampleTrace>,
    fc: [DenseCache; 3],
}

impl Network {
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Network {
        let relu = ActivationFunction::ReLU;
        let pool = MaxPool2d::new(2);
        let conv1 = Conv2d::new(1, 6, 5, relu, rng);
        let conv2 = Conv2d::new(6, 6, 3, relu, rng);
        let conv3 = Conv2d::new(6, 16, 3, relu, rng);

        let mut side = (INPUT_SIZE, INPUT_SIZE);
        for conv in [&conv1, &conv2, &conv3] {
            side = conv.output_size(side.0, side.1);
            side = pool.output_size(side.0, side.1);
        }
        let flat_dims = (conv3.out_channels, side.0, side.1);
        let flat = flat_dims.0 * flat_dims.1 * flat_dims.2;

        Network {
            conv1,
            conv2,
            conv3,
            pool,
            fc1: Dense::new(flat, 120, relu, rng),
            fc2: Dense::new(120, 48, relu, rng),
            fc3: Dense::new(48, NUM_CLASSES, ActivationFunction::Identity, rng),
            flat_dims,
        }
    }

    /// Shape every input image must have: `(channels, height, width)`.
    pub fn input_dims(&self) -> (usize, usize, usize) {
        (self.conv1.in_channels, INPUT_SIZE, INPUT_SIZE)
    }

    pub fn num_classes(&self) -> usize {
        self.fc3.out_features
    }

    fn check_batch(&self, batch: &[Volume]) -> Result<()> {
        if batch.is_empty() {
            return Err(FerError::computation("forward pass over an empty batch"));
        }
        let expected = self.input_dims();
        if let Some(bad) = batch.iter().find(|v| v.dims() != expected) {
            return Err(FerError::computation(format!(
                "input image has shape {:?}, model expects {:?}",
                bad.dims(),
                expected
            )));
        }
        Ok(())
    }

    fn features(&self, image: &Volume) -> Result<Vec<f64>> {
        let mut x = self.pool.forward(&self.conv1.forward(image)?)?;
        x = self.pool.forward(&self.conv2.forward(&x)?)?;
        x = self.pool.forward(&self.conv3.forward(&x)?)?;
        Ok(x.data)
    }

    /// Maps a batch of images to per-class logits, one row per image.
    /// Parameters are only read.
    pub fn forward(&self, batch: &[Volume]) -> Result<Matrix> {
        self.check_batch(batch)?;
        let rows = batch.iter().map(|img| self.features(img)).collect::<Result<Vec<_>>>()?;
        let mut x = Matrix::from_rows(rows)?;
        for fc in [&self.fc1, &self.fc2, &self.fc3] {
            x = fc.forward(&x)?;
        }
        Ok(x)
    }

    /// Convenience wrapper treating one image as a batch of one.
    pub fn forward_one(&self, image: &Volume) -> Result<Vec<f64>> {
        let scores = self.forward(std::slice::from_ref(image))?;
        Ok(scores.data)
    }

    /// Forward pass that also records what `backward` needs.
    pub fn forward_train(&self, batch: &[Volume]) -> Result<(Matrix, ForwardTrace)> {
        self.check_batch(batch)?;
        let mut rows = Vec::with_capacity(batch.len());
        let mut samples = Vec::with_capacity(batch.len());
        for image in batch {
            let (a1, c1) = self.conv1.forward_cached(image)?;
            let (p1, q1) = self.pool.forward_cached(&a1)?;
            let (a2, c2) = self.conv2.forward_cached(&p1)?;
            let (p2, q2) = self.pool.forward_cached(&a2)?;
            let (a3, c3) = self.conv3.forward_cached(&p2)?;
            let (p3, q3) = self.pool.forward_cached(&a3)?;
            rows.push(p3.data);
            samples.push(SampleTrace { conv: [(c1, q1), (c2, q2), (c3, q3)] });
        }
        let flat = Matrix::from_rows(rows)?;
        let (h1, f1) = self.fc1.forward_cached(&flat)?;
        let (h2, f2) = self.fc2.forward_cached(&h1)?;
        let (logits, f3) = self.fc3.forward_cached(&h2)?;
        Ok((logits, ForwardTrace { samples, fc: [f1, f2, f3] }))
    }

    /// Back-propagates ∂L/∂logits through the recorded pass.
    pub fn backward(&self, trace: &ForwardTrace, grad_logits: &Matrix) -> Result<Gradients> {
        if grad_logits.rows != trace.samples.len() || grad_logits.cols != self.num_classes() {
            return Err(FerError::computation(format!(
                "logit gradient is {}x{}, expected {}x{}",
                grad_logits.rows,
                grad_logits.cols,
                trace.samples.len(),
                self.num_classes()
            )));
        }
        let [f1, f2, f3] = &trace.fc;
        let (g_fc3, d) = self.fc3.backward(f3, grad_logits)?;
        let (g_fc2, d) = self.fc2.backward(f2, &d)?;
        let (g_fc1, d_flat) = self.fc1.backward(f1, &d)?;

        let convs = [&self.conv1, &self.conv2, &self.conv3];
        let mut conv_grads: Vec<LayerGrads> = convs
            .iter()
            .map(|c| LayerGrads::zeros_like(&c.weights, &c.biases))
            .collect();

        let (c, h, w) = self.flat_dims;
        for (b, sample) in trace.samples.iter().enumerate() {
            let mut grad = Volume::new(c, h, w, d_flat.row(b).to_vec())?;
            for stage in (0..3).rev() {
                let (conv_cache, pool_cache) = &sample.conv[stage];
                grad = self.pool.backward(pool_cache, &grad)?;
                grad = convs[stage].backward(conv_cache, &grad, &mut conv_grads[stage])?;
            }
        }

        let mut grads = Gradients::new();
        for (name, g) in ["conv1", "conv2", "conv3"]
            .into_iter()
            .zip(conv_grads)
            .chain([("fc1", g_fc1), ("fc2", g_fc2), ("fc3", g_fc3)])
        {
            grads.insert(format!("{name}.weight"), g.weights);
            grads.insert(format!("{name}.bias"), g.biases);
        }
        Ok(grads)
    }

    /// Every parameter in a stable order, with its checkpoint name.
    pub fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let layers: [(&str, &Tensor, &Tensor); 6] = [
            ("conv1", &self.conv1.weights, &self.conv1.biases),
            ("conv2", &self.conv2.weights, &self.conv2.biases),
            ("conv3", &self.conv3.weights, &self.conv3.biases),
            ("fc1", &self.fc1.weights, &self.fc1.biases),
            ("fc2", &self.fc2.weights, &self.fc2.biases),
            ("fc3", &self.fc3.weights, &self.fc3.biases),
        ];
        layers
            .into_iter()
            .flat_map(|(name, w, b)| [(format!("{name}.weight"), w), (format!("{name}.bias"), b)])
            .collect()
    }

    pub fn named_parameters_mut(&mut self) -> Vec<(String, &mut Tensor)> {
        let Network { conv1, conv2, conv3, fc1, fc2, fc3, .. } = self;
        let layers: [(&str, &mut Tensor, &mut Tensor); 6] = [
            ("conv1", &mut conv1.weights, &mut conv1.biases),
            ("conv2", &mut conv2.weights, &mut conv2.biases),
            ("conv3", &mut conv3.weights, &mut conv3.biases),
            ("fc1", &mut fc1.weights, &mut fc1.biases),
            ("fc2", &mut fc2.weights, &mut fc2.biases),
            ("fc3", &mut fc3.weights, &mut fc3.biases),
        ];
        layers
            .into_iter()
            .flat_map(|(name, w, b)| [(format!("{name}.weight"), w), (format!("{name}.bias"), b)])
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.named_parameters().iter().map(|(_, t)| t.len()).sum()
    }

    pub fn state_dict(&self) -> ModelState {
        self.named_parameters()
            .into_iter()
            .map(|(name, t)| (name, t.clone()))
            .collect()
    }

    /// Verifies that `state` names exactly this model's parameters with the
    /// same shapes and the right number of values.
    pub fn check_state(&self, state: &ModelState) -> Result<()> {
        let own = self.named_parameters();
        for (name, param) in &own {
            let Some(found) = state.get(name) else {
                return Err(FerError::load("model_state", format!("missing parameter `{name}`")));
            };
            if found.shape != param.shape || found.data.len() != param.data.len() {
                return Err(FerError::ShapeMismatch {
                    name: name.clone(),
                    expected: param.shape.clone(),
                    found: found.shape.clone(),
                });
            }
        }
        if let Some(extra) = state.keys().find(|k| !own.iter().any(|(n, _)| n == *k)) {
            return Err(FerError::load("model_state", format!("unexpected parameter `{extra}`")));
        }
        Ok(())
    }

    /// Replaces all parameters. Nothing is touched unless the whole state
    /// passes [`Network::check_state`].
    pub fn load_state_dict(&mut self, state: &ModelState) -> Result<()> {
        self.check_state(state)?;
        for (name, param) in self.named_parameters_mut() {
            if let Some(src) = state.get(&name) {
                param.data.copy_from_slice(&src.data);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn image(seed: u64) -> Volume {
        let mut rng = StdRng::seed_from_u64(seed);
        let pixels = (0..INPUT_SIZE * INPUT_SIZE).map(|_| rng.gen::<f64>()).collect();
        Volume::grayscale(INPUT_SIZE, INPUT_SIZE, pixels).unwrap()
    }

    #[test]
    fn topology_matches_reference_shapes() {
        let net = Network::new(&mut StdRng::seed_from_u64(0));
        let shapes: Vec<(String, Vec<usize>)> = net
            .named_parameters()
            .into_iter()
            .map(|(n, t)| (n, t.shape.clone()))
            .collect();
        assert_eq!(shapes[0], ("conv1.weight".to_string(), vec![6, 1, 5, 5]));
        assert_eq!(shapes[4], ("conv3.weight".to_string(), vec![16, 6, 3, 3]));
        assert_eq!(shapes[6], ("fc1.weight".to_string(), vec![120, 256]));
        assert_eq!(shapes[11], ("fc3.bias".to_string(), vec![3]));
        assert_eq!(net.parameter_count(), 156 + 330 + 880 + 30840 + 5808 + 147);
    }

    #[test]
    fn forward_is_deterministic_and_read_only() {
        let net = Network::new(&mut StdRng::seed_from_u64(1));
        let before = net.state_dict();
        let batch = vec![image(10), image(11)];
        let a = net.forward(&batch).unwrap();
        let b = net.forward(&batch).unwrap();
        assert_eq!(a, b);
        assert_eq!((a.rows, a.cols), (2, NUM_CLASSES));
        assert_eq!(net.state_dict(), before);
        assert_eq!(net.forward_one(&batch[1]).unwrap(), a.row(1).to_vec());
    }

    #[test]
    fn training_pass_agrees_with_inference_pass() {
        let net = Network::new(&mut StdRng::seed_from_u64(2));
        let batch = vec![image(3), image(4), image(5)];
        let (logits, _) = net.forward_train(&batch).unwrap();
        assert_eq!(logits, net.forward(&batch).unwrap());
    }

    #[test]
    fn backward_matches_finite_difference_on_sampled_weights() {
        use crate::loss::cross_entropy::CrossEntropyLoss;

        let mut net = Network::new(&mut StdRng::seed_from_u64(3));
        let batch = vec![image(20), image(21)];
        let labels = [0usize, 2];
        let (logits, trace) = net.forward_train(&batch).unwrap();
        let grads = net
            .backward(&trace, &CrossEntropyLoss::derivative(&logits, &labels).unwrap())
            .unwrap();

        let h = 1e-7;
        for (name, idx) in [("fc3.weight", 5), ("fc1.bias", 7), ("conv3.weight", 40), ("conv1.weight", 3)] {
            let loss_at = |net: &Network| {
                CrossEntropyLoss::loss(&net.forward(&batch).unwrap(), &labels).unwrap()
            };
            let set = |net: &mut Network, delta: f64| {
                for (n, t) in net.named_parameters_mut() {
                    if n == name {
                        t.data[idx] += delta;
                    }
                }
            };
            set(&mut net, h);
            let up = loss_at(&net);
            set(&mut net, -2.0 * h);
            let down = loss_at(&net);
            set(&mut net, h);
            let numeric = (up - down) / (2.0 * h);
            let analytic = grads[name].data[idx];
            assert!(
                (numeric - analytic).abs() < 1e-5 * (1.0 + numeric.abs()),
                "{name}[{idx}]: numeric {numeric} vs analytic {analytic}"
            );
        }
    }

    #[test]
    fn rejects_wrong_image_size_and_empty_batch() {
        let net = Network::new(&mut StdRng::seed_from_u64(4));
        let small = Volume::grayscale(32, 32, vec![0.0; 32 * 32]).unwrap();
        assert!(matches!(net.forward(&[small]), Err(FerError::Computation(_))));
        assert!(matches!(net.forward(&[]), Err(FerError::Computation(_))));
    }

    #[test]
    fn mismatched_state_leaves_parameters_untouched() {
        let mut net = Network::new(&mut StdRng::seed_from_u64(5));
        let before = net.state_dict();
        let mut state = Network::new(&mut StdRng::seed_from_u64(6)).state_dict();
        state.insert("fc2.weight".into(), Tensor::zeros(&[48, 121]));
        let err = net.load_state_dict(&state).unwrap_err();
        assert!(matches!(err, FerError::ShapeMismatch { .. }));
        assert_eq!(net.state_dict(), before);
    }

    #[test]
    fn state_round_trips_between_models() {
        let src = Network::new(&mut StdRng::seed_from_u64(7));
        let mut dst = Network::new(&mut StdRng::seed_from_u64(8));
        dst.load_state_dict(&src.state_dict()).unwrap();
        assert_eq!(dst.state_dict(), src.state_dict());
    }
}
