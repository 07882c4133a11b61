use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::data::{Batch, DataLoader};
use crate::random::PrngKey;
use crate::util::{argmax, logsumexp, relu, relu_derivative, MlError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerParams {
    pub weights: DMatrix<f64>,
    pub bias: DVector<f64>,
}

impl LayerParams {
    pub fn new(weights: DMatrix<f64>, bias: DVector<f64>) -> Result<Self> {
        if weights.nrows() != bias.nrows() {
            Err(MlError::ShapeMismatch {
                expected: format!("bias of length {}", weights.nrows()),
                found: format!("bias of length {}", bias.nrows()),
            })?
        }

        Ok(Self { weights, bias })
    }

    /// `W h + b` for every column of `h`.
    fn affine(&self, h: &DMatrix<f64>) -> DMatrix<f64> {
        let mut z = &self.weights * h;
        for mut col in z.column_iter_mut() {
            col += &self.bias;
        }
        z
    }

    fn same_shape(&self, other: &LayerParams) -> bool {
        self.weights.shape() == other.weights.shape() && self.bias.len() == other.bias.len()
    }
}

/// Weight/bias pairs of a multilayer perceptron, input layer first.
///
/// Never mutated after construction: optimizers build a new `Params` from the
/// old one and a gradient of the same shape.
/// Deserializing goes through [`Params::new`], so a checkpoint with no layers
/// or mismatched shapes is rejected on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParams")]
pub struct Params {
    layers: Vec<LayerParams>,
}

#[derive(Deserialize)]
struct RawParams {
    layers: Vec<LayerParams>,
}

impl TryFrom<RawParams> for Params {
    type Error = MlError;

    fn try_from(raw: RawParams) -> Result<Self> {
        Params::new(raw.layers)
    }
}

impl Params {
    pub fn new(layers: Vec<LayerParams>) -> Result<Self> {
        let layers = layers
            .into_iter()
            .map(|l| LayerParams::new(l.weights, l.bias))
            .collect::<Result<Vec<_>>>()?;
        for pair in layers.windows(2) {
            if pair[0].weights.nrows() != pair[1].weights.ncols() {
                Err(MlError::ShapeMismatch {
                    expected: format!("layer input of width {}", pair[0].weights.nrows()),
                    found: format!("layer input of width {}", pair[1].weights.ncols()),
                })?
            }
        }
        if layers.is_empty() {
            Err(MlError::InvalidLayerSizes(Vec::new()))?
        }

        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[LayerParams] {
        &self.layers
    }

    /// Layer widths including input and output.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![self.layers[0].weights.ncols()];
        sizes.extend(self.layers.iter().map(|l| l.weights.nrows()));
        sizes
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].weights.ncols()
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.weights.len() + l.bias.len()).sum()
    }

    pub fn zeros_like(&self) -> Params {
        self.map(|_| 0.0)
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Params {
        let layers = self
            .layers
            .iter()
            .map(|l| LayerParams {
                weights: l.weights.map(&f),
                bias: l.bias.map(&f),
            })
            .collect();
        Params { layers }
    }

    /// Combine two parameter sets of identical shape entry by entry.
    pub fn zip_map(&self, other: &Params, f: impl Fn(f64, f64) -> f64) -> Result<Params> {
        if self.layers.len() != other.layers.len()
            || self.layers.iter().zip(&other.layers).any(|(a, b)| !a.same_shape(b))
        {
            Err(MlError::ShapeMismatch {
                expected: format!("{:?}", self.sizes()),
                found: format!("{:?}", other.sizes()),
            })?
        }

        let layers = self
            .layers
            .iter()
            .zip(&other.layers)
            .map(|(a, b)| LayerParams {
                weights: a.weights.zip_map(&b.weights, &f),
                bias: a.bias.zip_map(&b.bias, &f),
            })
            .collect();
        Ok(Params { layers })
    }
}

fn random_layer_params(m: usize, n: usize, key: PrngKey, scale: f64) -> LayerParams {
    let (w_key, b_key) = key.split();
    LayerParams {
        weights: w_key.normal_matrix(n, m) * scale,
        bias: b_key.normal_vector(n) * scale,
    }
}

/// One `(weights, bias)` pair per consecutive pair of `sizes`, every entry drawn
/// from `scale * N(0, 1)`.
pub fn init_network_params(sizes: &[usize], key: PrngKey, scale: f64) -> Result<Params> {
    if sizes.len() < 2 || sizes.contains(&0) {
        Err(MlError::InvalidLayerSizes(sizes.to_vec()))?
    }

    let keys = key.split_n(sizes.len() - 1);
    let layers = sizes
        .windows(2)
        .zip(keys)
        .map(|(w, key)| random_layer_params(w[0], w[1], key, scale))
        .collect();
    Ok(Params { layers })
}

fn check_input_dim(params: &Params, dim: usize) -> Result<()> {
    if dim != params.input_dim() {
        Err(MlError::ShapeMismatch {
            expected: format!("input of width {}", params.input_dim()),
            found: format!("input of width {dim}"),
        })?
    }
    Ok(())
}

fn check_batch(params: &Params, batch: &Batch) -> Result<()> {
    check_input_dim(params, batch.dim())?;
    let outputs = params.layers[params.layers.len() - 1].weights.nrows();
    if batch.num_classes != outputs {
        Err(MlError::ShapeMismatch {
            expected: format!("{outputs} classes"),
            found: format!("{} classes", batch.num_classes),
        })?
    }
    Ok(())
}

fn log_softmax_columns(mut logits: DMatrix<f64>) -> DMatrix<f64> {
    for mut col in logits.column_iter_mut() {
        let lse = logsumexp(col.as_view());
        col.add_scalar_mut(-lse);
    }
    logits
}

/// Intermediate values of a forward pass over the columns of `x`.
struct Trace {
    /// input to each layer; `inputs[0]` is `x`
    inputs: Vec<DMatrix<f64>>,
    /// pre-activation of each hidden layer
    hidden: Vec<DMatrix<f64>>,
    log_probs: DMatrix<f64>,
}

fn forward(params: &Params, x: DMatrix<f64>) -> Trace {
    let last = params.layers.len() - 1;
    let mut inputs = vec![x];
    let mut hidden = Vec::with_capacity(last);

    for layer in &params.layers[..last] {
        let z = layer.affine(&inputs[inputs.len() - 1]);
        inputs.push(z.map(relu));
        hidden.push(z);
    }
    let logits = params.layers[last].affine(&inputs[last]);

    Trace {
        inputs,
        hidden,
        log_probs: log_softmax_columns(logits),
    }
}

/// Log-probabilities over classes for a single input vector.
pub fn predict(params: &Params, image: &DVector<f64>) -> Result<DVector<f64>> {
    check_input_dim(params, image.len())?;
    let x = DMatrix::from_column_slice(image.len(), 1, image.as_slice());
    Ok(forward(params, x).log_probs.column(0).into_owned())
}

/// [`predict`] applied to every row of `images`; row `i` of the result belongs
/// to row `i` of the input.
pub fn batched_predict(params: &Params, images: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    check_input_dim(params, images.ncols())?;
    Ok(forward(params, images.transpose()).log_probs.transpose())
}

/// Cross-entropy summed over the batch.
pub fn loss(params: &Params, batch: &Batch) -> Result<f64> {
    check_batch(params, batch)?;
    let log_probs = batched_predict(params, &batch.features)?;
    Ok(-log_probs.component_mul(&batch.targets()?).sum())
}

/// [`loss`] together with its gradient with respect to every parameter.
pub fn loss_and_grad(params: &Params, batch: &Batch) -> Result<(f64, Params)> {
    check_batch(params, batch)?;
    let targets = batch.targets()?.transpose();
    let Trace { inputs, hidden, log_probs } = forward(params, batch.features.transpose());

    let loss = -log_probs.component_mul(&targets).sum();

    // d loss / d logits = softmax * sum(y) - y, per column
    let mut delta = log_probs.map(f64::exp);
    for (j, mut col) in delta.column_iter_mut().enumerate() {
        col *= targets.column(j).sum();
    }
    delta -= &targets;

    let mut grads = Vec::with_capacity(params.layers.len());
    for (l, layer) in params.layers.iter().enumerate().rev() {
        let weights = &delta * inputs[l].transpose();
        let bias = delta.column_sum();
        if l > 0 {
            let upstream = layer.weights.transpose() * &delta;
            delta = upstream.zip_map(&hidden[l - 1], |g, z| g * relu_derivative(z));
        }
        grads.push(LayerParams { weights, bias });
    }
    grads.reverse();

    Ok((loss, Params { layers: grads }))
}

pub fn predicted_classes(log_probs: &DMatrix<f64>) -> Vec<usize> {
    log_probs.row_iter().map(|row| argmax(row.iter())).collect()
}

/// Fraction of rows whose arg-max matches the label.
pub fn class_accuracy(log_probs: &DMatrix<f64>, labels: &[usize]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    correct(log_probs, labels) as f64 / labels.len() as f64
}

fn correct(log_probs: &DMatrix<f64>, labels: &[usize]) -> usize {
    predicted_classes(log_probs)
        .iter()
        .zip(labels)
        .filter(|(p, t)| p == t)
        .count()
}

pub fn accuracy(params: &Params, batch: &Batch) -> Result<f64> {
    let log_probs = batched_predict(params, &batch.features)?;
    Ok(class_accuracy(&log_probs, &batch.labels))
}

/// Accuracy accumulated over every batch of a split.
pub fn dataset_accuracy(params: &Params, loader: &DataLoader<'_>) -> Result<f64> {
    let mut hits = 0;
    let mut total = 0;
    for batch in loader.iter() {
        let log_probs = batched_predict(params, &batch.features)?;
        hits += correct(&log_probs, &batch.labels);
        total += batch.len();
    }
    Ok(if total == 0 { 0.0 } else { hits as f64 / total as f64 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;
    use approx::assert_relative_eq;

    fn small_params() -> Params {
        init_network_params(&[4, 5, 3, 3], PrngKey::new(11), 0.5).unwrap()
    }

    fn small_batch() -> Batch {
        let features = PrngKey::new(5).normal_matrix(6, 4);
        Dataset::new(features, vec![0, 1, 2, 2, 1, 0], 3).unwrap()
    }

    #[test]
    fn init_is_deterministic() {
        let a = init_network_params(&[784, 32, 10], PrngKey::new(0), 0.01).unwrap();
        let b = init_network_params(&[784, 32, 10], PrngKey::new(0), 0.01).unwrap();
        let c = init_network_params(&[784, 32, 10], PrngKey::new(1), 0.01).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.sizes(), vec![784, 32, 10]);
        assert_eq!(a.layers[0].weights.shape(), (32, 784));
        assert_eq!(a.layers[1].bias.len(), 10);
    }

    #[test]
    fn init_rejects_bad_sizes() {
        for sizes in [vec![], vec![3], vec![3, 0, 2]] {
            assert!(matches!(
                init_network_params(&sizes, PrngKey::new(0), 0.01),
                Err(MlError::InvalidLayerSizes(_))
            ));
        }
    }

    #[test]
    fn predict_returns_log_probabilities() {
        let params = small_params();
        for seed in 0..5 {
            let x = PrngKey::new(seed).normal_vector(4) * 10.0;
            let log_probs = predict(&params, &x).unwrap();
            assert_eq!(log_probs.len(), 3);
            assert_relative_eq!(log_probs.map(f64::exp).sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn batched_predict_matches_single() {
        let params = small_params();
        let batch = small_batch();
        let batched = batched_predict(&params, &batch.features).unwrap();
        for (i, row) in batch.features.row_iter().enumerate() {
            let single = predict(&params, &row.transpose()).unwrap();
            for k in 0..3 {
                assert_relative_eq!(batched[(i, k)], single[k], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn predict_rejects_wrong_width() {
        let params = small_params();
        assert!(matches!(
            predict(&params, &DVector::zeros(7)),
            Err(MlError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn accuracy_all_right_and_all_wrong() {
        let labels = vec![0, 2, 1, 2];
        let mut right = DMatrix::from_element(4, 3, -5.0);
        let mut wrong = DMatrix::from_element(4, 3, -5.0);
        for (i, &l) in labels.iter().enumerate() {
            right[(i, l)] = -0.1;
            wrong[(i, (l + 1) % 3)] = -0.1;
        }
        assert_eq!(class_accuracy(&right, &labels), 1.0);
        assert_eq!(class_accuracy(&wrong, &labels), 0.0);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let params = small_params();
        let batch = small_batch();
        let (value, grad) = loss_and_grad(&params, &batch).unwrap();
        assert_relative_eq!(value, loss(&params, &batch).unwrap(), epsilon = 1e-12);

        let h = 1e-6;
        for (l, layer) in params.layers.iter().enumerate() {
            for idx in [0, layer.weights.len() - 1] {
                let mut plus = params.clone();
                plus.layers[l].weights[idx] += h;
                let mut minus = params.clone();
                minus.layers[l].weights[idx] -= h;
                let numeric = (loss(&plus, &batch).unwrap() - loss(&minus, &batch).unwrap()) / (2.0 * h);
                assert_relative_eq!(grad.layers[l].weights[idx], numeric, epsilon = 1e-5);
            }
            for idx in 0..layer.bias.len() {
                let mut plus = params.clone();
                plus.layers[l].bias[idx] += h;
                let mut minus = params.clone();
                minus.layers[l].bias[idx] -= h;
                let numeric = (loss(&plus, &batch).unwrap() - loss(&minus, &batch).unwrap()) / (2.0 * h);
                assert_relative_eq!(grad.layers[l].bias[idx], numeric, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn zip_map_rejects_other_shapes() {
        let a = small_params();
        let b = init_network_params(&[4, 2, 3], PrngKey::new(0), 0.1).unwrap();
        assert!(a.zip_map(&b, |x, y| x + y).is_err());
        assert_eq!(a.zip_map(&a, |x, _| x).unwrap(), a);
    }

    #[test]
    fn params_new_checks_layers() {
        assert!(matches!(Params::new(Vec::new()), Err(MlError::InvalidLayerSizes(_))));

        let short_bias = LayerParams { weights: DMatrix::zeros(3, 2), bias: DVector::zeros(2) };
        assert!(matches!(Params::new(vec![short_bias]), Err(MlError::ShapeMismatch { .. })));

        let layers = small_params().layers().to_vec();
        assert_eq!(Params::new(layers).unwrap(), small_params());
    }

    #[test]
    fn loss_rejects_class_count_mismatch() {
        let params = init_network_params(&[4, 5, 2], PrngKey::new(1), 0.1).unwrap();
        assert!(matches!(loss(&params, &small_batch()), Err(MlError::ShapeMismatch { .. })));
        assert!(matches!(loss_and_grad(&params, &small_batch()), Err(MlError::ShapeMismatch { .. })));
    }
}
