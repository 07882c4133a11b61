use std::io;

use nalgebra::{DVector, DVectorView};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("couldn't parse config: {0}")]
    Config(#[from] ron::error::SpannedError),
    #[error("couldn't (de)serialize parameters: {0}")]
    Pickle(#[from] serde_pickle::Error),
    #[error("couldn't write image: {0}")]
    Image(#[from] image::ImageError),
    #[error("covariance matrix is singular")]
    SingularCovariance,
    #[error("covariance is not positive definite (sigma_x={sigma_x}, sigma_y={sigma_y}, rho={rho})")]
    NotPositiveDefinite { sigma_x: f64, sigma_y: f64, rho: f64 },
    #[error("invalid layer sizes {0:?}: need at least two non-zero widths")]
    InvalidLayerSizes(Vec<usize>),
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },
    #[error("label {label} out of range for {num_classes} classes")]
    InvalidLabel { label: usize, num_classes: usize },
    #[error("dataset is empty")]
    EmptyDataset,
    #[error("malformed idx file: {0}")]
    MalformedIdx(String),
    #[error("loss became non-finite ({loss}) at step {step}")]
    NonFiniteLoss { step: usize, loss: f64 },
    #[error("training already finished")]
    TrainingFinished,
}

pub type Result<T> = std::result::Result<T, MlError>;

/// `n` evenly spaced values from `start` to `end`, both included.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

pub fn relu(x: f64) -> f64 {
    x.max(0.0)
}

pub fn relu_derivative(x: f64) -> f64 {
    if x > 0.0 { 1.0 } else { 0.0 }
}

/// Numerically stable `ln(sum(exp(x)))`.
pub fn logsumexp(x: DVectorView<'_, f64>) -> f64 {
    let max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + x.iter().map(|&e| (e - max).exp()).sum::<f64>().ln()
}

/// Index of the largest entry; ties resolve to the first one.
pub fn argmax<'a>(values: impl IntoIterator<Item = &'a f64>) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, &e) in values.into_iter().enumerate() {
        if e > best.1 {
            best = (i, e);
        }
    }
    best.0
}

pub fn one_hot(label: usize, num_classes: usize) -> Result<DVector<f64>> {
    if label >= num_classes {
        Err(MlError::InvalidLabel { label, num_classes })?
    }
    let mut v = DVector::zeros(num_classes);
    v[label] = 1.0;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linspace_includes_endpoints() {
        let xs = linspace(-3.0, 3.0, 7);
        assert_eq!(xs.len(), 7);
        assert_relative_eq!(xs[0], -3.0);
        assert_relative_eq!(xs[3], 0.0, epsilon = 1e-12);
        assert_relative_eq!(xs[6], 3.0);
    }

    #[test]
    fn logsumexp_handles_large_values() {
        let v = DVector::from_vec(vec![1000.0, 1000.0]);
        assert_relative_eq!(logsumexp(v.as_view()), 1000.0 + 2f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn one_hot_argmax_recovers_label() {
        for label in 0..10 {
            let v = one_hot(label, 10).unwrap();
            assert_eq!(argmax(v.iter()), label);
            assert_relative_eq!(v.sum(), 1.0);
        }
    }

    #[test]
    fn one_hot_rejects_out_of_range() {
        assert!(matches!(
            one_hot(10, 10),
            Err(MlError::InvalidLabel { label: 10, num_classes: 10 })
        ));
    }
}
