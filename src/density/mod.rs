//! Bivariate normal density.
//!
//! ```text
//! p(x) = exp(-1/2 (x - μ)^T Σ^-1 (x - μ)) / sqrt((2π)^2 |Σ|)
//! ```

use std::f64::consts::PI;

use nalgebra::{DMatrix, Matrix2, Vector2};

use crate::util::{linspace, MlError, Result};

/// Covariance of two variables with standard deviations `sigma_x`, `sigma_y`
/// and correlation `rho`.
pub fn covariance(sigma_x: f64, sigma_y: f64, rho: f64) -> Result<Matrix2<f64>> {
    if sigma_x <= 0.0 || sigma_y <= 0.0 || rho.abs() >= 1.0 {
        Err(MlError::NotPositiveDefinite { sigma_x, sigma_y, rho })?
    }
    let off = rho * sigma_x * sigma_y;
    Ok(Matrix2::new(
        sigma_x * sigma_x, off,
        off, sigma_y * sigma_y,
    ))
}

#[derive(Debug, Clone)]
pub struct Gaussian2 {
    mean: Vector2<f64>,
    cov: Matrix2<f64>,
    inv_cov: Matrix2<f64>,
    norm: f64,
}

impl Gaussian2 {
    pub fn new(mean: Vector2<f64>, cov: Matrix2<f64>) -> Result<Self> {
        let det = cov.determinant();
        if !(det > 0.0) {
            Err(MlError::SingularCovariance)?
        }
        // det > 0 also holds when both variances are negative
        let (var_x, var_y) = (cov[(0, 0)], cov[(1, 1)]);
        if var_x <= 0.0 || var_y <= 0.0 {
            let (sigma_x, sigma_y) = (var_x.signum() * var_x.abs().sqrt(), var_y.signum() * var_y.abs().sqrt());
            Err(MlError::NotPositiveDefinite {
                sigma_x,
                sigma_y,
                rho: cov[(0, 1)] / (sigma_x * sigma_y).abs(),
            })?
        }
        let inv_cov = cov.try_inverse().ok_or(MlError::SingularCovariance)?;

        Ok(Self {
            mean,
            cov,
            inv_cov,
            norm: 1.0 / ((2.0 * PI).powi(2) * det).sqrt(),
        })
    }

    pub fn standard(rho: f64) -> Result<Self> {
        Self::new(Vector2::zeros(), covariance(1.0, 1.0, rho)?)
    }

    pub fn mean(&self) -> &Vector2<f64> {
        &self.mean
    }

    pub fn covariance(&self) -> &Matrix2<f64> {
        &self.cov
    }

    pub fn std_dev(&self) -> Vector2<f64> {
        Vector2::new(self.cov[(0, 0)].sqrt(), self.cov[(1, 1)].sqrt())
    }

    pub fn pdf(&self, x: &Vector2<f64>) -> f64 {
        let d = x - self.mean;
        let quad = d.dot(&(self.inv_cov * d));
        self.norm * (-0.5 * quad).exp()
    }
}

/// Density values on a regular mesh, `values[(i, j)] = pdf(xs[i], ys[j])`.
#[derive(Debug, Clone)]
pub struct DensityGrid {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub values: DMatrix<f64>,
}

impl DensityGrid {
    /// Evaluate over `mean ± 3σ` on each axis with `resolution` points per axis.
    pub fn evaluate(gaussian: &Gaussian2, resolution: usize) -> Self {
        let mean = gaussian.mean();
        let sd = gaussian.std_dev();
        Self::evaluate_on(
            gaussian,
            linspace(mean.x - 3.0 * sd.x, mean.x + 3.0 * sd.x, resolution),
            linspace(mean.y - 3.0 * sd.y, mean.y + 3.0 * sd.y, resolution),
        )
    }

    pub fn evaluate_on(gaussian: &Gaussian2, xs: Vec<f64>, ys: Vec<f64>) -> Self {
        let values = DMatrix::from_fn(xs.len(), ys.len(), |i, j| {
            gaussian.pdf(&Vector2::new(xs[i], ys[j]))
        });
        Self { xs, ys, values }
    }

    pub fn max(&self) -> f64 {
        self.values.max()
    }

    /// Value at the grid point closest to `(x, y)`.
    pub fn value_near(&self, x: f64, y: f64) -> f64 {
        self.values[(nearest(&self.xs, x), nearest(&self.ys, y))]
    }

    /// Riemann sum of the density over the mesh cells.
    pub fn integrate(&self) -> f64 {
        if self.xs.len() < 2 || self.ys.len() < 2 {
            return 0.0;
        }
        let dx = self.xs[1] - self.xs[0];
        let dy = self.ys[1] - self.ys[0];
        self.values.sum() * dx * dy
    }
}

fn nearest(axis: &[f64], v: f64) -> usize {
    if axis.len() < 2 {
        return 0;
    }
    let step = axis[1] - axis[0];
    let i = ((v - axis[0]) / step).round();
    i.clamp(0.0, (axis.len() - 1) as f64) as usize
}
