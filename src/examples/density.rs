use std::error::Error;

use nalgebra::Vector2;
use tracing::info;

use crate::{config::DensityConfig, density::{covariance, DensityGrid, Gaussian2}, plot::plot_density_surfaces};

/// Evaluate the bivariate normal for every configured correlation and draw the
/// surfaces into one figure.
pub fn run_sample(config: &DensityConfig) -> Result<(), Box<dyn Error>> {
    let mut grids = Vec::with_capacity(config.correlations.len());

    for &rho in &config.correlations {
        let cov = covariance(config.sigma_x, config.sigma_y, rho)?;
        let gaussian = Gaussian2::new(Vector2::zeros(), cov)?;
        let grid = DensityGrid::evaluate(&gaussian, config.resolution.max(2));

        info!(
            rho,
            peak = grid.max(),
            mass = grid.integrate(),
            "evaluated density"
        );
        grids.push((format!(
            "cov = [[{:.1}, {:.1}], [{:.1}, {:.1}]]",
            cov[(0, 0)], cov[(0, 1)], cov[(1, 0)], cov[(1, 1)]
        ), grid));
    }

    plot_density_surfaces(&config.output, &grids)?;
    info!(path = %config.output.display(), "wrote density surfaces");

    Ok(())
}
