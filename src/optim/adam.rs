use serde::{Deserialize, Serialize};

use super::Optimizer;
use crate::neural_net::Params;
use crate::util::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Adam {
    pub step_size: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
}

/// First and second moment estimates, one entry per parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamState {
    pub step: u32,
    pub mu: Params,
    pub nu: Params,
}

impl Adam {
    pub fn new(step_size: f64) -> Self {
        Self {
            step_size,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl Optimizer for Adam {
    type State = AdamState;

    fn init(&self, params: &Params) -> AdamState {
        AdamState {
            step: 0,
            mu: params.zeros_like(),
            nu: params.zeros_like(),
        }
    }

    fn update(&self, grads: &Params, state: AdamState, params: &Params) -> Result<(Params, AdamState)> {
        let Adam { step_size, beta1: b1, beta2: b2, eps } = *self;

        let step = state.step + 1;
        let mu = state.mu.zip_map(grads, |m, g| b1 * m + (1.0 - b1) * g)?;
        let nu = state.nu.zip_map(grads, |v, g| b2 * v + (1.0 - b2) * g * g)?;

        let bias1 = 1.0 - b1.powi(step as i32);
        let bias2 = 1.0 - b2.powi(step as i32);
        let delta = mu.zip_map(&nu, |m, v| step_size * (m / bias1) / ((v / bias2).sqrt() + eps))?;
        let next = params.zip_map(&delta, |p, d| p - d)?;

        Ok((next, AdamState { step, mu, nu }))
    }
}
