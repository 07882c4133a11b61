//! Gradient-based updates for [`Params`].

use crate::neural_net::Params;
use crate::util::Result;

mod adam;

pub use adam::{Adam, AdamState};

/// An update rule with explicit state.
///
/// `update` never touches its inputs: it returns the next parameters and the
/// next state, and the caller replaces the old pair with the new one.
pub trait Optimizer {
    type State;

    fn init(&self, params: &Params) -> Self::State;

    fn update(&self, grads: &Params, state: Self::State, params: &Params) -> Result<(Params, Self::State)>;
}

/// Plain gradient descent, `p - step_size * g`.
#[derive(Debug, Clone, Copy)]
pub struct Sgd {
    pub step_size: f64,
}

impl Sgd {
    pub fn new(step_size: f64) -> Self {
        Self { step_size }
    }
}

impl Optimizer for Sgd {
    type State = ();

    fn init(&self, _params: &Params) -> Self::State {}

    fn update(&self, grads: &Params, _state: (), params: &Params) -> Result<(Params, ())> {
        let step_size = self.step_size;
        Ok((params.zip_map(grads, |p, g| p - step_size * g)?, ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural_net::init_network_params;
    use crate::random::PrngKey;
    use approx::assert_relative_eq;

    #[test]
    fn sgd_steps_against_gradient() {
        let params = init_network_params(&[2, 2], PrngKey::new(0), 1.0).unwrap();
        let grads = params.map(|_| 2.0);
        let (next, ()) = Sgd::new(0.1).update(&grads, (), &params).unwrap();
        assert_relative_eq!(next.layers()[0].bias[0], params.layers()[0].bias[0] - 0.2, epsilon = 1e-12);
    }
}
