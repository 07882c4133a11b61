//! Two small tutorials: bivariate normal density surfaces, and a multilayer
//! perceptron trained on MNIST with explicit seeds and functional updates.

pub mod config;
pub mod data;
pub mod density;
pub mod examples;
pub mod neural_net;
pub mod optim;
pub mod plot;
pub mod random;
pub mod training;
pub mod util;

pub use util::{MlError, Result};
