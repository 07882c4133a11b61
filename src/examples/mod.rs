//! The two tutorial programs.

pub mod density;
pub mod handwriting;
