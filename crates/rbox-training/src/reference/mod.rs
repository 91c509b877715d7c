//! CPU reference adapters used by the `rbox-train` binary.
//!
//! A real detector binds a tensor framework behind the same two traits.

pub mod adam;
pub mod model;

pub use adam::{Adam, AdamParams};
pub use model::{BoxPriorModel, BoxPriorOutput, Mode};
