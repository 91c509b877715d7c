//! Command implementations for the `rbox-train` binary.

pub mod train;
