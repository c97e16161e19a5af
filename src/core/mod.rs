//! Core constants and error types.
//!
//! This module has no I/O and no cryptographic dependencies; every other
//! layer builds on it.

mod constants;
mod error;

pub use constants::*;
pub use error::*;
