//! GPU pressure projection for 2D incompressible flow.
//!
//! The crate is split in two layers:
//! - [`renderer`]: a thin compute substrate over `wgpu` (buffers, bound
//!   kernels, record-once command lists with explicit barriers).
//! - [`engine`]: the fluid pipeline built on it (divergence, weighted
//!   Poisson matrix, CG/Jacobi solvers, projection, extrapolation and
//!   rigid-body coupling), composed per step by [`engine::World`].

pub mod config;
pub mod engine;
pub mod error;
pub mod renderer;

pub use config::{SolverKind, WorldConfig};
pub use error::{Error, Result};
