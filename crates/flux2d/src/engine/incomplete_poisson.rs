//! Incomplete Poisson preconditioner.
//!
//! Approximates `A^-1` by `K K^T` with `K = I - L D^-1`, where `L` is the
//! strictly lower part of `A`. On the 5-point stencil both triangular
//! products expand to a fixed neighbourhood, so the whole application is one
//! data-parallel pass instead of a sequential triangular solve.

use glam::UVec2;

use crate::renderer::{Access, Binding, BoundWork, CommandEncoder, ComputeSize, Device, GenericBuffer, Work};

use super::params::GridParams;

pub struct IncompletePoisson {
    work: Work,
    params: GenericBuffer,
    bound: Option<BoundWork>,
}

impl IncompletePoisson {
    pub fn new(device: &Device, size: UVec2) -> Self {
        Self {
            work: Work::new(
                device,
                ComputeSize::grid(size),
                "incomplete_poisson",
                "main",
                &[
                    Binding::Storage(Access::Read),
                    Binding::Storage(Access::Read),
                    Binding::Storage(Access::Read),
                    Binding::Storage(Access::Write),
                    Binding::Uniform,
                ],
            ),
            params: GenericBuffer::uniform(
                device,
                "incomplete poisson params",
                &GridParams::new(size, 0.0),
            ),
            bound: None,
        }
    }

    /// Bind the matrix, the residual `r` and the output `z`.
    pub fn bind(
        &mut self,
        diagonal: &GenericBuffer,
        weights: &GenericBuffer,
        r: &GenericBuffer,
        z: &GenericBuffer,
    ) {
        self.bound = Some(self.work.bind(&[diagonal, weights, r, z, &self.params]));
    }

    /// Record `z = M^-1 r`. Panics if not bound.
    pub fn record(&self, encoder: &mut CommandEncoder) {
        self.bound
            .as_ref()
            .expect("incomplete poisson recorded before bind")
            .record(encoder);
    }
}
