//! Linear solver interface for the pressure Poisson system.

use glam::{UVec2, Vec4};

use crate::error::Result;
use crate::renderer::{Device, DoubleBuffer, GenericBuffer};

/// GPU storage of the system `A p = div`.
///
/// `A` is symmetric with five non-zeros per row: `diagonal` and the four
/// couplings in `weights` (x: +x, y: -x, z: +y, w: -y neighbour).
pub struct Data {
    pub weights: GenericBuffer,
    pub diagonal: GenericBuffer,
    pub div: GenericBuffer,
    pub pressure: DoubleBuffer,
    size: UVec2,
}

impl Data {
    pub fn new(device: &Device, size: UVec2) -> Self {
        Self {
            weights: GenericBuffer::grid::<Vec4>(device, "weights", size),
            diagonal: GenericBuffer::grid::<f32>(device, "diagonal", size),
            div: GenericBuffer::grid::<f32>(device, "div", size),
            pressure: DoubleBuffer::grid::<f32>(device, "pressure", size),
            size,
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn len(&self) -> usize {
        (self.size.x * self.size.y) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stopping criteria of a solve and what the solve achieved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Parameters {
    pub max_iterations: u32,
    /// Max-norm of the residual at which the solve stops
    pub error_tolerance: f32,
    pub out_iterations: u32,
    pub out_error: f32,
}

impl Parameters {
    pub fn new(max_iterations: u32, error_tolerance: f32) -> Self {
        Self {
            max_iterations,
            error_tolerance,
            out_iterations: 0,
            out_error: 0.0,
        }
    }

    /// Record the state after `iterations` iterations and report whether the
    /// solve should stop.
    pub fn is_finished(&mut self, iterations: u32, error: f32) -> bool {
        self.out_iterations = iterations;
        self.out_error = error;
        error <= self.error_tolerance || iterations >= self.max_iterations
    }

    pub fn converged(&self) -> bool {
        self.out_error <= self.error_tolerance
    }

    pub(crate) fn reset(&mut self) {
        self.out_iterations = 0;
        self.out_error = 0.0;
    }

    pub(crate) fn report(&self, solver: &str) {
        if self.converged() {
            log::debug!(
                "{solver}: converged in {} iterations (error {:e})",
                self.out_iterations,
                self.out_error
            );
        } else {
            log::warn!(
                "{solver}: no convergence after {} iterations (error {:e}, tolerance {:e})",
                self.out_iterations,
                self.out_error,
                self.error_tolerance
            );
        }
    }
}

/// An iterative solver of [`Data`] running on the GPU.
///
/// The solution is written to `data.pressure.front()`.
pub trait LinearSolver {
    /// Bind to `data` and record the solver's command lists. Called once.
    fn bind(&mut self, data: &Data);

    /// Per-step preparation once the matrix has been rebuilt.
    fn init(&mut self, data: &Data);

    /// Iterate until `params` says to stop, filling its outputs.
    fn solve(&mut self, params: &mut Parameters) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finishes_below_tolerance() {
        let mut params = Parameters::new(100, 1e-3);
        assert!(!params.is_finished(0, 1.0));
        assert!(params.is_finished(12, 5e-4));
        assert_eq!(params.out_iterations, 12);
        assert_eq!(params.out_error, 5e-4);
        assert!(params.converged());
    }

    #[test]
    fn test_finishes_at_iteration_cap() {
        let mut params = Parameters::new(10, 1e-6);
        assert!(!params.is_finished(9, 0.5));
        assert!(params.is_finished(10, 0.5));
        assert!(!params.converged(), "cap reached with a large residual");
    }

    #[test]
    fn test_zero_iterations_stops_immediately() {
        let mut params = Parameters::new(0, 0.0);
        assert!(params.is_finished(0, 10.0));
        params.reset();
        assert_eq!(params.out_iterations, 0);
        assert_eq!(params.out_error, 0.0);
    }
}
