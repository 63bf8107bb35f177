//! Damped Jacobi relaxation.
//!
//! Ping-pongs the two pressure buffers: each submission of the recorded list
//! runs a front -> back and a back -> front sweep, so the solution always
//! ends in `pressure.front()`, then refreshes the residual max-norm. When a
//! single iteration is left before the cap, a one-sweep list runs instead and
//! copies the result back to the front.

use glam::UVec2;

use crate::error::Result;
use crate::renderer::readback::Readback;
use crate::renderer::{
    Access, Binding, CommandBuffer, ComputeSize, Device, GenericBuffer, ResourceId, Work,
};

use super::linear_solver::{Data, LinearSolver, Parameters};
use super::params::GridParams;
use super::reduce::{Reduce, ReduceOp};

struct Bound {
    init: CommandBuffer,
    iterate: CommandBuffer,
    single: CommandBuffer,
    div: ResourceId,
}

pub struct Jacobi {
    device: Device,
    size: UVec2,
    params: GenericBuffer,
    r: GenericBuffer,
    residual: GenericBuffer,
    readback: Readback,
    bound: Option<Bound>,
}

impl Jacobi {
    /// `omega` is the damping factor; 2/3 is the usual choice.
    pub fn new(device: &Device, size: UVec2, omega: f32) -> Self {
        let residual = GenericBuffer::storage::<f32>(device, "jacobi residual", 1);
        log::info!("Jacobi solver for {}x{} grid (omega {omega})", size.x, size.y);

        Self {
            device: device.clone(),
            size,
            params: GenericBuffer::uniform(
                device,
                "jacobi params",
                &GridParams::new(size, 0.0).with_scalar(omega),
            ),
            r: GenericBuffer::grid::<f32>(device, "jacobi r", size),
            readback: Readback::for_buffer(device, &residual),
            residual,
            bound: None,
        }
    }
}

impl LinearSolver for Jacobi {
    fn bind(&mut self, data: &Data) {
        assert_eq!(data.size(), self.size, "jacobi bound to a different grid size");
        let device = &self.device;
        let front = data.pressure.front();
        let back = data.pressure.back();

        let sweep = Work::new(
            device,
            ComputeSize::grid(self.size),
            "jacobi",
            "main",
            &[
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Write),
                Binding::Uniform,
            ],
        );
        let forward = sweep.bind(&[&data.diagonal, &data.weights, &data.div, front, back, &self.params]);
        let backward = sweep.bind(&[&data.diagonal, &data.weights, &data.div, back, front, &self.params]);

        let residual = Work::new(
            device,
            ComputeSize::grid(self.size),
            "residual",
            "main",
            &[
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Write),
                Binding::Uniform,
            ],
        )
        .bind(&[&data.diagonal, &data.weights, front, &data.div, &self.r, &self.params]);
        let max_residual =
            Reduce::new(device, data.len(), ReduceOp::MaxAbs).bind(&[&self.r], &self.residual);

        let mut init = CommandBuffer::new(device, "jacobi init", false);
        init.record(|encoder| {
            encoder.clear(front);
            encoder.barrier(&[front]);
            residual.record(encoder);
            encoder.barrier(&[&self.r]);
            max_residual.record(encoder);
        });

        let mut iterate = CommandBuffer::new(device, "jacobi iterate", false);
        iterate.record(|encoder| {
            forward.record(encoder);
            encoder.barrier(&[front, back]);
            backward.record(encoder);
            encoder.barrier(&[front, back]);
            residual.record(encoder);
            encoder.barrier(&[&self.r]);
            max_residual.record(encoder);
        });

        let mut single = CommandBuffer::new(device, "jacobi single sweep", false);
        single.record(|encoder| {
            forward.record(encoder);
            encoder.barrier(&[front, back]);
            encoder.copy(back, front);
            encoder.barrier(&[front, back]);
            residual.record(encoder);
            encoder.barrier(&[&self.r]);
            max_residual.record(encoder);
        });

        self.bound = Some(Bound {
            init,
            iterate,
            single,
            div: data.div.id(),
        });
    }

    fn init(&mut self, data: &Data) {
        let bound = self.bound.as_ref().expect("jacobi initialised before bind");
        assert_eq!(bound.div, data.div.id(), "jacobi bound to other data");
    }

    fn solve(&mut self, params: &mut Parameters) -> Result<()> {
        params.reset();
        let Some(bound) = self.bound.as_mut() else {
            panic!("jacobi solved before bind");
        };
        bound.init.submit();

        let mut error = self.readback.read::<f32>(&self.device, &self.residual)?[0];
        let mut iterations = 0;
        while !params.is_finished(iterations, error) {
            if params.max_iterations - iterations == 1 {
                bound.single.submit();
                iterations += 1;
            } else {
                bound.iterate.submit();
                iterations += 2;
            }
            error = self.readback.read::<f32>(&self.device, &self.residual)?[0];
        }

        params.report("jacobi");
        Ok(())
    }
}
