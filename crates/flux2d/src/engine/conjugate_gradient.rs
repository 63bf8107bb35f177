//! Preconditioned conjugate gradient on the GPU.
//!
//! All vectors and scalars of the iteration live in GPU buffers. Two command
//! lists are recorded at bind time: `init` (x = 0, r = b, z = M^-1 r, s = z)
//! and `iterate` (one full CG iteration ending with the residual max-norm).
//! The host submits `iterate` and reads back the one-float residual until
//! the tolerance or the iteration cap is reached.

use glam::UVec2;

use crate::error::Result;
use crate::renderer::readback::Readback;
use crate::renderer::{
    Access, Binding, BoundWork, CommandBuffer, ComputeSize, Device, GenericBuffer, ResourceId, Work,
};

use super::incomplete_poisson::IncompletePoisson;
use super::linear_solver::{Data, LinearSolver, Parameters};
use super::params::GridParams;
use super::reduce::{Reduce, ReduceOp};

struct Vectors {
    r: GenericBuffer,
    z: GenericBuffer,
    s: GenericBuffer,
    product: GenericBuffer,
}

struct Scalars {
    rz: GenericBuffer,
    rz_new: GenericBuffer,
    s_product: GenericBuffer,
    alpha: GenericBuffer,
    beta: GenericBuffer,
    residual: GenericBuffer,
}

struct Bound {
    init: CommandBuffer,
    iterate: CommandBuffer,
    div: ResourceId,
}

pub struct ConjugateGradient {
    device: Device,
    size: UVec2,
    preconditioner: IncompletePoisson,
    vectors: Vectors,
    scalars: Scalars,
    params: GenericBuffer,
    readback: Readback,
    bound: Option<Bound>,
}

impl ConjugateGradient {
    pub fn new(device: &Device, size: UVec2) -> Self {
        let scalar = |label: &str| GenericBuffer::storage::<f32>(device, label, 1);
        let residual = scalar("cg residual");

        log::info!("Conjugate gradient solver for {}x{} grid", size.x, size.y);

        Self {
            device: device.clone(),
            size,
            preconditioner: IncompletePoisson::new(device, size),
            vectors: Vectors {
                r: GenericBuffer::grid::<f32>(device, "cg r", size),
                z: GenericBuffer::grid::<f32>(device, "cg z", size),
                s: GenericBuffer::grid::<f32>(device, "cg s", size),
                product: GenericBuffer::grid::<f32>(device, "cg As", size),
            },
            scalars: Scalars {
                rz: scalar("cg rz"),
                rz_new: scalar("cg rz new"),
                s_product: scalar("cg sAs"),
                alpha: scalar("cg alpha"),
                beta: scalar("cg beta"),
                residual: residual.clone(),
            },
            params: GenericBuffer::uniform(device, "cg params", &GridParams::new(size, 0.0)),
            readback: Readback::for_buffer(device, &residual),
            bound: None,
        }
    }
}

impl LinearSolver for ConjugateGradient {
    fn bind(&mut self, data: &Data) {
        assert_eq!(data.size(), self.size, "conjugate gradient bound to a different grid size");

        let device = &self.device;
        let len = data.len();
        let Vectors { r, z, s, product } = &self.vectors;
        let Scalars {
            rz,
            rz_new,
            s_product,
            alpha,
            beta,
            residual,
        } = &self.scalars;
        let x = data.pressure.front();

        self.preconditioner.bind(&data.diagonal, &data.weights, r, z);

        let multiply = Work::new(
            device,
            ComputeSize::grid(self.size),
            "multiply_matrix",
            "main",
            &[
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Write),
                Binding::Uniform,
            ],
        )
        .bind(&[&data.diagonal, &data.weights, s, product, &self.params]);

        let dot = Reduce::new(device, len, ReduceOp::Dot);
        let dot_s_product = dot.bind(&[s, product], s_product);
        let dot_rz = dot.bind(&[r, z], rz);
        let dot_rz_new = dot.bind(&[r, z], rz_new);
        let max_residual = Reduce::new(device, len, ReduceOp::MaxAbs).bind(&[r], residual);

        let scalar_kernel = |shader: &str, second: Access| {
            Work::new(
                device,
                ComputeSize::single(),
                shader,
                "main",
                &[
                    Binding::Storage(Access::Read),
                    Binding::Storage(second),
                    Binding::Storage(Access::Write),
                ],
            )
        };
        let update_alpha = scalar_kernel("cg_alpha", Access::Read).bind(&[rz, s_product, alpha]);
        let update_beta = scalar_kernel("cg_beta", Access::ReadWrite).bind(&[rz_new, rz, beta]);

        let vector_op = |entry: &str| -> Work {
            Work::new(
                device,
                ComputeSize::linear(len as u32),
                "vector_ops",
                entry,
                &[
                    Binding::Storage(Access::Read),
                    Binding::Storage(Access::Read),
                    Binding::Storage(Access::ReadWrite),
                ],
            )
        };
        let update_x: BoundWork = vector_op("axpy").bind(&[alpha, s, x]);
        let update_r: BoundWork = vector_op("axmy").bind(&[alpha, product, r]);
        let update_s: BoundWork = vector_op("xpay").bind(&[beta, z, s]);

        let preconditioner = &self.preconditioner;

        let mut init = CommandBuffer::new(device, "cg init", false);
        init.record(|encoder| {
            encoder.debug_marker_begin("cg init");
            encoder.clear(x);
            encoder.copy(&data.div, r);
            encoder.barrier(&[r]);
            preconditioner.record(encoder);
            encoder.barrier(&[z]);
            encoder.copy(z, s);
            dot_rz.record(encoder);
            max_residual.record(encoder);
            encoder.debug_marker_end();
        });

        let mut iterate = CommandBuffer::new(device, "cg iterate", false);
        iterate.record(|encoder| {
            encoder.debug_marker_begin("cg iterate");
            multiply.record(encoder);
            encoder.barrier(&[product]);
            dot_s_product.record(encoder);
            update_alpha.record(encoder);
            encoder.barrier(&[alpha]);

            update_x.record(encoder);
            update_r.record(encoder);
            encoder.barrier(&[r]);

            preconditioner.record(encoder);
            encoder.barrier(&[z]);
            dot_rz_new.record(encoder);

            encoder.barrier(&[rz]);
            update_beta.record(encoder);
            encoder.barrier(&[beta, s]);
            update_s.record(encoder);
            encoder.barrier(&[s]);

            max_residual.record(encoder);
            encoder.debug_marker_end();
        });

        self.bound = Some(Bound {
            init,
            iterate,
            div: data.div.id(),
        });
    }

    fn init(&mut self, data: &Data) {
        let bound = self
            .bound
            .as_ref()
            .expect("conjugate gradient initialised before bind");
        assert_eq!(bound.div, data.div.id(), "conjugate gradient bound to other data");
    }

    fn solve(&mut self, params: &mut Parameters) -> Result<()> {
        params.reset();
        let Some(bound) = self.bound.as_mut() else {
            panic!("conjugate gradient solved before bind");
        };
        let read_residual = || -> Result<f32> {
            Ok(self.readback.read::<f32>(&self.device, &self.scalars.residual)?[0])
        };
        bound.init.submit();

        let mut error = read_residual()?;
        let mut iterations = 0;
        while !params.is_finished(iterations, error) {
            bound.iterate.submit();
            error = read_residual()?;
            iterations += 1;
        }

        params.report("conjugate gradient");
        Ok(())
    }
}
