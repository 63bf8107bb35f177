//! Velocity extrapolation and solid constraint.
//!
//! After projection only faces next to liquid carry meaningful velocity
//! (the `valid` mask). Extrapolation dilates the valid region one face per
//! round by averaging valid neighbours; the constraint then removes the
//! normal component on faces inside the solid so nothing flows into walls.

use glam::UVec2;

use crate::renderer::{Access, Binding, CommandBuffer, ComputeSize, Device, GenericBuffer, Work};

use super::params::GridParams;
use super::velocity::Velocity;

pub struct Extrapolation {
    device: Device,
    size: UVec2,
    params: GenericBuffer,
    velocity: Velocity,
    extrapolate: CommandBuffer,
    constrain: CommandBuffer,
}

impl Extrapolation {
    /// Record `iterations / 2` forward-and-back rounds over `valid` and
    /// `velocity`.
    pub fn new(
        device: &Device,
        size: UVec2,
        valid: &GenericBuffer,
        velocity: &Velocity,
        iterations: u32,
    ) -> Self {
        let params = GenericBuffer::uniform(device, "extrapolation params", &GridParams::new(size, 0.0));
        let scratch = GenericBuffer::grid::<[u32; 2]>(device, "valid scratch", size);

        let work = Work::new(
            device,
            ComputeSize::grid(size),
            "extrapolate",
            "main",
            &[
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Write),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Write),
                Binding::Uniform,
            ],
        );
        let field = velocity.field();
        let output = velocity.output();
        let forward = work.bind(&[valid, &scratch, field, output, &params]);
        let backward = work.bind(&[&scratch, valid, output, field, &params]);

        let mut extrapolate = CommandBuffer::new(device, "extrapolate", true);
        extrapolate.record(|encoder| {
            encoder.debug_marker_begin("extrapolate");
            for _ in 0..iterations / 2 {
                forward.record(encoder);
                encoder.barrier(&[valid, &scratch, field, output]);
                backward.record(encoder);
                encoder.barrier(&[valid, &scratch, field, output]);
            }
            encoder.debug_marker_end();
        });

        Self {
            device: device.clone(),
            size,
            params,
            velocity: velocity.clone(),
            extrapolate,
            constrain: CommandBuffer::new(device, "constrain velocity", true),
        }
    }

    /// Bind the solid constraint against `solid_phi`.
    pub fn constrain_bind(&mut self, solid_phi: &GenericBuffer) {
        let constrain = Work::new(
            &self.device,
            ComputeSize::grid(self.size),
            "constrain_velocity",
            "main",
            &[
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Write),
                Binding::Uniform,
            ],
        )
        .bind(&[
            solid_phi,
            self.velocity.field(),
            self.velocity.output(),
            &self.params,
        ]);

        let velocity = &self.velocity;
        self.constrain.record(|encoder| {
            constrain.record(encoder);
            velocity.copy_back(encoder);
        });
    }

    pub fn extrapolate(&mut self) {
        self.extrapolate.submit();
    }

    /// Panics if [`constrain_bind`](Self::constrain_bind) was never called.
    pub fn constrain_velocity(&mut self) {
        self.constrain.submit();
    }

    pub fn wait(&mut self) {
        self.extrapolate.wait();
        self.constrain.wait();
    }
}
