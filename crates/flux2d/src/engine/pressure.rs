//! Pressure projection.
//!
//! Builds the weighted Poisson system from the liquid and solid level sets,
//! hands it to a [`LinearSolver`] and subtracts the resulting pressure
//! gradient from the velocity. Face weights are the open fraction of each
//! face (sub-cell solid boundaries); liquid/air faces use the ghost-fluid
//! distance ratio so the free surface sits between cell centres.

use glam::UVec2;

use crate::error::Result;
use crate::renderer::{Access, Binding, CommandBuffer, ComputeSize, Device, GenericBuffer, Work};

use super::linear_solver::{Data, LinearSolver, Parameters};
use super::params::GridParams;
use super::velocity::Velocity;

/// Level sets and boundary velocity the projection reads.
pub struct Boundaries<'a> {
    pub liquid_phi: &'a GenericBuffer,
    pub solid_phi: &'a GenericBuffer,
    /// Velocity of the solid on each face, same layout as [`Velocity`]
    pub solid_velocity: &'a GenericBuffer,
}

pub struct Pressure {
    build: CommandBuffer,
    project: CommandBuffer,
}

impl Pressure {
    /// Bind and record the build and projection passes. `valid` receives the
    /// mask of faces the projection updated.
    pub fn new(
        device: &Device,
        dt: f32,
        size: UVec2,
        data: &Data,
        velocity: &Velocity,
        boundaries: Boundaries<'_>,
        valid: &GenericBuffer,
    ) -> Self {
        let params = GenericBuffer::uniform(device, "pressure params", &GridParams::new(size, dt));
        let grid = ComputeSize::grid(size);
        let Boundaries {
            liquid_phi,
            solid_phi,
            solid_velocity,
        } = boundaries;

        let div = Work::new(
            device,
            grid,
            "build_div",
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
        .bind(&[velocity.field(), liquid_phi, solid_phi, solid_velocity, &data.div, &params]);

        let matrix = Work::new(
            device,
            grid,
            "build_matrix",
            "main",
            &[
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Write),
                Binding::Storage(Access::Write),
                Binding::Uniform,
            ],
        )
        .bind(&[liquid_phi, solid_phi, &data.weights, &data.diagonal, &params]);

        let project = Work::new(
            device,
            grid,
            "project",
            "main",
            &[
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Write),
                Binding::Storage(Access::Write),
                Binding::Uniform,
            ],
        )
        .bind(&[
            velocity.field(),
            data.pressure.front(),
            liquid_phi,
            solid_phi,
            solid_velocity,
            velocity.output(),
            valid,
            &params,
        ]);

        let mut build = CommandBuffer::new(device, "pressure build", true);
        build.record(|encoder| {
            encoder.debug_marker_begin("build linear equation");
            div.record(encoder);
            matrix.record(encoder);
            encoder.barrier(&[&data.div, &data.weights, &data.diagonal]);
            encoder.debug_marker_end();
        });

        let mut apply = CommandBuffer::new(device, "pressure project", true);
        apply.record(|encoder| {
            encoder.debug_marker_begin("project");
            project.record(encoder);
            encoder.barrier(&[valid]);
            velocity.copy_back(encoder);
            encoder.debug_marker_end();
        });

        Self {
            build,
            project: apply,
        }
    }

    /// Compute the divergence, weights and diagonal.
    pub fn build_linear_equation(&mut self) {
        self.build.submit();
    }

    /// Subtract the gradient of `pressure.front()` from the velocity.
    pub fn apply_pressure(&mut self) {
        self.project.submit();
    }

    /// Build, solve and project in one go.
    pub fn solve(
        &mut self,
        solver: &mut dyn LinearSolver,
        data: &Data,
        params: &mut Parameters,
    ) -> Result<()> {
        self.build_linear_equation();
        solver.init(data);
        solver.solve(params)?;
        self.apply_pressure();
        Ok(())
    }

    /// Block until the last projection has completed.
    pub fn wait(&mut self) {
        self.build.wait();
        self.project.wait();
    }
}
