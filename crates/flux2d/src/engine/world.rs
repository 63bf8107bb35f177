//! A complete pressure-projection step.

use glam::{UVec2, Vec2};

use crate::config::{SolverKind, WorldConfig};
use crate::error::Result;
use crate::renderer::{
    execute_command, Access, Binding, Blend, Clear, CommandBuffer, ComputeSize, Device, Drawable,
    GenericBuffer, RenderTarget, Shape, Work,
};

use super::conjugate_gradient::ConjugateGradient;
use super::extrapolation::Extrapolation;
use super::jacobi::Jacobi;
use super::level_set::FAR_DISTANCE;
use super::linear_solver::{Data, LinearSolver, Parameters};
use super::params::{GridParams, ImpulseParams};
use super::pressure::{Boundaries, Pressure};
use super::rigid_body::{RigidBody, RigidBodyKind};
use super::velocity::Velocity;

/// Handle to a rigid body owned by a [`World`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RigidBodyId(usize);

/// Owns every field of the simulation and runs the step in order:
/// solid rebuild, divergence and matrix, rigid-body divergence, solve,
/// projection, rigid-body forces, extrapolation and constraints.
pub struct World {
    device: Device,
    config: WorldConfig,
    velocity: Velocity,
    liquid_phi: RenderTarget,
    static_solid_phi: RenderTarget,
    solid_phi: RenderTarget,
    solid_velocity: GenericBuffer,
    valid: GenericBuffer,
    grid_params: GenericBuffer,
    data: Data,
    solver: Box<dyn LinearSolver>,
    pressure: Pressure,
    extrapolation: Extrapolation,
    solid_rebuild: CommandBuffer,
    bodies: Vec<RigidBody>,
}

impl World {
    /// Panics if `config` fails [`WorldConfig::validate`]; configs loaded
    /// from JSON are already validated.
    pub fn new(device: &Device, config: &WorldConfig) -> Self {
        if let Err(err) = config.validate() {
            panic!("{err}");
        }
        let size = config.size();
        log::info!(
            "Creating {}x{} world (dt {}, {:?})",
            size.x,
            size.y,
            config.dt,
            config.solver
        );

        let velocity = Velocity::new(device, size);
        let liquid_phi = RenderTarget::new(device, "liquid phi", size, 1);
        let static_solid_phi = RenderTarget::new(device, "static solid phi", size, 1);
        let solid_phi = RenderTarget::new(device, "solid phi", size, 1);
        let solid_velocity = GenericBuffer::grid::<Vec2>(device, "solid velocity", size);
        let valid = GenericBuffer::grid::<[u32; 2]>(device, "valid", size);
        let grid_params = GenericBuffer::uniform(device, "world grid", &GridParams::new(size, config.dt));

        let far = Clear::new(device, FAR_DISTANCE);
        for target in [&liquid_phi, &static_solid_phi, &solid_phi] {
            execute_command(device, "clear level set", |encoder| {
                far.draw(encoder, target.framebuffer(0), size, Blend::Replace);
            });
        }

        let data = Data::new(device, size);
        let mut solver: Box<dyn LinearSolver> = match config.solver {
            SolverKind::ConjugateGradient => Box::new(ConjugateGradient::new(device, size)),
            SolverKind::Jacobi => Box::new(Jacobi::new(device, size, config.jacobi_omega)),
        };
        solver.bind(&data);

        let pressure = Pressure::new(
            device,
            config.dt,
            size,
            &data,
            &velocity,
            Boundaries {
                liquid_phi: liquid_phi.framebuffer(0),
                solid_phi: solid_phi.framebuffer(0),
                solid_velocity: &solid_velocity,
            },
            &valid,
        );

        let mut extrapolation = Extrapolation::new(
            device,
            size,
            &valid,
            &velocity,
            config.extrapolation_iterations,
        );
        extrapolation.constrain_bind(solid_phi.framebuffer(0));

        let mut solid_rebuild = CommandBuffer::new(device, "solid rebuild", true);
        solid_rebuild.record(|encoder| {
            encoder.copy(static_solid_phi.framebuffer(0), solid_phi.framebuffer(0));
            encoder.barrier(&[solid_phi.framebuffer(0)]);
        });

        Self {
            device: device.clone(),
            config: config.clone(),
            velocity,
            liquid_phi,
            static_solid_phi,
            solid_phi,
            solid_velocity,
            valid,
            grid_params,
            data,
            solver,
            pressure,
            extrapolation,
            solid_rebuild,
            bodies: Vec::new(),
        }
    }

    pub fn size(&self) -> UVec2 {
        self.config.size()
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Union a shape into the liquid region.
    pub fn draw_liquid(&mut self, drawable: &dyn Drawable) {
        self.liquid_phi.record(&[drawable], Blend::Union).render(0).wait();
    }

    /// Union a shape into the static solid region.
    pub fn draw_solid(&mut self, drawable: &dyn Drawable) {
        self.static_solid_phi
            .record(&[drawable], Blend::Union)
            .render(0)
            .wait();
    }

    /// Accelerate the fluid by `force` on every face inside `shape` for one
    /// time step.
    pub fn add_force(&mut self, shape: &dyn Shape, force: Vec2) {
        let impulse = GenericBuffer::uniform(
            &self.device,
            "impulse",
            &ImpulseParams {
                value: (force * self.config.dt).to_array(),
                _pad: [0.0; 2],
            },
        );
        let work = Work::new(
            &self.device,
            ComputeSize::grid(self.size()),
            "shape_velocity",
            "main",
            &[
                Binding::Storage(Access::ReadWrite),
                Binding::Uniform,
                Binding::Uniform,
                Binding::Uniform,
            ],
        )
        .bind(&[self.velocity.field(), shape.params(), &impulse, &self.grid_params]);
        execute_command(&self.device, "add force", |encoder| work.record(encoder));
    }

    /// Add a rigid body. Static bodies are merged into the static solid
    /// level set now; dynamic ones are re-rendered every step.
    pub fn create_rigid_body(
        &mut self,
        shape: Box<dyn Shape>,
        centre: Vec2,
        kind: RigidBodyKind,
    ) -> RigidBodyId {
        let target = match kind {
            RigidBodyKind::Static => self.static_solid_phi.framebuffer(0),
            RigidBodyKind::Dynamic => self.solid_phi.framebuffer(0),
        };
        let mut body = RigidBody::new(
            &self.device,
            self.size(),
            self.config.dt,
            shape,
            centre,
            target,
            kind,
        );
        let liquid_phi = self.liquid_phi.framebuffer(0);
        body.bind_div(&self.data.div, &self.data.diagonal, liquid_phi);
        body.bind_pressure(liquid_phi, self.data.pressure.front());
        body.bind_velocity_constrain(&self.velocity);

        self.bodies.push(body);
        RigidBodyId(self.bodies.len() - 1)
    }

    /// Panics if `id` belongs to another world.
    pub fn rigid_body(&self, id: RigidBodyId) -> &RigidBody {
        &self.bodies[id.0]
    }

    /// Panics if `id` belongs to another world.
    pub fn rigid_body_mut(&mut self, id: RigidBodyId) -> &mut RigidBody {
        &mut self.bodies[id.0]
    }

    /// Run one pressure projection step and report the solve.
    pub fn step(&mut self) -> Result<Parameters> {
        self.solid_rebuild.submit();
        for body in &mut self.bodies {
            if body.kind() == RigidBodyKind::Dynamic {
                body.render_phi();
            }
        }

        self.pressure.build_linear_equation();
        for body in &mut self.bodies {
            body.div();
        }

        let mut params = Parameters::new(self.config.max_iterations, self.config.error_tolerance);
        self.solver.init(&self.data);
        self.solver.solve(&mut params)?;
        self.pressure.apply_pressure();
        for body in &mut self.bodies {
            body.pressure();
        }

        self.extrapolation.extrapolate();
        self.extrapolation.constrain_velocity();
        for body in &mut self.bodies {
            body.velocity_constrain();
        }

        log::debug!(
            "Step finished: {} iterations, error {:e}",
            params.out_iterations,
            params.out_error
        );
        Ok(params)
    }

    /// Block until every submitted step has completed.
    pub fn wait(&self) {
        self.device.wait_idle();
    }

    pub fn velocity(&self) -> &Velocity {
        &self.velocity
    }

    pub fn liquid_phi(&self) -> &GenericBuffer {
        self.liquid_phi.framebuffer(0)
    }

    pub fn solid_phi(&self) -> &GenericBuffer {
        self.solid_phi.framebuffer(0)
    }

    pub fn static_solid_phi(&self) -> &GenericBuffer {
        self.static_solid_phi.framebuffer(0)
    }

    pub fn solid_velocity(&self) -> &GenericBuffer {
        &self.solid_velocity
    }

    pub fn valid(&self) -> &GenericBuffer {
        &self.valid
    }

    pub fn data(&self) -> &Data {
        &self.data
    }
}
