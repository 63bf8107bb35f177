//! Two-way coupling of rigid bodies with the pressure solve.
//!
//! A body is a signed-distance shape rendered into its own level set. Its
//! velocity enters the divergence through the faces it covers, its inertia
//! optionally stiffens the diagonal, and the solved pressure integrated over
//! the covered faces gives the force and torque the fluid exerts on it.

use bytemuck::Zeroable;
use glam::{UVec2, Vec2, Vec4};

use crate::error::Result;
use crate::renderer::readback::Readback;
use crate::renderer::{
    Access, Binding, Blend, BoundWork, Clear, CommandBuffer, ComputeSize, Device, Drawable,
    GenericBuffer, RenderCommand, RenderTarget, Shape, Transform, Work,
};

use super::level_set::FAR_DISTANCE;
use super::params::{BodyParams, CentreConstants, GridParams};
use super::reduce::{BoundReduce, Reduce, ReduceOp};
use super::velocity::Velocity;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RigidBodyKind {
    /// Rendered into the static solid level set once.
    Static,
    /// Re-rendered into the per-step solid level set by [`RigidBody::render_phi`].
    Dynamic,
}

/// Pressure force and torque (about the body centre) exerted by the fluid.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Forces {
    pub force: Vec2,
    pub torque: f32,
}

struct DivPass {
    work: BoundWork,
    div: GenericBuffer,
    diagonal: GenericBuffer,
}

struct PressurePass {
    work: BoundWork,
    sum: BoundReduce,
}

struct ConstrainPass {
    work: BoundWork,
    velocity: Velocity,
}

pub struct RigidBody {
    device: Device,
    size: UVec2,
    kind: RigidBodyKind,
    centre: Vec2,
    shape: Box<dyn Shape>,
    phi: RenderTarget,
    render: RenderCommand,
    union: CommandBuffer,

    grid_params: GenericBuffer,
    body_params: GenericBuffer,
    force: GenericBuffer,
    force_sum: GenericBuffer,
    readback: Readback,

    div_pass: Option<DivPass>,
    pressure_pass: Option<PressurePass>,
    constrain_pass: Option<ConstrainPass>,
    div: CommandBuffer,
    pressure: CommandBuffer,
    constrain: CommandBuffer,

    velocity: Vec2,
    angular_velocity: f32,
    mass: f32,
    inertia: f32,
}

impl RigidBody {
    /// Render `shape` into the body's level set and prepare the union into
    /// `solid_phi`. A static body is unioned immediately.
    pub fn new(
        device: &Device,
        size: UVec2,
        dt: f32,
        mut shape: Box<dyn Shape>,
        centre: Vec2,
        solid_phi: &GenericBuffer,
        kind: RigidBodyKind,
    ) -> Self {
        let rotation = shape.transform().rotation;
        shape.set_transform(Transform::new(centre, rotation));

        let phi = RenderTarget::new(device, "rigid body phi", size, 1);
        let clear = Clear::new(device, FAR_DISTANCE);
        let drawables: [&dyn Drawable; 2] = [&clear, shape.as_drawable()];
        let render = phi.record(&drawables, Blend::Union);

        let grid_params = GenericBuffer::uniform(device, "rigid body grid", &GridParams::new(size, dt));
        let union_work = Work::new(
            device,
            ComputeSize::grid(size),
            "union_phi",
            "main",
            &[
                Binding::Storage(Access::Read),
                Binding::Storage(Access::ReadWrite),
                Binding::Uniform,
            ],
        )
        .bind(&[phi.framebuffer(0), solid_phi, &grid_params]);
        let mut union = CommandBuffer::new(device, "rigid body union", true);
        union.record(|encoder| {
            union_work.record(encoder);
            encoder.barrier(&[solid_phi]);
        });

        let force_sum = GenericBuffer::storage::<Vec4>(device, "rigid body force sum", 1);
        let mut body = Self {
            device: device.clone(),
            size,
            kind,
            centre,
            shape,
            render,
            union,
            body_params: GenericBuffer::uniform(device, "rigid body", &BodyParams::zeroed()),
            force: GenericBuffer::grid::<Vec4>(device, "rigid body force", size),
            readback: Readback::for_buffer(device, &force_sum),
            force_sum,
            grid_params,
            phi,
            div_pass: None,
            pressure_pass: None,
            constrain_pass: None,
            div: CommandBuffer::new(device, "rigid body div", true),
            pressure: CommandBuffer::new(device, "rigid body pressure", true),
            constrain: CommandBuffer::new(device, "rigid body constrain", true),
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            mass: f32::INFINITY,
            inertia: f32::INFINITY,
        };

        if kind == RigidBodyKind::Static {
            body.render_phi();
            body.union.wait();
        }
        log::debug!("Created {kind:?} rigid body at {centre}");
        body
    }

    pub fn kind(&self) -> RigidBodyKind {
        self.kind
    }

    pub fn centre(&self) -> Vec2 {
        self.centre
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    /// The body's own level set.
    pub fn phi(&self) -> &GenericBuffer {
        self.phi.framebuffer(0)
    }

    pub fn shape(&self) -> &dyn Shape {
        self.shape.as_ref()
    }

    /// Render the body's level set and union it into the solid level set.
    pub fn render_phi(&mut self) {
        self.render.render(0);
        self.union.submit();
    }

    /// Bind the divergence pass: adds the body velocity through covered
    /// faces to `div` and the lumped inertia to `diagonal`.
    pub fn bind_div(&mut self, div: &GenericBuffer, diagonal: &GenericBuffer, liquid_phi: &GenericBuffer) {
        let work = Work::with_constants::<CentreConstants>(
            &self.device,
            ComputeSize::grid(self.size),
            "rigidbody_div",
            "main",
            &[
                Binding::Storage(Access::ReadWrite),
                Binding::Storage(Access::ReadWrite),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Uniform,
                Binding::Uniform,
            ],
        )
        .bind(&[
            div,
            diagonal,
            liquid_phi,
            self.phi.framebuffer(0),
            &self.body_params,
            &self.grid_params,
        ]);
        self.div_pass = Some(DivPass {
            work,
            div: div.clone(),
            diagonal: diagonal.clone(),
        });
        self.record_div();
    }

    /// Bind the force pass over the solved `pressure`.
    pub fn bind_pressure(&mut self, liquid_phi: &GenericBuffer, pressure: &GenericBuffer) {
        let work = Work::with_constants::<CentreConstants>(
            &self.device,
            ComputeSize::grid(self.size),
            "rigidbody_pressure",
            "main",
            &[
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Write),
                Binding::Uniform,
            ],
        )
        .bind(&[
            liquid_phi,
            self.phi.framebuffer(0),
            pressure,
            &self.force,
            &self.grid_params,
        ]);
        let sum = Reduce::new(&self.device, (self.size.x * self.size.y) as usize, ReduceOp::SumVec4)
            .bind(&[&self.force], &self.force_sum);
        self.pressure_pass = Some(PressurePass { work, sum });
        self.record_pressure();
    }

    /// Bind the constraint enforcing the body's normal velocity on the faces
    /// it covers.
    pub fn bind_velocity_constrain(&mut self, velocity: &Velocity) {
        let work = Work::with_constants::<CentreConstants>(
            &self.device,
            ComputeSize::grid(self.size),
            "rigidbody_constrain",
            "main",
            &[
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Read),
                Binding::Storage(Access::Write),
                Binding::Uniform,
                Binding::Uniform,
            ],
        )
        .bind(&[
            self.phi.framebuffer(0),
            velocity.field(),
            velocity.output(),
            &self.body_params,
            &self.grid_params,
        ]);
        self.constrain_pass = Some(ConstrainPass {
            work,
            velocity: velocity.clone(),
        });
        self.record_constrain();
    }

    fn record_div(&mut self) {
        let constants = CentreConstants::new(self.centre);
        if let Some(pass) = &self.div_pass {
            self.div.record(|encoder| {
                pass.work.push_constants(encoder, &constants);
                pass.work.record(encoder);
                encoder.barrier(&[&pass.div, &pass.diagonal]);
            });
        }
    }

    fn record_pressure(&mut self) {
        let constants = CentreConstants::new(self.centre);
        let force = &self.force;
        if let Some(pass) = &self.pressure_pass {
            self.pressure.record(|encoder| {
                encoder.clear(force);
                encoder.barrier(&[force]);
                pass.work.push_constants(encoder, &constants);
                pass.work.record(encoder);
                encoder.barrier(&[force]);
                pass.sum.record(encoder);
            });
        }
    }

    fn record_constrain(&mut self) {
        let constants = CentreConstants::new(self.centre);
        if let Some(pass) = &self.constrain_pass {
            self.constrain.record(|encoder| {
                pass.work.push_constants(encoder, &constants);
                pass.work.record(encoder);
                pass.velocity.copy_back(encoder);
            });
        }
    }

    /// Submit the divergence pass. Panics if not bound.
    pub fn div(&mut self) {
        self.div.submit();
    }

    /// Submit the force pass. Panics if not bound.
    pub fn pressure(&mut self) {
        self.pressure.submit();
    }

    /// Submit the velocity constraint. Panics if not bound.
    pub fn velocity_constrain(&mut self) {
        self.constrain.submit();
    }

    /// Force and torque from the last submitted force pass.
    pub fn forces(&mut self) -> Result<Forces> {
        self.pressure.wait();
        let [x, y, torque, _] = self.readback.read::<[f32; 4]>(&self.device, &self.force_sum)?[0];
        Ok(Forces {
            force: Vec2::new(x, y),
            torque,
        })
    }

    pub fn set_velocities(&mut self, velocity: Vec2, angular_velocity: f32) {
        self.velocity = velocity;
        self.angular_velocity = angular_velocity;
        self.upload_state();
    }

    /// Infinite (the default) or non-positive values disable the inertia
    /// term on the diagonal.
    pub fn set_mass(&mut self, mass: f32, inertia: f32) {
        self.mass = mass;
        self.inertia = inertia;
        self.upload_state();
    }

    /// Move the body. Re-records the passes with the new centre; the level
    /// set follows on the next [`render_phi`](Self::render_phi).
    pub fn update_position(&mut self, position: Vec2, rotation: f32) {
        self.centre = position;
        self.shape.set_transform(Transform::new(position, rotation));
        self.record_div();
        self.record_pressure();
        self.record_constrain();
    }

    fn upload_state(&self) {
        self.body_params.write(&BodyParams {
            velocity: self.velocity.to_array(),
            angular_velocity: self.angular_velocity,
            inv_mass: inverse(self.mass),
            inv_inertia: inverse(self.inertia),
            _pad: [0.0; 3],
        });
    }
}

fn inverse(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        1.0 / value
    } else {
        0.0
    }
}
