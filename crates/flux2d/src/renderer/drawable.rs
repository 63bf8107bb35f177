//! Signed-distance shapes drawn into level-set buffers.
//!
//! Every level set in the crate is a cell-centred `f32` grid: cell (i, j)
//! holds the signed distance at `(i + 0.5, j + 0.5)`, negative inside.
//! Drawing evaluates a shape's distance per cell and either replaces the
//! stored value or unions with it (`min`).

use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec2};

use super::buffer::GenericBuffer;
use super::command::{CommandBuffer, CommandEncoder, RenderCommand};
use super::device::Device;
use super::work::{Access, Binding, ComputeSize, Work};

const KIND_CLEAR: u32 = 0;
const KIND_ELLIPSE: u32 = 1;
const KIND_RECTANGLE: u32 = 2;

/// Mirrors `Shape` in shape.wgsl.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct ShapeParams {
    kind: u32,
    _pad0: [u32; 3],
    position: [f32; 2],
    half_size: [f32; 2],
    rotation: f32,
    value: f32,
    _pad1: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct DrawConstants {
    width: u32,
    height: u32,
    blend: u32,
    _pad: u32,
}

/// How a drawn distance combines with the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Blend {
    /// Overwrite the target.
    #[default]
    Replace,
    /// Keep the minimum of target and shape.
    Union,
}

impl Blend {
    fn code(self) -> u32 {
        match self {
            Blend::Replace => 0,
            Blend::Union => 1,
        }
    }
}

/// Placement of a shape in grid units, rotation in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transform {
    pub position: Vec2,
    pub rotation: f32,
}

impl Transform {
    pub fn new(position: Vec2, rotation: f32) -> Self {
        Self { position, rotation }
    }

    /// Map a grid point into the shape's local frame.
    pub fn to_local(&self, point: Vec2) -> Vec2 {
        Vec2::from_angle(-self.rotation).rotate(point - self.position)
    }
}

/// Something that can be recorded into a level-set buffer.
pub trait Drawable {
    fn draw(&self, encoder: &mut CommandEncoder, target: &GenericBuffer, size: UVec2, blend: Blend);
}

/// A movable signed-distance shape.
pub trait Shape: Drawable {
    fn transform(&self) -> Transform;

    /// Move the shape. Takes effect from the next submission.
    fn set_transform(&mut self, transform: Transform);

    /// Host evaluation of the distance drawn at `point`.
    fn distance(&self, point: Vec2) -> f32;

    /// Uniform block describing the shape to kernels.
    fn params(&self) -> &GenericBuffer;

    fn as_drawable(&self) -> &dyn Drawable;
}

fn draw_params(
    params: &GenericBuffer,
    encoder: &mut CommandEncoder,
    target: &GenericBuffer,
    size: UVec2,
    blend: Blend,
) {
    let work = Work::with_constants::<DrawConstants>(
        params.device(),
        ComputeSize::grid(size),
        "shape",
        "main",
        &[Binding::Storage(Access::ReadWrite), Binding::Uniform],
    );
    let bound = work.bind(&[target, params]);
    bound.push_constants(
        encoder,
        &DrawConstants {
            width: size.x,
            height: size.y,
            blend: blend.code(),
            _pad: 0,
        },
    );
    bound.record(encoder);
    encoder.barrier(&[target]);
}

/// Fills the whole target with a constant.
pub struct Clear {
    params: GenericBuffer,
}

impl Clear {
    pub fn new(device: &Device, value: f32) -> Self {
        let params = ShapeParams {
            kind: KIND_CLEAR,
            value,
            ..Zeroable::zeroed()
        };
        Self {
            params: GenericBuffer::uniform(device, "clear", &params),
        }
    }
}

impl Drawable for Clear {
    fn draw(&self, encoder: &mut CommandEncoder, target: &GenericBuffer, size: UVec2, _blend: Blend) {
        draw_params(&self.params, encoder, target, size, Blend::Replace);
    }
}

struct SdfShape {
    kind: u32,
    half_size: Vec2,
    transform: Transform,
    params: GenericBuffer,
}

impl SdfShape {
    fn new(device: &Device, label: &str, kind: u32, half_size: Vec2) -> Self {
        let shape = Self {
            kind,
            half_size,
            transform: Transform::default(),
            params: GenericBuffer::uniform(device, label, &ShapeParams::zeroed()),
        };
        shape.upload();
        shape
    }

    fn upload(&self) {
        self.params.write(&ShapeParams {
            kind: self.kind,
            position: self.transform.position.to_array(),
            half_size: self.half_size.to_array(),
            rotation: self.transform.rotation,
            ..Zeroable::zeroed()
        });
    }

    fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.upload();
    }

    fn distance(&self, point: Vec2) -> f32 {
        sdf_distance(self.kind, self.half_size, self.transform.to_local(point))
    }
}

/// Same formulas as `shape_distance` in shape.wgsl. The ellipse distance is
/// approximate away from circles.
fn sdf_distance(kind: u32, half_size: Vec2, local: Vec2) -> f32 {
    match kind {
        KIND_ELLIPSE => ((local / half_size).length() - 1.0) * half_size.min_element(),
        _ => {
            let q = local.abs() - half_size;
            q.max(Vec2::ZERO).length() + q.max_element().min(0.0)
        }
    }
}

/// Axis-aligned ellipse (before rotation) centred on its position.
pub struct Ellipse(SdfShape);

impl Ellipse {
    pub fn new(device: &Device, radius: Vec2) -> Self {
        Self(SdfShape::new(device, "ellipse", KIND_ELLIPSE, radius))
    }

    pub fn circle(device: &Device, radius: f32) -> Self {
        Self::new(device, Vec2::splat(radius))
    }

    pub fn radius(&self) -> Vec2 {
        self.0.half_size
    }
}

/// Rectangle centred on its position.
pub struct Rectangle(SdfShape);

impl Rectangle {
    pub fn new(device: &Device, size: Vec2) -> Self {
        Self(SdfShape::new(device, "rectangle", KIND_RECTANGLE, size * 0.5))
    }

    pub fn size(&self) -> Vec2 {
        self.0.half_size * 2.0
    }
}

macro_rules! impl_shape {
    ($ty:ty) => {
        impl Drawable for $ty {
            fn draw(
                &self,
                encoder: &mut CommandEncoder,
                target: &GenericBuffer,
                size: UVec2,
                blend: Blend,
            ) {
                draw_params(&self.0.params, encoder, target, size, blend);
            }
        }

        impl Shape for $ty {
            fn transform(&self) -> Transform {
                self.0.transform
            }

            fn set_transform(&mut self, transform: Transform) {
                self.0.set_transform(transform);
            }

            fn distance(&self, point: Vec2) -> f32 {
                self.0.distance(point)
            }

            fn params(&self) -> &GenericBuffer {
                &self.0.params
            }

            fn as_drawable(&self) -> &dyn Drawable {
                self
            }
        }
    };
}

impl_shape!(Ellipse);
impl_shape!(Rectangle);

/// A set of cell-centred `f32` framebuffers of one size.
pub struct RenderTarget {
    size: UVec2,
    framebuffers: Vec<GenericBuffer>,
}

impl RenderTarget {
    pub fn new(device: &Device, label: &str, size: UVec2, count: usize) -> Self {
        assert!(count > 0, "{label}: render target needs a framebuffer");
        let framebuffers = (0..count)
            .map(|i| GenericBuffer::grid::<f32>(device, &format!("{label} {i}"), size))
            .collect();
        Self { size, framebuffers }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Panics if `index` is out of range.
    pub fn framebuffer(&self, index: usize) -> &GenericBuffer {
        self.framebuffers.get(index).unwrap_or_else(|| {
            panic!(
                "framebuffer index {index} out of range ({} framebuffers)",
                self.framebuffers.len()
            )
        })
    }

    /// Record `drawables` in order into every framebuffer, one command list each.
    pub fn record(&self, drawables: &[&dyn Drawable], blend: Blend) -> RenderCommand {
        let commands = self
            .framebuffers
            .iter()
            .map(|framebuffer| {
                let mut command =
                    CommandBuffer::new(framebuffer.device(), framebuffer.label(), true);
                command.record(|encoder| {
                    for drawable in drawables {
                        drawable.draw(encoder, framebuffer, self.size, blend);
                    }
                });
                command
            })
            .collect();
        RenderCommand::new(commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_to_local_undoes_rotation() {
        let transform = Transform::new(Vec2::new(10.0, 5.0), std::f32::consts::FRAC_PI_2);
        let local = transform.to_local(Vec2::new(10.0, 7.0));
        assert!((local - Vec2::new(2.0, 0.0)).length() < 1e-5, "got {local}");
    }

    #[test]
    fn test_circle_distance_is_exact() {
        let radius = Vec2::splat(4.0);
        assert_eq!(sdf_distance(KIND_ELLIPSE, radius, Vec2::ZERO), -4.0);
        assert!((sdf_distance(KIND_ELLIPSE, radius, Vec2::new(6.0, 0.0)) - 2.0).abs() < 1e-6);
        assert!(sdf_distance(KIND_ELLIPSE, radius, Vec2::new(0.0, 4.0)).abs() < 1e-6);
    }

    #[test]
    fn test_rectangle_distance() {
        let half = Vec2::new(3.0, 1.0);
        assert_eq!(sdf_distance(KIND_RECTANGLE, half, Vec2::ZERO), -1.0);
        assert_eq!(sdf_distance(KIND_RECTANGLE, half, Vec2::new(5.0, 0.0)), 2.0);
        // Outside a corner the distance is euclidean.
        assert!((sdf_distance(KIND_RECTANGLE, half, Vec2::new(6.0, 5.0)) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn shape_params_layout_matches_wgsl() {
        use std::mem::{offset_of, size_of};

        use crate::renderer::shaders::layout::wgsl_struct_layout;

        for kernel in ["shape", "shape_velocity"] {
            let layout = wgsl_struct_layout(kernel, "Shape");
            assert_eq!(layout.size as usize, size_of::<ShapeParams>(), "{kernel}");
            for (member, offset) in [
                ("position", offset_of!(ShapeParams, position)),
                ("half_size", offset_of!(ShapeParams, half_size)),
                ("rotation", offset_of!(ShapeParams, rotation)),
                ("value", offset_of!(ShapeParams, value)),
            ] {
                assert_eq!(layout.offset(member) as usize, offset, "{kernel}: {member}");
            }
        }

        let layout = wgsl_struct_layout("shape", "DrawConstants");
        assert_eq!(layout.size as usize, size_of::<DrawConstants>());
        assert_eq!(layout.offset("blend") as usize, offset_of!(DrawConstants, blend));
    }

    #[test]
    fn test_blend_codes() {
        assert_eq!(Blend::Replace.code(), 0);
        assert_eq!(Blend::Union.code(), 1);
        assert_eq!(Blend::default(), Blend::Replace);
    }
}
