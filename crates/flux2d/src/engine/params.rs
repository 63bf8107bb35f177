//! `#[repr(C)]` parameter blocks mirroring the WGSL uniforms.

use bytemuck::{Pod, Zeroable};
use glam::{UVec2, Vec2};

/// `GridParams` in common.wgsl (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct GridParams {
    pub width: u32,
    pub height: u32,
    pub dt: f32,
    /// Kernel-specific scalar (Jacobi damping)
    pub scalar: f32,
}

impl GridParams {
    pub fn new(size: UVec2, dt: f32) -> Self {
        Self {
            width: size.x,
            height: size.y,
            dt,
            scalar: 0.0,
        }
    }

    pub fn with_scalar(mut self, scalar: f32) -> Self {
        self.scalar = scalar;
        self
    }
}

/// Rigid body state read by the coupling kernels (32 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct BodyParams {
    pub velocity: [f32; 2],
    pub angular_velocity: f32,
    /// Zero for infinite mass
    pub inv_mass: f32,
    pub inv_inertia: f32,
    pub _pad: [f32; 3],
}

/// Rotation centre pushed as constants (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct CentreConstants {
    pub centre: [f32; 2],
    pub _pad: [f32; 2],
}

impl CentreConstants {
    pub fn new(centre: Vec2) -> Self {
        Self {
            centre: centre.to_array(),
            _pad: [0.0; 2],
        }
    }
}

/// Velocity impulse added inside a shape (16 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct ImpulseParams {
    pub value: [f32; 2],
    pub _pad: [f32; 2],
}

#[cfg(test)]
mod tests {
    use std::mem::{offset_of, size_of};

    use super::*;
    use crate::renderer::shaders::layout::wgsl_struct_layout;

    #[test]
    fn grid_params_layout_matches_wgsl() {
        let layout = wgsl_struct_layout("jacobi", "GridParams");
        assert_eq!(layout.size as usize, size_of::<GridParams>());
        assert_eq!(layout.offset("dt") as usize, offset_of!(GridParams, dt));
        assert_eq!(layout.offset("scalar") as usize, offset_of!(GridParams, scalar));
    }

    #[test]
    fn body_params_layout_matches_wgsl() {
        for kernel in ["rigidbody_div", "rigidbody_constrain"] {
            let layout = wgsl_struct_layout(kernel, "Body");
            assert_eq!(layout.size as usize, size_of::<BodyParams>(), "{kernel}");
            assert_eq!(
                layout.offset("angular_velocity") as usize,
                offset_of!(BodyParams, angular_velocity)
            );
            assert_eq!(layout.offset("inv_mass") as usize, offset_of!(BodyParams, inv_mass));
            assert_eq!(
                layout.offset("inv_inertia") as usize,
                offset_of!(BodyParams, inv_inertia)
            );
        }
    }

    #[test]
    fn centre_constants_layout_matches_wgsl() {
        for kernel in ["rigidbody_div", "rigidbody_pressure", "rigidbody_constrain"] {
            let layout = wgsl_struct_layout(kernel, "Centre");
            assert_eq!(layout.size as usize, size_of::<CentreConstants>(), "{kernel}");
            assert_eq!(layout.offset("centre") as usize, offset_of!(CentreConstants, centre));
        }
    }

    #[test]
    fn impulse_params_layout_matches_wgsl() {
        let layout = wgsl_struct_layout("shape_velocity", "Impulse");
        assert_eq!(layout.size as usize, size_of::<ImpulseParams>());
        assert_eq!(layout.offset("value") as usize, offset_of!(ImpulseParams, value));
    }
}
