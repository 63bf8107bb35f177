//! Staggered velocity field.

use glam::{UVec2, Vec2};

use crate::renderer::{CommandEncoder, Device, DoubleBuffer, GenericBuffer};

/// MAC velocity: cell (i, j) stores `u` on its left face in `.x` and `v` on
/// its bottom face in `.y`.
///
/// Kernels that read the field and write a new one write into [`output`]
/// and then record [`copy_back`].
///
/// [`output`]: Velocity::output
/// [`copy_back`]: Velocity::copy_back
#[derive(Clone)]
pub struct Velocity {
    buffers: DoubleBuffer,
    size: UVec2,
}

impl Velocity {
    pub fn new(device: &Device, size: UVec2) -> Self {
        Self {
            buffers: DoubleBuffer::grid::<Vec2>(device, "velocity", size),
            size,
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    /// The canonical field.
    pub fn field(&self) -> &GenericBuffer {
        self.buffers.front()
    }

    /// Scratch write target of the current pass.
    pub fn output(&self) -> &GenericBuffer {
        self.buffers.back()
    }

    /// Record copying `output()` over the canonical field.
    pub fn copy_back(&self, encoder: &mut CommandEncoder) {
        encoder.barrier(&[self.output(), self.field()]);
        encoder.copy(self.output(), self.field());
        encoder.barrier(&[self.output(), self.field()]);
    }
}
