//! GPU buffers over the simulation grid.

use std::sync::Arc;

use bytemuck::Pod;
use glam::UVec2;

use crate::error::Result;

use super::device::Device;
use super::readback::Readback;

/// Identity of a GPU resource, used by the barrier tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(pub(crate) usize);

/// How a buffer may be bound to a kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Storage,
    Uniform,
}

/// A GPU array of plain-old-data elements.
///
/// Clones share the same allocation; command lists hold clones so a buffer
/// lives as long as any list that references it.
#[derive(Clone)]
pub struct GenericBuffer {
    buffer: Arc<wgpu::Buffer>,
    device: Device,
    kind: BufferKind,
    len: usize,
    stride: usize,
    label: Arc<str>,
}

impl GenericBuffer {
    /// Storage buffer of `len` elements of `T`, zero initialised.
    pub fn storage<T: Pod>(device: &Device, label: &str, len: usize) -> Self {
        assert!(len > 0, "{label}: empty buffer");
        let stride = std::mem::size_of::<T>();
        let buffer = device.handle().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: storage_size(len * stride),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self::wrap(device, buffer, BufferKind::Storage, len, stride, label)
    }

    /// Storage buffer with one `T` per grid cell.
    pub fn grid<T: Pod>(device: &Device, label: &str, size: UVec2) -> Self {
        Self::storage::<T>(device, label, (size.x * size.y) as usize)
    }

    /// Uniform buffer holding `value`, padded to 16 bytes.
    pub fn uniform<T: Pod>(device: &Device, label: &str, value: &T) -> Self {
        let uniform = Self::zeroed_uniform(device, label, std::mem::size_of::<T>());
        uniform.write(value);
        uniform
    }

    pub(crate) fn zeroed_uniform(device: &Device, label: &str, stride: usize) -> Self {
        let buffer = device.handle().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: uniform_size(stride),
            usage: wgpu::BufferUsages::UNIFORM
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self::wrap(device, buffer, BufferKind::Uniform, 1, stride, label)
    }

    fn wrap(
        device: &Device,
        buffer: wgpu::Buffer,
        kind: BufferKind,
        len: usize,
        stride: usize,
        label: &str,
    ) -> Self {
        Self {
            buffer: Arc::new(buffer),
            device: device.clone(),
            kind,
            len,
            stride,
            label: label.into(),
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId(Arc::as_ptr(&self.buffer) as usize)
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_size(&self) -> u64 {
        self.buffer.size()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub(crate) fn shared(&self) -> Arc<wgpu::Buffer> {
        self.buffer.clone()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Upload `data` from the host. Takes effect before the next submission.
    ///
    /// Uploads whose size is not a multiple of four bytes are zero padded.
    /// Panics if `data` is larger than the buffer.
    pub fn copy_from<T: Pod>(&self, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        assert!(
            bytes.len() as u64 <= self.byte_size(),
            "{}: uploading {} bytes into {} bytes",
            self.label,
            bytes.len(),
            self.byte_size()
        );
        if bytes.is_empty() {
            return;
        }
        let padded = align_to_copy(bytes.len() as u64) as usize;
        if padded == bytes.len() {
            self.device.queue().write_buffer(&self.buffer, 0, bytes);
        } else {
            let mut staged = bytes.to_vec();
            staged.resize(padded, 0);
            self.device.queue().write_buffer(&self.buffer, 0, &staged);
        }
    }

    /// Upload a single value, typically a uniform parameter block.
    pub fn write<T: Pod>(&self, value: &T) {
        self.copy_from(std::slice::from_ref(value));
    }

    /// Read the whole buffer back to the host, blocking until all previously
    /// submitted work has finished.
    pub fn copy_to<T: Pod>(&self) -> Result<Vec<T>> {
        assert_eq!(
            std::mem::size_of::<T>(),
            self.stride,
            "{}: reading back with the wrong element type",
            self.label
        );
        let mut data = Readback::for_buffer(&self.device, self).read::<T>(&self.device, self)?;
        data.truncate(self.len);
        Ok(data)
    }
}

impl std::fmt::Debug for GenericBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericBuffer")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("len", &self.len)
            .finish()
    }
}

fn align_to_copy(bytes: u64) -> u64 {
    bytes.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}

/// Storage allocations are rounded up so copies and maps stay aligned.
fn storage_size(bytes: usize) -> u64 {
    align_to_copy(bytes as u64)
}

fn uniform_size(stride: usize) -> u64 {
    (stride.max(16).div_ceil(16) * 16) as u64
}

/// Two-slot storage with an explicit front/back flip.
#[derive(Clone, Debug)]
pub struct DoubleBuffer<T = GenericBuffer> {
    slots: [T; 2],
    front: usize,
}

impl<T> DoubleBuffer<T> {
    pub fn new(front: T, back: T) -> Self {
        Self {
            slots: [front, back],
            front: 0,
        }
    }

    pub fn front(&self) -> &T {
        &self.slots[self.front]
    }

    pub fn back(&self) -> &T {
        &self.slots[1 - self.front]
    }

    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }
}

impl DoubleBuffer<GenericBuffer> {
    /// Two grid-sized storage buffers of `T`.
    pub fn grid<T: Pod>(device: &Device, label: &str, size: UVec2) -> Self {
        Self::new(
            GenericBuffer::grid::<T>(device, &format!("{label} front"), size),
            GenericBuffer::grid::<T>(device, &format!("{label} back"), size),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_size_is_rounded_to_copy_alignment() {
        assert_eq!(storage_size(3), 4);
        assert_eq!(storage_size(4), 4);
        assert_eq!(storage_size(17), 20);
        assert_eq!(align_to_copy(0), 0);
    }

    #[test]
    fn test_uniform_size_is_padded_to_16_bytes() {
        assert_eq!(uniform_size(4), 16);
        assert_eq!(uniform_size(16), 16);
        assert_eq!(uniform_size(20), 32);
        assert_eq!(uniform_size(48), 48);
    }

    #[test]
    fn test_double_buffer_swap_flips_slots() {
        let mut pair = DoubleBuffer::new("a", "b");
        assert_eq!((*pair.front(), *pair.back()), ("a", "b"));

        pair.swap();
        assert_eq!((*pair.front(), *pair.back()), ("b", "a"));

        pair.swap();
        assert_eq!(*pair.front(), "a", "two swaps restore the original order");
    }
}
