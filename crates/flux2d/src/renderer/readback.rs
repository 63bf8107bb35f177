//! Synchronous GPU buffer readback.
//!
//! A `MAP_READ` staging buffer is filled by a copy, mapped, and drained into
//! a `Vec`. The calling thread blocks until the copy has executed.

use std::sync::mpsc;

use bytemuck::Pod;

use crate::error::{Error, Result};

use super::buffer::GenericBuffer;
use super::device::Device;

/// Wait for a buffer map operation to complete, returning Result instead of panicking.
pub fn await_buffer_map(rx: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>) -> Result<()> {
    match rx.recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            log::error!("Buffer map failed: {e:?}");
            Err(Error::BufferMap(e))
        }
        Err(_) => {
            log::error!("Buffer map channel disconnected - possible device lost");
            Err(Error::ChannelDisconnected)
        }
    }
}

/// Reusable staging buffer sized for one source buffer.
pub struct Readback {
    buffer: wgpu::Buffer,
    size: u64,
}

impl Readback {
    pub fn new(device: &Device, label: &str, size: u64) -> Self {
        Self {
            buffer: device.handle().create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            size,
        }
    }

    pub fn for_buffer(device: &Device, source: &GenericBuffer) -> Self {
        Self::new(
            device,
            &format!("{} readback", source.label()),
            source.byte_size(),
        )
    }

    /// Copy `source` into the staging buffer and read it back as `T`s.
    ///
    /// Panics if `source` is larger than the staging buffer.
    pub fn read<T: Pod>(&self, device: &Device, source: &GenericBuffer) -> Result<Vec<T>> {
        let size = source.byte_size();
        assert!(
            size <= self.size,
            "{} ({size} bytes) does not fit a {} byte readback",
            source.label(),
            self.size
        );

        let mut encoder = device.create_command_encoder("readback");
        encoder.copy_buffer_to_buffer(source.raw(), 0, &self.buffer, 0, size);
        device.submit(encoder.finish());

        let slice = self.buffer.slice(0..size);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.wait_idle();
        await_buffer_map(rx)?;

        let data = {
            let view = slice.get_mapped_range();
            view.chunks_exact(std::mem::size_of::<T>())
                .map(bytemuck::pod_read_unaligned)
                .collect()
        };
        self.buffer.unmap();
        Ok(data)
    }
}
