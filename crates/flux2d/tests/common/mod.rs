//! Shared helpers for GPU integration tests.

#![allow(dead_code)]

use flux2d::renderer::Device;
use glam::UVec2;

/// Headless device, or `None` (with a log line) when no adapter is present.
pub fn device() -> Option<Device> {
    let _ = env_logger::builder().is_test(true).try_init();
    match Device::new() {
        Ok(device) => Some(device),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

pub fn index(size: UVec2, i: u32, j: u32) -> usize {
    (j * size.x + i) as usize
}

/// Level set of a half plane: negative for cells with centre x < `boundary`.
pub fn left_of(size: UVec2, boundary: f32) -> Vec<f32> {
    (0..size.y)
        .flat_map(|_| (0..size.x).map(move |i| i as f32 + 0.5 - boundary))
        .collect()
}
