//! Buffers, kernels and command lists on a real device.

mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};

use flux2d::engine::reduce::{Reduce, ReduceOp};
use flux2d::renderer::{
    execute_command, Access, Binding, Blend, Clear, CommandBuffer, ComputeSize, Device, Drawable,
    Ellipse, GenericBuffer, RenderTarget, Shape, Transform, Work,
};
use glam::{UVec2, Vec2};

fn axpy(device: &Device, len: usize) -> Work {
    Work::new(
        device,
        ComputeSize::linear(len as u32),
        "vector_ops",
        "axpy",
        &[
            Binding::Storage(Access::Read),
            Binding::Storage(Access::Read),
            Binding::Storage(Access::ReadWrite),
        ],
    )
}

/// Upload then download returns the same data.
#[test]
fn test_buffer_round_trip() {
    let Some(device) = common::device() else { return };
    let data: Vec<f32> = (0..300).map(|i| i as f32 * 0.5 - 20.0).collect();
    let buffer = GenericBuffer::storage::<f32>(&device, "round trip", data.len());

    buffer.copy_from(&data);
    assert_eq!(buffer.copy_to::<f32>().unwrap(), data);
}

/// Byte payloads whose length is not a multiple of four survive the trip.
#[test]
fn test_unaligned_byte_round_trip() {
    let Some(device) = common::device() else { return };
    for len in [1usize, 3, 7, 257] {
        let data: Vec<u8> = (0..len).map(|i| (i * 37 + 11) as u8).collect();
        let buffer = GenericBuffer::storage::<u8>(&device, "bytes", len);

        buffer.copy_from(&data);
        assert_eq!(buffer.copy_to::<u8>().unwrap(), data, "payload of {len} bytes");
    }
}

/// Copies recorded in a command list move data between buffers.
#[test]
fn test_recorded_copy() {
    let Some(device) = common::device() else { return };
    let src = GenericBuffer::storage::<u32>(&device, "src", 64);
    let dst = GenericBuffer::storage::<u32>(&device, "dst", 64);
    src.copy_from(&(0..64).collect::<Vec<u32>>());

    execute_command(&device, "copy", |encoder| encoder.copy(&src, &dst));

    assert_eq!(dst.copy_to::<u32>().unwrap(), (0..64).collect::<Vec<u32>>());
}

#[test]
fn test_submit_before_record_panics() {
    let Some(device) = common::device() else { return };
    let mut command = CommandBuffer::new(&device, "empty", true);
    assert!(!command.is_recorded());

    let result = catch_unwind(AssertUnwindSafe(|| {
        command.submit();
    }));
    assert!(result.is_err(), "submitting an unrecorded command must panic");
}

/// A list recorded once applies its effect on every submission.
#[test]
fn test_replay_applies_effect_each_submit() {
    let Some(device) = common::device() else { return };
    let len = 1000;
    let scale = GenericBuffer::storage::<f32>(&device, "scale", 1);
    let x = GenericBuffer::storage::<f32>(&device, "x", len);
    let y = GenericBuffer::storage::<f32>(&device, "y", len);
    scale.copy_from(&[2.0f32]);
    x.copy_from(&(0..len).map(|i| i as f32).collect::<Vec<_>>());

    let bound = axpy(&device, len).bind(&[&scale, &x, &y]);
    let mut command = CommandBuffer::new(&device, "axpy", true);
    command.record(|encoder| bound.record(encoder));

    command.submit().wait();
    command.submit().wait();

    let result = y.copy_to::<f32>().unwrap();
    for (i, value) in result.iter().enumerate() {
        assert_eq!(*value, 4.0 * i as f32, "element {i} after two replays");
    }
}

/// Two writes of the same buffer without a barrier are rejected at record time.
#[test]
fn test_missing_barrier_panics() {
    let Some(device) = common::device() else { return };
    let scale = GenericBuffer::storage::<f32>(&device, "scale", 1);
    let x = GenericBuffer::storage::<f32>(&device, "x", 16);
    let y = GenericBuffer::storage::<f32>(&device, "y", 16);
    let bound = axpy(&device, 16).bind(&[&scale, &x, &y]);

    let mut command = CommandBuffer::new(&device, "hazard", true);
    let result = catch_unwind(AssertUnwindSafe(|| {
        command.record(|encoder| {
            bound.record(encoder);
            bound.record(encoder);
        });
    }));
    assert!(result.is_err(), "write-after-write without barrier must panic");

    command.record(|encoder| {
        bound.record(encoder);
        encoder.barrier(&[&y]);
        bound.record(encoder);
    });
    assert!(command.is_recorded());
}

#[test]
fn test_conflicting_binding_panics() {
    let Some(device) = common::device() else { return };
    let scale = GenericBuffer::storage::<f32>(&device, "scale", 1);
    let x = GenericBuffer::storage::<f32>(&device, "x", 16);
    let work = axpy(&device, 16);

    let result = catch_unwind(AssertUnwindSafe(|| work.bind(&[&scale, &x, &x])));
    assert!(result.is_err(), "binding x as both input and output must panic");
}

#[test]
fn test_reductions_match_host() {
    let Some(device) = common::device() else { return };
    let len = 1500;
    let a: Vec<f32> = (0..len).map(|i| ((i % 7) as f32 - 3.0) * 0.25).collect();
    let b: Vec<f32> = (0..len).map(|i| ((i % 5) as f32) * 0.5).collect();
    let a_buffer = GenericBuffer::storage::<f32>(&device, "a", len);
    let b_buffer = GenericBuffer::storage::<f32>(&device, "b", len);
    let dot = GenericBuffer::storage::<f32>(&device, "dot", 1);
    let max = GenericBuffer::storage::<f32>(&device, "max", 1);
    a_buffer.copy_from(&a);
    b_buffer.copy_from(&b);

    let bound_dot = Reduce::new(&device, len, ReduceOp::Dot).bind(&[&a_buffer, &b_buffer], &dot);
    let bound_max = Reduce::new(&device, len, ReduceOp::MaxAbs).bind(&[&a_buffer], &max);
    execute_command(&device, "reduce", |encoder| {
        bound_dot.record(encoder);
        bound_max.record(encoder);
    });

    let expected_dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
    let gpu_dot = dot.copy_to::<f32>().unwrap()[0];
    assert!(
        (gpu_dot - expected_dot).abs() < 1e-2,
        "dot {gpu_dot} vs host {expected_dot}"
    );
    assert_eq!(max.copy_to::<f32>().unwrap()[0], 0.75);
}

/// Clearing then unioning a circle matches the host distance.
#[test]
fn test_render_circle_into_target() {
    let Some(device) = common::device() else { return };
    let size = UVec2::new(32, 24);
    let target = RenderTarget::new(&device, "phi", size, 2);
    let clear = Clear::new(&device, 5.0);
    let mut circle = Ellipse::circle(&device, 4.0);
    circle.set_transform(Transform::new(Vec2::new(12.0, 10.0), 0.0));

    let drawables: [&dyn Drawable; 2] = [&clear, &circle];
    let mut render = target.record(&drawables, Blend::Union);
    render.render(1).wait();

    let phi = target.framebuffer(1).copy_to::<f32>().unwrap();
    for j in 0..size.y {
        for i in 0..size.x {
            let centre = Vec2::new(i as f32 + 0.5, j as f32 + 0.5);
            let expected = circle.distance(centre).min(5.0);
            let value = phi[common::index(size, i, j)];
            assert!(
                (value - expected).abs() < 1e-4,
                "cell ({i}, {j}): {value} vs {expected}"
            );
        }
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        render.render(2);
    }));
    assert!(result.is_err(), "framebuffer index 2 of 2 must panic");
}

/// Drawing again, or creating the same kernel again, reuses its pipeline.
#[test]
fn test_repeated_draws_share_pipelines() {
    let Some(device) = common::device() else { return };
    let size = UVec2::new(16, 16);
    let target = RenderTarget::new(&device, "phi", size, 1);
    let circle = Ellipse::circle(&device, 3.0);
    let drawables: [&dyn Drawable; 1] = [&circle];

    target.record(&drawables, Blend::Union).render(0).wait();
    let after_first = device.pipeline_count();
    for _ in 0..4 {
        target.record(&drawables, Blend::Union).render(0).wait();
    }
    assert_eq!(device.pipeline_count(), after_first);

    axpy(&device, 64);
    let with_axpy = device.pipeline_count();
    assert_eq!(with_axpy, after_first + 1);
    axpy(&device, 128);
    assert_eq!(device.pipeline_count(), with_axpy);
}
