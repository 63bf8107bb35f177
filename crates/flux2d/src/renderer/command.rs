//! Record-once, replay-many command lists.
//!
//! A `wgpu::CommandBuffer` can only be submitted once, so a [`CommandBuffer`]
//! keeps the recorded list of commands instead and re-encodes it into a
//! fresh `wgpu` encoder on every [`CommandBuffer::submit`]. Every pipeline,
//! bind group and buffer the list references is held by `Arc`.
//!
//! While recording, the [`CommandEncoder`] tracks which buffers have been
//! read and written since the last barrier naming them. Reading after a
//! write, or writing after any access, without such a barrier is a
//! programming error and panics immediately.

use std::collections::HashMap;
use std::sync::Arc;

use super::buffer::{GenericBuffer, ResourceId};
use super::device::Device;
use super::work::{Access, BoundWork};

enum Command {
    Dispatch {
        label: Arc<str>,
        pipeline: Arc<wgpu::ComputePipeline>,
        bind_group: Arc<wgpu::BindGroup>,
        work_groups: [u32; 3],
    },
    Barrier,
    Copy {
        src: Arc<wgpu::Buffer>,
        dst: Arc<wgpu::Buffer>,
        size: u64,
    },
    Clear(Arc<wgpu::Buffer>),
    DebugMarkerBegin(String),
    DebugMarkerEnd,
}

/// Accesses since the last barrier, per buffer.
#[derive(Default)]
pub(crate) struct HazardTracker {
    reads: HashMap<ResourceId, String>,
    writes: HashMap<ResourceId, String>,
}

impl HazardTracker {
    /// Register `command` accessing `resource`. Panics on a hazard.
    pub(crate) fn access(&mut self, id: ResourceId, access: Access, resource: &str, command: &str) {
        if let Some(writer) = self.writes.get(&id) {
            let hazard = if access.writes() {
                "write-after-write"
            } else {
                "read-after-write"
            };
            panic!(
                "{hazard} hazard on `{resource}`: `{command}` follows `{writer}` without a barrier"
            );
        }
        if access.writes() {
            if let Some(reader) = self.reads.get(&id) {
                panic!(
                    "write-after-read hazard on `{resource}`: `{command}` follows `{reader}` without a barrier"
                );
            }
        }

        if access.reads() {
            self.reads.insert(id, command.to_owned());
        }
        if access.writes() {
            self.writes.insert(id, command.to_owned());
        }
    }

    pub(crate) fn barrier(&mut self, id: ResourceId) {
        self.reads.remove(&id);
        self.writes.remove(&id);
    }
}

/// Recording interface handed to [`CommandBuffer::record`].
#[derive(Default)]
pub struct CommandEncoder {
    commands: Vec<Command>,
    hazards: HazardTracker,
    markers: usize,
}

impl CommandEncoder {
    pub(crate) fn dispatch(&mut self, work: &BoundWork) {
        let label = work.label();
        for (buffer, access) in work.resources() {
            self.hazards.access(buffer.id(), *access, buffer.label(), label);
        }
        self.commands.push(Command::Dispatch {
            label: label.into(),
            pipeline: work.pipeline().clone(),
            bind_group: work.bind_group().clone(),
            work_groups: work.size().work_groups,
        });
    }

    /// Make earlier writes to `buffers` visible to later commands and allow
    /// them to be overwritten. Also ends the current compute pass.
    pub fn barrier(&mut self, buffers: &[&GenericBuffer]) {
        for buffer in buffers {
            self.hazards.barrier(buffer.id());
        }
        self.commands.push(Command::Barrier);
    }

    /// Copy all of `src` into the start of `dst`.
    pub fn copy(&mut self, src: &GenericBuffer, dst: &GenericBuffer) {
        let size = src.byte_size();
        assert!(
            size <= dst.byte_size(),
            "copy `{}` -> `{}`: source is larger than destination",
            src.label(),
            dst.label()
        );
        let label = format!("copy {} -> {}", src.label(), dst.label());
        self.hazards.access(src.id(), Access::Read, src.label(), &label);
        self.hazards.access(dst.id(), Access::Write, dst.label(), &label);
        self.commands.push(Command::Copy {
            src: src.shared(),
            dst: dst.shared(),
            size,
        });
    }

    /// Fill `buffer` with zeroes.
    pub fn clear(&mut self, buffer: &GenericBuffer) {
        let label = format!("clear {}", buffer.label());
        self.hazards.access(buffer.id(), Access::Write, buffer.label(), &label);
        self.commands.push(Command::Clear(buffer.shared()));
    }

    pub fn debug_marker_begin(&mut self, label: &str) {
        self.markers += 1;
        self.commands.push(Command::DebugMarkerBegin(label.to_owned()));
    }

    pub fn debug_marker_end(&mut self) {
        assert!(self.markers > 0, "debug marker end without a begin");
        self.markers -= 1;
        self.commands.push(Command::DebugMarkerEnd);
    }

    pub(crate) fn push_constants(
        &mut self,
        staging: Arc<wgpu::Buffer>,
        constants: &GenericBuffer,
        size: u64,
    ) {
        self.commands.push(Command::Copy {
            src: staging,
            dst: constants.shared(),
            size,
        });
    }

    fn finish(self) -> Vec<Command> {
        assert_eq!(self.markers, 0, "unbalanced debug markers");
        self.commands
    }
}

fn encode(device: &Device, label: &str, commands: &[Command]) -> wgpu::CommandBuffer {
    let mut encoder = device.create_command_encoder(label);

    let mut i = 0;
    while i < commands.len() {
        match &commands[i] {
            Command::Dispatch { .. } => {
                // Consecutive dispatches share one pass.
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(label),
                    timestamp_writes: None,
                });
                while let Some(Command::Dispatch {
                    label,
                    pipeline,
                    bind_group,
                    work_groups: [x, y, z],
                }) = commands.get(i)
                {
                    pass.insert_debug_marker(label);
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, &**bind_group, &[]);
                    pass.dispatch_workgroups(*x, *y, *z);
                    i += 1;
                }
                continue;
            }
            Command::Barrier => {}
            Command::Copy { src, dst, size } => {
                encoder.copy_buffer_to_buffer(src, 0, dst, 0, *size);
            }
            Command::Clear(buffer) => encoder.clear_buffer(buffer, 0, None),
            Command::DebugMarkerBegin(label) => encoder.push_debug_group(label),
            Command::DebugMarkerEnd => encoder.pop_debug_group(),
        }
        i += 1;
    }

    encoder.finish()
}

/// A recorded command list plus the fence of its last submission.
pub struct CommandBuffer {
    device: Device,
    label: String,
    synchronise: bool,
    commands: Option<Vec<Command>>,
    fence: Option<wgpu::SubmissionIndex>,
}

impl CommandBuffer {
    /// `synchronise` keeps a fence for [`CommandBuffer::wait`]; without it
    /// `wait` returns immediately.
    pub fn new(device: &Device, label: &str, synchronise: bool) -> Self {
        Self {
            device: device.clone(),
            label: label.to_owned(),
            synchronise,
            commands: None,
            fence: None,
        }
    }

    /// Replace the command list with what `f` records. Waits for the previous
    /// submission first.
    pub fn record<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut CommandEncoder),
    {
        self.wait();
        let mut encoder = CommandEncoder::default();
        f(&mut encoder);
        self.commands = Some(encoder.finish());
        self
    }

    /// Queue the recorded list for execution.
    ///
    /// Panics if nothing has been recorded.
    pub fn submit(&mut self) -> &mut Self {
        let commands = self
            .commands
            .as_ref()
            .unwrap_or_else(|| panic!("submitting command buffer `{}` that wasn't recorded", self.label));
        let index = self
            .device
            .submit(encode(&self.device, &self.label, commands));
        if self.synchronise {
            self.fence = Some(index);
        }
        self
    }

    /// Block until the last submission has completed.
    pub fn wait(&mut self) -> &mut Self {
        if let Some(index) = self.fence.take() {
            self.device.wait(index);
        }
        self
    }

    pub fn is_recorded(&self) -> bool {
        self.commands.is_some()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Record, submit and wait for a one-off command list.
pub fn execute_command<F>(device: &Device, label: &str, f: F)
where
    F: FnOnce(&mut CommandEncoder),
{
    CommandBuffer::new(device, label, true).record(f).submit().wait();
}

/// One command list per framebuffer of a render target.
pub struct RenderCommand {
    commands: Vec<CommandBuffer>,
}

impl RenderCommand {
    pub(crate) fn new(commands: Vec<CommandBuffer>) -> Self {
        Self { commands }
    }

    /// Submit the list that draws into framebuffer `index`.
    ///
    /// Panics if `index` is out of range.
    pub fn render(&mut self, index: usize) -> &mut Self {
        let count = self.commands.len();
        let command = self.commands.get_mut(index).unwrap_or_else(|| {
            panic!("framebuffer index {index} out of range ({count} framebuffers)")
        });
        command.wait().submit();
        self
    }

    pub fn wait(&mut self) -> &mut Self {
        for command in &mut self.commands {
            command.wait();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ResourceId = ResourceId(1);
    const B: ResourceId = ResourceId(2);

    #[test]
    fn test_read_after_read_is_allowed() {
        let mut hazards = HazardTracker::default();
        hazards.access(A, Access::Read, "a", "first");
        hazards.access(A, Access::Read, "a", "second");
    }

    #[test]
    #[should_panic(expected = "read-after-write hazard on `a`")]
    fn test_read_after_write_panics() {
        let mut hazards = HazardTracker::default();
        hazards.access(A, Access::Write, "a", "producer");
        hazards.access(A, Access::Read, "a", "consumer");
    }

    #[test]
    #[should_panic(expected = "write-after-read hazard on `a`")]
    fn test_write_after_read_panics() {
        let mut hazards = HazardTracker::default();
        hazards.access(A, Access::Read, "a", "consumer");
        hazards.access(A, Access::ReadWrite, "a", "producer");
    }

    #[test]
    #[should_panic(expected = "write-after-write hazard on `a`")]
    fn test_write_after_write_panics() {
        let mut hazards = HazardTracker::default();
        hazards.access(A, Access::Write, "a", "first");
        hazards.access(A, Access::Write, "a", "second");
    }

    #[test]
    fn test_barrier_clears_only_the_named_resource() {
        let mut hazards = HazardTracker::default();
        hazards.access(A, Access::Write, "a", "producer");
        hazards.access(B, Access::Read, "b", "producer");
        hazards.barrier(A);

        hazards.access(A, Access::Read, "a", "consumer");
        hazards.access(B, Access::Read, "b", "consumer");
        assert!(hazards.reads.contains_key(&B), "b keeps its pending read");
        assert!(!hazards.writes.contains_key(&A));
    }

    #[test]
    fn test_disjoint_writes_share_a_span() {
        let mut hazards = HazardTracker::default();
        hazards.access(A, Access::Write, "a", "first");
        hazards.access(B, Access::Write, "b", "second");
    }

    #[test]
    #[should_panic(expected = "unbalanced debug markers")]
    fn test_unbalanced_markers_panic() {
        let mut encoder = CommandEncoder::default();
        encoder.debug_marker_begin("pressure");
        encoder.finish();
    }
}
