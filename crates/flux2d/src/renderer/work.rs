//! Kernels bound to concrete buffers.
//!
//! A [`Work`] owns the pipeline and bind-group layout of one WGSL entry
//! point; [`Work::bind`] validates a list of buffers against that layout and
//! returns a [`BoundWork`] that can be recorded into any number of command
//! lists.

use std::sync::Arc;

use bytemuck::Pod;
use glam::UVec2;
use wgpu::util::DeviceExt;

use super::buffer::{BufferKind, GenericBuffer};
use super::command::CommandEncoder;
use super::device::{CachedPipeline, Device, PipelineKey};

/// Work group edge length of 2D grid kernels.
pub const LOCAL_SIZE: u32 = 16;

/// Work group size of 1D kernels (reductions, vector updates).
pub const LINEAR_LOCAL_SIZE: u32 = 256;

/// How a kernel accesses a storage buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn reads(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn writes(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// One slot of a kernel's bind group, in binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    Storage(Access),
    Uniform,
}

impl Binding {
    fn layout_entry(self, binding: u32) -> wgpu::BindGroupLayoutEntry {
        let ty = match self {
            Binding::Storage(access) => wgpu::BufferBindingType::Storage {
                read_only: access == Access::Read,
            },
            Binding::Uniform => wgpu::BufferBindingType::Uniform,
        };
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }

    fn access(self) -> Access {
        match self {
            Binding::Storage(access) => access,
            Binding::Uniform => Access::Read,
        }
    }

    fn kind(self) -> BufferKind {
        match self {
            Binding::Storage(_) => BufferKind::Storage,
            Binding::Uniform => BufferKind::Uniform,
        }
    }
}

/// Number of work groups a dispatch launches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComputeSize {
    pub work_groups: [u32; 3],
}

impl ComputeSize {
    /// One invocation per cell of a grid, in 16x16 groups.
    pub fn grid(size: UVec2) -> Self {
        Self {
            work_groups: [size.x.div_ceil(LOCAL_SIZE), size.y.div_ceil(LOCAL_SIZE), 1],
        }
    }

    /// One invocation per element of a 1D array, in groups of 256.
    pub fn linear(len: u32) -> Self {
        Self {
            work_groups: [len.div_ceil(LINEAR_LOCAL_SIZE), 1, 1],
        }
    }

    /// A single work group.
    pub fn single() -> Self {
        Self {
            work_groups: [1, 1, 1],
        }
    }
}

/// A compiled kernel and its bind-group layout.
///
/// Pipelines are cached on the device, so creating the same kernel again
/// only costs the lookup.
pub struct Work {
    device: Device,
    label: Arc<str>,
    pipeline: Arc<wgpu::ComputePipeline>,
    layout: Arc<wgpu::BindGroupLayout>,
    bindings: Vec<Binding>,
    constants: Option<usize>,
    size: ComputeSize,
}

impl Work {
    pub fn new(
        device: &Device,
        size: ComputeSize,
        shader: &str,
        entry_point: &str,
        bindings: &[Binding],
    ) -> Self {
        Self::build(device, size, shader, entry_point, bindings, None)
    }

    /// Like [`Work::new`], with a block of `T` constants bound as a uniform
    /// after the last binding and filled by [`BoundWork::push_constants`].
    pub fn with_constants<T: Pod>(
        device: &Device,
        size: ComputeSize,
        shader: &str,
        entry_point: &str,
        bindings: &[Binding],
    ) -> Self {
        Self::build(
            device,
            size,
            shader,
            entry_point,
            bindings,
            Some(std::mem::size_of::<T>()),
        )
    }

    fn build(
        device: &Device,
        size: ComputeSize,
        shader: &str,
        entry_point: &str,
        bindings: &[Binding],
        constants: Option<usize>,
    ) -> Self {
        let label: Arc<str> = format!("{shader}::{entry_point}").into();
        let key = PipelineKey {
            shader: shader.to_owned(),
            entry_point: entry_point.to_owned(),
            bindings: bindings.to_vec(),
            constants,
        };
        let CachedPipeline { pipeline, layout } = device.compute_pipeline(key, || {
            let module = device.shader_module(shader);

            let mut entries: Vec<_> = bindings
                .iter()
                .enumerate()
                .map(|(i, binding)| binding.layout_entry(i as u32))
                .collect();
            if constants.is_some() {
                entries.push(Binding::Uniform.layout_entry(bindings.len() as u32));
            }

            let handle = device.handle();
            let layout = handle.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&*label),
                entries: &entries,
            });
            let pipeline_layout = handle.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&*label),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            let pipeline = handle.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&*label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            });
            CachedPipeline {
                pipeline: Arc::new(pipeline),
                layout: Arc::new(layout),
            }
        });

        Self {
            device: device.clone(),
            label,
            pipeline,
            layout,
            bindings: bindings.to_vec(),
            constants,
            size,
        }
    }

    pub fn size(&self) -> ComputeSize {
        self.size
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Bind `buffers` in binding order.
    ///
    /// Panics if the count or kind of a buffer does not match the layout, or
    /// if one buffer is bound twice and either binding writes it.
    pub fn bind(&self, buffers: &[&GenericBuffer]) -> BoundWork {
        assert_eq!(
            buffers.len(),
            self.bindings.len(),
            "{}: expected {} buffers, got {}",
            self.label,
            self.bindings.len(),
            buffers.len()
        );

        let mut resources = Vec::with_capacity(buffers.len());
        for (i, (binding, buffer)) in self.bindings.iter().zip(buffers).enumerate() {
            assert_eq!(
                binding.kind(),
                buffer.kind(),
                "{}: binding {i} expects a {:?} buffer, `{}` is {:?}",
                self.label,
                binding.kind(),
                buffer.label(),
                buffer.kind()
            );
            resources.push(((*buffer).clone(), binding.access()));
        }
        check_aliasing(&self.label, &resources);

        let constants = self.constants.map(|stride| {
            GenericBuffer::zeroed_uniform(&self.device, &format!("{} constants", self.label), stride)
        });

        let mut entries: Vec<_> = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buffer.raw().as_entire_binding(),
            })
            .collect();
        if let Some(constants) = &constants {
            entries.push(wgpu::BindGroupEntry {
                binding: buffers.len() as u32,
                resource: constants.raw().as_entire_binding(),
            });
        }

        let bind_group = self
            .device
            .handle()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&*self.label),
                layout: self.layout.as_ref(),
                entries: &entries,
            });

        BoundWork {
            device: self.device.clone(),
            label: self.label.clone(),
            pipeline: self.pipeline.clone(),
            bind_group: Arc::new(bind_group),
            size: self.size,
            resources,
            constants,
        }
    }
}

fn check_aliasing(label: &str, resources: &[(GenericBuffer, Access)]) {
    for (i, (a, access_a)) in resources.iter().enumerate() {
        for (b, access_b) in &resources[i + 1..] {
            if a.id() == b.id() && (access_a.writes() || access_b.writes()) {
                panic!(
                    "{label}: `{}` bound twice with conflicting access ({access_a:?}, {access_b:?})",
                    a.label()
                );
            }
        }
    }
}

/// A kernel bound to concrete buffers, ready to be recorded.
pub struct BoundWork {
    device: Device,
    label: Arc<str>,
    pipeline: Arc<wgpu::ComputePipeline>,
    bind_group: Arc<wgpu::BindGroup>,
    size: ComputeSize,
    resources: Vec<(GenericBuffer, Access)>,
    constants: Option<GenericBuffer>,
}

impl BoundWork {
    pub fn record(&self, encoder: &mut CommandEncoder) {
        encoder.dispatch(self);
    }

    /// Record an update of the constants block, visible to every later
    /// dispatch of this binding in the same list.
    ///
    /// Panics if the kernel was not created with constants of type `T`.
    pub fn push_constants<T: Pod>(&self, encoder: &mut CommandEncoder, value: &T) {
        let constants = self
            .constants
            .as_ref()
            .unwrap_or_else(|| panic!("{}: kernel has no constants block", self.label));
        let bytes = bytemuck::bytes_of(value);
        assert!(
            bytes.len() as u64 <= constants.byte_size(),
            "{}: constants block is {} bytes, got {}",
            self.label,
            constants.byte_size(),
            bytes.len()
        );

        let staging = self
            .device
            .handle()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(format!("{} constants staging", self.label).as_str()),
                contents: bytes,
                usage: wgpu::BufferUsages::COPY_SRC,
            });
        encoder.push_constants(Arc::new(staging), constants, bytes.len() as u64);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn pipeline(&self) -> &Arc<wgpu::ComputePipeline> {
        &self.pipeline
    }

    pub(crate) fn bind_group(&self) -> &Arc<wgpu::BindGroup> {
        &self.bind_group
    }

    pub(crate) fn size(&self) -> ComputeSize {
        self.size
    }

    pub(crate) fn resources(&self) -> &[(GenericBuffer, Access)] {
        &self.resources
    }
}
