//! Headless GPU device.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

use super::shaders;
use super::work::Binding;

/// Everything a compute pipeline is built from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub shader: String,
    pub entry_point: String,
    pub bindings: Vec<Binding>,
    pub constants: Option<usize>,
}

/// A compiled pipeline with the bind-group layout it was built against.
#[derive(Clone)]
pub(crate) struct CachedPipeline {
    pub pipeline: Arc<wgpu::ComputePipeline>,
    pub layout: Arc<wgpu::BindGroupLayout>,
}

struct DeviceInner {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: Option<wgpu::AdapterInfo>,
    modules: Mutex<HashMap<&'static str, Arc<wgpu::ShaderModule>>>,
    pipelines: Mutex<HashMap<PipelineKey, CachedPipeline>>,
}

/// Shared handle to a `wgpu` device and queue.
///
/// Cloning is cheap; every buffer, kernel and command list keeps a clone so
/// the device outlives all of them.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Create a headless device on the best available adapter.
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(Error::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("Using GPU: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("flux2d device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("GPU uncaptured error: {error}");
        }));

        Ok(Self::build(device, queue, Some(info)))
    }

    /// Wrap a device created elsewhere, e.g. by a windowing layer.
    pub fn from_wgpu(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self::build(device, queue, None)
    }

    fn build(device: wgpu::Device, queue: wgpu::Queue, info: Option<wgpu::AdapterInfo>) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                device,
                queue,
                info,
                modules: Mutex::new(HashMap::new()),
                pipelines: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn handle(&self) -> &wgpu::Device {
        &self.inner.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.inner.queue
    }

    pub fn adapter_info(&self) -> Option<&wgpu::AdapterInfo> {
        self.inner.info.as_ref()
    }

    /// Compiled module for one of the crate's kernels, cached per device.
    ///
    /// Panics if `name` is not a known kernel.
    pub fn shader_module(&self, name: &str) -> Arc<wgpu::ShaderModule> {
        let mut modules = self
            .inner
            .modules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let (key, body) = shaders::find(name)
            .unwrap_or_else(|| panic!("unknown shader `{name}`"));

        modules
            .entry(key)
            .or_insert_with(|| {
                log::debug!("Compiling shader {key}");
                let source = shaders::with_prelude(body);
                Arc::new(
                    self.inner
                        .device
                        .create_shader_module(wgpu::ShaderModuleDescriptor {
                            label: Some(key),
                            source: wgpu::ShaderSource::Wgsl(source.into()),
                        }),
                )
            })
            .clone()
    }

    /// Pipeline for `key`, built by `build` on first use and shared by every
    /// later kernel with the same shader, entry point and layout.
    pub(crate) fn compute_pipeline(
        &self,
        key: PipelineKey,
        build: impl FnOnce() -> CachedPipeline,
    ) -> CachedPipeline {
        let mut pipelines = self
            .inner
            .pipelines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pipelines
            .entry(key)
            .or_insert_with_key(|key| {
                log::debug!("Building pipeline {}::{}", key.shader, key.entry_point);
                build()
            })
            .clone()
    }

    /// Number of distinct compute pipelines built on this device.
    pub fn pipeline_count(&self) -> usize {
        self.inner
            .pipelines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn create_command_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.inner
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    pub fn submit(&self, commands: wgpu::CommandBuffer) -> wgpu::SubmissionIndex {
        self.inner.queue.submit(std::iter::once(commands))
    }

    /// Block until the given submission has completed.
    pub fn wait(&self, index: wgpu::SubmissionIndex) {
        let _ = self
            .inner
            .device
            .poll(wgpu::Maintain::WaitForSubmissionIndex(index));
    }

    /// Block until all submitted work has completed.
    pub fn wait_idle(&self) {
        let _ = self.inner.device.poll(wgpu::Maintain::Wait);
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("adapter", &self.inner.info.as_ref().map(|info| &info.name))
            .finish()
    }
}
