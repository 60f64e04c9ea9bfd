use bevy::log::{
    error,
    info,
};

use crate::error::{
    SplatError,
    SplatResult,
};


/// the device and queue every splat resource is created on
#[derive(Clone, Debug)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// requests a headless device with the adapter's full limits.
    pub async fn new() -> SplatResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(SplatError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "selected gpu adapter",
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("splat_device"),
                    required_features: adapter.features() & wgpu::Features::TIMESTAMP_QUERY,
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        Ok(Self::from_parts(device, queue))
    }

    pub fn new_blocking() -> SplatResult<Self> {
        pollster::block_on(Self::new())
    }

    /// wraps a device owned by the host; device loss and uncaptured errors
    /// are logged and never recovered from.
    pub fn from_parts(
        device: wgpu::Device,
        queue: wgpu::Queue,
    ) -> Self {
        device.set_device_lost_callback(|reason, message| {
            error!(reason = ?reason, "gpu device lost: {message}");
        });

        device.on_uncaptured_error(Box::new(|err| {
            error!("uncaptured gpu error: {err}");
        }));

        Self {
            device,
            queue,
        }
    }

    /// shares the device and queue of bevy's renderer. the renderer keeps
    /// ownership of device-loss and uncaptured-error handling.
    #[cfg(feature = "bevy_render")]
    pub fn from_render_device(
        device: &bevy::render::renderer::RenderDevice,
        queue: &bevy::render::renderer::RenderQueue,
    ) -> Self {
        let queue: &wgpu::Queue = queue;

        Self {
            device: device.wgpu_device().clone(),
            queue: queue.clone(),
        }
    }
}
