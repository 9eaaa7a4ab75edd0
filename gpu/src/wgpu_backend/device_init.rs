//! WebGPU device initialization via wgpu

use log::{info, warn};

use crate::error::{GpuError, Result};

/// Device, queue and the adapter facts the runtime needs.
pub struct WgpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
    pub features: wgpu::Features,
}

fn instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

impl WgpuContext {
    /// Create a context on the best adapter for `power_preference`.
    ///
    /// 64-bit float support is requested only when `request_f64` is set and
    /// the adapter offers it.
    pub fn new(power_preference: wgpu::PowerPreference, request_f64: bool) -> Result<Self> {
        let instance = instance();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| GpuError::BackendUnavailable("no compatible GPU adapter found".into()))?;

        let adapter_info = adapter.get_info();
        let mut required_features = wgpu::Features::empty();
        if request_f64 {
            if adapter.features().contains(wgpu::Features::SHADER_F64) {
                required_features |= wgpu::Features::SHADER_F64;
            } else {
                warn!("adapter '{}' has no 64-bit float support", adapter_info.name);
            }
        }

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("webcs_device"),
                required_features,
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                ..Default::default()
            },
            None,
        ))
        .map_err(|e| GpuError::BackendUnavailable(format!("device request failed: {}", e)))?;

        info!(
            "using adapter '{}' ({:?}, {:?})",
            adapter_info.name, adapter_info.backend, adapter_info.device_type
        );

        Ok(WgpuContext {
            device,
            queue,
            adapter_info,
            features: required_features,
        })
    }

    /// Check if wgpu can find any adapter on this system.
    pub fn is_available() -> bool {
        pollster::block_on(instance().request_adapter(&wgpu::RequestAdapterOptions::default()))
            .is_some()
    }

    pub fn supports_f64(&self) -> bool {
        self.features.contains(wgpu::Features::SHADER_F64)
    }

    /// Block until all submitted work has completed.
    pub fn wait(&self) {
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Run `f` inside validation and out-of-memory error scopes and return
    /// the first error it raised.
    pub fn validation_scope<T>(&self, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        (value, validation.or(oom))
    }

    /// Largest buffer the device accepts.
    pub fn max_buffer_size(&self) -> u64 {
        self.device.limits().max_buffer_size
    }

    /// Like [`validation_scope`](Self::validation_scope), mapping an error to [`GpuError::Backend`].
    pub fn checked<T>(&self, what: &str, f: impl FnOnce() -> T) -> Result<T> {
        match self.validation_scope(f) {
            (value, None) => Ok(value),
            (_, Some(error)) => Err(GpuError::backend(format!("{}: {}", what, error))),
        }
    }
}
