//! WebGPU backend for GPU compute (cross-platform via wgpu)

pub mod buffer_ops;
pub mod compile;
pub mod device_init;
pub mod dispatch;
pub mod present;
pub mod texture_ops;

pub use buffer_ops::DeviceBuffer;
pub use device_init::WgpuContext;
pub use texture_ops::DeviceTexture;
