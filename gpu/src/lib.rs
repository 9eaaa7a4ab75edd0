//! WebCS GPU compute: pseudo-kernel compiler and resource binder.
//!
//! A kernel is a short body of shader-like text plus a parameter list. The
//! compiler half ([`analyzer`], [`codegen`], [`assembler`]) infers parameter
//! types, access modes and uniforms, rewrites subscripts into backend
//! load/store calls and assembles a complete WGSL or GLSL compute program
//! validated with `naga`. It has no GPU dependency.
//!
//! With the `webgpu-backend` feature (default) the runtime half compiles the
//! program through `wgpu` and manages dispatch:
//!
//! ```no_run
//! use webcs_gpu::{ComputeContext, ContextOptions, KernelArg, KernelConfig, KernelSource};
//!
//! # fn main() -> webcs_gpu::Result<()> {
//! let gpu = ComputeContext::new(ContextOptions::default())?;
//! let source = KernelSource::body("A, B", "B[thread.x] = A[thread.x] * 2.0;");
//! let config = KernelConfig::new([64, 1, 1])
//!     .param("A", "float[]")
//!     .param("B", "float[]")
//!     .groups([4, 1, 1]);
//! let mut kernel = gpu.create_kernel(&source, &config)?;
//!
//! let input = vec![1.0f32; 256];
//! kernel.run(vec![KernelArg::from(&input), KernelArg::Null])?;
//! let doubled = kernel.get_data("B", None)?;
//! # let _ = doubled;
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod assembler;
pub mod codegen;
pub mod config;
pub mod error;
pub mod kernel_ir;
pub mod logging;
pub mod reflect;
pub mod registry;

#[cfg(feature = "webgpu-backend")]
pub mod device;
#[cfg(feature = "webgpu-backend")]
pub mod kernel;
#[cfg(feature = "webgpu-backend")]
pub mod resource;
#[cfg(feature = "webgpu-backend")]
pub mod wgpu_backend;

pub use assembler::{compile, KernelSource, ShaderProgram};
pub use codegen::Target;
pub use config::{KernelConfig, ParamDecl, ParamSpec};
pub use error::{GpuError, Result};
pub use kernel_ir::{AccessMode, KernelLayout, ParamSlot, SlotKind, UniformSlot};
pub use registry::{HostScalar, ImageFormat, ParamType, ScalarKind};

#[cfg(feature = "webgpu-backend")]
pub use device::{ComputeContext, ContextOptions};
#[cfg(feature = "webgpu-backend")]
pub use kernel::KernelHandle;
#[cfg(feature = "webgpu-backend")]
pub use resource::{GpuResource, HostData, HostSlice, ImageData, KernelArg, Ownership, UniformMap};
#[cfg(feature = "webgpu-backend")]
pub use wgpu_backend::{DeviceBuffer, DeviceTexture};
