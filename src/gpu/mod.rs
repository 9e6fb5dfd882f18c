//! Graphics backends
//!
//! The solver talks to a [`RenderBackend`]. `WgpuBackend` drives a real
//! device (WebGPU, Vulkan, Metal, DX12 or GL/WebGL2); `CpuBackend` executes
//! the same passes on host grids for tests and headless runs.

pub mod backend;
pub mod capability;
pub mod cpu_backend;
pub mod device;
pub mod wgpu_backend;

pub use backend::{DrawCall, DrawTarget, PassParams, ProgramId, RenderBackend};
pub use capability::{
    CapabilityProfile, ChannelFormats, Channels, ContextKind, FormatSupport, StorageFormat,
};
pub use cpu_backend::CpuBackend;
pub use device::{texture_format, GpuContext};
pub use wgpu_backend::WgpuBackend;
