//! wgpu implementation of the sketch render backend.
//!
//! - `context` picks an adapter and creates a headless device, deciding the
//!   screen's MSAA sample count along the way.
//! - `uniforms` lays out each program's uniform block with std140 rules.
//! - `pipeline` owns shader modules, bind group layouts, and a cache of render
//!   pipelines keyed by blend, topology, and destination format.
//! - `readback` copies textures into CPU memory with row padding removed.
//! - `backend` ties the pieces together behind [`procgen::RenderBackend`].

mod backend;
mod context;
pub(crate) mod pipeline;
pub(crate) mod readback;
pub(crate) mod uniforms;

/// Colour format of the screen destination.
pub(crate) const SCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub use backend::GpuBackend;
pub use context::{AdapterProfile, GpuOptions, GpuPowerPreference};
