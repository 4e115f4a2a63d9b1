//! GPU rendering for sketchbook sketches.
//!
//! ```text
//!   sketchbook ──▶ SketchRunner<GpuBackend> ──▶ compile::translate ──▶ wgpu pipelines
//!        │                  │
//!        │                  └─▶ read_pixels ──▶ still::save_png
//!        └─▶ window::run_preview(FrameSource) ──▶ winit surface
//! ```
//!
//! [`GpuBackend`] implements [`procgen::RenderBackend`] against a headless
//! device, so the same sketch code drives the CPU backend in tests and the
//! GPU here. Sketch programs are written in WebGL-style GLSL and rewritten
//! into Vulkan GLSL before naga compiles them. The preview window and PNG
//! export both consume read-back [`procgen::PixelBuffer`]s.

mod compile;
mod gpu;
mod still;
mod window;

pub use gpu::{AdapterProfile, GpuBackend, GpuOptions, GpuPowerPreference};
pub use still::{load_image, save_png};
pub use window::{run_preview, FrameSource};
