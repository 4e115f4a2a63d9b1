use anyhow::{Context as AnyhowContext, Result};
use wgpu::TextureFormatFeatureFlags;

use super::SCREEN_FORMAT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

/// Options for creating a [`super::GpuBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuOptions {
    /// Multisample the screen destination when the adapter allows it.
    pub antialias: bool,
    pub power: GpuPowerPreference,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            antialias: true,
            power: GpuPowerPreference::Low,
        }
    }
}

/// Summary of the adapter chosen for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
}

impl AdapterProfile {
    fn from_info(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }
}

/// Device and queue without a presentation surface.
pub(crate) struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub max_dimension: u32,
    /// MSAA sample count used for the screen destination.
    pub screen_samples: u32,
    pub adapter_profile: AdapterProfile,
}

impl GpuContext {
    pub(crate) fn headless(options: GpuOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let power_preference = match options.power {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let adapter_profile = AdapterProfile::from_info(&adapter.get_info());
        let limits = adapter.limits();
        tracing::debug!(
            name = %adapter_profile.name,
            backend = ?adapter_profile.backend,
            device_type = ?adapter_profile.device_type,
            "selected GPU adapter"
        );

        let format_features = adapter.get_texture_format_features(SCREEN_FORMAT);
        let supported = format_features.flags.supported_sample_counts();
        let mut screen_samples = if options.antialias && supported.contains(&4) {
            4
        } else {
            1
        };
        if screen_samples > 1
            && !format_features
                .flags
                .contains(TextureFormatFeatureFlags::MULTISAMPLE_RESOLVE)
        {
            tracing::warn!("screen format does not support MSAA resolve; disabling antialiasing");
            screen_samples = 1;
        }
        if screen_samples > 1 && adapter_profile.is_software() {
            tracing::warn!("software rasterizer detected; disabling antialiasing for performance");
            screen_samples = 1;
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("sketchbook device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        Ok(Self {
            device,
            queue,
            max_dimension: limits.max_texture_dimension_2d,
            screen_samples,
            adapter_profile,
        })
    }
}
