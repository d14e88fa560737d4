//! Backend configuration.
//!
//! Type aliases for the backend and device, picked by compile-time feature flags.
//! The NdArray backend is the default so the networks run anywhere; enable
//! `backend-wgpu` for GPU execution.
//!
//! # Feature Flags
//!
//! - `backend-ndarray` (default): NdArray backend, CPU only
//! - `backend-wgpu`: WGPU backend via Vulkan/Metal/DirectX, takes precedence when both are enabled
//!
//! # Example
//!
//! ```rust,no_run
//! use drivenets::backend::{Backend, default_device};
//! use drivenets::core::{AnyNet, NetConfig};
//!
//! let device = default_device();
//! let net = AnyNet::<Backend>::init(&NetConfig::default(), &device);
//! ```

#[cfg(feature = "backend-wgpu")]
pub use burn_wgpu::Wgpu as InnerBackend;

#[cfg(all(feature = "backend-ndarray", not(feature = "backend-wgpu")))]
pub use burn_ndarray::NdArray as InnerBackend;

/// The backend used for inference.
pub type Backend = InnerBackend;

/// The backend with autodiff support, for anything that needs gradients.
pub type AutodiffBackend = burn::backend::Autodiff<InnerBackend>;

/// The device type corresponding to the selected backend.
#[cfg(feature = "backend-wgpu")]
pub type Device = burn_wgpu::WgpuDevice;

#[cfg(all(feature = "backend-ndarray", not(feature = "backend-wgpu")))]
pub type Device = burn_ndarray::NdArrayDevice;

/// Get the default device for the selected backend.
pub fn default_device() -> Device {
    #[cfg(feature = "backend-wgpu")]
    tracing::info!("Using WGPU backend");

    #[cfg(all(feature = "backend-ndarray", not(feature = "backend-wgpu")))]
    tracing::info!("Using NdArray (CPU) backend");

    let device = Device::default();
    tracing::info!("Device initialized: {:?}", device);
    device
}
