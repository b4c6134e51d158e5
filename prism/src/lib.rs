//! A backend-neutral GPU device and resource layer. Devices are created over D3D11, D3D12 or
//! Vulkan, either by explicit request or by probing the platform for the best supported backend.
//!
//! ```no_run
//! use prism::api::*;
//!
//! fn main() -> PrismResult<()> {
//!     let mut device = PrismDevice::new(&PrismDeviceDef::default())?;
//!     log::info!("Using {:?} on {}", device.backend_type(), device.adapter_info()?.name);
//!
//!     let _buffer = device.create_buffer(&PrismBufferDef::for_constant_buffer(256))?;
//!     device.wait_idle()?;
//!     device.destroy();
//!     Ok(())
//! }
//! ```

pub use prism_base as base;

pub use prism_api as api;
