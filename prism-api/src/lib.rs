//! Backend-neutral device creation and resource allocation over D3D11, D3D12 and Vulkan.
//!
//! A `PrismDevice` is created from a `PrismDeviceDef`. Unless the def names a backend, the first
//! backend in the platform's priority order that passes its support check is used. All native
//! calls go through per-backend traits (`Dx11Native`, `Dx12Native`, `VkNative`) held by a
//! `PrismBackendRegistry`. The `reference` module implements them in software. The system Vulkan
//! loader is used with the `vulkan-loader` feature, and the system D3D runtimes with `d3d-runtime`.
//!
//! Buffers and textures are described by `PrismBufferDef` and `PrismTextureDef`. Defs are checked
//! the same way on every backend before any native object is created.

#[cfg(feature = "vulkan-loader")]
pub use ash;
#[cfg(all(windows, feature = "d3d-runtime"))]
pub use windows;

pub use backends::*;
pub use buffer::*;
pub use device::*;
pub use diagnostics::*;
pub use error::*;
pub use platform::*;
pub use registry::*;
pub use selection::*;
pub use texture::*;
pub use types::*;

mod backends;
mod buffer;
mod device;
mod diagnostics;
mod error;
mod platform;
mod registry;
mod selection;
mod texture;
mod types;

pub(crate) mod internal_shared;

pub mod reference;
