mod native;
pub use native::*;

#[cfg(all(windows, feature = "d3d-runtime"))]
mod windows_native;
#[cfg(all(windows, feature = "d3d-runtime"))]
pub use windows_native::*;

mod api;
pub use api::*;

mod device_context;
pub use device_context::*;

mod buffer;
pub use buffer::*;

mod texture;
pub use texture::*;
