mod native;
pub use native::*;

mod queue_allocation;
pub use queue_allocation::*;

mod instance;
pub use instance::*;

mod api;
pub use api::*;

mod device_context;
pub use device_context::*;

mod buffer;
pub use buffer::*;

mod texture;
pub use texture::*;

#[cfg(feature = "vulkan-loader")]
mod ash_native;
#[cfg(feature = "vulkan-loader")]
pub use ash_native::*;
