mod definitions;
pub use definitions::*;

mod device_info;
pub use device_info::*;

mod format;
pub use format::*;

mod misc;
pub use misc::*;
