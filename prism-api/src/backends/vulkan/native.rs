//! The Vulkan entry points the backend calls. Values mirror the native enums and flags so that an
//! implementation over the real API (see `AshVkNative`) is a direct translation.

use crate::{PrismNativeHandle, PrismResult, PrismValidationSeverity};

/// Packs a version the way VK_MAKE_API_VERSION does (variant 0)
pub const fn vk_make_api_version(
    major: u32,
    minor: u32,
    patch: u32,
) -> u32 {
    (major << 22) | (minor << 12) | patch
}

pub const VK_API_VERSION_1_0: u32 = vk_make_api_version(1, 0, 0);
pub const VK_API_VERSION_1_1: u32 = vk_make_api_version(1, 1, 0);
pub const VK_API_VERSION_1_2: u32 = vk_make_api_version(1, 2, 0);

/// Formats a packed version as "major.minor.patch"
pub fn vk_version_to_string(version: u32) -> String {
    format!(
        "{}.{}.{}",
        (version >> 22) & 0x7F,
        (version >> 12) & 0x3FF,
        version & 0xFFF
    )
}

/// Matches VkPhysicalDeviceType
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VkPhysicalDeviceType {
    Other,
    IntegratedGpu,
    DiscreteGpu,
    VirtualGpu,
    Cpu,
}

bitflags::bitflags! {
    /// Matches VkQueueFlags
    pub struct VkQueueFlags: u32 {
        const GRAPHICS = 0x1;
        const COMPUTE = 0x2;
        const TRANSFER = 0x4;
        const SPARSE_BINDING = 0x8;
    }
}

/// The parts of VkQueueFamilyProperties used to allocate queues
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VkQueueFamilyDesc {
    pub queue_flags: VkQueueFlags,
    pub queue_count: u32,
}

/// The members of VkPhysicalDeviceFeatures that are reported to the application
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VkPhysicalDeviceFeatures {
    pub independent_blend: bool,
    pub geometry_shader: bool,
    pub tessellation_shader: bool,
    pub multi_viewport: bool,
    pub full_draw_index_uint32: bool,
    pub multi_draw_indirect: bool,
    pub fill_mode_non_solid: bool,
    pub sampler_anisotropy: bool,
    pub texture_compression_bc: bool,
    pub texture_compression_etc2: bool,
    pub texture_compression_astc_ldr: bool,
    pub image_cube_array: bool,
}

/// The members of VkPhysicalDeviceLimits that are reported to the application
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct VkPhysicalDeviceLimits {
    pub max_image_dimension_1d: u32,
    pub max_image_dimension_2d: u32,
    pub max_image_dimension_3d: u32,
    pub max_image_dimension_cube: u32,
    pub max_image_array_layers: u32,
    pub max_color_attachments: u32,
    pub max_viewports: u32,
    pub max_viewport_dimensions: [u32; 2],
    pub max_uniform_buffer_range: u32,
    pub min_uniform_buffer_offset_alignment: u64,
    pub min_storage_buffer_offset_alignment: u64,
    pub max_sampler_anisotropy: f32,
    pub max_vertex_input_bindings: u32,
    pub max_tessellation_patch_size: u32,
    pub max_compute_shared_memory_size: u32,
    pub max_compute_work_group_count: [u32; 3],
    pub max_compute_work_group_invocations: u32,
    pub max_compute_work_group_size: [u32; 3],
}

/// Everything the backend needs to know about a VkPhysicalDevice. `index` identifies the device to
/// the instance that enumerated it.
#[derive(Clone, Debug, PartialEq)]
pub struct VkPhysicalDeviceDesc {
    pub index: u32,
    pub device_name: String,
    pub device_type: VkPhysicalDeviceType,
    pub vendor_id: u32,
    pub device_id: u32,
    pub api_version: u32,
    pub driver_version: u32,
    pub queue_families: Vec<VkQueueFamilyDesc>,
    pub features: VkPhysicalDeviceFeatures,
    pub limits: VkPhysicalDeviceLimits,
    pub extensions: Vec<String>,
}

impl VkPhysicalDeviceDesc {
    pub fn supports_extension(
        &self,
        extension_name: &str,
    ) -> bool {
        self.extensions.iter().any(|x| x == extension_name)
    }
}

bitflags::bitflags! {
    /// Matches VkDebugUtilsMessageSeverityFlagsEXT
    pub struct VkDebugSeverityFlags: u32 {
        const VERBOSE = 0x1;
        const INFO = 0x10;
        const WARNING = 0x100;
        const ERROR = 0x1000;
    }
}

impl VkDebugSeverityFlags {
    pub fn to_validation_severity(self) -> PrismValidationSeverity {
        if self.contains(VkDebugSeverityFlags::ERROR) {
            PrismValidationSeverity::Error
        } else if self.contains(VkDebugSeverityFlags::WARNING) {
            PrismValidationSeverity::Warning
        } else if self.contains(VkDebugSeverityFlags::INFO) {
            PrismValidationSeverity::Info
        } else {
            PrismValidationSeverity::Message
        }
    }
}

/// Matches VkValidationFeatureEnableEXT
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VkValidationFeatureEnable {
    GpuAssisted,
    GpuAssistedReserveBindingSlot,
    SynchronizationValidation,
}

/// VkInstanceCreateInfo, with the debug messenger and validation features chained on
#[derive(Clone, Debug, PartialEq)]
pub struct VkInstanceDesc {
    pub application_name: String,
    pub api_version: u32,
    pub enabled_layers: Vec<String>,
    pub enabled_extensions: Vec<String>,
    /// Severities the debug messenger reports. Empty disables the messenger.
    pub debug_severity: VkDebugSeverityFlags,
    pub validation_features: Vec<VkValidationFeatureEnable>,
}

/// A message received by the debug utils messenger callback
#[derive(Clone, Debug, PartialEq)]
pub struct VkDebugMessage {
    pub severity: VkDebugSeverityFlags,
    pub message_id_number: i32,
    pub message_id_name: String,
    pub message: String,
}

/// VkDeviceQueueCreateInfo
#[derive(Clone, Debug, PartialEq)]
pub struct VkDeviceQueueCreateInfo {
    pub queue_family_index: u32,
    pub queue_priorities: Vec<f32>,
}

/// VkDeviceCreateInfo
#[derive(Clone, Debug, PartialEq)]
pub struct VkDeviceDesc {
    pub queue_create_infos: Vec<VkDeviceQueueCreateInfo>,
    pub enabled_extensions: Vec<String>,
    pub enabled_features: VkPhysicalDeviceFeatures,
}

bitflags::bitflags! {
    /// Matches VkBufferUsageFlags
    pub struct VkBufferUsageFlags: u32 {
        const TRANSFER_SRC = 0x1;
        const TRANSFER_DST = 0x2;
        const UNIFORM_TEXEL_BUFFER = 0x4;
        const STORAGE_TEXEL_BUFFER = 0x8;
        const UNIFORM_BUFFER = 0x10;
        const STORAGE_BUFFER = 0x20;
        const INDEX_BUFFER = 0x40;
        const VERTEX_BUFFER = 0x80;
        const INDIRECT_BUFFER = 0x100;
    }
}

/// Where a buffer or image's memory is allocated from. Matches gpu-allocator's `MemoryLocation`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VkMemoryLocation {
    /// Device local, not mappable
    GpuOnly,
    /// Host visible and coherent, for uploads
    CpuToGpu,
    /// Host visible and preferably cached, for readback
    GpuToCpu,
}

impl VkMemoryLocation {
    pub fn is_host_visible(self) -> bool {
        self != VkMemoryLocation::GpuOnly
    }
}

bitflags::bitflags! {
    /// Matches VkImageUsageFlags
    pub struct VkImageUsageFlags: u32 {
        const TRANSFER_SRC = 0x1;
        const TRANSFER_DST = 0x2;
        const SAMPLED = 0x4;
        const STORAGE = 0x8;
        const COLOR_ATTACHMENT = 0x10;
        const DEPTH_STENCIL_ATTACHMENT = 0x20;
    }
}

bitflags::bitflags! {
    /// Matches VkImageCreateFlags
    pub struct VkImageCreateFlags: u32 {
        const MUTABLE_FORMAT = 0x8;
        const CUBE_COMPATIBLE = 0x10;
    }
}

/// Matches VkImageType
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VkImageType {
    Type1D,
    Type2D,
    Type3D,
}

/// Matches VkImageTiling
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum VkImageTiling {
    Optimal,
    Linear,
}

/// A VkFormat value
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VkFormat(pub i32);

impl VkFormat {
    pub const UNDEFINED: VkFormat = VkFormat(0);
    pub const R8_UNORM: VkFormat = VkFormat(9);
    pub const R8G8_UNORM: VkFormat = VkFormat(16);
    pub const R8G8B8A8_UNORM: VkFormat = VkFormat(37);
    pub const R8G8B8A8_SRGB: VkFormat = VkFormat(43);
    pub const B8G8R8A8_UNORM: VkFormat = VkFormat(44);
    pub const B8G8R8A8_SRGB: VkFormat = VkFormat(50);
    pub const A2B10G10R10_UNORM_PACK32: VkFormat = VkFormat(64);
    pub const R16_SFLOAT: VkFormat = VkFormat(76);
    pub const R16G16B16A16_SFLOAT: VkFormat = VkFormat(97);
    pub const R32_UINT: VkFormat = VkFormat(98);
    pub const R32_SFLOAT: VkFormat = VkFormat(100);
    pub const R32G32_SFLOAT: VkFormat = VkFormat(103);
    pub const R32G32B32A32_SFLOAT: VkFormat = VkFormat(109);
    pub const B10G11R11_UFLOAT_PACK32: VkFormat = VkFormat(122);
    pub const D16_UNORM: VkFormat = VkFormat(124);
    pub const D32_SFLOAT: VkFormat = VkFormat(126);
    pub const D24_UNORM_S8_UINT: VkFormat = VkFormat(129);
    pub const D32_SFLOAT_S8_UINT: VkFormat = VkFormat(130);
    pub const BC1_RGBA_UNORM_BLOCK: VkFormat = VkFormat(133);
    pub const BC3_UNORM_BLOCK: VkFormat = VkFormat(137);
    pub const BC7_UNORM_BLOCK: VkFormat = VkFormat(145);
}

/// VkBufferCreateInfo
#[derive(Clone, Debug, PartialEq)]
pub struct VkBufferDesc {
    pub size: u64,
    pub usage: VkBufferUsageFlags,
}

/// VkImageCreateInfo, always with exclusive sharing and an undefined initial layout
#[derive(Clone, Debug, PartialEq)]
pub struct VkImageDesc {
    pub image_type: VkImageType,
    pub format: VkFormat,
    pub extent: [u32; 3],
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: u32,
    pub tiling: VkImageTiling,
    pub usage: VkImageUsageFlags,
    pub flags: VkImageCreateFlags,
}

/// The loader: global entry points that don't need an instance
pub trait VkNative: Send + Sync {
    /// vkEnumerateInstanceVersion, VK_API_VERSION_1_0 if the loader predates it
    fn instance_version(&self) -> PrismResult<u32>;

    /// vkEnumerateInstanceLayerProperties
    fn enumerate_instance_layers(&self) -> PrismResult<Vec<String>>;

    /// vkEnumerateInstanceExtensionProperties
    fn enumerate_instance_extensions(&self) -> PrismResult<Vec<String>>;

    /// vkCreateInstance, plus vkCreateDebugUtilsMessengerEXT if `desc.debug_severity` is not empty.
    /// Dropping the returned instance destroys it.
    fn create_instance(
        &self,
        desc: &VkInstanceDesc,
    ) -> PrismResult<Box<dyn VkNativeInstance>>;
}

/// VkInstance and its debug messenger
pub trait VkNativeInstance: Send + Sync {
    /// vkEnumeratePhysicalDevices along with the properties, features, queue families and
    /// extensions of each device
    fn enumerate_physical_devices(&self) -> PrismResult<Vec<VkPhysicalDeviceDesc>>;

    /// vkCreateDevice
    fn create_device(
        &self,
        physical_device: &VkPhysicalDeviceDesc,
        desc: &VkDeviceDesc,
    ) -> PrismResult<Box<dyn VkNativeDevice>>;

    /// Drains the messages the debug messenger has received
    fn take_debug_messages(&self) -> Vec<VkDebugMessage>;
}

/// VkDevice
pub trait VkNativeDevice: Send + Sync {
    /// vkGetDeviceQueue
    fn get_device_queue(
        &self,
        queue_family_index: u32,
        queue_index: u32,
    ) -> PrismNativeHandle;

    /// vkCreateBuffer, then allocates and binds memory from the given location
    fn create_buffer(
        &self,
        desc: &VkBufferDesc,
        memory_location: VkMemoryLocation,
    ) -> PrismResult<PrismNativeHandle>;

    /// vkCreateImage, then allocates and binds memory from the given location
    fn create_image(
        &self,
        desc: &VkImageDesc,
        memory_location: VkMemoryLocation,
    ) -> PrismResult<PrismNativeHandle>;

    /// Copies into the mapped memory of a buffer created in a host visible location
    fn write_buffer_data(
        &self,
        buffer: PrismNativeHandle,
        offset: u64,
        data: &[u8],
    ) -> PrismResult<()>;

    /// vkSetDebugUtilsObjectNameEXT on the device
    fn set_device_name(
        &self,
        name: &str,
    );

    /// vkSetDebugUtilsObjectNameEXT on a buffer or image
    fn set_object_name(
        &self,
        object: PrismNativeHandle,
        name: &str,
    );

    /// vkDestroyBuffer and frees its memory
    fn destroy_buffer(
        &self,
        buffer: PrismNativeHandle,
    );

    /// vkDestroyImage and frees its memory
    fn destroy_image(
        &self,
        image: PrismNativeHandle,
    );

    /// vkDeviceWaitIdle
    fn wait_idle(&self) -> PrismResult<()>;

    /// vkDestroyDevice
    fn destroy(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_packing() {
        assert_eq!(VK_API_VERSION_1_1, 0x401000);
        assert!(VK_API_VERSION_1_2 > VK_API_VERSION_1_1);
        assert_eq!(
            vk_version_to_string(vk_make_api_version(1, 3, 250)),
            "1.3.250"
        );
    }

    #[test]
    fn test_debug_severity_mapping() {
        assert_eq!(
            VkDebugSeverityFlags::ERROR.to_validation_severity(),
            PrismValidationSeverity::Error
        );
        assert_eq!(
            VkDebugSeverityFlags::VERBOSE.to_validation_severity(),
            PrismValidationSeverity::Message
        );
    }
}
