use super::{PrismAdapterType, PrismVendor};

/// Identity of the adapter a device was created on
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrismAdapterInfo {
    pub vendor_id: u32,
    pub device_id: u32,
    pub name: String,
    pub adapter_type: PrismAdapterType,
    pub driver_description: String,
}

impl PrismAdapterInfo {
    pub fn vendor(&self) -> PrismVendor {
        PrismVendor::from_vendor_id(self.vendor_id)
    }
}

/// Optional features of a device. Features that could not be queried are reported as unsupported.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PrismDeviceFeatures {
    pub independent_blend: bool,
    pub compute_shader: bool,
    pub tessellation_shader: bool,
    pub multi_viewport: bool,
    pub index_type_uint32: bool,
    pub multi_draw_indirect: bool,
    pub fill_mode_non_solid: bool,
    pub sampler_anisotropy: bool,
    pub texture_compression_bc: bool,
    pub texture_compression_etc2: bool,
    pub texture_compression_astc_ldr: bool,
    pub texture_cube_array: bool,
    pub raytracing: bool,
    pub render_passes: bool,
}

/// Numeric limits of a device
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PrismDeviceLimits {
    pub max_texture_dimension_1d: u32,
    pub max_texture_dimension_2d: u32,
    pub max_texture_dimension_3d: u32,
    pub max_texture_dimension_cube: u32,
    pub max_texture_array_layers: u32,
    pub max_color_attachments: u32,
    pub max_viewports: u32,
    pub max_viewport_dimensions: [u32; 2],
    pub max_uniform_buffer_range: u64,
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

/// Snapshot of the adapter, its features and limits, captured when the device is created and
/// never changed afterwards
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrismDeviceInfo {
    pub adapter_info: PrismAdapterInfo,
    pub features: PrismDeviceFeatures,
    pub limits: PrismDeviceLimits,
}
