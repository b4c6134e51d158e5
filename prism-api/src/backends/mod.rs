pub mod dxgi;

pub mod dx11;

pub mod dx12;

pub mod vulkan;
