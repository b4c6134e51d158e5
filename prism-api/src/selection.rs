use crate::{
    PrismBackendRegistry, PrismBackendType, PrismDeviceDef, PrismError, PrismOsFamily,
    PrismPlatformInfo, PrismResult,
};

/// Backends tried by automatic selection, most preferred first
pub fn backend_priority(platform: &PrismPlatformInfo) -> &'static [PrismBackendType] {
    match platform.os_family {
        PrismOsFamily::Windows => &[
            PrismBackendType::Dx12,
            PrismBackendType::Vulkan,
            PrismBackendType::Dx11,
        ],
        PrismOsFamily::Linux | PrismOsFamily::Android => &[PrismBackendType::Vulkan],
        _ => &[],
    }
}

/// Picks the backend a device will be created with. A backend named in the def is returned
/// without checking support, the device creation reports it if it can't run.
pub fn select_backend(
    device_def: &PrismDeviceDef,
    registry: &PrismBackendRegistry,
) -> PrismResult<PrismBackendType> {
    if let Some(backend) = device_def.preferred_backend {
        return Ok(backend);
    }

    let platform = registry.platform();
    for backend in backend_priority(platform) {
        if registry.is_backend_supported(*backend) {
            log::info!("Selected backend {:?}", backend);
            return Ok(*backend);
        }

        log::debug!("Backend {:?} is not supported, trying the next", backend);
    }

    log::warn!(
        "No supported backend found for {:?}",
        platform.os_family
    );
    Err(PrismError::UnsupportedPlatform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{ReferenceDriver, ReferenceDxgiConfig, ReferenceVkConfig};

    fn platform(os_family: PrismOsFamily) -> PrismPlatformInfo {
        PrismPlatformInfo::with_os_family(os_family)
    }

    #[test]
    fn test_priority_by_platform() {
        assert_eq!(
            backend_priority(&platform(PrismOsFamily::Windows)),
            &[
                PrismBackendType::Dx12,
                PrismBackendType::Vulkan,
                PrismBackendType::Dx11
            ]
        );
        assert_eq!(
            backend_priority(&platform(PrismOsFamily::Android)),
            &[PrismBackendType::Vulkan]
        );
        assert!(backend_priority(&platform(PrismOsFamily::MacOs)).is_empty());
        assert!(backend_priority(&platform(PrismOsFamily::Unknown)).is_empty());
    }

    #[test]
    fn test_automatic_selection() {
        let driver = ReferenceDriver::default();
        let def = PrismDeviceDef::default();

        let registry = driver.registry(platform(PrismOsFamily::Windows));
        assert_eq!(select_backend(&def, &registry), Ok(PrismBackendType::Dx12));

        let registry = driver.registry(platform(PrismOsFamily::Linux));
        assert_eq!(select_backend(&def, &registry), Ok(PrismBackendType::Vulkan));

        let registry = driver.registry(platform(PrismOsFamily::Ios));
        assert_eq!(
            select_backend(&def, &registry),
            Err(PrismError::UnsupportedPlatform)
        );
    }

    #[test]
    fn test_falls_through_unsupported_backends() {
        // Only WARP on the D3D side and no Vulkan devices at all
        let driver = ReferenceDriver::new(
            ReferenceDxgiConfig::software_only(),
            ReferenceVkConfig {
                physical_devices: vec![],
                ..Default::default()
            },
        );
        let registry = driver.registry(platform(PrismOsFamily::Windows));
        assert_eq!(
            select_backend(&PrismDeviceDef::default(), &registry),
            Err(PrismError::UnsupportedPlatform)
        );

        let driver = ReferenceDriver::new(
            ReferenceDxgiConfig::software_only(),
            ReferenceVkConfig::default(),
        );
        let registry = driver.registry(platform(PrismOsFamily::Windows));
        assert_eq!(
            select_backend(&PrismDeviceDef::default(), &registry),
            Ok(PrismBackendType::Vulkan)
        );
    }

    #[test]
    fn test_requested_backend_is_not_checked() {
        let driver = ReferenceDriver::default();
        let registry = driver.registry(platform(PrismOsFamily::Linux));
        let def = PrismDeviceDef {
            preferred_backend: Some(PrismBackendType::Dx11),
            ..Default::default()
        };
        assert_eq!(select_backend(&def, &registry), Ok(PrismBackendType::Dx11));
    }
}
