use super::native::*;
use crate::{PrismBackendType, PrismNativeError, PrismResult, PrismValidationMode};

const KHRONOS_VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
const LUNARG_STANDARD_VALIDATION_LAYER: &str = "VK_LAYER_LUNARG_standard_validation";
const LUNARG_CORE_VALIDATION_LAYER: &str = "VK_LAYER_LUNARG_core_validation";

/// The layers that made up LUNARG_standard_validation before it was a single layer
const INDIVIDUAL_VALIDATION_LAYERS: [&str; 5] = [
    "VK_LAYER_GOOGLE_threading",
    "VK_LAYER_LUNARG_parameter_validation",
    "VK_LAYER_LUNARG_object_tracker",
    LUNARG_CORE_VALIDATION_LAYER,
    "VK_LAYER_GOOGLE_unique_objects",
];

const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";
const VALIDATION_FEATURES_EXTENSION: &str = "VK_EXT_validation_features";

/// VK_ERROR_INCOMPATIBLE_DRIVER
const VK_ERROR_INCOMPATIBLE_DRIVER: i64 = -9;

pub(crate) const VK_MINIMUM_API_VERSION: u32 = VK_API_VERSION_1_1;

/// Picks the most complete set of validation layers that is installed, newest first
pub(crate) fn find_best_validation_layers(available_layers: &[String]) -> Vec<String> {
    let is_available = |name: &str| available_layers.iter().any(|layer| layer == name);

    if is_available(KHRONOS_VALIDATION_LAYER) {
        return vec![KHRONOS_VALIDATION_LAYER.to_string()];
    }

    if is_available(LUNARG_STANDARD_VALIDATION_LAYER) {
        return vec![LUNARG_STANDARD_VALIDATION_LAYER.to_string()];
    }

    if INDIVIDUAL_VALIDATION_LAYERS
        .iter()
        .all(|layer| is_available(layer))
    {
        return INDIVIDUAL_VALIDATION_LAYERS
            .iter()
            .map(|layer| layer.to_string())
            .collect();
    }

    if is_available(LUNARG_CORE_VALIDATION_LAYER) {
        return vec![LUNARG_CORE_VALIDATION_LAYER.to_string()];
    }

    Vec::default()
}

pub(crate) fn debug_severity_for_mode(validation_mode: PrismValidationMode) -> VkDebugSeverityFlags {
    match validation_mode {
        PrismValidationMode::Disabled => VkDebugSeverityFlags::empty(),
        PrismValidationMode::Enabled | PrismValidationMode::Gpu => {
            VkDebugSeverityFlags::ERROR | VkDebugSeverityFlags::WARNING
        }
        PrismValidationMode::Verbose => VkDebugSeverityFlags::all(),
    }
}

/// A VkInstance shared by all vulkan devices created from the same registry
pub struct PrismVkInstance {
    native_instance: Box<dyn VkNativeInstance>,
    api_version: u32,
    validation_enabled: bool,
}

impl std::fmt::Debug for PrismVkInstance {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        f.debug_struct("PrismVkInstance")
            .field("api_version", &vk_version_to_string(self.api_version))
            .field("validation_enabled", &self.validation_enabled)
            .finish()
    }
}

impl PrismVkInstance {
    pub fn native_instance(&self) -> &dyn VkNativeInstance {
        &*self.native_instance
    }

    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// True if validation layers and the debug messenger are active
    pub fn validation_enabled(&self) -> bool {
        self.validation_enabled
    }

    pub fn new(
        native: &dyn VkNative,
        application_name: &str,
        validation_mode: PrismValidationMode,
    ) -> PrismResult<Self> {
        profiling::scope!("PrismVkInstance::new");

        let api_version = native.instance_version()?;
        log::info!("Found Vulkan version: {}", vk_version_to_string(api_version));

        if api_version < VK_MINIMUM_API_VERSION {
            return Err(PrismNativeError::new(
                Some(PrismBackendType::Vulkan),
                "vkEnumerateInstanceVersion",
                VK_ERROR_INCOMPATIBLE_DRIVER,
                format!(
                    "Vulkan {} is required, the loader supports {}",
                    vk_version_to_string(VK_MINIMUM_API_VERSION),
                    vk_version_to_string(api_version)
                ),
            )
            .into());
        }

        let layers = native.enumerate_instance_layers().unwrap_or_else(|e| {
            log::warn!("Could not enumerate instance layers: {}", e);
            Vec::default()
        });
        log::debug!("Available Layers: {:#?}", layers);

        let extensions = native.enumerate_instance_extensions().unwrap_or_else(|e| {
            log::warn!("Could not enumerate instance extensions: {}", e);
            Vec::default()
        });
        log::debug!("Available Extensions: {:#?}", extensions);

        let has_extension = |name: &str| extensions.iter().any(|extension| extension == name);

        let mut enabled_layers = Vec::default();
        let mut enabled_extensions = Vec::default();
        let mut debug_severity = VkDebugSeverityFlags::empty();
        let mut validation_features = Vec::default();

        if validation_mode.is_enabled() {
            let validation_layers = find_best_validation_layers(&layers);
            let debug_utils_available = has_extension(DEBUG_UTILS_EXTENSION);

            if validation_layers.is_empty() {
                log::warn!("Could not find an appropriate validation layer. Check that the vulkan SDK has been installed or disable validation.");
            }

            if !debug_utils_available {
                log::warn!("Could not find the DebugUtils extension. Check that the vulkan SDK has been installed or disable validation.");
            }

            if !validation_layers.is_empty() && debug_utils_available {
                enabled_layers = validation_layers;
                enabled_extensions.push(DEBUG_UTILS_EXTENSION.to_string());
                debug_severity = debug_severity_for_mode(validation_mode);

                if validation_mode == PrismValidationMode::Gpu {
                    // The extension is provided by the validation layer itself, so it may not be
                    // listed by the loader
                    if !has_extension(VALIDATION_FEATURES_EXTENSION) {
                        log::debug!(
                            "{} not reported by the loader, requesting GPU-assisted validation anyway",
                            VALIDATION_FEATURES_EXTENSION
                        );
                    }

                    validation_features = vec![
                        VkValidationFeatureEnable::GpuAssisted,
                        VkValidationFeatureEnable::GpuAssistedReserveBindingSlot,
                        VkValidationFeatureEnable::SynchronizationValidation,
                    ];
                }
            }
        }

        log::debug!("Using layers: {:?}", enabled_layers);
        log::debug!("Using extensions: {:?}", enabled_extensions);

        let desc = VkInstanceDesc {
            application_name: application_name.to_string(),
            api_version,
            enabled_layers,
            enabled_extensions,
            debug_severity,
            validation_features,
        };

        log::info!("Creating vulkan instance");
        let native_instance = native.create_instance(&desc)?;

        Ok(PrismVkInstance {
            native_instance,
            api_version,
            validation_enabled: !desc.debug_severity.is_empty(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers(names: &[&str]) -> Vec<String> {
        names.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_khronos_layer_preferred() {
        let available = layers(&[LUNARG_STANDARD_VALIDATION_LAYER, KHRONOS_VALIDATION_LAYER]);
        assert_eq!(
            find_best_validation_layers(&available),
            vec![KHRONOS_VALIDATION_LAYER]
        );
    }

    #[test]
    fn test_validation_layer_fallback_chain() {
        let available = layers(&[LUNARG_STANDARD_VALIDATION_LAYER]);
        assert_eq!(
            find_best_validation_layers(&available),
            vec![LUNARG_STANDARD_VALIDATION_LAYER]
        );

        let available = layers(&INDIVIDUAL_VALIDATION_LAYERS);
        assert_eq!(find_best_validation_layers(&available).len(), 5);

        // Only some of the individual layers
        let available = layers(&["VK_LAYER_GOOGLE_threading", LUNARG_CORE_VALIDATION_LAYER]);
        assert_eq!(
            find_best_validation_layers(&available),
            vec![LUNARG_CORE_VALIDATION_LAYER]
        );

        assert!(find_best_validation_layers(&layers(&["VK_LAYER_MESA_overlay"])).is_empty());
    }

    #[test]
    fn test_debug_severity() {
        assert!(debug_severity_for_mode(PrismValidationMode::Disabled).is_empty());
        assert_eq!(
            debug_severity_for_mode(PrismValidationMode::Enabled),
            VkDebugSeverityFlags::ERROR | VkDebugSeverityFlags::WARNING
        );
        assert!(debug_severity_for_mode(PrismValidationMode::Verbose)
            .contains(VkDebugSeverityFlags::INFO | VkDebugSeverityFlags::VERBOSE));
    }
}
