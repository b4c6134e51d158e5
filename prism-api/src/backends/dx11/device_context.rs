use super::native::*;
use crate::dx11::{PrismBufferDx11, PrismTextureDx11};
use crate::internal_shared::{forward_validation_messages, PrismContextTracker, TrackedDeviceInner};
use crate::{
    PrismBackendType, PrismBufferDef, PrismDeviceInfo, PrismResult, PrismTextureDef,
    PrismValidationMessage, PrismValidationSink,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Benign messages that are dropped before reaching the validation sink
pub(crate) const DX11_DENIED_MESSAGE_IDS: [Dx11MessageId; 1] =
    [Dx11MessageId::SetPrivateDataChangingParams];

pub struct PrismDeviceContextDx11Inner {
    pub(crate) device_info: Arc<PrismDeviceInfo>,
    native_device: Box<dyn Dx11NativeDevice>,
    feature_level: Dx11FeatureLevel,
    validation_sink: Arc<dyn PrismValidationSink>,

    destroyed: AtomicBool,
    context_tracker: PrismContextTracker,
}

impl Drop for PrismDeviceContextDx11Inner {
    fn drop(&mut self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            log::trace!("destroying D3D11 device");
            if let Err(e) = self.native_device.wait_idle() {
                log::warn!("Failed to wait for D3D11 device idle before release: {}", e);
            }

            let remaining_references = self.native_device.release();
            if remaining_references > 0 {
                #[cfg(debug_assertions)]
                log::warn!(
                    "D3D11 device released with {} outstanding native references",
                    remaining_references
                );
            }
            log::trace!("destroyed D3D11 device");
        }
    }
}

impl TrackedDeviceInner for PrismDeviceContextDx11Inner {
    fn context_tracker(&self) -> &PrismContextTracker {
        &self.context_tracker
    }
}

impl PrismDeviceContextDx11Inner {
    pub(crate) fn new(
        device_info: PrismDeviceInfo,
        native_device: Box<dyn Dx11NativeDevice>,
        feature_level: Dx11FeatureLevel,
        validation_sink: Arc<dyn PrismValidationSink>,
    ) -> Self {
        PrismDeviceContextDx11Inner {
            device_info: Arc::new(device_info),
            native_device,
            feature_level,
            validation_sink,
            destroyed: AtomicBool::new(false),
            context_tracker: PrismContextTracker::default(),
        }
    }
}

/// Cloneable handle to a D3D11 device. Resources hold one of these to keep the native device
/// alive.
pub struct PrismDeviceContextDx11 {
    pub(crate) inner: Arc<PrismDeviceContextDx11Inner>,
    create_index: u64,
}

impl std::fmt::Debug for PrismDeviceContextDx11 {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        f.debug_struct("PrismDeviceContextDx11")
            .field("adapter", &self.inner.device_info.adapter_info.name)
            .field("feature_level", &self.inner.feature_level)
            .finish()
    }
}

impl Clone for PrismDeviceContextDx11 {
    fn clone(&self) -> Self {
        let create_index = self.inner.context_tracker.track_new();
        PrismDeviceContextDx11 {
            inner: self.inner.clone(),
            create_index,
        }
    }
}

impl Drop for PrismDeviceContextDx11 {
    fn drop(&mut self) {
        self.inner.context_tracker.untrack(self.create_index);
    }
}

impl PrismDeviceContextDx11 {
    pub(crate) fn new(inner: Arc<PrismDeviceContextDx11Inner>) -> Self {
        let create_index = inner.context_tracker.track_new();
        PrismDeviceContextDx11 {
            inner,
            create_index,
        }
    }

    pub fn device_info(&self) -> &Arc<PrismDeviceInfo> {
        &self.inner.device_info
    }

    pub fn feature_level(&self) -> Dx11FeatureLevel {
        self.inner.feature_level
    }

    pub fn native_device(&self) -> &dyn Dx11NativeDevice {
        &*self.inner.native_device
    }

    pub fn wait_idle(&self) -> PrismResult<()> {
        profiling::scope!("PrismDeviceContextDx11::wait_idle");
        self.inner.native_device.wait_idle()
    }

    /// Drains the D3D11 info queue into the validation sink. Returns the number of messages
    /// delivered.
    pub fn pump_validation_messages(&self) -> usize {
        let messages = self
            .inner
            .native_device
            .take_messages()
            .into_iter()
            .map(|message| {
                let message_id = match message.id {
                    Dx11MessageId::Other(id) => id.to_string(),
                    id => format!("{:?}", id),
                };
                (
                    message.id,
                    PrismValidationMessage {
                        backend: PrismBackendType::Dx11,
                        severity: message.severity,
                        message_id,
                        message: message.description,
                    },
                )
            });

        forward_validation_messages(
            messages,
            &DX11_DENIED_MESSAGE_IDS,
            &*self.inner.validation_sink,
        )
    }

    pub fn create_buffer(
        &self,
        buffer_def: &PrismBufferDef,
        initial_data: Option<&[u8]>,
    ) -> PrismResult<PrismBufferDx11> {
        let result = PrismBufferDx11::new(self, buffer_def, initial_data);
        self.pump_validation_messages();
        result
    }

    pub fn create_texture(
        &self,
        texture_def: &PrismTextureDef,
    ) -> PrismResult<PrismTextureDx11> {
        let result = PrismTextureDx11::new(self, texture_def);
        self.pump_validation_messages();
        result
    }
}
