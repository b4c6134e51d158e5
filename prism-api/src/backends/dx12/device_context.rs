use super::native::*;
use crate::dx12::{PrismBufferDx12, PrismTextureDx12};
use crate::internal_shared::{forward_validation_messages, PrismContextTracker, TrackedDeviceInner};
use crate::{
    PrismBackendType, PrismBufferDef, PrismDeviceInfo, PrismResult, PrismTextureDef,
    PrismValidationMessage, PrismValidationSink,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Messages that are expected during normal operation and are never forwarded
pub(crate) const DX12_DENIED_MESSAGE_IDS: [Dx12MessageId; 6] = [
    Dx12MessageId::ClearRenderTargetViewMismatchingClearValue,
    Dx12MessageId::ClearDepthStencilViewMismatchingClearValue,
    Dx12MessageId::MapInvalidNullRange,
    Dx12MessageId::UnmapInvalidNullRange,
    Dx12MessageId::ExecuteCommandListsWrongSwapChainBufferReference,
    Dx12MessageId::ResourceBarrierMismatchingCommandListType,
];

pub(crate) const DX12_BREAK_ON_MESSAGE_IDS: [Dx12MessageId; 1] =
    [Dx12MessageId::DeviceRemovalProcessAtFault];

pub struct PrismDeviceContextDx12Inner {
    pub(crate) device_info: Arc<PrismDeviceInfo>,
    native_device: Box<dyn Dx12NativeDevice>,
    feature_level: Dx12FeatureLevel,
    validation_sink: Arc<dyn PrismValidationSink>,

    destroyed: AtomicBool,
    context_tracker: PrismContextTracker,
}

impl Drop for PrismDeviceContextDx12Inner {
    fn drop(&mut self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            log::trace!("destroying D3D12 device");
            if let Err(e) = self.native_device.wait_idle() {
                log::warn!("Failed to wait for D3D12 device idle before release: {}", e);
            }

            let remaining_references = self.native_device.release();
            if remaining_references > 0 {
                log::warn!(
                    "D3D12 device released with {} outstanding native references",
                    remaining_references
                );
            }
            log::trace!("destroyed D3D12 device");
        }
    }
}

impl TrackedDeviceInner for PrismDeviceContextDx12Inner {
    fn context_tracker(&self) -> &PrismContextTracker {
        &self.context_tracker
    }
}

impl PrismDeviceContextDx12Inner {
    pub(crate) fn new(
        device_info: PrismDeviceInfo,
        native_device: Box<dyn Dx12NativeDevice>,
        feature_level: Dx12FeatureLevel,
        validation_sink: Arc<dyn PrismValidationSink>,
    ) -> Self {
        PrismDeviceContextDx12Inner {
            device_info: Arc::new(device_info),
            native_device,
            feature_level,
            validation_sink,
            destroyed: AtomicBool::new(false),
            context_tracker: PrismContextTracker::default(),
        }
    }
}

pub struct PrismDeviceContextDx12 {
    pub(crate) inner: Arc<PrismDeviceContextDx12Inner>,
    create_index: u64,
}

impl std::fmt::Debug for PrismDeviceContextDx12 {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        f.debug_struct("PrismDeviceContextDx12")
            .field("adapter", &self.inner.device_info.adapter_info.name)
            .field("feature_level", &self.inner.feature_level)
            .finish()
    }
}

impl Clone for PrismDeviceContextDx12 {
    fn clone(&self) -> Self {
        let create_index = self.inner.context_tracker.track_new();
        PrismDeviceContextDx12 {
            inner: self.inner.clone(),
            create_index,
        }
    }
}

impl Drop for PrismDeviceContextDx12 {
    fn drop(&mut self) {
        self.inner.context_tracker.untrack(self.create_index);
    }
}

impl PrismDeviceContextDx12 {
    pub(crate) fn new(inner: Arc<PrismDeviceContextDx12Inner>) -> Self {
        let create_index = inner.context_tracker.track_new();
        PrismDeviceContextDx12 {
            inner,
            create_index,
        }
    }

    pub fn device_info(&self) -> &Arc<PrismDeviceInfo> {
        &self.inner.device_info
    }

    pub fn feature_level(&self) -> Dx12FeatureLevel {
        self.inner.feature_level
    }

    pub fn native_device(&self) -> &dyn Dx12NativeDevice {
        &*self.inner.native_device
    }

    pub fn wait_idle(&self) -> PrismResult<()> {
        profiling::scope!("PrismDeviceContextDx12::wait_idle");
        self.inner.native_device.wait_idle()
    }

    pub fn pump_validation_messages(&self) -> usize {
        let messages = self
            .inner
            .native_device
            .take_messages()
            .into_iter()
            .map(|message| {
                let message_id = match message.id {
                    Dx12MessageId::Other(id) => id.to_string(),
                    id => format!("{:?}", id),
                };
                (
                    message.id,
                    PrismValidationMessage {
                        backend: PrismBackendType::Dx12,
                        severity: message.severity,
                        message_id,
                        message: message.description,
                    },
                )
            });

        forward_validation_messages(
            messages,
            &DX12_DENIED_MESSAGE_IDS,
            &*self.inner.validation_sink,
        )
    }

    pub fn create_buffer(
        &self,
        buffer_def: &PrismBufferDef,
        initial_data: Option<&[u8]>,
    ) -> PrismResult<PrismBufferDx12> {
        let result = PrismBufferDx12::new(self, buffer_def, initial_data);
        self.pump_validation_messages();
        result
    }

    pub fn create_texture(
        &self,
        texture_def: &PrismTextureDef,
    ) -> PrismResult<PrismTextureDx12> {
        let result = PrismTextureDx12::new(self, texture_def);
        self.pump_validation_messages();
        result
    }
}
