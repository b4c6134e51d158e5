use crate::PrismBackendType;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrismValidationSeverity {
    Corruption,
    Error,
    Warning,
    Info,
    Message,
}

/// A message produced by a native validation layer
#[derive(Clone, Debug, PartialEq)]
pub struct PrismValidationMessage {
    pub backend: PrismBackendType,
    pub severity: PrismValidationSeverity,
    /// Native identifier of the message, i.e. "ClearRenderTargetViewMismatchingClearValue" or a
    /// vulkan VUID
    pub message_id: String,
    pub message: String,
}

/// Receives validation messages from devices. Called synchronously on the thread that pumped the
/// messages. Messages on a backend's denylist are dropped before reaching the sink.
pub trait PrismValidationSink: Send + Sync {
    fn on_validation_message(
        &self,
        message: &PrismValidationMessage,
    );
}

/// Default sink, forwards messages to the `log` crate
#[derive(Default)]
pub struct PrismLogValidationSink;

impl PrismValidationSink for PrismLogValidationSink {
    fn on_validation_message(
        &self,
        message: &PrismValidationMessage,
    ) {
        match message.severity {
            PrismValidationSeverity::Corruption | PrismValidationSeverity::Error => log::error!(
                "[{:?}] {}: {}",
                message.backend,
                message.message_id,
                message.message
            ),
            PrismValidationSeverity::Warning => log::warn!(
                "[{:?}] {}: {}",
                message.backend,
                message.message_id,
                message.message
            ),
            PrismValidationSeverity::Info => log::info!(
                "[{:?}] {}: {}",
                message.backend,
                message.message_id,
                message.message
            ),
            PrismValidationSeverity::Message => log::debug!(
                "[{:?}] {}: {}",
                message.backend,
                message.message_id,
                message.message
            ),
        }
    }
}
