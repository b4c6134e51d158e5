use crate::{PrismValidationMessage, PrismValidationSink};

/// Passes native validation messages to the sink, dropping any whose identifier is on the
/// backend's denylist. Returns the number of messages delivered.
pub(crate) fn forward_validation_messages<IdT: PartialEq>(
    messages: impl IntoIterator<Item = (IdT, PrismValidationMessage)>,
    deny_list: &[IdT],
    sink: &dyn PrismValidationSink,
) -> usize {
    let mut delivered = 0;
    for (id, message) in messages {
        if deny_list.contains(&id) {
            log::trace!("Ignoring denylisted validation message {}", message.message_id);
            continue;
        }

        sink.on_validation_message(&message);
        delivered += 1;
    }

    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PrismBackendType, PrismValidationSeverity};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<String>>);

    impl PrismValidationSink for CollectingSink {
        fn on_validation_message(
            &self,
            message: &PrismValidationMessage,
        ) {
            self.0.lock().unwrap().push(message.message_id.clone());
        }
    }

    fn message(id: &str) -> PrismValidationMessage {
        PrismValidationMessage {
            backend: PrismBackendType::Vulkan,
            severity: PrismValidationSeverity::Error,
            message_id: id.to_string(),
            message: String::new(),
        }
    }

    #[test]
    fn test_denied_messages_are_dropped() {
        let sink = CollectingSink::default();
        let delivered = forward_validation_messages(
            vec![(1, message("a")), (2, message("b")), (3, message("c"))],
            &[2],
            &sink,
        );
        assert_eq!(delivered, 2);
        assert_eq!(*sink.0.lock().unwrap(), vec!["a", "c"]);
    }
}
