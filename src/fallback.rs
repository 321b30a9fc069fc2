use std::sync::Arc;

/// Best-effort diagnostic output for the pipeline's own trouble reports.
///
/// This is deliberately not a sink: messages about failed deliveries or a
/// broken backup file must never travel through the pipeline that is failing,
/// so the default implementation is a bare stderr write.
pub trait FallbackChannel: Send + Sync {
    fn report(&self, message: &str);
}

impl<T: FallbackChannel + ?Sized> FallbackChannel for Arc<T> {
    fn report(&self, message: &str) {
        (**self).report(message);
    }
}

/// Default fallback channel: one line per message on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrFallback;

impl FallbackChannel for StderrFallback {
    fn report(&self, message: &str) {
        eprintln!("loki-relay: {message}");
    }
}

/// Collects messages in memory; used by tests and embedders that want to
/// inspect what the pipeline complained about.
#[derive(Debug, Default)]
pub struct MemoryFallback {
    messages: parking_lot::Mutex<Vec<String>>,
}

impl MemoryFallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl FallbackChannel for MemoryFallback {
    fn report(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fallback_collects_in_order() {
        let fallback = MemoryFallback::new();
        fallback.report("first");
        fallback.report("second");
        assert_eq!(fallback.messages(), vec!["first", "second"]);
    }
}
