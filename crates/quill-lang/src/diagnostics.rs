use std::cell::RefCell;
use std::fmt;

/// Where scopes and expression nodes report recoverable failures.
///
/// A handle is passed into the base scope at construction and shared down the
/// scope chain, so embedders and tests can capture what rendering degraded on
/// instead of scraping a global logger.
pub trait DiagnosticSink: fmt::Debug {
    /// A degraded rendering outcome the template author should see.
    fn error(&self, message: &str);

    /// A lenient lookup miss, only interesting when debugging a template.
    fn debug(&self, message: &str);
}

/// Forwards diagnostics to the active `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn error(&self, message: &str) {
        tracing::error!(target: "quill", "{message}");
    }

    fn debug(&self, message: &str) {
        tracing::debug!(target: "quill", "{message}");
    }
}

/// Buffers diagnostics in memory for later inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    errors: RefCell<Vec<String>>,
    debugs: RefCell<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    pub fn debugs(&self) -> Vec<String> {
        self.debugs.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty() && self.debugs.borrow().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }

    fn debug(&self, message: &str) {
        self.debugs.borrow_mut().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.error("first");
        sink.error("second");
        sink.debug("aside");

        assert_eq!(sink.errors(), vec!["first".to_string(), "second".to_string()]);
        assert_eq!(sink.debugs(), vec!["aside".to_string()]);
        assert!(!sink.is_empty());
    }
}
