// thumbgate/src/core/classify.rs
use super::ThumbnailError;
use crate::backend::{BackendError, UNKNOWN_FORMAT_SUFFIX};
use std::sync::Mutex;

/// Receives backend errors the classifier could not place, before they reach
/// the caller as [`ThumbnailError::Generic`].
pub trait DiagnosticsSink: Send + Sync {
    fn capture(&self, error: &BackendError);
}

/// Default sink: an error-level log line.
#[derive(Debug, Default)]
pub struct LogDiagnostics;

impl DiagnosticsSink for LogDiagnostics {
    fn capture(&self, error: &BackendError) {
        log::error!("unclassified image error: {}", error);
    }
}

/// Keeps captured messages in memory.
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    captured: Mutex<Vec<String>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured(&self) -> Vec<String> {
        self.captured
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl DiagnosticsSink for MemoryDiagnostics {
    fn capture(&self, error: &BackendError) {
        if let Ok(mut captured) = self.captured.lock() {
            captured.push(error.to_string());
        }
    }
}

pub fn is_unknown_format(message: &str) -> bool {
    message.trim().ends_with(UNKNOWN_FORMAT_SUFFIX)
}

/// Maps a backend error into the caller-facing taxonomy.
pub fn classify(error: BackendError, sink: &dyn DiagnosticsSink) -> ThumbnailError {
    let message = error.to_string();
    if is_unknown_format(&message) {
        return ThumbnailError::UnsupportedFormat;
    }
    if let BackendError::Io(io) = &error {
        if io.kind() == std::io::ErrorKind::NotFound {
            return ThumbnailError::NotFound;
        }
    }
    sink.capture(&error);
    ThumbnailError::generic(message.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GENERIC_STATUS;

    #[test]
    fn unknown_format_message() {
        let sink = MemoryDiagnostics::new();
        let err = classify(
            BackendError::Load("buffer is not in a known format ".to_string()),
            &sink,
        );
        assert!(matches!(err, ThumbnailError::UnsupportedFormat));
        assert!(sink.captured().is_empty());
    }

    #[test]
    fn missing_file_is_not_found() {
        let sink = MemoryDiagnostics::new();
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            classify(BackendError::Io(io), &sink),
            ThumbnailError::NotFound
        ));
    }

    #[test]
    fn other_errors_are_reported_then_wrapped() {
        let sink = MemoryDiagnostics::new();
        let err = classify(BackendError::Operation("  extract_area: bad extract area ".to_string()), &sink);
        match err {
            ThumbnailError::Generic { message, status } => {
                assert_eq!(message, "extract_area: bad extract area");
                assert_eq!(status, GENERIC_STATUS);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(sink.captured().len(), 1);
    }
}
