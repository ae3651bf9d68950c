//! Editor loop tuning knobs.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one peer's editor loop.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// End-of-tick sleep between polls of the document and registry.
    pub poll_interval: Duration,
    /// Merge once this many local updates are buffered (or any remote
    /// update arrives, whichever comes first).
    pub merge_threshold: usize,
    /// Broadcast once this many local operations are queued.
    pub broadcast_threshold: usize,
    /// Listener sleep when its mailbox is empty.
    pub listener_idle_backoff: Duration,
    /// Listener sleep after a receive error.
    pub listener_error_backoff: Duration,
    /// Pause after a merge write so editors settle before re-polling.
    pub merge_settle: Duration,
    /// Document path override; defaults to `<user_id>_doc.txt`.
    pub doc_path: Option<PathBuf>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            merge_threshold: 5,
            broadcast_threshold: 5,
            listener_idle_backoff: Duration::from_millis(50),
            listener_error_backoff: Duration::from_millis(100),
            merge_settle: Duration::from_millis(200),
            doc_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let cfg = EditorConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert_eq!(cfg.merge_threshold, 5);
        assert_eq!(cfg.broadcast_threshold, 5);
        assert_eq!(cfg.listener_idle_backoff, Duration::from_millis(50));
        assert_eq!(cfg.listener_error_backoff, Duration::from_millis(100));
        assert!(cfg.doc_path.is_none());
    }
}
