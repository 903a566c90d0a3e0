//! Progress reporting for cache operations

use std::sync::Mutex;

/// Receives progress updates from long running cache operations
pub trait ProgressReporter: Send + Sync {
    /// A new phase begins
    fn start(&self, message: &str);

    /// Update the current phase
    fn message(&self, message: &str);

    /// The current phase ended
    fn stop(&self, message: &str);

    /// Bytes transferred so far; `total` is known when the server sent a length
    fn bytes(&self, transferred: u64, total: Option<u64>) {
        let _ = (transferred, total);
    }
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn start(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn message(&self, message: &str) {
        tracing::debug!("{}", message);
    }

    fn stop(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn bytes(&self, transferred: u64, total: Option<u64>) {
        tracing::trace!(transferred, total, "transfer progress");
    }
}

/// A recorded progress update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Start(String),
    Message(String),
    Stop(String),
    Bytes { transferred: u64, total: Option<u64> },
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.lock().clone()
    }

    /// Messages of start, message and stop events, in order
    pub fn messages(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Start(m) | ProgressEvent::Message(m) | ProgressEvent::Stop(m) => {
                    Some(m.clone())
                }
                ProgressEvent::Bytes { .. } => None,
            })
            .collect()
    }

    fn push(&self, event: ProgressEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ProgressEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProgressReporter for CollectingProgress {
    fn start(&self, message: &str) {
        self.push(ProgressEvent::Start(message.to_string()));
    }

    fn message(&self, message: &str) {
        self.push(ProgressEvent::Message(message.to_string()));
    }

    fn stop(&self, message: &str) {
        self.push(ProgressEvent::Stop(message.to_string()));
    }

    fn bytes(&self, transferred: u64, total: Option<u64>) {
        self.push(ProgressEvent::Bytes { transferred, total });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_progress() {
        let progress = CollectingProgress::new();
        progress.start("Downloading");
        progress.bytes(10, Some(20));
        progress.stop("Done");

        assert_eq!(
            progress.events(),
            vec![
                ProgressEvent::Start("Downloading".into()),
                ProgressEvent::Bytes {
                    transferred: 10,
                    total: Some(20)
                },
                ProgressEvent::Stop("Done".into()),
            ]
        );
        assert_eq!(progress.messages(), vec!["Downloading", "Done"]);
    }
}
