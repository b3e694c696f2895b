//! OS notification seam.
//!
//! The dedup layer and scheduler talk to this trait; the desktop shell
//! provides the real implementation. [`LogNotifier`] is the headless default.

#[cfg(test)]
use std::sync::Arc;

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str) -> Result<(), String>;
}

/// Writes notifications to the log instead of the OS. Used headless and as
/// the default when no shell notifier is wired in.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<(), String> {
        log::info!("notification: {} | {}", title, body);
        Ok(())
    }
}

/// Test helper that records every notification raised.
#[cfg(test)]
pub struct RecordingNotifier {
    pub sent: parking_lot::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<(), String> {
        self.sent.lock().push((title.to_string(), body.to_string()));
        Ok(())
    }
}
