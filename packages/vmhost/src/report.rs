//! User-facing status reporting.
//!
//! Failures that the user should see (runtime missing, launch failed,
//! conflicting class path) are dispatched through a [`Reporter`] in addition
//! to being logged. Hosts plug in whatever surface they have: a status bar,
//! a dialog, or stderr.

use std::sync::Mutex;

/// A status notification for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    /// Human-readable text.
    pub text: String,
    /// Whether this is an error rather than progress information.
    pub is_error: bool,
}

impl StatusMessage {
    /// An error notification.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    /// An informational notification.
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }
}

/// Receives status notifications.
pub trait Reporter: Send + Sync {
    /// Deliver a notification.
    fn dispatch(&self, message: StatusMessage);
}

/// Reporter that only forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn dispatch(&self, message: StatusMessage) {
        if message.is_error {
            tracing::error!(status = %message.text, "status");
        } else {
            tracing::info!(status = %message.text, "status");
        }
    }
}

/// Reporter that keeps every notification for later display.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    messages: Mutex<Vec<StatusMessage>>,
}

impl CollectingReporter {
    /// Create an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything dispatched so far.
    pub fn messages(&self) -> Vec<StatusMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Remove and return everything dispatched so far.
    pub fn take(&self) -> Vec<StatusMessage> {
        std::mem::take(
            &mut *self
                .messages
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl Reporter for CollectingReporter {
    fn dispatch(&self, message: StatusMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
    }
}
