//! Completion notifications.
//!
//! Both engines report their outcome through a [`CompletionNotifier`]. The
//! notification is a serializable record; delivery is up to the notifier.
//!
//! # Payload Format
//!
//! ```json
//! {
//!   "event_id": "550e8400-e29b-41d4-a716-446655440000",
//!   "kind": "import-done",
//!   "site_id": 1,
//!   "sent_at": "2024-01-15T10:30:00Z",
//!   "payload": { "rows": 3, "fault_count": 0, "faults": [] }
//! }
//! ```

mod webhook;

pub use webhook::{DEFAULT_TIMEOUT_SECS, WebhookNotifier};

use crate::io::Fault;
use crate::models::ExportJob;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

/// What a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    /// An export job finished and its artifact is verified.
    ExportDone,
    /// An import ran to the end of its artifact.
    ImportDone,
    /// An import was aborted.
    ImportError,
}

impl NotificationKind {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ExportDone => "export-done",
            Self::ImportDone => "import-done",
            Self::ImportError => "import-error",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific notification data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationPayload {
    /// The finished export job.
    Export {
        /// The job record.
        job: ExportJob,
    },
    /// Outcome of a completed import.
    Import {
        /// Rows ingested.
        rows: u64,
        /// Total rows rejected.
        fault_count: u64,
        /// Retained fault messages.
        faults: Vec<String>,
    },
    /// Why an import was aborted.
    Error {
        /// Error message.
        error: String,
    },
}

/// A completion notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique ID for idempotent delivery.
    pub event_id: Uuid,
    /// What happened.
    pub kind: NotificationKind,
    /// Site concerned.
    pub site_id: i64,
    /// When the notification was created.
    pub sent_at: DateTime<Utc>,
    /// Details.
    pub payload: NotificationPayload,
}

impl Notification {
    fn new(kind: NotificationKind, site_id: i64, payload: NotificationPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            site_id,
            sent_at: Utc::now(),
            payload,
        }
    }

    /// An export finished.
    #[must_use]
    pub fn export_done(job: &ExportJob) -> Self {
        Self::new(
            NotificationKind::ExportDone,
            job.site_id,
            NotificationPayload::Export { job: job.clone() },
        )
    }

    /// An import completed with `rows` ingested and `fault_count` rejected.
    #[must_use]
    pub fn import_done(site_id: i64, rows: u64, fault_count: u64, faults: &[Fault]) -> Self {
        Self::new(
            NotificationKind::ImportDone,
            site_id,
            NotificationPayload::Import {
                rows,
                fault_count,
                faults: faults.iter().map(ToString::to_string).collect(),
            },
        )
    }

    /// An import was aborted.
    #[must_use]
    pub fn import_error(site_id: i64, error: &crate::Error) -> Self {
        Self::new(
            NotificationKind::ImportError,
            site_id,
            NotificationPayload::Error {
                error: error.to_string(),
            },
        )
    }

    /// Serializes the notification to JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Receives completion notifications.
///
/// Notifiers own their delivery failures: they log them and never fail the
/// run that triggered them.
pub trait CompletionNotifier: Send + Sync {
    /// Delivers a notification.
    fn notify(&self, notification: &Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl CompletionNotifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        match notification.kind {
            NotificationKind::ImportError => warn!(
                kind = %notification.kind,
                site.id = notification.site_id,
                payload = %notification.to_json(),
                "completion notification"
            ),
            _ => info!(
                kind = %notification.kind,
                site.id = notification.site_id,
                payload = %notification.to_json(),
                "completion notification"
            ),
        }
    }
}
