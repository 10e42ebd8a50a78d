//! Hit import service.
//!
//! Rebuilds hits from an export artifact and feeds them to a [`HitSink`].
//!
//! Rows that cannot be decoded are skipped and collected in a bounded
//! [`FaultGroup`]; only an unreadable stream, a header with another schema
//! version, a failed wipe or a failing sink abort the import.

use crate::Result;
use crate::io::artifact::ArtifactReader;
use crate::io::faults::{DEFAULT_FAULT_CAPACITY, Fault, FaultGroup};
use crate::io::throttle::Throttle;
use crate::io::traits::HitSink;
use crate::models::SessionRef;
use crate::notify::{CompletionNotifier, Notification};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Default number of rows between pauses in production mode.
pub const DEFAULT_PAUSE_EVERY: u64 = 5000;

/// Default pause length in production mode.
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(10);

/// Default wait before the completion notification.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);

/// Options for hit import.
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Pacing of ingested rows.
    pub throttle: Throttle,
    /// Wait before notifying completion, giving downstream aggregation time
    /// to catch up with the ingested rows. A heuristic, not a guarantee.
    pub settle_delay: Duration,
    /// Number of faults kept in detail.
    pub fault_capacity: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            throttle: Throttle::disabled(),
            settle_delay: Duration::ZERO,
            fault_capacity: DEFAULT_FAULT_CAPACITY,
        }
    }
}

impl ImportOptions {
    /// Sets the throttle.
    #[must_use]
    pub const fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    /// Sets the settle delay.
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the fault capacity.
    #[must_use]
    pub const fn with_fault_capacity(mut self, capacity: usize) -> Self {
        self.fault_capacity = capacity;
        self
    }
}

/// Where imported hits go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportTarget {
    /// Site receiving the hits.
    pub site_id: i64,
}

impl ImportTarget {
    /// Targets `site_id`.
    #[must_use]
    pub const fn new(site_id: i64) -> Self {
        Self { site_id }
    }
}

/// Outcome of a completed import.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    /// Site that received the hits.
    pub site_id: i64,
    /// Rows ingested.
    pub imported: u64,
    /// Total rows rejected.
    pub fault_count: u64,
    /// Rejected rows kept in detail.
    #[serde(serialize_with = "serialize_faults")]
    pub faults: Vec<Fault>,
    /// Whether existing hits were wiped first.
    pub replaced: bool,
    /// Distinct sessions minted.
    pub sessions: usize,
}

fn serialize_faults<S: serde::Serializer>(
    faults: &[Fault],
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_seq(faults.iter().map(ToString::to_string))
}

impl ImportSummary {
    /// Returns whether any row was rejected.
    #[must_use]
    pub const fn has_faults(&self) -> bool {
        self.fault_count > 0
    }

    /// Returns the retained faults as messages.
    #[must_use]
    pub fn fault_messages(&self) -> Vec<String> {
        self.faults.iter().map(ToString::to_string).collect()
    }
}

/// Session identities minted for one import run.
///
/// Every distinct token in the artifact gets one fresh identity; identities
/// are never shared across runs.
#[derive(Debug, Default)]
pub struct SessionRemap {
    sessions: HashMap<String, Uuid>,
}

impl SessionRemap {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identity for `token`, minting one on first use.
    pub fn resolve(&mut self, token: &str, mint: impl FnOnce() -> Uuid) -> Uuid {
        if let Some(id) = self.sessions.get(token) {
            return *id;
        }
        let id = mint();
        self.sessions.insert(token.to_string(), id);
        id
    }

    /// Number of distinct tokens seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns whether no token was seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Service for importing hits from an artifact.
pub struct ImportService {
    sink: Arc<dyn HitSink>,
    notifier: Option<Arc<dyn CompletionNotifier>>,
    options: ImportOptions,
}

impl ImportService {
    /// Creates a new import service.
    #[must_use]
    pub fn new(sink: Arc<dyn HitSink>) -> Self {
        Self {
            sink,
            notifier: None,
            options: ImportOptions::default(),
        }
    }

    /// Sets the notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sets the import options.
    #[must_use]
    pub const fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    /// Imports the artifact read from `source` into `target`.
    ///
    /// With `replace`, all existing hits of the site are deleted first. With
    /// `notify`, the notifier is told about the outcome after the settle
    /// delay. Aborted imports are always reported to the notifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact cannot be read, its header carries
    /// another schema version, the wipe fails, or the sink rejects a hit.
    /// Hits ingested before the error are flushed to the sink and kept.
    #[instrument(skip(self, source), fields(site.id = target.site_id))]
    pub fn run<R: Read>(
        &self,
        target: &ImportTarget,
        source: R,
        replace: bool,
        notify: bool,
    ) -> Result<ImportSummary> {
        info!(replace, "import started");

        let summary = match self.ingest_all(target, source, replace) {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "import failed");
                metrics::counter!("import_runs_total", "status" => "failed").increment(1);
                if let Some(notifier) = &self.notifier {
                    notifier.notify(&Notification::import_error(target.site_id, &e));
                }
                return Err(e);
            },
        };

        metrics::counter!("import_runs_total", "status" => "success").increment(1);
        if summary.has_faults() {
            warn!(
                rows = summary.imported,
                faults = summary.fault_count,
                first = %summary.fault_messages().first().map_or("", String::as_str),
                "import finished with rejected rows"
            );
        } else {
            info!(rows = summary.imported, "import finished");
        }

        if notify {
            if let Some(notifier) = &self.notifier {
                if !self.options.settle_delay.is_zero() {
                    thread::sleep(self.options.settle_delay);
                }
                notifier.notify(&Notification::import_done(
                    summary.site_id,
                    summary.imported,
                    summary.fault_count,
                    &summary.faults,
                ));
            }
        }
        Ok(summary)
    }

    fn ingest_all<R: Read>(
        &self,
        target: &ImportTarget,
        source: R,
        replace: bool,
    ) -> Result<ImportSummary> {
        let mut reader = ArtifactReader::new(source);
        reader.read_header()?;

        if replace {
            self.sink.wipe_all(target.site_id)?;
            info!("existing hits wiped");
        }

        let mut faults = FaultGroup::new(self.options.fault_capacity);
        let mut sessions = SessionRemap::new();
        let mut imported: u64 = 0;

        let ingested = self.ingest_rows(
            target,
            &mut reader,
            &mut faults,
            &mut sessions,
            &mut imported,
        );
        if let Err(e) = ingested {
            if let Err(flush) = self.sink.flush() {
                warn!(error = %flush, "failed to flush hits ingested before the error");
            }
            return Err(e);
        }
        self.sink.flush()?;

        metrics::counter!("import_faults_total").increment(faults.count());
        Ok(ImportSummary {
            site_id: target.site_id,
            imported,
            fault_count: faults.count(),
            faults: faults.drain(),
            replaced: replace,
            sessions: sessions.len(),
        })
    }

    /// Decodes and ingests rows until the artifact ends.
    fn ingest_rows<R: Read>(
        &self,
        target: &ImportTarget,
        reader: &mut ArtifactReader<R>,
        faults: &mut FaultGroup<Fault>,
        sessions: &mut SessionRemap,
        imported: &mut u64,
    ) -> Result<()> {
        while let Some(read) = reader.next_row()? {
            let decoded = read.row.and_then(|row| {
                let hit = row.to_hit(target.site_id)?;
                Ok((row, hit))
            });
            let Some((row, mut hit)) = faults.capture(read.line, decoded) else {
                continue;
            };

            let session = sessions.resolve(row.session_token(), || self.sink.session_id());
            hit.session = SessionRef::Canonical(session);
            self.sink.ingest(hit)?;

            *imported += 1;
            metrics::counter!("import_rows_total").increment(1);
            self.options.throttle.tick(*imported);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_remap_reuses_within_run() {
        let mut remap = SessionRemap::new();
        let a = remap.resolve("x", Uuid::new_v4);
        let b = remap.resolve("x", || unreachable!("token already mapped"));
        let c = remap.resolve("y", Uuid::new_v4);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(remap.len(), 2);
    }

    #[test]
    fn test_session_remap_fresh_per_run() {
        let mut first = SessionRemap::new();
        let mut second = SessionRemap::new();
        assert_ne!(
            first.resolve("42", Uuid::new_v4),
            second.resolve("42", Uuid::new_v4)
        );
    }

    #[test]
    fn test_default_options() {
        let options = ImportOptions::default();
        assert!(!options.throttle.is_enabled());
        assert_eq!(options.fault_capacity, 50);
    }
}
