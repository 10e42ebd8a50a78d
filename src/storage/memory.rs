//! In-memory hit store.
//!
//! Useful for testing and for short-lived imports that do not need
//! persistence. Hits are visible to reads as soon as they are ingested.

use crate::Result;
use crate::io::traits::{HitBatch, HitSink, HitSource};
use crate::models::Hit;
use crate::storage::acquire_lock;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    hits: Vec<(i64, Hit)>,
}

/// In-memory hit store.
///
/// IDs are assigned in ingest order starting at 1 and never reused, also
/// after a wipe.
#[derive(Debug, Default)]
pub struct MemoryHitStore {
    inner: Mutex<Inner>,
}

impl MemoryHitStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all hits of `site_id` in ID order.
    #[must_use]
    pub fn hits(&self, site_id: i64) -> Vec<Hit> {
        acquire_lock(&self.inner)
            .hits
            .iter()
            .filter(|(_, h)| h.site_id == site_id)
            .map(|(_, h)| h.clone())
            .collect()
    }

    /// Number of hits of `site_id`.
    #[must_use]
    pub fn count(&self, site_id: i64) -> usize {
        acquire_lock(&self.inner)
            .hits
            .iter()
            .filter(|(_, h)| h.site_id == site_id)
            .count()
    }
}

impl HitSource for MemoryHitStore {
    fn list_after(&self, site_id: i64, after_id: i64, limit: usize) -> Result<HitBatch> {
        let inner = acquire_lock(&self.inner);
        let page: Vec<&(i64, Hit)> = inner
            .hits
            .iter()
            .filter(|(id, h)| h.site_id == site_id && *id > after_id)
            .take(limit)
            .collect();

        Ok(HitBatch {
            last_id: page.last().map_or(after_id, |(id, _)| *id),
            hits: page.into_iter().map(|(_, h)| h.clone()).collect(),
        })
    }
}

impl HitSink for MemoryHitStore {
    fn ingest(&self, hit: Hit) -> Result<()> {
        let mut inner = acquire_lock(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.hits.push((id, hit));
        Ok(())
    }

    fn wipe_all(&self, site_id: i64) -> Result<()> {
        acquire_lock(&self.inner)
            .hits
            .retain(|(_, h)| h.site_id != site_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_ids_are_not_reused_after_wipe() {
        let store = MemoryHitStore::new();
        store.ingest(Hit::new(1, "/a", Utc::now())).unwrap();
        store.wipe_all(1).unwrap();
        store.ingest(Hit::new(1, "/b", Utc::now())).unwrap();

        let batch = store.list_after(1, 0, 10).unwrap();
        assert_eq!(batch.last_id, 2);
        assert_eq!(store.count(1), 1);
    }

    #[test]
    fn test_list_after_filters_site() {
        let store = MemoryHitStore::new();
        store.ingest(Hit::new(1, "/a", Utc::now())).unwrap();
        store.ingest(Hit::new(2, "/b", Utc::now())).unwrap();
        store.ingest(Hit::new(1, "/c", Utc::now())).unwrap();

        let batch = store.list_after(1, 1, 10).unwrap();
        assert_eq!(batch.hits.len(), 1);
        assert_eq!(batch.hits[0].path, "/c");
        assert_eq!(batch.last_id, 3);
        assert_eq!(store.hits(2).len(), 1);
    }
}
