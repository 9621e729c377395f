use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::model::Dataset;
use crate::source::{Freshness, SourceDescriptor};

struct CacheEntry {
    freshness: Freshness,
    dataset: Arc<Dataset>,
}

/// Outcome of a cache lookup.
#[derive(Clone)]
pub enum CacheLookup {
    /// The source has not changed since it was last read.
    Hit(Arc<Dataset>),
    /// The source was (re)read.
    Loaded(Arc<Dataset>),
}

impl CacheLookup {
    pub fn dataset(&self) -> &Arc<Dataset> {
        match self {
            CacheLookup::Hit(d) | CacheLookup::Loaded(d) => d,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

/// Loaded datasets keyed by source descriptor and freshness stamp.
///
/// The cache is an ordinary value owned by whoever drives refreshes; nothing
/// about it is process-global.
#[derive(Default)]
pub struct SnapshotCache {
    entries: HashMap<SourceDescriptor, CacheEntry>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached dataset if the source is unchanged, otherwise load it.
    ///
    /// A failed load leaves any previous entry untouched.
    pub fn load(&mut self, source: &SourceDescriptor) -> Result<CacheLookup> {
        let adapter = source.adapter();
        let freshness = adapter.freshness()?;

        if let Some(entry) = self.entries.get(source) {
            if entry.freshness == freshness {
                debug!("cache hit for {}", adapter.describe());
                return Ok(CacheLookup::Hit(Arc::clone(&entry.dataset)));
            }
        }

        debug!("reading {}", adapter.describe());
        let dataset = Arc::new(adapter.load()?);
        self.entries.insert(
            source.clone(),
            CacheEntry {
                freshness,
                dataset: Arc::clone(&dataset),
            },
        );
        Ok(CacheLookup::Loaded(dataset))
    }

    /// Drop the entry for `source` so the next load rereads it.
    pub fn invalidate(&mut self, source: &SourceDescriptor) -> bool {
        self.entries.remove(source).is_some()
    }

    pub fn contains(&self, source: &SourceDescriptor) -> bool {
        self.entries.contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
