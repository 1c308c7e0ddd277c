//! The value interner: content-addressed deduplication of large or
//! fulltext-indexed strings into a rowid-keyed value table.
//!
//! The durable table is unique-constrained on content, so interning the
//! same string twice (even from two in-flight calls) lands on the same
//! rowid; "already exists" is success. Values are retained for the life
//! of the store, mirroring the append-only log: there is no eviction.

use bimap::BiMap;

use crate::error::Result;
use crate::persist::Persistor;

pub struct Interner {
    // one-to-one mapping between interned strings and their rowids
    kept: BiMap<String, i64>,
}

impl Interner {
    pub fn new() -> Self {
        Self { kept: BiMap::new() }
    }

    // repopulates the cache from durable storage on startup
    pub(crate) fn restore(&mut self, rowid: i64, text: String) {
        self.kept.insert(text, rowid);
    }

    /// Intern `text`, returning its stable handle. Idempotent: the same
    /// string always yields the same rowid.
    pub fn intern(&mut self, text: &str, persistor: &mut Persistor) -> Result<i64> {
        if let Some(rowid) = self.kept.get_by_left(text) {
            return Ok(*rowid);
        }
        let rowid = persistor.persist_fulltext(text)?;
        self.kept.insert(text.to_owned(), rowid);
        Ok(rowid)
    }

    /// The inverse of [`Interner::intern`], total over all handles ever
    /// issued by this store.
    pub fn resolve(&self, handle: i64) -> Option<&str> {
        self.kept.get_by_right(&handle).map(String::as_str)
    }

    /// Every interned value as (rowid, string), ordered by rowid.
    pub fn values(&self) -> Vec<(i64, String)> {
        let mut values: Vec<(i64, String)> = self
            .kept
            .iter()
            .map(|(text, rowid)| (*rowid, text.clone()))
            .collect();
        values.sort_unstable_by_key(|(rowid, _)| *rowid);
        values
    }

    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}
