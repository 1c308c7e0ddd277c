//! Read-only views over the datom index.
//!
//! Nothing in this module mutates the store. The views are snapshots
//! taken under the index lock, so a reader sees either the state before
//! a commit or the state after it, never an interleaving.

use std::collections::HashMap;
use std::fmt;

use rusqlite::types::ToSql;

use crate::construct::{
    lock, Database, Datom, Entid, OtherHasher, TempId, Transaction, TransactionReport,
};
use crate::error::Result;

/// A numeric identifier converted back to its symbolic ident when the
/// schema carries a reverse mapping, and left numeric otherwise.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum IdentOrEntid {
    Ident(String),
    Entid(Entid),
}
impl fmt::Display for IdentOrEntid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IdentOrEntid::Ident(ident) => write!(f, ":{}", ident),
            IdentOrEntid::Entid(entid) => write!(f, "{}", entid),
        }
    }
}

/// A snapshot of datoms in (e, a, v, tx) order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Datoms(pub Vec<Datom>);
impl Datoms {
    pub fn iter(&self) -> std::slice::Iter<'_, Datom> {
        self.0.iter()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl fmt::Display for Datoms {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for datom in &self.0 {
            writeln!(f, "{}", datom)?;
        }
        Ok(())
    }
}

/// A snapshot of whole transactions in increasing transaction order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transactions(pub Vec<Transaction>);
impl Transactions {
    pub fn iter(&self) -> std::slice::Iter<'_, Transaction> {
        self.0.iter()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl fmt::Display for Transactions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for transaction in &self.0 {
            write!(f, "{}", transaction)?;
        }
        Ok(())
    }
}

/// The interned fulltext values, ordered by rowid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FulltextValues(pub Vec<(i64, String)>);
impl fmt::Display for FulltextValues {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (rowid, text) in &self.0 {
            writeln!(f, "{}\t{}", rowid, text)?;
        }
        Ok(())
    }
}

/// The resolver's output for a given report, for client consumption.
pub fn tempids(report: &TransactionReport) -> &HashMap<TempId, Entid, OtherHasher> {
    report.tempids()
}

impl Database {
    /// The set of datoms in the store, ordered by (e, a, v, tx), but not
    /// including any transaction-metadata datoms. The exclusion matches
    /// the metadata attribute by identity: a user datom whose value
    /// happens to equal some transaction instant stays in.
    pub fn datoms(&self) -> Result<Datoms> {
        Ok(Datoms(lock(&self.index)?.datoms()))
    }

    /// Every datom, metadata included, ordered by (e, a, v, tx),
    /// optionally restricted to an inclusive entity range.
    pub fn scan_eavt(&self, entities: Option<(Entid, Entid)>) -> Result<Datoms> {
        Ok(Datoms(lock(&self.index)?.scan_eavt(entities, false)))
    }

    /// Datoms with transaction identifier strictly greater than `tx`,
    /// ordered by (tx, e, a, v).
    pub fn datoms_after(&self, tx: Entid) -> Result<Datoms> {
        Ok(Datoms(lock(&self.index)?.datoms_after(tx)))
    }

    /// Transactions strictly after `tx`, each grouping its datoms,
    /// ordered by (tx, e, a, v).
    pub fn transactions_after(&self, tx: Entid) -> Result<Transactions> {
        Ok(Transactions(lock(&self.index)?.transactions_after(tx)))
    }

    /// The fulltext values in the store, ordered by rowid.
    pub fn fulltext_values(&self) -> Result<FulltextValues> {
        Ok(FulltextValues(lock(&self.interner)?.values()))
    }

    /// Resolve a fulltext handle back to its string, when the handle was
    /// issued by this store.
    pub fn resolve_fulltext(&self, handle: i64) -> Result<Option<String>> {
        Ok(lock(&self.interner)?.resolve(handle).map(str::to_owned))
    }

    /// Convert a numeric identifier to a symbolic ident if possible,
    /// otherwise hand the number back.
    pub fn to_entid(&self, entid: Entid) -> Result<IdentOrEntid> {
        Ok(match lock(&self.schema)?.ident(entid) {
            Some(ident) => IdentOrEntid::Ident(ident.to_owned()),
            None => IdentOrEntid::Entid(entid),
        })
    }

    /// Pass a read-only query straight to the storage driver and render
    /// the rows as tab-and-newline separated text. Debug surface; never
    /// goes through the transaction processor.
    pub fn dump_query(&self, sql: &str, params: &[&dyn ToSql]) -> Result<String> {
        lock(&self.persistor)?.dump_query(sql, params)
    }
}
