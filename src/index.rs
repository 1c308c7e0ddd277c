//! The datom index: the multiply-sorted collection of all committed datoms.
//!
//! Two orders are maintained over the same underlying set. The primary
//! order is lexicographic on (e, a, v, tx) and lives in one `BTreeSet`.
//! The secondary order, lexicographic on (tx, e, a, v), falls out of a
//! per-transaction log keyed by transaction identifier. Both are restored
//! from durable storage on startup and mutated only by the transaction
//! processor's commit.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use crate::construct::{Datom, Entid, OtherHasher, Transaction, Value, TX_INSTANT};
use crate::schema::Schema;

// sentinels for entity-bounded range scans over the EAVT order
fn lower_bound(e: Entid) -> Datom {
    Datom::new(e, Entid::MIN, Value::Integer(i64::MIN), Entid::MIN, false)
}
fn upper_bound(e: Entid) -> Datom {
    Datom::new(e, Entid::MAX, Value::FulltextRef(i64::MAX), Entid::MAX, true)
}

pub struct DatomIndex {
    // canonical EAVT order
    eavt: BTreeSet<Datom>,
    // transaction log: tx -> datoms of that transaction in (e, a, v) order
    log: BTreeMap<Entid, BTreeSet<Datom>>,
    // (unique attribute, value) -> owning entity, consumed by upserts
    unique: HashMap<(Entid, Value), Entid, OtherHasher>,
}

impl DatomIndex {
    pub fn new() -> Self {
        Self {
            eavt: BTreeSet::new(),
            log: BTreeMap::new(),
            unique: HashMap::default(),
        }
    }

    /// Fold one committed transaction's datoms (or a restored batch) into
    /// the sorted orders. Only the transaction processor and the restore
    /// path call this; atomicity towards readers comes from the index
    /// lock being held across the whole call.
    pub fn commit(&mut self, datoms: &[Datom], schema: &Schema) {
        for datom in datoms {
            self.eavt.insert(datom.clone());
            self.log
                .entry(datom.tx())
                .or_default()
                .insert(datom.clone());
            let unique = schema
                .attribute(datom.a())
                .map(|a| a.unique())
                .unwrap_or(false);
            if unique {
                let key = (datom.a(), datom.v().clone());
                if datom.added() {
                    self.unique.insert(key, datom.e());
                } else if self.unique.get(&key) == Some(&datom.e()) {
                    self.unique.remove(&key);
                }
            }
        }
    }

    /// The entity currently owning (attribute, value) under a unique
    /// attribute, if any.
    pub fn unique_match(&self, a: Entid, v: &Value) -> Option<Entid> {
        self.unique.get(&(a, v.clone())).copied()
    }

    /// All datoms in (e, a, v, tx) order, optionally restricted to an
    /// inclusive entity range and optionally excluding the
    /// transaction-metadata datoms. The exclusion matches the metadata
    /// attribute by identity, never by value shape.
    pub fn scan_eavt(
        &self,
        entities: Option<(Entid, Entid)>,
        exclude_tx_metadata: bool,
    ) -> Vec<Datom> {
        let scan: Box<dyn Iterator<Item = &Datom>> = match entities {
            // an inverted range holds no entities
            Some((lo, hi)) if lo > hi => Box::new(std::iter::empty()),
            Some((lo, hi)) => Box::new(self.eavt.range(lower_bound(lo)..=upper_bound(hi))),
            None => Box::new(self.eavt.iter()),
        };
        scan.filter(|d| !(exclude_tx_metadata && d.a() == TX_INSTANT))
            .cloned()
            .collect()
    }

    /// The "current facts" view: every datom except transaction metadata.
    pub fn datoms(&self) -> Vec<Datom> {
        self.scan_eavt(None, true)
    }

    /// All datoms with transaction identifier strictly greater than `tx`,
    /// in (tx, e, a, v) order.
    pub fn datoms_after(&self, tx: Entid) -> Vec<Datom> {
        self.log
            .range((Bound::Excluded(tx), Bound::Unbounded))
            .flat_map(|(_, datoms)| datoms.iter().cloned())
            .collect()
    }

    /// Transactions strictly after `tx`, each grouping its own datoms
    /// (metadata datom included), in increasing transaction order.
    pub fn transactions_after(&self, tx: Entid) -> Vec<Transaction> {
        self.log
            .range((Bound::Excluded(tx), Bound::Unbounded))
            .map(|(tx, datoms)| Transaction::new(*tx, datoms.iter().cloned().collect()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.eavt.len()
    }
    pub fn is_empty(&self) -> bool {
        self.eavt.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::construct::{TX0, USER0};
    use crate::schema::{Cardinality, Schema, ValueType};

    fn schema_with_unique_name() -> Schema {
        let mut schema = Schema::new();
        schema
            .declare("person/name", USER0, ValueType::String, Cardinality::One, true, false)
            .expect("declare");
        schema
    }

    #[test]
    fn eavt_scan_is_sorted_and_deduplicated() {
        let schema = schema_with_unique_name();
        let mut index = DatomIndex::new();
        let d1 = Datom::new(USER0 + 1, USER0, Value::from("b"), TX0, true);
        let d2 = Datom::new(USER0 + 1, USER0, Value::from("a"), TX0 + 1, true);
        index.commit(&[d1.clone(), d2.clone(), d1.clone()], &schema);
        let scan = index.scan_eavt(None, false);
        assert_eq!(scan, vec![d2, d1]);
    }

    #[test]
    fn entity_bounds_restrict_the_scan() {
        let schema = schema_with_unique_name();
        let mut index = DatomIndex::new();
        for i in 0..5 {
            index.commit(
                &[Datom::new(USER0 + i, USER0, Value::from("x"), TX0, true)],
                &schema,
            );
        }
        let scan = index.scan_eavt(Some((USER0 + 1, USER0 + 3)), false);
        assert_eq!(scan.len(), 3);
        assert!(scan.iter().all(|d| d.e() >= USER0 + 1 && d.e() <= USER0 + 3));
    }

    #[test]
    fn an_inverted_entity_range_yields_an_empty_scan() {
        let schema = schema_with_unique_name();
        let mut index = DatomIndex::new();
        index.commit(
            &[Datom::new(USER0 + 3, USER0, Value::from("x"), TX0, true)],
            &schema,
        );
        let scan = index.scan_eavt(Some((USER0 + 5, USER0 + 1)), false);
        assert!(scan.is_empty());
    }

    #[test]
    fn history_after_the_maximum_tx_is_empty() {
        let schema = schema_with_unique_name();
        let mut index = DatomIndex::new();
        index.commit(
            &[Datom::new(USER0 + 1, USER0, Value::from("x"), TX0, true)],
            &schema,
        );
        assert!(index.datoms_after(Entid::MAX).is_empty());
        assert!(index.transactions_after(Entid::MAX).is_empty());
    }

    #[test]
    fn retraction_releases_the_unique_slot() {
        let schema = schema_with_unique_name();
        let mut index = DatomIndex::new();
        let v = Value::from("Alice");
        index.commit(&[Datom::new(USER0 + 1, USER0, v.clone(), TX0, true)], &schema);
        assert_eq!(index.unique_match(USER0, &v), Some(USER0 + 1));
        index.commit(
            &[Datom::new(USER0 + 1, USER0, v.clone(), TX0 + 1, false)],
            &schema,
        );
        assert_eq!(index.unique_match(USER0, &v), None);
    }

    #[test]
    fn log_order_is_tx_major() {
        let schema = schema_with_unique_name();
        let mut index = DatomIndex::new();
        let newer = Datom::new(USER0 + 1, USER0, Value::from("a"), TX0 + 1, true);
        let older = Datom::new(USER0 + 9, USER0, Value::from("z"), TX0, true);
        index.commit(&[newer.clone(), older.clone()], &schema);
        assert_eq!(index.datoms_after(0), vec![older.clone(), newer.clone()]);
        assert_eq!(index.datoms_after(TX0), vec![newer]);
        let transactions = index.transactions_after(0);
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].tx(), TX0);
        assert_eq!(transactions[0].datoms(), &[older]);
    }
}
