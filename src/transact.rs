//! The transaction processor: the only writer.
//!
//! One `transact` call validates the proposed operations against the
//! attribute schema, interns fulltext values, resolves temporary
//! identifiers, materializes the final datom set together with the
//! transaction-metadata datom, and commits everything as a single atomic
//! unit. Any failure aborts before the commit and leaves the visible
//! state untouched; the caller resubmits a corrected batch if desired.
//!
//! Writers are serialized: the database's write guard is held for the
//! whole call, on every exit path.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::construct::{
    lock, Database, Datom, Entid, EntityPlace, Operation, TransactionReport, Value, ValuePlace,
    TX_INSTANT,
};
use crate::error::{FactlogError, Result};
use crate::interner::Interner;
use crate::persist::Persistor;
use crate::resolve::resolve_tempids;
use crate::schema::{Cardinality, Schema, ValueType};

impl Database {
    /// Commit a batch of assertions and retractions as one transaction.
    pub fn transact(&self, operations: Vec<Operation>) -> Result<TransactionReport> {
        transact(self, operations)
    }
}

fn attribute_name(schema: &Schema, a: Entid) -> String {
    schema
        .ident(a)
        .map(str::to_owned)
        .unwrap_or_else(|| a.to_string())
}

/// Validate every operation against the schema, coercing where the
/// original semantics allow it (an integer offered to a ref attribute
/// becomes an entity reference) and interning strings that fall under
/// the fulltext policy. Returns the checked batch.
fn check_operations(
    operations: Vec<Operation>,
    schema: &Schema,
    fulltext_threshold: usize,
    interner: &mut Interner,
    persistor: &mut Persistor,
) -> Result<Vec<Operation>> {
    let mut checked = Vec::with_capacity(operations.len());
    for operation in operations {
        let a = operation.attribute();
        let attribute = schema
            .attribute(a)
            .ok_or_else(|| FactlogError::UnknownAttribute(attribute_name(schema, a)))?;
        let value = match operation.value().clone() {
            ValuePlace::TempId(tempid) => {
                if attribute.value_type() != ValueType::Ref {
                    return Err(FactlogError::TypeMismatch {
                        attribute: attribute_name(schema, a),
                        expected: attribute.value_type().name().to_owned(),
                        value: format!("tempid {}", tempid),
                    });
                }
                ValuePlace::TempId(tempid)
            }
            ValuePlace::Value(v) => {
                // refs coerce a little; everything else matches exactly
                let v = match (attribute.value_type(), v) {
                    (ValueType::Ref, Value::Integer(i)) => Value::EntityRef(i),
                    (_, v) => v,
                };
                if !v.matches(attribute.value_type()) {
                    return Err(FactlogError::TypeMismatch {
                        attribute: attribute_name(schema, a),
                        expected: attribute.value_type().name().to_owned(),
                        value: v.to_string(),
                    });
                }
                let v = match v {
                    Value::String(s)
                        if attribute.fulltext() || s.len() >= fulltext_threshold =>
                    {
                        Value::FulltextRef(interner.intern(&s, persistor)?)
                    }
                    other => other,
                };
                ValuePlace::Value(v)
            }
        };
        checked.push(match operation {
            Operation::Assert(e, a, _) => Operation::Assert(e, a, value),
            Operation::Retract(e, a, _) => Operation::Retract(e, a, value),
        });
    }
    Ok(checked)
}

/// A cardinality-one attribute must not receive two different asserted
/// values for the same resolved entity within one batch.
fn check_cardinality(datoms: &[Datom], schema: &Schema) -> Result<()> {
    let mut asserted: HashMap<(Entid, Entid), &Value> = HashMap::new();
    for datom in datoms {
        if !datom.added() {
            continue;
        }
        let cardinality = schema
            .attribute(datom.a())
            .map(|a| a.cardinality())
            .unwrap_or(Cardinality::Many);
        if cardinality != Cardinality::One {
            continue;
        }
        match asserted.insert((datom.e(), datom.a()), datom.v()) {
            Some(previous) if *previous != *datom.v() => {
                return Err(FactlogError::CardinalityConflict {
                    entity: datom.e(),
                    attribute: attribute_name(schema, datom.a()),
                    first: previous.to_string(),
                    second: datom.v().to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

pub(crate) fn transact(db: &Database, operations: Vec<Operation>) -> Result<TransactionReport> {
    // single-writer discipline: held until this call returns
    let _writer = lock(&db.write_guard)?;
    let span = tracing::debug_span!("transact", operations = operations.len());
    let _enter = span.enter();

    let schema = lock(&db.schema)?;

    // validate and intern first; interning is content-addressed and
    // idempotent, so values interned for a batch that later fails are
    // merely pre-warmed for its resubmission
    let operations = {
        let mut interner = lock(&db.interner)?;
        let mut persistor = lock(&db.persistor)?;
        check_operations(
            operations,
            &schema,
            db.fulltext_threshold(),
            &mut interner,
            &mut persistor,
        )?
    };

    let mut allocator = lock(&db.allocator)?;
    let bindings = {
        let index = lock(&db.index)?;
        resolve_tempids(
            &operations,
            &schema,
            &index,
            &mut allocator,
            db.upsert_policy(),
        )?
    };

    // materialize the final datom set
    let tx = allocator.allocate_tx();
    let now = Utc::now();
    let micros = now.timestamp_micros();
    let mut datoms = Vec::with_capacity(operations.len() + 1);
    for operation in &operations {
        let e = match operation.entity() {
            EntityPlace::Entid(e) => *e,
            EntityPlace::TempId(t) => bindings[t],
        };
        let v = match operation.value() {
            ValuePlace::Value(v) => v.clone(),
            ValuePlace::TempId(t) => Value::EntityRef(bindings[t]),
        };
        datoms.push(Datom::new(
            e,
            operation.attribute(),
            v,
            tx,
            operation.is_assertion(),
        ));
    }
    check_cardinality(&datoms, &schema)?;
    datoms.push(Datom::new(tx, TX_INSTANT, Value::Integer(micros), tx, true));
    // duplicate full tuples collapse before the atomic write
    let datoms: Vec<Datom> = datoms.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

    // commit: durable first, then visible to readers
    lock(&db.persistor)?.commit_transaction(tx, &datoms)?;
    lock(&db.index)?.commit(&datoms, &schema);
    tracing::info!(tx, datoms = datoms.len(), "committed transaction");

    let instant = DateTime::from_timestamp_micros(micros).unwrap_or(now);
    Ok(TransactionReport::new(tx, instant, bindings))
}
