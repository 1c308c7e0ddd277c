//! The identifier resolver: maps temporary identifiers to permanent
//! entity identifiers, one consistent binding per batch.
//!
//! A tempid appearing in entity position under a unique attribute with a
//! concrete value is an upsert candidate: if the (attribute, value) pair
//! already belongs to a committed entity the tempid resolves to that
//! entity, otherwise a fresh identifier is allocated. Resolution either
//! succeeds for every tempid in the batch or fails as a whole before any
//! datom is written.

use std::collections::HashMap;

use crate::construct::{
    Entid, EntidAllocator, EntityPlace, OtherHasher, Operation, TempId, ValuePlace,
};
use crate::error::{FactlogError, Result};
use crate::index::DatomIndex;
use crate::schema::Schema;

/// What to do when two different tempids, via different unique
/// attributes, both resolve to the same existing entity. Rejection is
/// the default; convergence treats the two tempids as aliases of that
/// entity.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum UpsertPolicy {
    #[default]
    RejectConvergence,
    AllowConvergence,
}

pub fn resolve_tempids(
    operations: &[Operation],
    schema: &Schema,
    index: &DatomIndex,
    allocator: &mut EntidAllocator,
    policy: UpsertPolicy,
) -> Result<HashMap<TempId, Entid, OtherHasher>> {
    let mut bindings: HashMap<TempId, Entid, OtherHasher> = HashMap::default();
    // existing entity -> the tempid that claimed it, for convergence detection
    let mut claimed: HashMap<Entid, TempId, OtherHasher> = HashMap::default();

    // upsert pass: assertions with a tempid entity, a unique attribute and
    // a concrete value may resolve against committed state
    for operation in operations {
        if !operation.is_assertion() {
            continue;
        }
        let EntityPlace::TempId(tempid) = operation.entity() else {
            continue;
        };
        let unique = schema
            .attribute(operation.attribute())
            .map(|a| a.unique())
            .unwrap_or(false);
        if !unique {
            continue;
        }
        let ValuePlace::Value(value) = operation.value() else {
            continue;
        };
        let Some(existing) = index.unique_match(operation.attribute(), value) else {
            continue;
        };
        if let Some(bound) = bindings.get(tempid) {
            if *bound != existing {
                return Err(FactlogError::IdentifierResolution(format!(
                    "tempid {} matches both entity {} and entity {} through unique attributes",
                    tempid, bound, existing
                )));
            }
            continue;
        }
        if let Some(owner) = claimed.get(&existing) {
            if *owner != *tempid && policy == UpsertPolicy::RejectConvergence {
                return Err(FactlogError::IdentifierResolution(format!(
                    "tempids {} and {} both upsert to entity {}",
                    owner, tempid, existing
                )));
            }
        } else {
            claimed.insert(existing, tempid.clone());
        }
        bindings.insert(tempid.clone(), existing);
    }

    // allocation pass: every tempid still unbound, in entity or value
    // position, gets a fresh identifier; repeated occurrences share it
    for operation in operations {
        if let EntityPlace::TempId(tempid) = operation.entity() {
            bindings
                .entry(tempid.clone())
                .or_insert_with(|| allocator.allocate_entity());
        }
        if let ValuePlace::TempId(tempid) = operation.value() {
            bindings
                .entry(tempid.clone())
                .or_insert_with(|| allocator.allocate_entity());
        }
    }

    Ok(bindings)
}
