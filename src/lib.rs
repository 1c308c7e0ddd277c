//! Factlog – a persistent, transaction-log-backed datom store.
//!
//! Factlog records immutable facts as *datoms*: quads of
//! `(entity, attribute, value, transaction)` plus an added flag, where:
//! * An [`construct::Entid`] is an opaque 64-bit entity identifier.
//! * A [`construct::Value`] is a closed tagged union (integer, float,
//!   string, boolean, entity reference, fulltext reference).
//! * A [`construct::Datom`] couples an entity, an attribute, a value and
//!   the transaction that asserted (or retracted) it.
//! * A [`construct::TempId`] is a client-local placeholder that resolves
//!   to a permanent identifier during one transaction.
//!
//! Clients submit batches of assertions and retractions; the transaction
//! processor resolves temporary identifiers (upserting through unique
//! attributes where possible), assigns a monotonically increasing
//! transaction identifier, synthesizes a transaction-metadata datom
//! carrying the wall-clock instant, and commits the whole batch
//! atomically. The accumulated history is kept in two canonical sort
//! orders, (e, a, v, tx) and (tx, e, a, v), and is never mutated:
//! retraction is itself a new datom.
//!
//! ## Modules
//! * [`construct`] – Fundamental constructs (entids, values, datoms,
//!   tempids, operations) and the [`construct::Database`] wiring.
//! * [`schema`] – The attribute-metadata and ident cache: value types,
//!   cardinality, uniqueness, fulltext flags.
//! * [`transact`] – The transaction processor, the store's only writer.
//! * [`resolve`] – Temporary-identifier resolution and upserts.
//! * [`index`] – The multiply-sorted datom index.
//! * [`interner`] – Content-addressed interning of fulltext values.
//! * [`reader`] – Read-only history views (datoms, transactions,
//!   fulltext values, ident lookups, debug queries).
//! * [`persist`] – SQLite persistence, restoration and the
//!   tamper-evident ledger.
//! * [`settings`] – Configuration (file + environment).
//!
//! ## Persistence
//! The [`persist::Persistor`] encapsulates SQLite schema creation and
//! durable storage for datoms, idents, attributes and fulltext values.
//! [`construct::Database`] wires a persistor together with the in-memory
//! index and restores prior state on startup; every commit is one SQLite
//! transaction, so readers see either the pre-commit or the fully
//! post-commit state.
//!
//! ## Quick Start
//! ```
//! use factlog::construct::{Database, Operation, Value};
//! use factlog::persist::PersistenceMode;
//! use factlog::schema::{Cardinality, ValueType};
//!
//! let db = Database::new(PersistenceMode::InMemory).unwrap();
//! let name = db
//!     .define_attribute("person/name", ValueType::String, Cardinality::One, true, false)
//!     .unwrap();
//! let report = db
//!     .transact(vec![Operation::assert("alice", name, Value::from("Alice"))])
//!     .unwrap();
//! assert_eq!(report.tempids().len(), 1);
//! assert_eq!(db.datoms().unwrap().len(), 1);
//! ```

pub mod construct;
pub mod error;
pub mod index;
pub mod interner;
pub mod persist;
pub mod reader;
pub mod resolve;
pub mod schema;
pub mod settings;
pub mod transact;
