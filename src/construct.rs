use std::sync::{Arc, Mutex, MutexGuard};

// other keepers use HashSet or HashMap
use core::hash::BuildHasherDefault;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use seahash::SeaHasher;

// custom made ordering for datoms
use std::cmp::Ordering;

// used to print out readable forms of a construct
use std::fmt;

// wall-clock instants recorded on transactions
use chrono::{DateTime, Utc};

// our own stuff that we need
use crate::error::{FactlogError, Result};
use crate::index::DatomIndex;
use crate::interner::Interner;
use crate::persist::{PersistenceMode, Persistor};
use crate::resolve::UpsertPolicy;
use crate::schema::{Attribute, Cardinality, Schema, ValueType};
use crate::settings::Settings;

// ------------- Entid -------------
pub type Entid = i64;

pub type EntidHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

/// First entity identifier handed out to user entities. Everything below
/// is reserved for system attributes and idents.
pub const USER0: Entid = 0x10000;
/// First transaction identifier. The transaction space is disjoint from
/// the entity space so the two counters can never collide.
pub const TX0: Entid = 0x1000_0000_0000;

/// The system attribute carried by every transaction-metadata datom.
pub const TX_INSTANT: Entid = 1;

#[derive(Debug)]
pub struct EntidAllocator {
    next_entity: Entid,
    next_tx: Entid,
}

impl EntidAllocator {
    pub fn new() -> Self {
        Self {
            next_entity: USER0,
            next_tx: TX0,
        }
    }
    // Identifiers are never reused. When restoring a persisted database the
    // lower bounds are pushed past every identifier seen in durable storage.
    pub fn retain(&mut self, id: Entid) {
        if id >= TX0 {
            if id >= self.next_tx {
                self.next_tx = id + 1;
            }
        } else if id >= USER0 && id >= self.next_entity {
            self.next_entity = id + 1;
        }
    }
    pub fn allocate_entity(&mut self) -> Entid {
        let e = self.next_entity;
        self.next_entity += 1;
        e
    }
    pub fn allocate_tx(&mut self) -> Entid {
        let tx = self.next_tx;
        self.next_tx += 1;
        tx
    }
}

// ------------- Value -------------
/// The closed union of values a datom can carry. A `FulltextRef` stores
/// only the rowid of an interned string; the reader resolves it back.
#[derive(Clone, Debug)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    EntityRef(Entid),
    FulltextRef(i64),
}

impl Value {
    // stable tags used in the persisted representation
    pub fn tag(&self) -> u8 {
        match self {
            Value::Integer(_) => 1,
            Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Boolean(_) => 4,
            Value::EntityRef(_) => 5,
            Value::FulltextRef(_) => 6,
        }
    }
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::EntityRef(_) => "ref",
            Value::FulltextRef(_) => "fulltext",
        }
    }
    pub fn matches(&self, value_type: ValueType) -> bool {
        matches!(
            (self, value_type),
            (Value::Integer(_), ValueType::Integer)
                | (Value::Float(_), ValueType::Float)
                | (Value::String(_), ValueType::String)
                | (Value::FulltextRef(_), ValueType::String)
                | (Value::Boolean(_), ValueType::Boolean)
                | (Value::EntityRef(_), ValueType::Ref)
        )
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (EntityRef(a), EntityRef(b)) => a.cmp(b),
            (FulltextRef(a), FulltextRef(b)) => a.cmp(b),
            _ => self.tag().cmp(&other.tag()),
        }
    }
}
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Value {}
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        match self {
            Value::Integer(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
            Value::Boolean(v) => v.hash(state),
            Value::EntityRef(v) => v.hash(state),
            Value::FulltextRef(v) => v.hash(state),
        }
    }
}
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "\"{}\"", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::EntityRef(v) => write!(f, "#{}", v),
            Value::FulltextRef(v) => write!(f, "fulltext({})", v),
        }
    }
}

// ------------- Datom -------------
/// One immutable fact. A retraction is itself a new datom with
/// `added == false`; nothing is ever mutated or deleted.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Datom {
    e: Entid,
    a: Entid,
    v: Value,
    tx: Entid,
    added: bool,
}

impl Datom {
    pub fn new(e: Entid, a: Entid, v: Value, tx: Entid, added: bool) -> Self {
        Self { e, a, v, tx, added }
    }
    // It's intentional to encapsulate the fields in the struct
    // and only expose them using "getters", because this yields
    // true immutability for datoms after creation.
    pub fn e(&self) -> Entid {
        self.e
    }
    pub fn a(&self) -> Entid {
        self.a
    }
    pub fn v(&self) -> &Value {
        &self.v
    }
    pub fn tx(&self) -> Entid {
        self.tx
    }
    pub fn added(&self) -> bool {
        self.added
    }
}
impl Ord for Datom {
    // the canonical EAVT order
    fn cmp(&self, other: &Self) -> Ordering {
        (self.e, self.a, &self.v, self.tx, self.added).cmp(&(
            other.e,
            other.a,
            &other.v,
            other.tx,
            other.added,
        ))
    }
}
impl PartialOrd for Datom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl fmt::Display for Datom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{} {} {} {} {}]",
            self.e,
            self.a,
            self.v,
            self.tx,
            if self.added { "+" } else { "-" }
        )
    }
}

// ------------- Transaction -------------
/// A committed transaction with its datoms, the metadata datom included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    tx: Entid,
    datoms: Vec<Datom>,
}
impl Transaction {
    pub fn new(tx: Entid, datoms: Vec<Datom>) -> Self {
        Self { tx, datoms }
    }
    pub fn tx(&self) -> Entid {
        self.tx
    }
    pub fn datoms(&self) -> &[Datom] {
        &self.datoms
    }
}
impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "tx {}:", self.tx)?;
        for datom in &self.datoms {
            writeln!(f, "  {}", datom)?;
        }
        Ok(())
    }
}

// ------------- TempId -------------
/// A client-supplied placeholder, valid only within one transaction's
/// input batch.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum TempId {
    Text(String),
    Number(i64),
}
impl From<&str> for TempId {
    fn from(t: &str) -> Self {
        TempId::Text(t.to_owned())
    }
}
impl From<String> for TempId {
    fn from(t: String) -> Self {
        TempId::Text(t)
    }
}
impl From<i64> for TempId {
    fn from(t: i64) -> Self {
        TempId::Number(t)
    }
}
impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TempId::Text(t) => write!(f, "{}", t),
            TempId::Number(n) => write!(f, "{}", n),
        }
    }
}

// ------------- Operations -------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityPlace {
    Entid(Entid),
    TempId(TempId),
}
impl From<Entid> for EntityPlace {
    fn from(e: Entid) -> Self {
        EntityPlace::Entid(e)
    }
}
impl From<TempId> for EntityPlace {
    fn from(t: TempId) -> Self {
        EntityPlace::TempId(t)
    }
}
impl From<&str> for EntityPlace {
    fn from(t: &str) -> Self {
        EntityPlace::TempId(TempId::from(t))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValuePlace {
    Value(Value),
    TempId(TempId),
}
impl ValuePlace {
    pub fn tempid(t: impl Into<TempId>) -> Self {
        ValuePlace::TempId(t.into())
    }
}
impl From<Value> for ValuePlace {
    fn from(v: Value) -> Self {
        ValuePlace::Value(v)
    }
}
impl From<i64> for ValuePlace {
    fn from(v: i64) -> Self {
        ValuePlace::Value(Value::Integer(v))
    }
}
impl From<f64> for ValuePlace {
    fn from(v: f64) -> Self {
        ValuePlace::Value(Value::Float(v))
    }
}
impl From<&str> for ValuePlace {
    fn from(v: &str) -> Self {
        ValuePlace::Value(Value::from(v))
    }
}
impl From<String> for ValuePlace {
    fn from(v: String) -> Self {
        ValuePlace::Value(Value::String(v))
    }
}
impl From<bool> for ValuePlace {
    fn from(v: bool) -> Self {
        ValuePlace::Value(Value::Boolean(v))
    }
}

/// One proposed assertion or retraction in a transaction's input batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Assert(EntityPlace, Entid, ValuePlace),
    Retract(EntityPlace, Entid, ValuePlace),
}
impl Operation {
    pub fn assert(e: impl Into<EntityPlace>, a: Entid, v: impl Into<ValuePlace>) -> Self {
        Operation::Assert(e.into(), a, v.into())
    }
    pub fn retract(e: impl Into<EntityPlace>, a: Entid, v: impl Into<ValuePlace>) -> Self {
        Operation::Retract(e.into(), a, v.into())
    }
    pub fn entity(&self) -> &EntityPlace {
        match self {
            Operation::Assert(e, _, _) | Operation::Retract(e, _, _) => e,
        }
    }
    pub fn attribute(&self) -> Entid {
        match self {
            Operation::Assert(_, a, _) | Operation::Retract(_, a, _) => *a,
        }
    }
    pub fn value(&self) -> &ValuePlace {
        match self {
            Operation::Assert(_, _, v) | Operation::Retract(_, _, v) => v,
        }
    }
    pub fn is_assertion(&self) -> bool {
        matches!(self, Operation::Assert(..))
    }
}

// ------------- TransactionReport -------------
/// Returned to the caller after a successful commit.
#[derive(Clone, Debug)]
pub struct TransactionReport {
    tx: Entid,
    tx_instant: DateTime<Utc>,
    tempids: HashMap<TempId, Entid, OtherHasher>,
}
impl TransactionReport {
    pub fn new(
        tx: Entid,
        tx_instant: DateTime<Utc>,
        tempids: HashMap<TempId, Entid, OtherHasher>,
    ) -> Self {
        Self {
            tx,
            tx_instant,
            tempids,
        }
    }
    pub fn tx(&self) -> Entid {
        self.tx
    }
    /// The entity the transaction-metadata datom was asserted on. The
    /// metadata datom has the shape (tx, db/txInstant, instant, tx, true),
    /// so this is the transaction identifier itself.
    pub fn tx_entity(&self) -> Entid {
        self.tx
    }
    pub fn tx_instant(&self) -> DateTime<Utc> {
        self.tx_instant
    }
    pub fn tempids(&self) -> &HashMap<TempId, Entid, OtherHasher> {
        &self.tempids
    }
}

// locks are plumbing, poisoning surfaces as an error rather than a panic
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| FactlogError::Lock(e.to_string()))
}

// ------------- Database -------------
// This sets up the database with the necessary structures
pub struct Database {
    // owns the identifier allocator
    pub allocator: Arc<Mutex<EntidAllocator>>,
    // owns the schema/ident cache consumed by validation and display
    pub schema: Arc<Mutex<Schema>>,
    // owns the multiply-sorted datom index
    pub index: Arc<Mutex<DatomIndex>>,
    // owns the fulltext value interner
    pub interner: Arc<Mutex<Interner>>,
    // responsible for the persistence layer
    pub persistor: Arc<Mutex<Persistor>>,
    // serializes writers: held for the whole of one transact call
    pub(crate) write_guard: Mutex<()>,
    fulltext_threshold: usize,
    upsert_policy: UpsertPolicy,
}

impl Database {
    pub fn new(mode: PersistenceMode) -> Result<Database> {
        Self::with_settings(mode, Settings::default())
    }

    pub fn from_settings(settings: Settings) -> Result<Database> {
        let mode = settings.persistence_mode();
        Self::with_settings(mode, settings)
    }

    pub fn with_settings(mode: PersistenceMode, settings: Settings) -> Result<Database> {
        let mut persistor = Persistor::new(mode, settings.ledger)?;
        let mut allocator = EntidAllocator::new();
        let mut schema = Schema::new();
        let mut interner = Interner::new();
        let mut index = DatomIndex::new();

        // Restore the existing database
        persistor.restore_schema(&mut schema, &mut allocator)?;
        persistor.restore_fulltext(&mut interner)?;
        persistor.restore_datoms(&mut index, &schema, &mut allocator)?;

        // Reserve the system attribute every transaction depends on
        if schema.attribute(TX_INSTANT).is_none() {
            let attribute = schema.declare(
                "db/txInstant",
                TX_INSTANT,
                ValueType::Integer,
                Cardinality::One,
                false,
                false,
            )?;
            persistor.persist_attribute(&attribute, "db/txInstant")?;
        }

        Ok(Database {
            allocator: Arc::new(Mutex::new(allocator)),
            schema: Arc::new(Mutex::new(schema)),
            index: Arc::new(Mutex::new(index)),
            interner: Arc::new(Mutex::new(interner)),
            persistor: Arc::new(Mutex::new(persistor)),
            write_guard: Mutex::new(()),
            fulltext_threshold: settings.fulltext_threshold,
            upsert_policy: settings.upsert_policy(),
        })
    }

    // functions to access the owned allocator and keepers
    pub fn allocator(&self) -> Arc<Mutex<EntidAllocator>> {
        Arc::clone(&self.allocator)
    }
    pub fn schema(&self) -> Arc<Mutex<Schema>> {
        Arc::clone(&self.schema)
    }
    pub fn index(&self) -> Arc<Mutex<DatomIndex>> {
        Arc::clone(&self.index)
    }
    pub fn interner(&self) -> Arc<Mutex<Interner>> {
        Arc::clone(&self.interner)
    }
    /// The storage handle, exposed so read-only collaborators can issue
    /// queries without going through the transaction processor.
    pub fn persistor(&self) -> Arc<Mutex<Persistor>> {
        Arc::clone(&self.persistor)
    }
    pub fn fulltext_threshold(&self) -> usize {
        self.fulltext_threshold
    }
    pub fn upsert_policy(&self) -> UpsertPolicy {
        self.upsert_policy
    }
    pub fn set_upsert_policy(&mut self, policy: UpsertPolicy) {
        self.upsert_policy = policy;
    }

    /// Register an attribute with the schema/ident cache and persist it.
    /// Defining the same ident twice with the same metadata is a no-op
    /// returning the existing entid.
    pub fn define_attribute(
        &self,
        ident: &str,
        value_type: ValueType,
        cardinality: Cardinality,
        unique: bool,
        fulltext: bool,
    ) -> Result<Entid> {
        let mut schema = lock(&self.schema)?;
        if let Some(entid) = schema.entid(ident) {
            let existing = schema
                .attribute(entid)
                .ok_or_else(|| FactlogError::Schema(format!("ident {} has no attribute", ident)))?;
            if existing.value_type() != value_type
                || existing.cardinality() != cardinality
                || existing.unique() != unique
                || existing.fulltext() != fulltext
            {
                return Err(FactlogError::Schema(format!(
                    "attribute {} is already defined with different metadata",
                    ident
                )));
            }
            return Ok(entid);
        }
        let entid = lock(&self.allocator)?.allocate_entity();
        // durable first: a storage failure must leave the cache untouched
        let attribute = Attribute::new(entid, value_type, cardinality, unique, fulltext);
        attribute.validate(ident)?;
        lock(&self.persistor)?.persist_attribute(&attribute, ident)?;
        schema.declare(ident, entid, value_type, cardinality, unique, fulltext)?;
        tracing::debug!(ident, entid, "defined attribute");
        Ok(entid)
    }
}
