//! SQLite persistence and restoration layer.
//!
//! The persistor owns the connection, creates the schema, commits one
//! transaction's datoms as a single atomic unit, and rebuilds the
//! in-memory structures when an existing database is opened. It also
//! maintains a tamper-evident ledger: every committed transaction
//! appends a blake3 hash chained over the previous head.

use rusqlite::types::{ToSql, ValueRef};
use rusqlite::{params, Connection};

use crate::construct::{Datom, Entid, EntidAllocator, Value};
use crate::error::{FactlogError, Result};
use crate::index::DatomIndex;
use crate::interner::Interner;
use crate::schema::{Attribute, Cardinality, Schema, ValueType};

#[derive(Clone, Debug)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

fn to_sql_value(v: &Value) -> rusqlite::types::Value {
    match v {
        Value::Integer(i) => (*i).into(),
        Value::Float(f) => (*f).into(),
        Value::String(s) => s.clone().into(),
        Value::Boolean(b) => (*b as i64).into(),
        Value::EntityRef(e) => (*e).into(),
        Value::FulltextRef(r) => (*r).into(),
    }
}

fn from_sql_value(tag: u8, value: ValueRef) -> Result<Value> {
    let corrupt = |e: rusqlite::types::FromSqlError| FactlogError::Durability(e.to_string());
    Ok(match tag {
        1 => Value::Integer(value.as_i64().map_err(corrupt)?),
        2 => Value::Float(value.as_f64().map_err(corrupt)?),
        3 => Value::String(value.as_str().map_err(corrupt)?.to_owned()),
        4 => Value::Boolean(value.as_i64().map_err(corrupt)? != 0),
        5 => Value::EntityRef(value.as_i64().map_err(corrupt)?),
        6 => Value::FulltextRef(value.as_i64().map_err(corrupt)?),
        other => {
            return Err(FactlogError::Durability(format!(
                "unknown value tag {} in persisted datom",
                other
            )));
        }
    })
}

fn render_sql_value(value: ValueRef) -> String {
    match value {
        ValueRef::Null => "null".to_owned(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

fn next_superhash(previous: Option<&str>, tx: Entid, datoms: &[Datom]) -> String {
    let mut hasher = blake3::Hasher::new();
    if let Some(previous) = previous {
        hasher.update(previous.as_bytes());
    }
    hasher.update(&tx.to_le_bytes());
    for datom in datoms {
        hasher.update(datom.to_string().as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

// ------------- Persistence -------------
pub struct Persistor {
    db: Connection,
    ledger: bool,
    superhash: Option<String>,
    fail_next_commit: bool,
}

impl Persistor {
    pub fn new(mode: PersistenceMode, ledger: bool) -> Result<Persistor> {
        let connection = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        connection.execute_batch(
            "
            create table if not exists Datom (
                E integer not null,
                A integer not null,
                ValueTag integer not null,
                Value any null,
                Tx integer not null,
                Added integer not null,
                constraint unique_Datom unique (
                    E, A, ValueTag, Value, Tx, Added
                )
            );
            create index if not exists Datom_by_Tx on Datom (Tx);
            create table if not exists Ident (
                Entid integer not null,
                Ident text not null,
                constraint referenceable_Entid primary key (
                    Entid
                ),
                constraint unique_Ident unique (
                    Ident
                )
            );
            create table if not exists Attribute (
                Attribute_Identity integer not null,
                ValueType text not null,
                Cardinality text not null,
                IsUnique integer not null,
                Fulltext integer not null,
                constraint Attribute_is_Ident foreign key (
                    Attribute_Identity
                ) references Ident(Entid),
                constraint referenceable_Attribute_Identity primary key (
                    Attribute_Identity
                )
            );
            create table if not exists FulltextValue (
                Value text not null,
                constraint unique_FulltextValue unique (
                    Value
                )
            );
            create table if not exists Ledger (
                Tx integer not null,
                Superhash text not null,
                constraint referenceable_Tx primary key (
                    Tx
                )
            );
            ",
        )?;
        let superhash = connection
            .query_row(
                "select Superhash from Ledger order by Tx desc limit 1",
                [],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(Persistor {
            db: connection,
            ledger,
            superhash,
            fail_next_commit: false,
        })
    }

    /// The read-only storage handle for external collaborators.
    pub fn connection(&self) -> &Connection {
        &self.db
    }

    pub fn persist_attribute(&mut self, attribute: &Attribute, ident: &str) -> Result<()> {
        self.db.execute(
            "insert or ignore into Ident (Entid, Ident) values (?, ?)",
            params![attribute.entid(), ident],
        )?;
        self.db.execute(
            "
            insert or ignore into Attribute (
                Attribute_Identity,
                ValueType,
                Cardinality,
                IsUnique,
                Fulltext
            ) values (?, ?, ?, ?, ?)
            ",
            params![
                attribute.entid(),
                attribute.value_type().name(),
                attribute.cardinality().name(),
                attribute.unique(),
                attribute.fulltext()
            ],
        )?;
        Ok(())
    }

    /// Insert a fulltext value, or find it if it already exists. The
    /// unique constraint on content makes concurrent interning of the
    /// same string converge on one rowid.
    pub fn persist_fulltext(&mut self, text: &str) -> Result<i64> {
        self.db.execute(
            "insert or ignore into FulltextValue (Value) values (?)",
            params![text],
        )?;
        let rowid = self.db.query_row(
            "select rowid from FulltextValue where Value = ?",
            params![text],
            |row| row.get(0),
        )?;
        Ok(rowid)
    }

    /// Commit one transaction's datoms atomically: either every row (and
    /// the ledger head) becomes durable, or none do.
    pub fn commit_transaction(&mut self, tx: Entid, datoms: &[Datom]) -> Result<()> {
        if self.fail_next_commit {
            self.fail_next_commit = false;
            return Err(FactlogError::Durability(
                "injected commit failure".to_owned(),
            ));
        }
        let head = if self.ledger {
            Some(next_superhash(self.superhash.as_deref(), tx, datoms))
        } else {
            None
        };
        let transaction = self.db.transaction()?;
        {
            let mut add_datom = transaction.prepare_cached(
                "
                insert into Datom (
                    E, A, ValueTag, Value, Tx, Added
                ) values (?, ?, ?, ?, ?, ?)
                ",
            )?;
            for datom in datoms {
                add_datom.execute(params![
                    datom.e(),
                    datom.a(),
                    datom.v().tag(),
                    to_sql_value(datom.v()),
                    datom.tx(),
                    datom.added()
                ])?;
            }
            if let Some(head) = &head {
                transaction.execute(
                    "insert into Ledger (Tx, Superhash) values (?, ?)",
                    params![tx, head],
                )?;
            }
        }
        transaction.commit()?;
        if head.is_some() {
            self.superhash = head;
        }
        tracing::debug!(tx, datoms = datoms.len(), "persisted transaction");
        Ok(())
    }

    /// The head of the ledger hash chain, if the ledger is enabled and at
    /// least one transaction has been committed.
    pub fn current_superhash(&self) -> Option<String> {
        self.superhash.clone()
    }

    /// Test hook: the next `commit_transaction` fails with a durability
    /// error before writing anything.
    pub fn inject_commit_failure(&mut self) {
        self.fail_next_commit = true;
    }

    pub fn restore_schema(
        &mut self,
        schema: &mut Schema,
        allocator: &mut EntidAllocator,
    ) -> Result<()> {
        let mut statement = self.db.prepare(
            "
            select i.Entid, i.Ident, a.ValueType, a.Cardinality, a.IsUnique, a.Fulltext
                from Ident i
                join Attribute a
                on a.Attribute_Identity = i.Entid
            ",
        )?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            let entid: Entid = row.get(0)?;
            let ident: String = row.get(1)?;
            let value_type: String = row.get(2)?;
            let cardinality: String = row.get(3)?;
            let value_type = ValueType::from_name(&value_type).ok_or_else(|| {
                FactlogError::Durability(format!("unknown value type {} for {}", value_type, ident))
            })?;
            let cardinality = Cardinality::from_name(&cardinality).ok_or_else(|| {
                FactlogError::Durability(format!(
                    "unknown cardinality {} for {}",
                    cardinality, ident
                ))
            })?;
            schema.declare(&ident, entid, value_type, cardinality, row.get(4)?, row.get(5)?)?;
            allocator.retain(entid);
        }
        Ok(())
    }

    pub fn restore_fulltext(&mut self, interner: &mut Interner) -> Result<()> {
        let mut statement = self
            .db
            .prepare("select rowid, Value from FulltextValue order by rowid")?;
        let mut rows = statement.query([])?;
        while let Some(row) = rows.next()? {
            interner.restore(row.get(0)?, row.get(1)?);
        }
        Ok(())
    }

    pub fn restore_datoms(
        &mut self,
        index: &mut DatomIndex,
        schema: &Schema,
        allocator: &mut EntidAllocator,
    ) -> Result<()> {
        // chronological order, so the unique-(a, v) lookup replays
        // assertions and retractions in the order they were committed
        let mut statement = self.db.prepare(
            "
            select E, A, ValueTag, Value, Tx, Added
                from Datom
                order by Tx, Added
            ",
        )?;
        let mut rows = statement.query([])?;
        let mut datoms = Vec::new();
        while let Some(row) = rows.next()? {
            let tag: u8 = row.get(2)?;
            let value = from_sql_value(tag, row.get_ref(3)?)?;
            let datom = Datom::new(row.get(0)?, row.get(1)?, value, row.get(4)?, row.get(5)?);
            allocator.retain(datom.e());
            allocator.retain(datom.a());
            allocator.retain(datom.tx());
            if let Value::EntityRef(referenced) = datom.v() {
                allocator.retain(*referenced);
            }
            datoms.push(datom);
        }
        index.commit(&datoms, schema);
        if !datoms.is_empty() {
            tracing::info!(datoms = datoms.len(), "restored datom index");
        }
        Ok(())
    }

    /// Execute an arbitrary read-only query and format the results as a
    /// tab-and-newline separated string suitable for debug printing.
    pub fn dump_query(&self, sql: &str, params: &[&dyn ToSql]) -> Result<String> {
        let mut statement = self.db.prepare(sql)?;
        let columns = statement.column_count();
        let mut rows = statement.query(params)?;
        let mut out = String::new();
        while let Some(row) = rows.next()? {
            let mut fields = Vec::with_capacity(columns);
            for i in 0..columns {
                fields.push(render_sql_value(row.get_ref(i)?));
            }
            out.push_str(&fields.join("\t"));
            out.push('\n');
        }
        Ok(out)
    }
}
