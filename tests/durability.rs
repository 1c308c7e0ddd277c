use factlog::construct::{Database, Operation, TempId, Value};
use factlog::error::FactlogError;
use factlog::persist::PersistenceMode;
use factlog::schema::{Cardinality, ValueType};
use factlog::settings::Settings;

#[test]
fn an_injected_commit_failure_leaves_the_store_unchanged() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    let name = db
        .define_attribute("person/name", ValueType::String, Cardinality::One, true, false)
        .expect("name");
    db.transact(vec![Operation::assert("a", name, Value::from("Alice"))])
        .expect("transact");
    let before = db.scan_eavt(None).expect("scan");

    db.persistor.lock().unwrap().inject_commit_failure();
    let err = db
        .transact(vec![Operation::assert("b", name, Value::from("Bob"))])
        .unwrap_err();
    assert!(matches!(err, FactlogError::Durability(_)));
    assert_eq!(db.scan_eavt(None).expect("scan"), before);

    // the identical batch is safely retryable afterwards
    let report = db
        .transact(vec![Operation::assert("b", name, Value::from("Bob"))])
        .expect("retry");
    assert!(report.tempids().contains_key(&TempId::from("b")));
    assert_eq!(db.scan_eavt(None).expect("scan").len(), before.len() + 2);
}

#[test]
fn a_failed_attribute_definition_leaves_the_schema_untouched() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    // sabotage the storage so the definition cannot become durable
    db.persistor
        .lock()
        .unwrap()
        .connection()
        .execute("drop table Ident", [])
        .expect("drop");
    let err = db
        .define_attribute("person/name", ValueType::String, Cardinality::One, false, false)
        .unwrap_err();
    assert!(matches!(err, FactlogError::Durability(_)));
    // the attribute cache never learned about the ident
    assert!(db.schema.lock().unwrap().entid("person/name").is_none());
}

#[test]
fn a_file_backed_store_restores_its_state_on_reopen() {
    let path = "test_factlog_restore.db".to_string();
    let _ = std::fs::remove_file(&path);

    let (alice, first_tx, superhash) = {
        let db = Database::new(PersistenceMode::File(path.clone())).expect("db");
        let name = db
            .define_attribute("person/name", ValueType::String, Cardinality::One, true, false)
            .expect("name");
        let bio = db
            .define_attribute("person/bio", ValueType::String, Cardinality::One, false, true)
            .expect("bio");
        let report = db
            .transact(vec![
                Operation::assert("a", name, Value::from("Alice")),
                Operation::assert("a", bio, Value::from("a long story")),
            ])
            .expect("transact");
        let head = db.persistor.lock().unwrap().current_superhash();
        assert!(head.is_some(), "ledger head expected after a commit");
        (report.tempids()[&TempId::from("a")], report.tx(), head)
    };

    let db = Database::new(PersistenceMode::File(path.clone())).expect("reopen");
    // datoms, schema and the ledger head survive the restart
    let datoms = db.datoms().expect("datoms");
    assert_eq!(datoms.len(), 2);
    assert!(datoms.iter().all(|d| d.e() == alice));
    assert_eq!(db.persistor.lock().unwrap().current_superhash(), superhash);

    let name = db.schema.lock().unwrap().entid("person/name").expect("restored ident");
    // upserts work against the restored index
    let report = db
        .transact(vec![Operation::assert("again", name, Value::from("Alice"))])
        .expect("transact");
    assert_eq!(report.tempids()[&TempId::from("again")], alice);
    assert!(report.tx() > first_tx, "tx ids keep increasing across restarts");

    // the fulltext table was restored too
    let values = db.fulltext_values().expect("values");
    assert_eq!(values.0.len(), 1);
    assert_eq!(values.0[0].1, "a long story");

    let _ = std::fs::remove_file(&path);
}

#[test]
fn the_ledger_can_be_disabled_through_settings() {
    let settings = Settings {
        ledger: false,
        ..Settings::default()
    };
    let db = Database::from_settings(settings).expect("db");
    let label = db
        .define_attribute("thing/label", ValueType::String, Cardinality::One, false, false)
        .expect("label");
    db.transact(vec![Operation::assert("t", label, Value::from("x"))])
        .expect("transact");
    assert!(db.persistor.lock().unwrap().current_superhash().is_none());
}

#[test]
fn every_commit_advances_the_ledger_head() {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    let label = db
        .define_attribute("thing/label", ValueType::String, Cardinality::One, false, false)
        .expect("label");
    assert!(db.persistor.lock().unwrap().current_superhash().is_none());
    db.transact(vec![Operation::assert("t", label, Value::from("one"))])
        .expect("transact");
    let first = db.persistor.lock().unwrap().current_superhash();
    assert!(first.is_some());
    db.transact(vec![Operation::assert("t", label, Value::from("two"))])
        .expect("transact");
    let second = db.persistor.lock().unwrap().current_superhash();
    assert_ne!(first, second);
}
