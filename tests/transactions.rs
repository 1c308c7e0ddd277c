use factlog::construct::{Database, Entid, Operation, TempId, Value, USER0, TX0};
use factlog::error::FactlogError;
use factlog::persist::PersistenceMode;
use factlog::schema::{Cardinality, ValueType};

fn setup() -> (Database, Entid, Entid, Entid) {
    let db = Database::new(PersistenceMode::InMemory).expect("db");
    let name = db
        .define_attribute("person/name", ValueType::String, Cardinality::One, true, false)
        .expect("name");
    let age = db
        .define_attribute("person/age", ValueType::Integer, Cardinality::One, false, false)
        .expect("age");
    let friend = db
        .define_attribute("person/friend", ValueType::Ref, Cardinality::Many, false, false)
        .expect("friend");
    (db, name, age, friend)
}

#[test]
fn transaction_identifiers_increase_monotonically() {
    let (db, name, _, _) = setup();
    let mut previous = 0;
    for i in 0..5 {
        let report = db
            .transact(vec![Operation::assert(
                "t",
                name,
                Value::from(format!("n{}", i)),
            )])
            .expect("transact");
        assert!(report.tx() > previous, "tx ids must strictly increase");
        assert!(report.tx() >= TX0);
        previous = report.tx();
    }
}

#[test]
fn a_fresh_tempid_yields_one_content_datom_and_no_metadata_in_datoms() {
    let (db, name, _, _) = setup();
    let report = db
        .transact(vec![Operation::assert("a", name, Value::from("Alice"))])
        .expect("transact");
    let e = report.tempids()[&TempId::from("a")];
    assert!(e >= USER0 && e < TX0);

    let datoms = db.datoms().expect("datoms");
    assert_eq!(datoms.len(), 1);
    let datom = &datoms.0[0];
    assert_eq!(datom.e(), e);
    assert_eq!(datom.a(), name);
    assert_eq!(*datom.v(), Value::from("Alice"));
    assert_eq!(datom.tx(), report.tx());
    assert!(datom.added());

    // the metadata datom is visible in the full scan only
    let full = db.scan_eavt(None).expect("scan");
    assert_eq!(full.len(), 2);
}

#[test]
fn metadata_exclusion_matches_attribute_identity_not_value() {
    let (db, name, age, _) = setup();
    let first = db
        .transact(vec![Operation::assert("a", name, Value::from("Alice"))])
        .expect("transact");
    // a user integer that happens to equal a transaction instant
    let instant_micros = first.tx_instant().timestamp_micros();
    db.transact(vec![Operation::assert("b", age, Value::from(instant_micros))])
        .expect("transact");

    let datoms = db.datoms().expect("datoms");
    assert_eq!(datoms.len(), 2, "the colliding user value must stay in");
    // excluding metadata removes exactly one datom per transaction
    let full = db.scan_eavt(None).expect("scan");
    assert_eq!(full.len() - datoms.len(), 2);
}

#[test]
fn the_same_tempid_resolves_identically_in_entity_and_value_position() {
    let (db, name, _, friend) = setup();
    let report = db
        .transact(vec![
            Operation::assert("a", name, Value::from("Alice")),
            Operation::assert("b", name, Value::from("Bob")),
            Operation::assert("b", friend, factlog::construct::ValuePlace::tempid("a")),
        ])
        .expect("transact");
    let a = report.tempids()[&TempId::from("a")];
    let b = report.tempids()[&TempId::from("b")];
    assert_ne!(a, b);

    let datoms = db.datoms().expect("datoms");
    let friendship = datoms
        .iter()
        .find(|d| d.a() == friend)
        .expect("friendship datom");
    assert_eq!(friendship.e(), b);
    assert_eq!(*friendship.v(), Value::EntityRef(a));
}

#[test]
fn unknown_attributes_are_rejected_without_a_write() {
    let (db, name, _, _) = setup();
    db.transact(vec![Operation::assert("a", name, Value::from("Alice"))])
        .expect("transact");
    let before = db.scan_eavt(None).expect("scan");
    let err = db
        .transact(vec![Operation::assert("b", 99_999, Value::from("x"))])
        .unwrap_err();
    assert!(matches!(err, FactlogError::UnknownAttribute(_)));
    assert_eq!(db.scan_eavt(None).expect("scan"), before);
}

#[test]
fn value_types_are_checked_against_the_schema() {
    let (db, _, age, _) = setup();
    let err = db
        .transact(vec![Operation::assert("a", age, Value::from("not a number"))])
        .unwrap_err();
    match err {
        FactlogError::TypeMismatch { attribute, expected, .. } => {
            assert_eq!(attribute, "person/age");
            assert_eq!(expected, "integer");
        }
        other => panic!("expected a type mismatch, got {}", other),
    }
}

#[test]
fn integers_coerce_to_entity_references_for_ref_attributes() {
    let (db, name, _, friend) = setup();
    let report = db
        .transact(vec![Operation::assert("a", name, Value::from("Alice"))])
        .expect("transact");
    let a = report.tempids()[&TempId::from("a")];
    db.transact(vec![Operation::assert("b", friend, Value::Integer(a))])
        .expect("transact");
    let datoms = db.datoms().expect("datoms");
    let friendship = datoms.iter().find(|d| d.a() == friend).expect("datom");
    assert_eq!(*friendship.v(), Value::EntityRef(a));
}

#[test]
fn two_values_for_a_cardinality_one_attribute_conflict() {
    let (db, name, _, _) = setup();
    let before = db.scan_eavt(None).expect("scan");
    let err = db
        .transact(vec![
            Operation::assert("a", name, Value::from("Alice")),
            Operation::assert("a", name, Value::from("Alicia")),
        ])
        .unwrap_err();
    assert!(matches!(err, FactlogError::CardinalityConflict { .. }));
    assert_eq!(db.scan_eavt(None).expect("scan"), before);
}

#[test]
fn asserting_the_same_value_twice_collapses_to_one_datom() {
    let (db, name, _, _) = setup();
    db.transact(vec![
        Operation::assert("a", name, Value::from("Alice")),
        Operation::assert("a", name, Value::from("Alice")),
    ])
    .expect("transact");
    assert_eq!(db.datoms().expect("datoms").len(), 1);
}

#[test]
fn retraction_is_recorded_as_a_new_datom() {
    let (db, name, _, _) = setup();
    let report = db
        .transact(vec![Operation::assert("a", name, Value::from("Alice"))])
        .expect("transact");
    let a = report.tempids()[&TempId::from("a")];
    db.transact(vec![Operation::retract(a, name, Value::from("Alice"))])
        .expect("retract");
    let datoms = db.datoms().expect("datoms");
    assert_eq!(datoms.len(), 2);
    assert!(datoms.iter().any(|d| !d.added()));
    assert!(datoms.iter().any(|d| d.added()));
}
