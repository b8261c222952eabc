use std::rc::Rc;

use databarn::construct::{FieldSpec, Shape};
use databarn::datatype::{DataType, Keyring, Value};
use databarn::{Barn, DatabarnError, Record};

fn person() -> Rc<Shape> {
    Shape::builder("Person")
        .field(FieldSpec::new("name").of(DataType::Text).key())
        .field(FieldSpec::new("age").of(DataType::Int))
        .build()
        .expect("shape")
}

fn make(shape: &Rc<Shape>, name: &str, age: i64) -> Record {
    Record::from_pairs(shape, [("name", Value::from(name)), ("age", Value::Int(age))]).expect("record")
}

fn pair() -> Rc<Shape> {
    Shape::builder("Pair")
        .field(FieldSpec::new("a").of(DataType::Int).key())
        .field(FieldSpec::new("b").of(DataType::Text).key())
        .field(FieldSpec::new("note"))
        .build()
        .expect("shape")
}

fn make_pair(shape: &Rc<Shape>, a: i64, b: &str) -> Record {
    Record::from_pairs(shape, [("a", Value::Int(a)), ("b", Value::from(b))]).expect("record")
}

#[test]
fn alice_and_bob() {
    let shape = person();
    let barn = Barn::with_shape(&shape);
    let alice = make(&shape, "Alice", 25);
    let bob = make(&shape, "Bob", 25);
    barn.add(&alice).expect("add alice");
    barn.add(&bob).expect("add bob");

    let found = barn.find_all(&[("age", Value::Int(25))]).expect("find_all");
    assert_eq!(found.len(), 2);
    assert_eq!(found.get(0), Some(&alice));
    assert_eq!(found.get(1), Some(&bob));
    assert_eq!(barn.get("Alice"), Some(alice));

    barn.remove(&bob).expect("remove bob");
    assert_eq!(barn.get("Bob"), None);
    let new_bob = make(&shape, "Bob", 30);
    barn.add(&new_bob).expect("key is free again");
    assert_eq!(barn.get("Bob"), Some(new_bob));
}

#[test]
fn duplicate_key_is_rejected() {
    let shape = person();
    let barn = Barn::with_shape(&shape);
    barn.add(&make(&shape, "Alice", 25)).expect("first");
    let err = barn.add(&make(&shape, "Alice", 40)).unwrap_err();
    assert!(matches!(err, DatabarnError::DuplicateKey(_)));
    assert_eq!(barn.len(), 1);
}

#[test]
fn null_key_is_rejected() {
    let shape = person();
    let barn = Barn::with_shape(&shape);
    let nameless = Record::from_pairs(&shape, [("age", Value::Int(3))]).expect("record");
    assert!(matches!(barn.add(&nameless), Err(DatabarnError::MissingKey(ref l)) if l == "name"));
    assert!(barn.is_empty());
    assert_eq!(nameless.owner(), None);
}

#[test]
fn composite_keys() {
    let shape = pair();
    let barn = Barn::with_shape(&shape);
    barn.add(&make_pair(&shape, 1, "x")).expect("(1, x)");
    barn.add(&make_pair(&shape, 1, "y")).expect("(1, y)");
    assert!(matches!(
        barn.add(&make_pair(&shape, 1, "x")),
        Err(DatabarnError::DuplicateKey(_))
    ));
    assert!(barn.has_key((1, "y")));
    assert!(!barn.has_key((2, "y")));
    let found = barn.get((1, "x")).expect("found");
    assert_eq!(found.get("b").unwrap(), Value::from("x"));
}

#[test]
fn composite_key_by_label_in_any_order() {
    let shape = pair();
    let barn = Barn::with_shape(&shape);
    let record = make_pair(&shape, 7, "q");
    barn.add(&record).expect("added");
    let found = barn
        .get_labeled(&[("b", Value::from("q")), ("a", Value::Int(7))])
        .expect("lookup");
    assert_eq!(found, Some(record));
    assert!(matches!(
        barn.get_labeled(&[("a", Value::Int(7))]),
        Err(DatabarnError::KeyArity { expected: 2, found: 1 })
    ));
    assert!(matches!(
        barn.get_labeled(&[("a", Value::Int(7)), ("note", Value::Null)]),
        Err(DatabarnError::KeyArity { .. })
    ));
}

#[test]
fn required_lookup_reports_misses_and_arity() {
    let shape = pair();
    let barn = Barn::with_shape(&shape);
    barn.add(&make_pair(&shape, 1, "x")).expect("added");
    assert!(barn.get_required((1, "x")).is_ok());
    assert!(matches!(barn.get_required((1, "z")), Err(DatabarnError::NotFound(_))));
    assert!(matches!(
        barn.get_required(1),
        Err(DatabarnError::KeyArity { expected: 2, found: 1 })
    ));
}

#[test]
fn key_fields_are_immutable_while_owned() {
    let shape = person();
    let barn = Barn::with_shape(&shape);
    let alice = make(&shape, "Alice", 25);
    barn.add(&alice).expect("added");
    assert!(matches!(alice.set("name", "Alicia"), Err(DatabarnError::KeyImmutable(_))));
    alice.set("age", 26).expect("non-key fields stay mutable");
    barn.remove(&alice).expect("removed");
    alice.set("name", "Alicia").expect("mutable again once detached");
}

#[test]
fn records_without_keys_are_indexed_by_identity() {
    let shape = Shape::builder("Event")
        .field(FieldSpec::new("what").of(DataType::Text))
        .build()
        .expect("shape");
    let barn = Barn::with_shape(&shape);
    let first = Record::from_pairs(&shape, [("what", Value::from("start"))]).expect("first");
    let second = Record::from_pairs(&shape, [("what", Value::from("stop"))]).expect("second");
    barn.add_all([&first, &second]).expect("added");
    assert_eq!(barn.get(Keyring::Id(1)), Some(first.clone()));
    // a plain integer works as an id too
    assert_eq!(barn.get(2), Some(second.clone()));
    assert_eq!(first.keyring(), Some(Keyring::Id(1)));
}

#[test]
fn identities_are_never_reused() {
    let shape = Shape::builder("Event")
        .field(FieldSpec::new("what").of(DataType::Text))
        .build()
        .expect("shape");
    let barn = Barn::with_shape(&shape);
    let first = Record::from_pairs(&shape, [("what", Value::from("a"))]).expect("first");
    barn.add(&first).expect("added");
    assert_eq!(first.identity(), Some(1));
    barn.remove(&first).expect("removed");
    assert_eq!(first.identity(), None);
    barn.add(&first).expect("re-added");
    assert_eq!(first.identity(), Some(2));
    assert_eq!(barn.last_identity(), 2);
}

#[test]
fn remove_by_key() {
    let shape = person();
    let barn = Barn::with_shape(&shape);
    let alice = make(&shape, "Alice", 25);
    barn.add(&alice).expect("added");
    let removed = barn.remove_key("Alice").expect("removed");
    assert_eq!(removed, alice);
    assert_eq!(alice.owner(), None);
    assert!(matches!(barn.remove_key("Alice"), Err(DatabarnError::NotFound(_))));
    assert!(matches!(barn.remove(&alice), Err(DatabarnError::NotFound(_))));
}

#[test]
fn untyped_barn_uses_each_records_own_keys() {
    let barn = Barn::new();
    let people = person();
    barn.add(&make(&people, "Alice", 25)).expect("keyed record");
    let loose = Record::open([("anything", Value::Bool(true))]).expect("open record");
    barn.add(&loose).expect("unkeyed record");
    assert!(barn.get("Alice").is_some());
    assert_eq!(barn.get(Keyring::Id(2)), Some(loose));
    assert!(matches!(
        barn.add(&make(&people, "Alice", 99)),
        Err(DatabarnError::DuplicateKey(_))
    ));
}

#[test]
fn barn_bound_to_an_open_shape_uses_each_records_own_keys() {
    let open = Shape::open("Open");
    let barn = Barn::with_shape(&open);
    let first = Record::new(&open).expect("first");
    first.add_field(FieldSpec::new("k").key(), 1).expect("key field");
    let second = Record::new(&open).expect("second");
    second.add_field(FieldSpec::new("k").key(), 1).expect("key field");
    barn.add(&first).expect("first added");
    assert!(matches!(barn.add(&second), Err(DatabarnError::DuplicateKey(_))));
    assert_eq!(barn.len(), 1);
    assert_eq!(barn.get(1), Some(first.clone()));
    assert_eq!(barn.get_required(1).expect("found"), first);
}

#[test]
fn signed_zeros_are_the_same_key() {
    let shape = Shape::builder("Point")
        .field(FieldSpec::new("x").of(DataType::Float).key())
        .build()
        .expect("shape");
    let barn = Barn::with_shape(&shape);
    let zero = Record::from_pairs(&shape, [("x", Value::Float(0.0))]).expect("zero");
    let negative_zero = Record::from_pairs(&shape, [("x", Value::Float(-0.0))]).expect("negative zero");
    barn.add(&zero).expect("added");
    assert!(matches!(barn.add(&negative_zero), Err(DatabarnError::DuplicateKey(_))));
    assert_eq!(barn.get(-0.0), Some(zero));
    assert_eq!(barn.find_all(&[("x", Value::Float(0.0))]).expect("search").len(), 1);
}
