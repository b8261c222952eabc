use std::rc::Rc;

use databarn::construct::{FieldSpec, Shape};
use databarn::datatype::{DataType, Value};
use databarn::{Barn, DatabarnError, Record};

fn city() -> Rc<Shape> {
    Shape::builder("City")
        .field(FieldSpec::new("name").of(DataType::Text).key())
        .field(FieldSpec::new("country").of(DataType::Text))
        .field(FieldSpec::new("population").of(DataType::Int))
        .build()
        .expect("shape")
}

fn setup() -> (Rc<Shape>, Barn) {
    let shape = city();
    let barn = Barn::with_shape(&shape);
    for (name, country, population) in [
        ("Stockholm", "SE", 980_000),
        ("Oslo", "NO", 700_000),
        ("Uppsala", "SE", 240_000),
        ("Bergen", "NO", 290_000),
        ("Lund", "SE", 95_000),
    ] {
        let record = Record::from_pairs(
            &shape,
            [
                ("name", Value::from(name)),
                ("country", Value::from(country)),
                ("population", Value::Int(population)),
            ],
        )
        .expect("record");
        barn.add(&record).expect("added");
    }
    (shape, barn)
}

fn names(records: impl IntoIterator<Item = Record>) -> Vec<String> {
    records
        .into_iter()
        .map(|r| r.get("name").unwrap().as_text().unwrap().to_owned())
        .collect()
}

#[test]
fn find_all_without_criteria_returns_everything_in_order() {
    let (_, barn) = setup();
    let all = barn.find_all(&[]).expect("find_all");
    assert_eq!(names(all), vec!["Stockholm", "Oslo", "Uppsala", "Bergen", "Lund"]);
}

#[test]
fn find_all_filters_and_is_idempotent() {
    let (_, barn) = setup();
    let first = barn.find_all(&[("country", Value::from("SE"))]).expect("first run");
    let second = barn.find_all(&[("country", Value::from("SE"))]).expect("second run");
    assert_eq!(first, second);
    assert_eq!(names(first), vec!["Stockholm", "Uppsala", "Lund"]);
}

#[test]
fn criteria_are_conjunctive_and_exact() {
    let (_, barn) = setup();
    let hits = barn
        .find_all(&[("country", Value::from("NO")), ("population", Value::Int(290_000))])
        .expect("find_all");
    assert_eq!(names(hits), vec!["Bergen"]);
    // no coercion between numeric variants
    let none = barn.find_all(&[("population", Value::Float(290_000.0))]).expect("find_all");
    assert!(none.is_empty());
}

#[test]
fn find_returns_first_match_or_nothing() {
    let (_, barn) = setup();
    let oslo = barn.find(&[("country", Value::from("NO"))]).expect("find");
    assert_eq!(oslo.unwrap().get("name").unwrap(), Value::from("Oslo"));
    assert_eq!(barn.find(&[("country", Value::from("DK"))]).expect("find"), None);
}

#[test]
fn unknown_criteria_on_static_shape() {
    let (_, barn) = setup();
    assert!(matches!(
        barn.find_all(&[("mayor", Value::from("x"))]),
        Err(DatabarnError::UnknownField { .. })
    ));
}

#[test]
fn positions_and_slices() {
    let (_, barn) = setup();
    assert_eq!(barn.at(2).unwrap().get("name").unwrap(), Value::from("Uppsala"));
    assert!(barn.at(5).is_none());
    assert_eq!(barn.at_back(0).unwrap().get("name").unwrap(), Value::from("Lund"));
    assert_eq!(barn.at_back(4).unwrap().get("name").unwrap(), Value::from("Stockholm"));
    assert!(barn.at_back(5).is_none());
    let middle = barn.slice(1..3);
    assert_eq!(names(middle), vec!["Oslo", "Uppsala"]);
    let tail = barn.slice(3..);
    assert_eq!(tail.len(), 2);
    // slices clamp to the barn's length
    assert_eq!(barn.slice(4..100).len(), 1);
    assert!(barn.slice(10..20).is_empty());
}

#[test]
fn slices_are_independent_of_the_barn() {
    let (_, barn) = setup();
    let snapshot = barn.slice(..);
    let lund = barn.get("Lund").expect("lund");
    barn.remove(&lund).expect("removed");
    assert_eq!(snapshot.len(), 5);
    assert_eq!(barn.len(), 4);
    // a result set can be sliced again
    assert_eq!(snapshot.slice(..2).len(), 2);
    assert_eq!(snapshot.at_back(0).unwrap().get("name").unwrap(), Value::from("Lund"));
}

#[test]
fn iteration_follows_insertion_order() {
    let (_, barn) = setup();
    let seen: Vec<Record> = barn.iter().collect();
    assert_eq!(seen.len(), 5);
    let mut count = 0;
    for record in &barn {
        assert_eq!(record.owner(), Some(barn.clone()));
        count += 1;
    }
    assert_eq!(count, 5);
}

#[test]
fn modifying_while_iterating_fails_fast() {
    let (shape, barn) = setup();
    let extra = Record::from_pairs(&shape, [("name", Value::from("Malmo"))]).expect("record");
    let mut iter = barn.iter();
    let first = iter.next().expect("first");
    assert!(matches!(barn.add(&extra), Err(DatabarnError::Busy)));
    assert!(matches!(barn.remove(&first), Err(DatabarnError::Busy)));
    drop(iter);
    barn.add(&extra).expect("allowed once iteration ends");
    assert_eq!(barn.len(), 6);
}

#[test]
fn snapshots_allow_modification_during_a_loop() {
    let (_, barn) = setup();
    for record in barn.records() {
        if record.get("country").unwrap() == Value::from("NO") {
            barn.remove(&record).expect("removed");
        }
    }
    assert_eq!(barn.len(), 3);
}

#[test]
fn membership_follows_the_owner() {
    let (shape, barn) = setup();
    let other = Barn::with_shape(&shape);
    let oslo = barn.get("Oslo").expect("oslo");
    assert!(barn.contains(&oslo));
    assert!(!other.contains(&oslo));
    assert_eq!(barn.to_string(), "Barn(5 records)");
}
