use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, Criterion};

use databarn::construct::{FieldSpec, Shape};
use databarn::datatype::{DataType, Value};
use databarn::marshal::{from_text, to_text};
use databarn::{Barn, ConversionOptions, Record};

fn person() -> Rc<Shape> {
    Shape::builder("Person")
        .field(FieldSpec::new("id").of(DataType::Int).auto())
        .field(FieldSpec::new("name").of(DataType::Text).key())
        .field(FieldSpec::new("age").of(DataType::Int))
        .build()
        .unwrap()
}

fn populated(shape: &Rc<Shape>, n: i64) -> Barn {
    let barn = Barn::with_shape(shape);
    for i in 0..n {
        let record = Record::from_pairs(
            shape,
            [
                ("name", Value::from(format!("person{}", i))),
                ("age", Value::Int(i % 90)),
            ],
        )
        .unwrap();
        barn.add(&record).unwrap();
    }
    barn
}

fn barn_add(c: &mut Criterion) {
    let shape = person();
    c.bench_function("barn add 1000", |b| {
        b.iter(|| black_box(populated(&shape, 1000)))
    });
}

fn barn_get(c: &mut Criterion) {
    let shape = person();
    let barn = populated(&shape, 10_000);
    c.bench_function("barn get by key", |b| {
        b.iter(|| black_box(barn.get("person4242")))
    });
}

fn barn_find_all(c: &mut Criterion) {
    let shape = person();
    let barn = populated(&shape, 10_000);
    c.bench_function("barn find_all scan", |b| {
        b.iter(|| black_box(barn.find_all(&[("age", Value::Int(42))]).unwrap()))
    });
}

fn text_round_trip(c: &mut Criterion) {
    let text = r#"{"name": "Alice", "home town": "Uppsala", "pets": [{"kind": "cat", "age": 3}, {"kind": "dog", "age": 7}], "address": {"street-name": "Main", "number": 1}}"#;
    let options = ConversionOptions::default();
    c.bench_function("text round trip", |b| {
        b.iter(|| {
            let record = from_text(black_box(text), None).unwrap();
            black_box(to_text(&record, &options).unwrap())
        })
    });
}

criterion_group!(benches, barn_add, barn_get, barn_find_all, text_round_trip);
criterion_main!(benches);
