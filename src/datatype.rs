// used for decimal numbers
use bigdecimal::BigDecimal;
// used for dates and timestamps
use chrono::{NaiveDate, NaiveDateTime};

// used to print out readable forms of a data type
use std::fmt;
// used to make key tuples hashable
use std::hash::{Hash, Hasher};
use std::cmp::Ordering;
use std::rc::Rc;

use crate::barn::{Barn, ResultSet};
use crate::construct::Shape;
use crate::record::Record;

// ------------- Data Types --------------
/// Type tag accepted by a field. `Record` and `Barn` may be narrowed to a
/// particular shape; `None` accepts any shape.
#[derive(Clone)]
pub enum DataType {
    Bool,
    Int,
    Float,
    Text,
    Decimal,
    Date,
    DateTime,
    List,
    Map,
    Record(Option<Rc<Shape>>),
    Barn(Option<Rc<Shape>>),
    Results,
}

impl DataType {
    pub fn uid(&self) -> u8 {
        match self {
            DataType::Bool => 1,
            DataType::Int => 2,
            DataType::Float => 3,
            DataType::Text => 4,
            DataType::Decimal => 5,
            DataType::Date => 6,
            DataType::DateTime => 7,
            DataType::List => 8,
            DataType::Map => 9,
            DataType::Record(_) => 10,
            DataType::Barn(_) => 11,
            DataType::Results => 12,
        }
    }
    pub fn data_type(&self) -> &'static str {
        match self {
            DataType::Bool => "Bool",
            DataType::Int => "Int",
            DataType::Float => "Float",
            DataType::Text => "Text",
            DataType::Decimal => "Decimal",
            DataType::Date => "Date",
            DataType::DateTime => "DateTime",
            DataType::List => "List",
            DataType::Map => "Map",
            DataType::Record(_) => "Record",
            DataType::Barn(_) => "Barn",
            DataType::Results => "Results",
        }
    }
    /// True if a non-null `value` is of this type. Null is handled by the field.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (DataType::Bool, Value::Bool(_))
            | (DataType::Int, Value::Int(_))
            | (DataType::Float, Value::Float(_))
            | (DataType::Text, Value::Text(_))
            | (DataType::Decimal, Value::Decimal(_))
            | (DataType::Date, Value::Date(_))
            | (DataType::DateTime, Value::DateTime(_))
            | (DataType::List, Value::List(_))
            | (DataType::Map, Value::Map(_))
            | (DataType::Results, Value::Results(_)) => true,
            (DataType::Record(None), Value::Record(_)) => true,
            (DataType::Record(Some(shape)), Value::Record(record)) => Rc::ptr_eq(shape, &record.shape()),
            (DataType::Barn(None), Value::Barn(_)) => true,
            (DataType::Barn(Some(shape)), Value::Barn(barn)) => barn
                .shape()
                .is_some_and(|bound| Rc::ptr_eq(shape, &bound)),
            _ => false,
        }
    }
    /// The shape a nested record or barn of this type should be built with.
    pub fn nested_shape(&self) -> Option<Rc<Shape>> {
        match self {
            DataType::Record(shape) | DataType::Barn(shape) => shape.clone(),
            _ => None,
        }
    }
}
impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DataType::Record(a), DataType::Record(b)) | (DataType::Barn(a), DataType::Barn(b)) => {
                match (a, b) {
                    (None, None) => true,
                    (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                    _ => false,
                }
            }
            _ => self.uid() == other.uid(),
        }
    }
}
impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataType::Record(Some(shape)) => write!(f, "Record<{}>", shape.name()),
            DataType::Barn(Some(shape)) => write!(f, "Barn<{}>", shape.name()),
            _ => write!(f, "{}", self.data_type()),
        }
    }
}
impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

// ------------- Value -------------
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Decimal(BigDecimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
    Map(Mapping),
    Record(Record),
    Barn(Barn),
    Results(ResultSet),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Text(_) => "Text",
            Value::Decimal(_) => "Decimal",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Record(_) => "Record",
            Value::Barn(_) => "Barn",
            Value::Results(_) => "Results",
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
    pub fn as_map(&self) -> Option<&Mapping> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }
    pub fn as_barn(&self) -> Option<&Barn> {
        match self {
            Value::Barn(b) => Some(b),
            _ => None,
        }
    }
    pub fn as_results(&self) -> Option<&ResultSet> {
        match self {
            Value::Results(r) => Some(r),
            _ => None,
        }
    }

    // Hash and equality used by the barn index, where floats compare by bits
    // (signed zeros aside).
    fn key_hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => (),
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(x) => float_key(*x).hash(state),
            Value::Text(s) => s.hash(state),
            Value::Decimal(d) => d.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(d) => d.hash(state),
            Value::List(items) => {
                items.len().hash(state);
                for item in items {
                    item.key_hash(state);
                }
            }
            Value::Map(m) => {
                m.len().hash(state);
                for (k, v) in m.iter() {
                    k.hash(state);
                    v.key_hash(state);
                }
            }
            Value::Record(r) => r.addr().hash(state),
            Value::Barn(b) => b.addr().hash(state),
            Value::Results(rs) => {
                for r in rs.iter() {
                    r.addr().hash(state);
                }
            }
        }
    }
    fn key_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => float_key(*a) == float_key(*b),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.key_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| ka == kb && va.key_eq(vb))
            }
            _ => self == other,
        }
    }
}

// -0.0 == 0.0, so both must land on the same index key
fn float_key(x: f64) -> u64 {
    if x == 0.0 { 0.0f64.to_bits() } else { x.to_bits() }
}

// Equality is variant-strict: Int(1) is not Float(1.0). Records and barns
// compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Barn(a), Value::Barn(b)) => a == b,
            (Value::Results(a), Value::Results(b)) => a == b,
            _ => false,
        }
    }
}

// Ordering only exists between scalars of the same variant.
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Date(d) => write!(f, "{}", d),
            Value::DateTime(d) => write!(f, "{}", d),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Map(m) => write!(f, "{}", m),
            Value::Record(r) => write!(f, "{}", r),
            Value::Barn(b) => write!(f, "{}", b),
            Value::Results(rs) => write!(f, "{}", rs),
        }
    }
}

macro_rules! value_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(v: $source) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}
value_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    u32 => Int,
    f64 => Float,
    f32 => Float,
    String => Text,
    &str => Text,
    BigDecimal => Decimal,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    Vec<Value> => List,
    Mapping => Map,
    Record => Record,
    Barn => Barn,
    ResultSet => Results,
}
impl From<&Record> for Value {
    fn from(r: &Record) -> Self {
        Value::Record(r.clone())
    }
}
impl From<&Barn> for Value {
    fn from(b: &Barn) -> Self {
        Value::Barn(b.clone())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ------------- Mapping -------------
/// Generic ordered mapping from external key to value, the shape-less
/// counterpart of a record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<(String, Value)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }
    /// Inserts or replaces; a replaced key keeps its position.
    pub fn insert<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (k, v) in iter {
            mapping.insert(k, v);
        }
        mapping
    }
}
impl IntoIterator for Mapping {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let items: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{:?}: {}", k, v))
            .collect();
        write!(f, "{{{}}}", items.join(", "))
    }
}

// ------------- Keyring -------------
/// Index key of a barn member: the ordered values of its key fields, or its
/// identity id when no key fields are declared.
#[derive(Clone, Debug)]
pub enum Keyring {
    Id(u64),
    Key(Vec<Value>),
}

impl Keyring {
    pub fn parts(&self) -> usize {
        match self {
            Keyring::Id(_) => 1,
            Keyring::Key(values) => values.len(),
        }
    }
}
impl PartialEq for Keyring {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Keyring::Id(a), Keyring::Id(b)) => a == b,
            (Keyring::Key(a), Keyring::Key(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.key_eq(y))
            }
            _ => false,
        }
    }
}
impl Eq for Keyring {}
impl Hash for Keyring {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Keyring::Id(id) => {
                0u8.hash(state);
                id.hash(state);
            }
            Keyring::Key(values) => {
                1u8.hash(state);
                for v in values {
                    v.key_hash(state);
                }
            }
        }
    }
}
impl fmt::Display for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Keyring::Id(id) => write!(f, "#{}", id),
            Keyring::Key(values) if values.len() == 1 => write!(f, "{}", values[0]),
            Keyring::Key(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// Anything that can be used to look a record up in a barn: a single key
/// value, a tuple of values for composite keys, or a ready keyring.
pub trait IntoKeyring {
    fn into_keyring(self) -> Keyring;
}
impl IntoKeyring for Keyring {
    fn into_keyring(self) -> Keyring {
        self
    }
}
impl IntoKeyring for Vec<Value> {
    fn into_keyring(self) -> Keyring {
        Keyring::Key(self)
    }
}
macro_rules! single_keyring {
    ($($source:ty),* $(,)?) => {
        $(
            impl IntoKeyring for $source {
                fn into_keyring(self) -> Keyring {
                    Keyring::Key(vec![Value::from(self)])
                }
            }
        )*
    };
}
single_keyring!(Value, bool, i64, i32, u32, f64, String, &str, BigDecimal, NaiveDate, NaiveDateTime);

impl<A: Into<Value>, B: Into<Value>> IntoKeyring for (A, B) {
    fn into_keyring(self) -> Keyring {
        Keyring::Key(vec![self.0.into(), self.1.into()])
    }
}
impl<A: Into<Value>, B: Into<Value>, C: Into<Value>> IntoKeyring for (A, B, C) {
    fn into_keyring(self) -> Keyring {
        Keyring::Key(vec![self.0.into(), self.1.into(), self.2.into()])
    }
}
