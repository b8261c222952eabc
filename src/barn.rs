use std::cell::{Ref, RefCell};
use std::ops::{Bound, Range, RangeBounds};
use std::rc::{Rc, Weak};

// the index uses a fast hashing algo, keyrings are hashed on every lookup
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;
use std::collections::HashMap;

// used to print out readable forms of a barn
use std::fmt;

use tracing::debug;

use crate::construct::{IdentityGenerator, Shape};
use crate::datatype::{IntoKeyring, Keyring, Value};
use crate::error::{DatabarnError, Result};
use crate::record::{Record, WeakRecord};

pub type KeyHasher = BuildHasherDefault<SeaHasher>;

pub(crate) type WeakBarn = Weak<RefCell<Stock>>;

// ------------- Barn -------------
pub(crate) struct Stock {
    shape: Option<Rc<Shape>>,
    generator: IdentityGenerator,
    order: Vec<Record>,
    index: HashMap<Keyring, Record, KeyHasher>,
    parent: Option<WeakRecord>,
}

impl Stock {
    fn key_labels(&self, record: &Record) -> Vec<String> {
        // open shapes declare no keys up front, each record carries its own
        match &self.shape {
            Some(shape) if !shape.is_dynamic() => shape.key_labels().to_vec(),
            _ => record.key_labels(),
        }
    }
    fn keyring_of(&self, record: &Record) -> Result<Keyring> {
        let labels = self.key_labels(record);
        if labels.is_empty() {
            return Ok(Keyring::Id(
                record.identity().unwrap_or_else(|| self.generator.peek()),
            ));
        }
        record.key_values(&labels)
    }
    fn keyed_by_identity(&self) -> bool {
        self.shape
            .as_ref()
            .is_none_or(|shape| shape.is_dynamic() || shape.key_labels().is_empty())
    }
    fn lookup(&self, keyring: &Keyring) -> Option<Record> {
        if let Some(record) = self.index.get(keyring) {
            return Some(record.clone());
        }
        // a lone integer doubles as an identity id where records are keyed by id
        if let Keyring::Key(values) = keyring {
            if let [Value::Int(id)] = values.as_slice() {
                if *id >= 0 && self.keyed_by_identity() {
                    return self.index.get(&Keyring::Id(*id as u64)).cloned();
                }
            }
        }
        None
    }
}

fn matches(record: &Record, criteria: &[(&str, Value)]) -> bool {
    criteria
        .iter()
        .all(|(label, value)| record.value(label).is_some_and(|v| v == *value))
}

fn scan_unique(members: &[Record], label: &str, value: &Value, except: Option<&Record>) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    let taken = members
        .iter()
        .filter(|member| except.is_none_or(|except| *member != except))
        .any(|member| member.value(label).is_some_and(|v| v == *value));
    if taken {
        return Err(DatabarnError::UniqueViolation {
            label: label.to_owned(),
            value: value.to_string(),
        });
    }
    Ok(())
}

fn clamp<R: RangeBounds<usize>>(range: R, len: usize) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    let end = end.min(len);
    start.min(end)..end
}

/// Ordered, keyed container of records. Records keep their insertion order,
/// are indexed by their key tuple (or identity id) and are owned by at most
/// one barn. Cloning a `Barn` clones the handle.
#[derive(Clone)]
pub struct Barn(Rc<RefCell<Stock>>);

impl Barn {
    /// A barn accepting records of any shape.
    pub fn new() -> Self {
        Self::from_stock(None)
    }
    /// A barn accepting only records of `shape`.
    pub fn with_shape(shape: &Rc<Shape>) -> Self {
        Self::from_stock(Some(Rc::clone(shape)))
    }
    fn from_stock(shape: Option<Rc<Shape>>) -> Self {
        Barn(Rc::new(RefCell::new(Stock {
            shape,
            generator: IdentityGenerator::new(),
            order: Vec::new(),
            index: HashMap::default(),
            parent: None,
        })))
    }
    pub fn shape(&self) -> Option<Rc<Shape>> {
        self.0.borrow().shape.clone()
    }
    pub fn len(&self) -> usize {
        self.0.borrow().order.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.borrow().order.is_empty()
    }

    /// Adds a record, assigning its identity and filling its auto fields.
    /// Nothing changes unless every check passes.
    pub fn add(&self, record: &Record) -> Result<()> {
        let mut stock = self.0.try_borrow_mut().map_err(|_| DatabarnError::Busy)?;
        if let Some(shape) = &stock.shape {
            let found = record.shape();
            if !Rc::ptr_eq(shape, &found) {
                return Err(DatabarnError::SchemaMismatch {
                    expected: shape.name().to_owned(),
                    found: found.name().to_owned(),
                });
            }
        }
        let owned_here = match record.owner() {
            Some(owner) if owner == *self => true,
            Some(_) => return Err(DatabarnError::AlreadyOwned),
            None => false,
        };
        let keyring = stock.keyring_of(record)?;
        if owned_here || stock.index.contains_key(&keyring) {
            return Err(DatabarnError::DuplicateKey(keyring.to_string()));
        }
        for (label, value) in record.unique_values() {
            scan_unique(&stock.order, &label, &value, None)?;
        }
        let identity = match record.identity() {
            Some(id) => {
                stock.generator.retain(id);
                id
            }
            None => stock.generator.generate(),
        };
        record.attach(Rc::downgrade(&self.0), identity, stock.parent.clone());
        stock.index.insert(keyring.clone(), record.clone());
        stock.order.push(record.clone());
        debug!(key = %keyring, identity, len = stock.order.len(), "record added");
        Ok(())
    }
    /// Adds records in order, stopping at the first failure. Records added
    /// before the failure stay in the barn.
    pub fn add_all<'a, I>(&self, records: I) -> Result<&Self>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        for record in records {
            self.add(record)?;
        }
        Ok(self)
    }

    /// Removes a member, clearing its owner and identity.
    pub fn remove(&self, record: &Record) -> Result<()> {
        let mut stock = self.0.try_borrow_mut().map_err(|_| DatabarnError::Busy)?;
        let missing = || DatabarnError::NotFound(format!("{} record is not in this barn", record.shape()));
        if !record.owned_by(self) {
            return Err(missing());
        }
        let position = stock
            .order
            .iter()
            .position(|member| member == record)
            .ok_or_else(missing)?;
        stock.order.remove(position);
        match stock.keyring_of(record) {
            Ok(keyring) if stock.index.get(&keyring).is_some_and(|m| m == record) => {
                stock.index.remove(&keyring);
            }
            _ => stock.index.retain(|_, member| member != record),
        }
        let clear_parent = stock.parent.is_some();
        record.detach(clear_parent);
        debug!(len = stock.order.len(), "record removed");
        Ok(())
    }
    pub fn remove_key<K: IntoKeyring>(&self, key: K) -> Result<Record> {
        let keyring = key.into_keyring();
        let record = self
            .0
            .try_borrow()
            .map_err(|_| DatabarnError::Busy)?
            .lookup(&keyring)
            .ok_or_else(|| DatabarnError::NotFound(keyring.to_string()))?;
        self.remove(&record)?;
        Ok(record)
    }

    // ------------- lookups -------------
    /// Looks a member up by key value, key tuple or (for barns keyed by
    /// identity) id.
    pub fn get<K: IntoKeyring>(&self, key: K) -> Option<Record> {
        self.0.borrow().lookup(&key.into_keyring())
    }
    /// Like `get`, but checks the key arity against the bound shape and fails
    /// with `NotFound` on a miss.
    pub fn get_required<K: IntoKeyring>(&self, key: K) -> Result<Record> {
        let keyring = key.into_keyring();
        let stock = self.0.borrow();
        if let Some(shape) = stock.shape.as_ref().filter(|shape| !shape.is_dynamic()) {
            let expected = shape.key_labels().len().max(1);
            if keyring.parts() != expected {
                return Err(DatabarnError::KeyArity {
                    expected,
                    found: keyring.parts(),
                });
            }
        }
        stock
            .lookup(&keyring)
            .ok_or_else(|| DatabarnError::NotFound(keyring.to_string()))
    }
    /// Looks a member up by naming every key field, in any order.
    pub fn get_labeled(&self, labeled: &[(&str, Value)]) -> Result<Option<Record>> {
        let stock = self.0.borrow();
        let labels = stock
            .shape
            .as_ref()
            .map(|shape| shape.key_labels().to_vec())
            .unwrap_or_default();
        if labels.is_empty() || labeled.len() != labels.len() {
            return Err(DatabarnError::KeyArity {
                expected: labels.len(),
                found: labeled.len(),
            });
        }
        let mut values = Vec::with_capacity(labels.len());
        for label in &labels {
            let value = labeled
                .iter()
                .find(|(l, _)| *l == label.as_str())
                .map(|(_, v)| v.clone())
                .ok_or(DatabarnError::KeyArity {
                    expected: labels.len(),
                    found: labeled.len(),
                })?;
            values.push(value);
        }
        Ok(stock.lookup(&Keyring::Key(values)))
    }
    pub fn has_key<K: IntoKeyring>(&self, key: K) -> bool {
        self.get(key).is_some()
    }
    /// O(1) membership through the record's owner back-reference.
    pub fn contains(&self, record: &Record) -> bool {
        record.owned_by(self)
    }

    // ------------- searches -------------
    fn check_criteria(stock: &Stock, criteria: &[(&str, Value)]) -> Result<()> {
        if let Some(shape) = &stock.shape {
            if !shape.is_dynamic() {
                if let Some((label, _)) = criteria.iter().find(|(label, _)| !shape.has_field(label)) {
                    return Err(DatabarnError::UnknownField {
                        label: (*label).to_owned(),
                        shape: shape.name().to_owned(),
                    });
                }
            }
        }
        Ok(())
    }
    /// First member, in insertion order, whose fields equal every criterion.
    pub fn find(&self, criteria: &[(&str, Value)]) -> Result<Option<Record>> {
        let stock = self.0.borrow();
        Self::check_criteria(&stock, criteria)?;
        Ok(stock.order.iter().find(|r| matches(r, criteria)).cloned())
    }
    /// Every matching member in insertion order. Empty criteria match all.
    pub fn find_all(&self, criteria: &[(&str, Value)]) -> Result<ResultSet> {
        let stock = self.0.borrow();
        Self::check_criteria(&stock, criteria)?;
        Ok(stock
            .order
            .iter()
            .filter(|r| matches(r, criteria))
            .cloned()
            .collect())
    }

    // ------------- positions -------------
    pub fn at(&self, index: usize) -> Option<Record> {
        self.0.borrow().order.get(index).cloned()
    }
    /// Counts from the end: `at_back(0)` is the last member.
    pub fn at_back(&self, index: usize) -> Option<Record> {
        let stock = self.0.borrow();
        let position = stock.order.len().checked_sub(index.checked_add(1)?)?;
        stock.order.get(position).cloned()
    }
    /// Members in `range`, clamped to the barn's length.
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> ResultSet {
        let stock = self.0.borrow();
        let range = clamp(range, stock.order.len());
        stock.order[range].iter().cloned().collect()
    }
    /// Iterates in insertion order. The barn rejects adds and removes with
    /// `Busy` for as long as the iterator lives.
    pub fn iter(&self) -> BarnIter<'_> {
        BarnIter {
            stock: self.0.borrow(),
            position: 0,
        }
    }
    /// A snapshot of the members, safe to hold while modifying the barn.
    pub fn records(&self) -> Vec<Record> {
        self.0.borrow().order.clone()
    }
    pub fn last_identity(&self) -> u64 {
        self.0.borrow().generator.lower_bound()
    }

    // ------------- family -------------
    pub fn parent(&self) -> Option<Record> {
        self.0.borrow().parent.as_ref().and_then(Record::upgrade)
    }
    pub(crate) fn set_parent(&self, parent: Option<&Record>) -> Result<()> {
        let mut stock = self.0.try_borrow_mut().map_err(|_| DatabarnError::Busy)?;
        stock.parent = parent.map(Record::downgrade);
        let weak = stock.parent.clone();
        for member in &stock.order {
            member.set_parent(weak.clone());
        }
        Ok(())
    }
    pub(crate) fn check_unique(&self, label: &str, value: &Value, except: Option<&Record>) -> Result<()> {
        scan_unique(&self.0.borrow().order, label, value, except)
    }
    pub(crate) fn upgrade(weak: &WeakBarn) -> Option<Barn> {
        weak.upgrade().map(Barn)
    }
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}
impl Default for Barn {
    fn default() -> Self {
        Self::new()
    }
}
impl PartialEq for Barn {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl fmt::Display for Barn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let len = self.len();
        write!(f, "Barn({} record{})", len, if len == 1 { "" } else { "s" })
    }
}
impl fmt::Debug for Barn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let stock = self.0.borrow();
        f.debug_struct("Barn")
            .field("shape", &stock.shape.as_ref().map(|s| s.name().to_owned()))
            .field("records", &stock.order)
            .finish()
    }
}

pub struct BarnIter<'a> {
    stock: Ref<'a, Stock>,
    position: usize,
}
impl Iterator for BarnIter<'_> {
    type Item = Record;
    fn next(&mut self) -> Option<Record> {
        let record = self.stock.order.get(self.position).cloned();
        self.position += 1;
        record
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.stock.order.len().saturating_sub(self.position);
        (rest, Some(rest))
    }
}
impl<'a> IntoIterator for &'a Barn {
    type Item = Record;
    type IntoIter = BarnIter<'a>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ------------- ResultSet -------------
/// Ordered, unindexed sequence of records returned by searches and slices.
/// It holds handles, so the records stay owned by their barn.
#[derive(Clone, Default, PartialEq)]
pub struct ResultSet {
    records: Vec<Record>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }
    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }
    pub fn last(&self) -> Option<&Record> {
        self.records.last()
    }
    pub fn at_back(&self, index: usize) -> Option<&Record> {
        self.records.iter().rev().nth(index)
    }
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> ResultSet {
        let range = clamp(range, self.records.len());
        self.records[range].iter().cloned().collect()
    }
    pub fn records(&self) -> &[Record] {
        &self.records
    }
    pub fn into_vec(self) -> Vec<Record> {
        self.records
    }
}
impl FromIterator<Record> for ResultSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
impl IntoIterator for ResultSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;
    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;
    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let items: Vec<String> = self.records.iter().map(|r| r.to_string()).collect();
        write!(f, "ResultSet[{}]", items.join(", "))
    }
}
impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.records.iter()).finish()
    }
}
