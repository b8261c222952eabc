use std::cell::RefCell;
use std::rc::{Rc, Weak};

// used to print out readable forms of a record
use std::fmt;

use tracing::trace;

use crate::barn::{Barn, WeakBarn};
use crate::construct::{check_label, FieldSpec, Identity, IdentityGenerator, Shape};
use crate::datatype::{Keyring, Mapping, Value};
use crate::error::{DatabarnError, Result};
use crate::marshal;

pub(crate) type WeakRecord = Weak<RefCell<Meta>>;

// A field spec together with the value currently held for it.
struct Slot {
    spec: FieldSpec,
    value: Value,
    was_set: bool,
}

// Per-record bookkeeping: the field table, the identity handed out by a barn,
// the owning barn and the parent back-reference. Neither of the two references
// keeps anything alive.
pub(crate) struct Meta {
    shape: Rc<Shape>,
    slots: Vec<Slot>,
    identity: Option<Identity>,
    owner: Option<WeakBarn>,
    parent: Option<WeakRecord>,
}

impl Meta {
    fn slot(&self, label: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.spec.label() == label)
    }
    fn slot_mut(&mut self, label: &str) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.spec.label() == label)
    }
    fn unknown(&self, label: &str) -> DatabarnError {
        DatabarnError::UnknownField {
            label: label.to_owned(),
            shape: self.shape.name().to_owned(),
        }
    }
    fn owner(&self) -> Option<Barn> {
        self.owner.as_ref().and_then(Barn::upgrade)
    }
}

/// One instance of a shape. Cloning a `Record` clones the handle, not the
/// values; `==` compares identity.
#[derive(Clone)]
pub struct Record(Rc<RefCell<Meta>>);

impl Record {
    pub fn new(shape: &Rc<Shape>) -> Result<Record> {
        Self::create(shape, Vec::new(), Vec::<(&str, Value)>::new())
    }
    pub fn from_pairs<K, S>(shape: &Rc<Shape>, kwargs: K) -> Result<Record>
    where
        K: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        Self::create(shape, Vec::new(), kwargs)
    }
    /// A record of a fresh dynamic shape holding exactly `kwargs`.
    pub fn open<K, S>(kwargs: K) -> Result<Record>
    where
        K: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        Self::create(&Shape::open("Record"), Vec::new(), kwargs)
    }
    /// Positional values fill declared fields in order, keyword values go
    /// by label (creating fields on a dynamic shape), and every field left
    /// unset receives its default. Auto fields stay null until a barn numbers
    /// them.
    pub fn create<A, K, S>(shape: &Rc<Shape>, args: A, kwargs: K) -> Result<Record>
    where
        A: IntoIterator<Item = Value>,
        K: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        let slots = shape
            .fields()
            .iter()
            .map(|spec| Slot {
                spec: spec.clone(),
                value: Value::Null,
                was_set: false,
            })
            .collect();
        let record = Record(Rc::new(RefCell::new(Meta {
            shape: Rc::clone(shape),
            slots,
            identity: None,
            owner: None,
            parent: None,
        })));
        for (index, value) in args.into_iter().enumerate() {
            let label = record
                .0
                .borrow()
                .slots
                .get(index)
                .map(|slot| slot.spec.label().to_owned())
                .ok_or_else(|| DatabarnError::UnknownField {
                    label: format!("#{}", index),
                    shape: shape.name().to_owned(),
                })?;
            record.set(&label, value)?;
        }
        for (label, value) in kwargs {
            let label = label.as_ref();
            if shape.is_dynamic() && !record.has_field(label) {
                record.add_field(FieldSpec::new(label), value)?;
            } else {
                record.set(label, value)?;
            }
        }
        let pending: Vec<FieldSpec> = record
            .0
            .borrow()
            .slots
            .iter()
            .filter(|slot| !slot.was_set && !slot.spec.is_auto())
            .map(|slot| slot.spec.clone())
            .collect();
        for spec in pending {
            record.set(spec.label(), spec.resolve_default())?;
        }
        Ok(record)
    }

    // ------------- field access -------------
    pub fn get(&self, label: &str) -> Result<Value> {
        let meta = self.0.borrow();
        meta.slot(label)
            .map(|slot| slot.value.clone())
            .ok_or_else(|| meta.unknown(label))
    }
    /// Like `get`, with `None` for a label the record does not have.
    pub fn value(&self, label: &str) -> Option<Value> {
        self.0.borrow().slot(label).map(|slot| slot.value.clone())
    }
    pub fn has_field(&self, label: &str) -> bool {
        self.0.borrow().slot(label).is_some()
    }
    /// True once the field received its first assignment.
    pub fn was_set(&self, label: &str) -> Result<bool> {
        let meta = self.0.borrow();
        meta.slot(label)
            .map(|slot| slot.was_set)
            .ok_or_else(|| meta.unknown(label))
    }

    /// Validated assignment. The first assignment of a frozen field locks it,
    /// auto fields are never client-settable, and key fields are immutable
    /// while the record belongs to a barn.
    pub fn set<V: Into<Value>>(&self, label: &str, value: V) -> Result<()> {
        let value = value.into();
        let (spec, was_set, owner) = {
            let meta = self.0.borrow();
            let slot = meta.slot(label).ok_or_else(|| meta.unknown(label))?;
            (slot.spec.clone(), slot.was_set, meta.owner())
        };
        if spec.is_auto() {
            if !was_set && value.is_null() {
                return Ok(());
            }
            return Err(DatabarnError::FrozenViolation(label.to_owned()));
        }
        spec.validate(&value)?;
        if spec.is_frozen() && was_set {
            return Err(DatabarnError::FrozenViolation(label.to_owned()));
        }
        if let Some(barn) = &owner {
            if spec.is_key() {
                return Err(DatabarnError::KeyImmutable(label.to_owned()));
            }
            if spec.is_unique() {
                barn.check_unique(label, &value, Some(self))?;
            }
        }
        self.adopt(&value)?;
        let previous = self.0.borrow_mut().slot_mut(label).map(|slot| {
            slot.was_set = true;
            std::mem::replace(&mut slot.value, value)
        });
        if let Some(previous) = previous {
            self.release(&previous, label);
        }
        trace!(label, "field assigned");
        Ok(())
    }

    /// Adds a field to a record of a dynamic shape.
    pub fn add_field<V: Into<Value>>(&self, spec: FieldSpec, value: V) -> Result<()> {
        let value = value.into();
        let owner = {
            let meta = self.0.borrow();
            if !meta.shape.is_dynamic() {
                return Err(DatabarnError::StaticSchemaViolation(meta.shape.name().to_owned()));
            }
            if meta.slot(spec.label()).is_some() {
                return Err(DatabarnError::InvalidLabel(format!(
                    "field '{}' already exists",
                    spec.label()
                )));
            }
            meta.owner()
        };
        check_label(spec.label())?;
        if spec.is_auto() {
            if spec.get_default().is_some() || spec.has_factory() {
                return Err(DatabarnError::InvalidShape(format!(
                    "auto field '{}' cannot have a default or factory",
                    spec.label()
                )));
            }
            if !value.is_null() {
                return Err(DatabarnError::FrozenViolation(spec.label().to_owned()));
            }
        }
        spec.validate(&value)?;
        if let Some(barn) = &owner {
            if spec.is_key() {
                return Err(DatabarnError::KeyImmutable(spec.label().to_owned()));
            }
            if spec.is_unique() {
                barn.check_unique(spec.label(), &value, Some(self))?;
            }
        }
        self.adopt(&value)?;
        trace!(label = spec.label(), "dynamic field added");
        let was_set = !spec.is_auto();
        self.0.borrow_mut().slots.push(Slot { spec, value, was_set });
        Ok(())
    }

    /// Removes a field from a record of a dynamic shape, returning its value.
    pub fn remove_field(&self, label: &str) -> Result<Value> {
        let slot = {
            let mut meta = self.0.borrow_mut();
            if !meta.shape.is_dynamic() {
                return Err(DatabarnError::StaticSchemaViolation(meta.shape.name().to_owned()));
            }
            let position = meta
                .slots
                .iter()
                .position(|s| s.spec.label() == label)
                .ok_or_else(|| meta.unknown(label))?;
            if meta.slots[position].spec.is_key() && meta.owner().is_some() {
                return Err(DatabarnError::KeyImmutable(label.to_owned()));
            }
            meta.slots.remove(position)
        };
        self.release(&slot.value, label);
        trace!(label, "dynamic field removed");
        Ok(slot.value)
    }

    /// Overrides the external spelling used for `label` in mappings and text.
    pub fn set_key_name<S: Into<String>>(&self, label: &str, key_name: S) -> Result<()> {
        let mut meta = self.0.borrow_mut();
        match meta.slot_mut(label) {
            Some(slot) => {
                slot.spec.set_key_name(key_name.into());
                Ok(())
            }
            None => Err(meta.unknown(label)),
        }
    }

    // Puts back an auto value read from a mapping. A non-negative id also
    // becomes the identity, which the next barn keeps instead of numbering.
    pub(crate) fn restore_auto(&self, label: &str, value: Value) -> Result<()> {
        let mut meta = self.0.borrow_mut();
        let spec = match meta.slot(label) {
            Some(slot) if slot.spec.is_auto() => slot.spec.clone(),
            Some(_) => return Err(DatabarnError::InvalidShape(format!("'{}' is not an auto field", label))),
            None => return Err(meta.unknown(label)),
        };
        spec.validate(&value)?;
        if value.is_null() {
            return Ok(());
        }
        let Value::Int(id) = value else {
            return Err(DatabarnError::TypeMismatch {
                label: label.to_owned(),
                expected: "Int".to_owned(),
                found: value.type_name().to_owned(),
            });
        };
        if id >= 0 && meta.identity.is_none() {
            meta.identity = Some(id as Identity);
        }
        if let Some(slot) = meta.slot_mut(label) {
            slot.value = value;
            slot.was_set = true;
        }
        trace!(label, id, "auto value restored");
        Ok(())
    }

    // ------------- introspection -------------
    pub fn shape(&self) -> Rc<Shape> {
        Rc::clone(&self.0.borrow().shape)
    }
    pub fn is_dynamic(&self) -> bool {
        self.0.borrow().shape.is_dynamic()
    }
    pub fn field(&self, label: &str) -> Option<FieldSpec> {
        self.0.borrow().slot(label).map(|slot| slot.spec.clone())
    }
    /// The instance field table, including dynamically added fields.
    pub fn fields(&self) -> Vec<FieldSpec> {
        self.0.borrow().slots.iter().map(|slot| slot.spec.clone()).collect()
    }
    pub fn labels(&self) -> Vec<String> {
        self.0
            .borrow()
            .slots
            .iter()
            .map(|slot| slot.spec.label().to_owned())
            .collect()
    }
    pub fn values(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .slots
            .iter()
            .map(|slot| (slot.spec.label().to_owned(), slot.value.clone()))
            .collect()
    }
    pub(crate) fn external_entries(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .slots
            .iter()
            .map(|slot| (slot.spec.external_name().to_owned(), slot.value.clone()))
            .collect()
    }
    pub fn key_labels(&self) -> Vec<String> {
        self.0
            .borrow()
            .slots
            .iter()
            .filter(|slot| slot.spec.is_key())
            .map(|slot| slot.spec.label().to_owned())
            .collect()
    }
    /// The record's own key tuple, or its identity id if it declares no key
    /// fields. `None` while a key field is null or no id was assigned yet.
    pub fn keyring(&self) -> Option<Keyring> {
        let labels = self.key_labels();
        if labels.is_empty() {
            return self.identity().map(Keyring::Id);
        }
        self.key_values(&labels).ok()
    }
    pub(crate) fn key_values(&self, labels: &[String]) -> Result<Keyring> {
        let meta = self.0.borrow();
        let mut values = Vec::with_capacity(labels.len());
        for label in labels {
            let slot = meta.slot(label).ok_or_else(|| meta.unknown(label))?;
            if slot.value.is_null() {
                return Err(DatabarnError::MissingKey(label.clone()));
            }
            values.push(slot.value.clone());
        }
        Ok(Keyring::Key(values))
    }
    pub(crate) fn unique_values(&self) -> Vec<(String, Value)> {
        self.0
            .borrow()
            .slots
            .iter()
            .filter(|slot| slot.spec.is_unique() && !slot.value.is_null())
            .map(|slot| (slot.spec.label().to_owned(), slot.value.clone()))
            .collect()
    }

    // ------------- metadata -------------
    pub fn identity(&self) -> Option<Identity> {
        self.0.borrow().identity
    }
    /// Assigns an identity from `generator` unless the record already has one.
    pub fn ensure_identity(&self, generator: &mut IdentityGenerator) -> Identity {
        let mut meta = self.0.borrow_mut();
        match meta.identity {
            Some(id) => id,
            None => {
                let id = generator.generate();
                meta.identity = Some(id);
                id
            }
        }
    }
    pub fn owner(&self) -> Option<Barn> {
        self.0.borrow().owner()
    }
    pub fn parent(&self) -> Option<Record> {
        self.0.borrow().parent.as_ref().and_then(Record::upgrade)
    }

    pub(crate) fn owned_by(&self, barn: &Barn) -> bool {
        self.owner().is_some_and(|owner| owner == *barn)
    }
    pub(crate) fn attach(&self, owner: WeakBarn, identity: Identity, parent: Option<WeakRecord>) {
        let mut meta = self.0.borrow_mut();
        meta.owner = Some(owner);
        meta.identity = Some(identity);
        if parent.is_some() {
            meta.parent = parent;
        }
        for slot in meta.slots.iter_mut() {
            if slot.spec.is_auto() && slot.value.is_null() {
                slot.value = Value::Int(identity as i64);
                slot.was_set = true;
            }
        }
    }
    pub(crate) fn detach(&self, clear_parent: bool) {
        let mut meta = self.0.borrow_mut();
        meta.owner = None;
        meta.identity = None;
        if clear_parent {
            meta.parent = None;
        }
    }
    pub(crate) fn set_parent(&self, parent: Option<WeakRecord>) {
        self.0.borrow_mut().parent = parent;
    }
    pub(crate) fn downgrade(&self) -> WeakRecord {
        Rc::downgrade(&self.0)
    }
    pub(crate) fn upgrade(weak: &WeakRecord) -> Option<Record> {
        weak.upgrade().map(Record)
    }
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    // children assigned to a field point back at this record
    fn adopt(&self, value: &Value) -> Result<()> {
        match value {
            Value::Record(child) => child.set_parent(Some(self.downgrade())),
            Value::Barn(barn) => barn.set_parent(Some(self))?,
            _ => (),
        }
        Ok(())
    }
    // a child replaced or removed from a field forgets this record
    fn release(&self, value: &Value, label: &str) {
        if matches!(value, Value::Record(_) | Value::Barn(_))
            && self.0.borrow().slots.iter().any(|slot| slot.value == *value)
        {
            return;
        }
        match value {
            Value::Record(child) if child.parent().is_some_and(|p| p == *self) => {
                child.set_parent(None);
            }
            Value::Barn(barn) if barn.parent().is_some_and(|p| p == *self) => {
                if barn.set_parent(None).is_err() {
                    trace!(label, "released barn is busy, parent left in place");
                }
            }
            _ => (),
        }
    }

    // ------------- comparison -------------
    fn comparable_pairs(&self, other: &Record) -> Result<Vec<(Value, Option<Value>)>> {
        let pairs: Vec<(String, Value)> = {
            let meta = self.0.borrow();
            meta.slots
                .iter()
                .filter(|slot| slot.spec.is_comparable())
                .map(|slot| (slot.spec.label().to_owned(), slot.value.clone()))
                .collect()
        };
        if pairs.is_empty() {
            return Err(DatabarnError::ComparisonUnsupported(self.shape().name().to_owned()));
        }
        Ok(pairs
            .into_iter()
            .map(|(label, value)| (value, other.value(&label)))
            .collect())
    }
    /// Equal iff every comparable field is pairwise equal.
    pub fn try_eq(&self, other: &Record) -> Result<bool> {
        Ok(self
            .comparable_pairs(other)?
            .iter()
            .all(|(a, b)| b.as_ref().is_some_and(|b| a == b)))
    }
    pub fn try_ne(&self, other: &Record) -> Result<bool> {
        self.try_eq(other).map(|eq| !eq)
    }
    /// Less iff every comparable field is strictly less; the order is
    /// conjunctive, so mixed results make every relation false.
    pub fn try_lt(&self, other: &Record) -> Result<bool> {
        Ok(self
            .comparable_pairs(other)?
            .iter()
            .all(|(a, b)| b.as_ref().is_some_and(|b| a < b)))
    }
    pub fn try_le(&self, other: &Record) -> Result<bool> {
        Ok(self
            .comparable_pairs(other)?
            .iter()
            .all(|(a, b)| b.as_ref().is_some_and(|b| a <= b)))
    }
    pub fn try_gt(&self, other: &Record) -> Result<bool> {
        Ok(self
            .comparable_pairs(other)?
            .iter()
            .all(|(a, b)| b.as_ref().is_some_and(|b| a > b)))
    }
    pub fn try_ge(&self, other: &Record) -> Result<bool> {
        Ok(self
            .comparable_pairs(other)?
            .iter()
            .all(|(a, b)| b.as_ref().is_some_and(|b| a >= b)))
    }

    // ------------- conversion -------------
    pub fn to_mapping(&self) -> Mapping {
        marshal::to_mapping(self)
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let meta = self.0.borrow();
        let items: Vec<String> = meta
            .slots
            .iter()
            .map(|slot| format!("{}={}", slot.spec.label(), slot.value))
            .collect();
        write!(f, "{}({})", meta.shape.name(), items.join(", "))
    }
}
impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.identity() {
            Some(id) => write!(f, "{}#{}", self, id),
            None => write!(f, "{}", self),
        }
    }
}
