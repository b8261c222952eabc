use std::rc::Rc;

// label lookups use a fast hashing algo since labels are short strings
use core::hash::BuildHasherDefault;
use std::collections::{HashMap, HashSet};
use seahash::SeaHasher;

// used to print out readable forms of a construct
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::barn::Barn;
use crate::datatype::{DataType, Value};
use crate::error::{DatabarnError, Result};

pub type LabelHasher = BuildHasherDefault<SeaHasher>;

/// Name under which a record keeps its metadata handle; no field may use it.
pub const RESERVED_LABEL: &str = "__dna__";

lazy_static! {
    pub(crate) static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

pub(crate) fn check_label(label: &str) -> Result<()> {
    if label == RESERVED_LABEL {
        return Err(DatabarnError::InvalidLabel(format!(
            "'{}' is reserved for record metadata",
            label
        )));
    }
    if !IDENTIFIER.is_match(label) {
        return Err(DatabarnError::InvalidLabel(format!(
            "'{}' is not a valid field identifier",
            label
        )));
    }
    Ok(())
}

// ------------- Identity -------------
pub type Identity = u64;

pub const GENESIS: Identity = 0;

/// Monotonic identity source. Every barn owns one; ids are never handed out twice.
#[derive(Debug)]
pub struct IdentityGenerator {
    lower_bound: Identity,
}

impl IdentityGenerator {
    pub fn new() -> Self {
        Self { lower_bound: GENESIS }
    }
    // Ids handed out elsewhere (for instance restored from a mapping) are
    // retained so that they are not generated again.
    pub fn retain(&mut self, id: Identity) {
        if id > self.lower_bound {
            self.lower_bound = id;
        }
    }
    pub fn peek(&self) -> Identity {
        self.lower_bound + 1
    }
    pub fn generate(&mut self) -> Identity {
        self.lower_bound += 1;
        self.lower_bound
    }
    pub fn lower_bound(&self) -> Identity {
        self.lower_bound
    }
}
impl Default for IdentityGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- FieldSpec -------------
pub type Factory = Rc<dyn Fn() -> Value>;

/// Declarative constraint for one named attribute of a shape.
#[derive(Clone)]
pub struct FieldSpec {
    label: String,
    types: Vec<DataType>,
    required: bool,
    frozen: bool,
    auto: bool,
    key: bool,
    unique: bool,
    comparable: bool,
    default: Option<Value>,
    factory: Option<Factory>,
    key_name: Option<String>,
}

impl FieldSpec {
    pub fn new<S: Into<String>>(label: S) -> Self {
        Self {
            label: label.into(),
            types: Vec::new(),
            required: false,
            frozen: false,
            auto: false,
            key: false,
            unique: false,
            comparable: false,
            default: None,
            factory: None,
            key_name: None,
        }
    }
    // builder style declaration
    pub fn of(mut self, data_type: DataType) -> Self {
        self.types.push(data_type);
        self
    }
    pub fn of_any<I: IntoIterator<Item = DataType>>(mut self, types: I) -> Self {
        self.types.extend(types);
        self
    }
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }
    pub fn auto(mut self) -> Self {
        self.auto = true;
        self
    }
    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
    pub fn comparable(mut self) -> Self {
        self.comparable = true;
        self
    }
    pub fn default_value<V: Into<Value>>(mut self, value: V) -> Self {
        self.default = Some(value.into());
        self
    }
    pub fn factory<F: Fn() -> Value + 'static>(mut self, factory: F) -> Self {
        self.factory = Some(Rc::new(factory));
        self
    }
    pub fn key_name<S: Into<String>>(mut self, key_name: S) -> Self {
        self.key_name = Some(key_name.into());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn types(&self) -> &[DataType] {
        &self.types
    }
    pub fn is_required(&self) -> bool {
        self.required
    }
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
    pub fn is_auto(&self) -> bool {
        self.auto
    }
    pub fn is_key(&self) -> bool {
        self.key
    }
    pub fn is_unique(&self) -> bool {
        self.unique
    }
    pub fn is_comparable(&self) -> bool {
        self.comparable
    }
    pub fn get_default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }
    /// External spelling used when the record is turned into a mapping.
    pub fn external_name(&self) -> &str {
        self.key_name.as_deref().unwrap_or(&self.label)
    }
    pub fn get_key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }
    pub(crate) fn set_key_name(&mut self, key_name: String) {
        self.key_name = Some(key_name);
    }

    /// Null passes unless the field is required; anything else must match
    /// one of the accepted types, if any are declared.
    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if self.required {
                return Err(DatabarnError::RequiredViolation(self.label.clone()));
            }
            return Ok(());
        }
        if !self.types.is_empty() && !self.types.iter().any(|t| t.accepts(value)) {
            let expected: Vec<String> = self.types.iter().map(|t| t.to_string()).collect();
            return Err(DatabarnError::TypeMismatch {
                label: self.label.clone(),
                expected: expected.join(" | "),
                found: value.type_name().to_string(),
            });
        }
        Ok(())
    }
    pub fn resolve_default(&self) -> Value {
        if let Some(value) = &self.default {
            return value.clone();
        }
        match &self.factory {
            Some(factory) => factory(),
            None => Value::Null,
        }
    }
    /// The shape nested mappings assigned to this field should take, if the
    /// field narrows its record or barn type to one.
    pub fn nested_shape(&self) -> Option<Rc<Shape>> {
        self.types.iter().find_map(DataType::nested_shape)
    }
    pub fn accepts_barn(&self) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| matches!(t, DataType::Barn(_)))
    }
}
impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("label", &self.label)
            .field("types", &self.types)
            .field("required", &self.required)
            .field("frozen", &self.frozen)
            .field("auto", &self.auto)
            .field("key", &self.key)
            .field("unique", &self.unique)
            .field("comparable", &self.comparable)
            .field("default", &self.default)
            .field("factory", &self.factory.is_some())
            .field("key_name", &self.key_name)
            .finish()
    }
}

// ------------- Shape -------------
/// The set of field specs a record conforms to. A dynamic shape starts
/// without fields and its records grow their own through `add_field`.
pub struct Shape {
    name: String,
    fields: Vec<FieldSpec>,
    lookup: HashMap<String, usize, LabelHasher>,
    key_labels: Vec<String>,
    dynamic: bool,
}

impl Shape {
    pub fn builder<S: Into<String>>(name: S) -> ShapeBuilder {
        ShapeBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }
    pub fn open<S: Into<String>>(name: S) -> Rc<Shape> {
        Rc::new(Self {
            name: name.into(),
            fields: Vec::new(),
            lookup: HashMap::default(),
            key_labels: Vec::new(),
            dynamic: true,
        })
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
    pub fn field(&self, label: &str) -> Option<&FieldSpec> {
        self.lookup.get(label).map(|&i| &self.fields[i])
    }
    pub fn has_field(&self, label: &str) -> bool {
        self.lookup.contains_key(label)
    }
    pub fn key_labels(&self) -> &[String] {
        &self.key_labels
    }
    pub fn is_composite_key(&self) -> bool {
        self.key_labels.len() > 1
    }
}
impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Shape")
            .field("name", &self.name)
            .field("dynamic", &self.dynamic)
            .field("fields", &self.fields)
            .finish()
    }
}
impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

pub struct ShapeBuilder {
    name: String,
    fields: Vec<FieldSpec>,
}

impl ShapeBuilder {
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }
    /// A field holding a barn of `child` records, created empty for every new
    /// record. Records added to it get the owning record as their parent.
    pub fn child_barn<S: Into<String>>(self, label: S, child: &Rc<Shape>) -> Self {
        let shape = Rc::clone(child);
        let spec = FieldSpec::new(label)
            .of(DataType::Barn(Some(Rc::clone(child))))
            .factory(move || Value::Barn(Barn::with_shape(&shape)));
        self.field(spec)
    }
    /// A field holding a single `child` record, null until assigned.
    pub fn child_record<S: Into<String>>(self, label: S, child: &Rc<Shape>) -> Self {
        self.field(FieldSpec::new(label).of(DataType::Record(Some(Rc::clone(child)))))
    }
    /// Checks the declaration. A shape declared without any field is dynamic.
    pub fn build(self) -> Result<Rc<Shape>> {
        let mut lookup: HashMap<String, usize, LabelHasher> = HashMap::default();
        let mut seen_names: HashSet<String, LabelHasher> = HashSet::default();
        let mut key_labels = Vec::new();
        for (i, spec) in self.fields.iter().enumerate() {
            check_label(spec.label()).map_err(|e| {
                DatabarnError::InvalidShape(format!("{}: {}", self.name, e))
            })?;
            if lookup.insert(spec.label().to_owned(), i).is_some() {
                return Err(DatabarnError::InvalidShape(format!(
                    "{}: field '{}' is declared twice",
                    self.name,
                    spec.label()
                )));
            }
            if !seen_names.insert(spec.external_name().to_owned()) {
                return Err(DatabarnError::InvalidShape(format!(
                    "{}: external name '{}' is used twice",
                    self.name,
                    spec.external_name()
                )));
            }
            if spec.is_auto() {
                if spec.get_default().is_some() || spec.has_factory() {
                    return Err(DatabarnError::InvalidShape(format!(
                        "{}: auto field '{}' cannot have a default or factory",
                        self.name,
                        spec.label()
                    )));
                }
                if !spec.types().is_empty() && !spec.types().contains(&DataType::Int) {
                    return Err(DatabarnError::InvalidShape(format!(
                        "{}: auto field '{}' must accept Int",
                        self.name,
                        spec.label()
                    )));
                }
            }
            // all key fields make up one composite key
            if spec.is_key() {
                key_labels.push(spec.label().to_owned());
            }
        }
        let dynamic = self.fields.is_empty();
        Ok(Rc::new(Shape {
            name: self.name,
            fields: self.fields,
            lookup,
            key_labels,
            dynamic,
        }))
    }
}
