//! Databarn – schema-aware in-memory records, keyed containers and mapping conversion.
//!
//! Databarn centers on the *record*: one instance of a [`construct::Shape`],
//! holding a value per field plus a small metadata handle. Around it:
//! * A [`construct::FieldSpec`] declares one attribute: accepted types, and the
//!   `required`, `frozen`, `auto`, `key`, `unique` and `comparable` flags plus
//!   an optional default or factory.
//! * A [`construct::Shape`] is the ordered field table a record conforms to. A
//!   shape declared without fields is *dynamic*: its records grow their own
//!   fields through [`record::Record::add_field`].
//! * A [`barn::Barn`] is an ordered, keyed container. Records are indexed by
//!   their key tuple, or by a barn-scoped identity id when no key field exists,
//!   and belong to at most one barn at a time.
//! * A [`barn::ResultSet`] is the unindexed, ordered answer to searches and slices.
//!
//! Every assignment goes through [`record::Record::set`], which validates the
//! value against the field spec and enforces the field's flags. Violations are
//! reported synchronously as [`error::DatabarnError`] variants; plain lookup
//! misses are `None` rather than errors.
//!
//! ## Modules
//! * [`construct`] – field specs, shapes and the identity generator.
//! * [`datatype`] – the dynamic [`datatype::Value`], type tags, mappings and key tuples.
//! * [`record`] – records and their metadata (identity, owner, parent).
//! * [`barn`] – the container, its fail-fast iterator and result sets.
//! * [`marshal`] – record ⇄ mapping ⇄ JSON text conversion with key sanitizing.
//! * [`options`] – conversion options, loadable through the `config` crate.
//!
//! ## Ownership
//! Records and barns are shared handles (`Rc<RefCell<..>>`); cloning one clones
//! the handle. A record points back at its owning barn and at its parent
//! record through weak references only, so neither keeps anything alive. The
//! crate is single-threaded by construction.
//!
//! ## Quick Start
//! ```
//! use databarn::construct::{FieldSpec, Shape};
//! use databarn::datatype::{DataType, Value};
//! use databarn::barn::Barn;
//! use databarn::record::Record;
//!
//! let person = Shape::builder("Person")
//!     .field(FieldSpec::new("name").of(DataType::Text).key())
//!     .field(FieldSpec::new("age").of(DataType::Int))
//!     .build()
//!     .unwrap();
//! let people = Barn::with_shape(&person);
//! for (name, age) in [("Alice", 25), ("Bob", 25)] {
//!     let record = Record::from_pairs(&person, [("name", Value::from(name)), ("age", Value::from(age))]).unwrap();
//!     people.add(&record).unwrap();
//! }
//! assert_eq!(people.find_all(&[("age", Value::Int(25))]).unwrap().len(), 2);
//! let alice = people.get("Alice").unwrap();
//! assert_eq!(alice.to_string(), "Person(name=\"Alice\", age=25)");
//! ```
//!
//! ## Conversion
//! [`marshal::from_text`] parses JSON into a record graph: objects become
//! records, arrays of objects become barns. Keys that are not valid field
//! identifiers are sanitized and their original spelling is kept on the field
//! spec, so [`marshal::to_text`] writes them back unchanged.

pub mod barn;
pub mod construct;
pub mod datatype;
pub mod error;
pub mod marshal;
pub mod options;
pub mod record;

pub use barn::{Barn, ResultSet};
pub use construct::{FieldSpec, IdentityGenerator, Shape};
pub use datatype::{DataType, Keyring, Mapping, Value};
pub use error::{DatabarnError, Result};
pub use options::ConversionOptions;
pub use record::Record;
