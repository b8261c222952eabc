use std::path::Path;
use std::rc::Rc;

// used to print out readable forms of the options
use std::fmt;

// config lets options come from a file and be overridden by the environment
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// Turns an arbitrary mapping key into a field label.
pub type KeyConverter = Rc<dyn Fn(&str) -> String>;

/// Controls how mapping keys become field labels and how text is written.
///
/// ```toml
/// replace_space_with = "_"
/// replace_dash_with = "__"
/// suffix_keyword_with = "_"
/// indent = 2
/// ```
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    pub replace_space_with: Option<String>,
    pub replace_dash_with: Option<String>,
    /// Appended to keys that are Rust keywords; `None` leaves them alone.
    pub suffix_keyword_with: Option<String>,
    /// Appended to a key that collides with the reserved metadata label.
    pub suffix_reserved_with: String,
    /// Pretty-print text output with this many spaces; compact when `None`.
    pub indent: Option<usize>,
    #[serde(skip)]
    pub key_converter: Option<KeyConverter>,
}

impl ConversionOptions {
    pub fn new() -> Self {
        Self::default()
    }
    /// Reads options from an optional file (any format `config` knows by
    /// extension), then from `DATABARN_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let options = builder
            .add_source(Environment::with_prefix("DATABARN").try_parsing(true))
            .build()?
            .try_deserialize::<ConversionOptions>()?;
        Ok(options)
    }
    pub fn replace_space_with<S: Into<String>>(mut self, with: Option<S>) -> Self {
        self.replace_space_with = with.map(Into::into);
        self
    }
    pub fn replace_dash_with<S: Into<String>>(mut self, with: Option<S>) -> Self {
        self.replace_dash_with = with.map(Into::into);
        self
    }
    pub fn suffix_keyword_with<S: Into<String>>(mut self, with: Option<S>) -> Self {
        self.suffix_keyword_with = with.map(Into::into);
        self
    }
    pub fn suffix_reserved_with<S: Into<String>>(mut self, with: S) -> Self {
        self.suffix_reserved_with = with.into();
        self
    }
    pub fn indent(mut self, indent: Option<usize>) -> Self {
        self.indent = indent;
        self
    }
    /// Replaces the built-in key sanitizing. The converted label must still
    /// be a valid identifier.
    pub fn key_converter<F: Fn(&str) -> String + 'static>(mut self, converter: F) -> Self {
        self.key_converter = Some(Rc::new(converter));
        self
    }
}
impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            replace_space_with: Some("_".to_owned()),
            replace_dash_with: Some("__".to_owned()),
            suffix_keyword_with: Some("_".to_owned()),
            suffix_reserved_with: "_".to_owned(),
            indent: None,
            key_converter: None,
        }
    }
}
impl fmt::Debug for ConversionOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConversionOptions")
            .field("replace_space_with", &self.replace_space_with)
            .field("replace_dash_with", &self.replace_dash_with)
            .field("suffix_keyword_with", &self.suffix_keyword_with)
            .field("suffix_reserved_with", &self.suffix_reserved_with)
            .field("indent", &self.indent)
            .field("key_converter", &self.key_converter.is_some())
            .finish()
    }
}
