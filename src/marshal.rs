use std::collections::HashSet;
use std::rc::Rc;

use bigdecimal::BigDecimal;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Number, Serializer};
use tracing::{debug, warn};

use crate::barn::Barn;
use crate::construct::{check_label, FieldSpec, Shape, RESERVED_LABEL};
use crate::datatype::{DataType, Mapping, Value};
use crate::error::{DatabarnError, Result};
use crate::options::ConversionOptions;
use crate::record::Record;

lazy_static! {
    static ref INVALID_CHARACTERS: Regex = Regex::new(r"[^A-Za-z0-9_]").unwrap();
    static ref KEYWORDS: HashSet<&'static str> = [
        "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
        "extern", "false", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "match", "mod",
        "move", "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super",
        "trait", "true", "type", "unsafe", "use", "where", "while", "abstract", "become", "box",
        "do", "final", "macro", "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
    ]
    .into_iter()
    .collect();
}

/// Turns a mapping key into a field label according to `options`.
pub fn sanitize_key(key: &str, options: &ConversionOptions) -> Result<String> {
    let mut label = match &options.key_converter {
        Some(convert) => convert(key),
        None => {
            let mut label = key.to_owned();
            if let Some(with) = &options.replace_space_with {
                label = label.replace(' ', with);
            }
            if let Some(with) = &options.replace_dash_with {
                label = label.replace('-', with);
            }
            let mut label = INVALID_CHARACTERS.replace_all(&label, "_").into_owned();
            if label.is_empty() || label.starts_with(|c: char| c.is_ascii_digit()) {
                label.insert(0, '_');
            }
            if let Some(suffix) = &options.suffix_keyword_with {
                if KEYWORDS.contains(label.as_str()) {
                    label.push_str(suffix);
                }
            }
            label
        }
    };
    if label == RESERVED_LABEL {
        label.push_str(&options.suffix_reserved_with);
    }
    check_label(&label)?;
    Ok(label)
}

// ------------- record -> mapping -------------
/// Generic mapping of a record, keyed by each field's external name. Nested
/// records become mappings; barns and result sets become lists of mappings.
pub fn to_mapping(record: &Record) -> Mapping {
    record
        .external_entries()
        .into_iter()
        .map(|(name, value)| (name, export(&value)))
        .collect()
}

fn export(value: &Value) -> Value {
    match value {
        Value::Record(record) => Value::Map(to_mapping(record)),
        Value::Barn(barn) => Value::List(barn.records().iter().map(|r| Value::Map(to_mapping(r))).collect()),
        Value::Results(results) => Value::List(results.iter().map(|r| Value::Map(to_mapping(r))).collect()),
        Value::List(items) => Value::List(items.iter().map(export).collect()),
        Value::Map(mapping) => Value::Map(mapping.iter().map(|(k, v)| (k.clone(), export(v))).collect()),
        other => other.clone(),
    }
}

// ------------- mapping -> record -------------
pub fn from_mapping(mapping: &Mapping, shape: Option<&Rc<Shape>>) -> Result<Record> {
    from_mapping_with(mapping, shape, &ConversionOptions::default())
}

/// Builds a record from a mapping. With a static `shape` every key must name
/// a declared field (by external name, label or sanitized label); otherwise
/// the record gets a dynamic shape grown from the keys.
pub fn from_mapping_with(
    mapping: &Mapping,
    shape: Option<&Rc<Shape>>,
    options: &ConversionOptions,
) -> Result<Record> {
    let shape = match shape {
        Some(shape) => Rc::clone(shape),
        None => Shape::open("Record"),
    };
    // (label, original key, converted value)
    let mut entries: Vec<(String, String, Value)> = Vec::with_capacity(mapping.len());
    for (key, value) in mapping.iter() {
        let label = if shape.is_dynamic() {
            let sanitized = sanitize_key(key, options)?;
            disambiguate(sanitized, key, &entries)
        } else {
            match_field(&shape, key, options)?
        };
        let spec = shape.field(&label);
        let converted = import(value, spec, options)?;
        entries.push((label, key.clone(), converted));
    }
    let names: Vec<(String, String)> = entries
        .iter()
        .filter(|(label, key, _)| label != key)
        .map(|(label, key, _)| (label.clone(), key.clone()))
        .collect();
    // auto values come back as-is instead of going through assignment
    let (autos, entries): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|(label, _, _)| shape.field(label).is_some_and(FieldSpec::is_auto));
    let record = Record::from_pairs(
        &shape,
        entries.into_iter().map(|(label, _, value)| (label, value)),
    )?;
    for (label, _, value) in autos {
        record.restore_auto(&label, value)?;
    }
    for (label, key) in names {
        record.set_key_name(&label, key)?;
    }
    debug!(shape = shape.name(), fields = mapping.len(), "mapping converted");
    Ok(record)
}

fn match_field(shape: &Shape, key: &str, options: &ConversionOptions) -> Result<String> {
    if let Some(spec) = shape.fields().iter().find(|s| s.get_key_name() == Some(key)) {
        return Ok(spec.label().to_owned());
    }
    if shape.has_field(key) {
        return Ok(key.to_owned());
    }
    let unknown = || DatabarnError::UnknownField {
        label: key.to_owned(),
        shape: shape.name().to_owned(),
    };
    let sanitized = sanitize_key(key, options).map_err(|_| unknown())?;
    if shape.has_field(&sanitized) {
        return Ok(sanitized);
    }
    Err(unknown())
}

fn disambiguate(label: String, key: &str, taken: &[(String, String, Value)]) -> String {
    let used = |candidate: &str| taken.iter().any(|(l, _, _)| l == candidate);
    if !used(&label) {
        return label;
    }
    let mut n = 1;
    let mut candidate = format!("{}_{}", label, n);
    while used(&candidate) {
        n += 1;
        candidate = format!("{}_{}", label, n);
    }
    warn!(key, label = %label, renamed = %candidate, "sanitized key collides with an earlier key");
    candidate
}

fn accepts_record(spec: Option<&FieldSpec>) -> bool {
    spec.is_none_or(|s| {
        s.types().is_empty() || s.types().iter().any(|t| matches!(t, DataType::Record(_)))
    })
}

fn declares_barn(spec: Option<&FieldSpec>) -> bool {
    spec.is_some_and(|s| s.types().iter().any(|t| matches!(t, DataType::Barn(_))))
}

fn import(value: &Value, spec: Option<&FieldSpec>, options: &ConversionOptions) -> Result<Value> {
    let hint = spec.and_then(FieldSpec::nested_shape);
    match value {
        Value::Map(mapping) if accepts_record(spec) => {
            Ok(Value::Record(from_mapping_with(mapping, hint.as_ref(), options)?))
        }
        Value::List(items)
            if !items.is_empty()
                && items.iter().all(|v| matches!(v, Value::Map(_)))
                && spec.is_none_or(FieldSpec::accepts_barn) =>
        {
            let barn = match &hint {
                Some(shape) => Barn::with_shape(shape),
                None => Barn::new(),
            };
            for item in items {
                if let Value::Map(mapping) = item {
                    barn.add(&from_mapping_with(mapping, hint.as_ref(), options)?)?;
                }
            }
            Ok(Value::Barn(barn))
        }
        // an empty child barn writes out as []
        Value::List(items) if items.is_empty() && declares_barn(spec) => Ok(Value::Barn(match &hint {
            Some(shape) => Barn::with_shape(shape),
            None => Barn::new(),
        })),
        Value::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|item| import(item, None, options))
                .collect::<Result<Vec<_>>>()?,
        )),
        other => Ok(other.clone()),
    }
}

// ------------- JSON -------------
pub fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(x) => Number::from_f64(*x).map_or(Json::Null, Json::Number),
        Value::Text(s) => Json::String(s.clone()),
        Value::Decimal(d) => {
            let text = d.to_string();
            // integers past i64 were read as decimals and go back out as numbers
            match text.parse::<u64>() {
                Ok(u) if u > i64::MAX as u64 => Json::Number(u.into()),
                _ => Json::String(text),
            }
        }
        Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
        Value::DateTime(d) => Json::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        Value::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(mapping) => Json::Object(
            mapping
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        Value::Record(_) | Value::Barn(_) | Value::Results(_) => value_to_json(&export(value)),
    }
}

pub fn json_to_value(json: &serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => Value::Int(i),
            (None, Some(u)) => Value::Decimal(BigDecimal::from(u)),
            _ => n.as_f64().map_or(Value::Null, Value::Float),
        },
        Json::String(s) => Value::Text(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        Json::Object(object) => Value::Map(
            object
                .iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect(),
        ),
    }
}

/// JSON text of a record, compact unless `options.indent` is set.
pub fn to_text(record: &Record, options: &ConversionOptions) -> Result<String> {
    let json = value_to_json(&Value::Map(to_mapping(record)));
    match options.indent {
        None => Ok(serde_json::to_string(&json)?),
        Some(width) => {
            let indent = " ".repeat(width);
            let mut buffer = Vec::new();
            let mut serializer =
                Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(indent.as_bytes()));
            json.serialize(&mut serializer)?;
            Ok(String::from_utf8_lossy(&buffer).into_owned())
        }
    }
}

pub fn from_text(text: &str, shape: Option<&Rc<Shape>>) -> Result<Record> {
    from_text_with(text, shape, &ConversionOptions::default())
}

pub fn from_text_with(
    text: &str,
    shape: Option<&Rc<Shape>>,
    options: &ConversionOptions,
) -> Result<Record> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    match json_to_value(&json) {
        Value::Map(mapping) => from_mapping_with(&mapping, shape, options),
        other => Err(DatabarnError::NotAMapping(other.type_name().to_owned())),
    }
}
