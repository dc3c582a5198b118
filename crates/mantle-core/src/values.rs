use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};

/// Index into the introspection accumulator's target list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub u32);

/// Index into the introspection accumulator's dependency list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyId(pub u32);

/// A source file reference as produced by `files()`, relative to the
/// subdirectory whose build file declared it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRef {
    pub subdir: String,
    pub rel: String,
}

impl FileRef {
    pub fn to_abs_path(&self, root: &Path) -> PathBuf {
        root.join(&self.subdir).join(&self.rel)
    }
}

/// The value a node would have at build time, as far as the analysis can
/// tell. `Unknown` is a first-class value, not an error: it marks "exists at
/// runtime, not determinable statically" and propagates through every
/// operator. `Disabler` is the conventional feature-disabled marker; it also
/// short-circuits call evaluation but is distinct from `Unknown`.
#[derive(Debug, Clone)]
pub enum Value {
    Str(String),
    Bool(bool),
    Int(i64),
    List(Vec<Value>),
    /// Insertion-ordered; key lookup is by value equality.
    Dict(Vec<(Value, Value)>),
    Unknown,
    Disabler,
    File(FileRef),
    Target(TargetId),
    Dependency(DependencyId),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Dicts compare as unordered key/value sets.
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter().any(|(bk, bv)| bk == k && bv == v)
                    })
            }
            (Value::Unknown, Value::Unknown) => true,
            (Value::Disabler, Value::Disabler) => true,
            (Value::File(a), Value::File(b)) => a == b,
            (Value::Target(a), Value::Target(b)) => a == b,
            (Value::Dependency(a), Value::Dependency(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    pub fn is_disabler(&self) -> bool {
        matches!(self, Value::Disabler)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
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

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Unknown => "unknown",
            Value::Disabler => "disabler",
            Value::File(_) => "file",
            Value::Target(_) => "target",
            Value::Dependency(_) => "dependency",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "'{s}'"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Unknown => write!(f, "<unknown>"),
            Value::Disabler => write!(f, "<disabled>"),
            Value::File(fr) => write!(f, "{}/{}", fr.subdir, fr.rel),
            Value::Target(id) => write!(f, "<target {}>", id.0),
            Value::Dependency(id) => write!(f, "<dependency {}>", id.0),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    match k {
                        Value::Str(s) => map.serialize_entry(s, v)?,
                        other => map.serialize_entry(&other.to_string(), v)?,
                    }
                }
                map.end()
            }
            Value::Unknown => serializer.serialize_str("unknown"),
            Value::Disabler => serializer.serialize_str("disabled"),
            Value::File(fr) => serializer.serialize_str(&format!("{}/{}", fr.subdir, fr.rel)),
            Value::Target(id) => serializer.serialize_str(&format!("<target {}>", id.0)),
            Value::Dependency(id) => serializer.serialize_str(&format!("<dependency {}>", id.0)),
        }
    }
}

/// Lookup in an insertion-ordered dict; last write wins on duplicate keys,
/// matching the right-biased `+` union.
pub fn dict_get<'a>(entries: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    entries.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Splice nested lists into one flat list, recursively.
pub fn flatten_deep(values: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        match v {
            Value::List(items) => out.extend(flatten_deep(items)),
            other => out.push(other),
        }
    }
    out
}
