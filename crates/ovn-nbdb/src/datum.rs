//! OVSDB values: atoms, sets, maps and rows, with their JSON encoding.
//!
//! The encoding follows RFC 7047 section 5.1:
//!
//! | value        | JSON                                   |
//! |--------------|----------------------------------------|
//! | string/int/bool | the JSON scalar                     |
//! | uuid         | `["uuid", "<uuid>"]`                   |
//! | named-uuid   | `["named-uuid", "<name>"]`             |
//! | set          | `["set", [<atom>, ...]]` or a bare atom |
//! | map          | `["map", [[<key>, <value>], ...]]`     |

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::{json, Value};

use crate::error::{NbError, NbResult};

/// Column holding a row's identity.
pub const UUID_COLUMN: &str = "_uuid";

/// Identity of a row.
///
/// `Named` is a forward reference to a row inserted earlier in the same
/// transaction; the server substitutes the real identity at commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Uuid {
    Real(String),
    Named(String),
}

impl Uuid {
    pub fn real(uuid: impl Into<String>) -> Self {
        Uuid::Real(uuid.into())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Uuid::Named(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Uuid::Real(s) | Uuid::Named(s) => s,
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(self, Uuid::Named(_))
    }

    fn to_json(&self) -> Value {
        match self {
            Uuid::Real(s) => json!(["uuid", s]),
            Uuid::Named(s) => json!(["named-uuid", s]),
        }
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uuid::Real(s) => write!(f, "{}", s),
            Uuid::Named(s) => write!(f, "@{}", s),
        }
    }
}

/// A single OVSDB scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Atom {
    String(String),
    Integer(i64),
    Boolean(bool),
    Uuid(Uuid),
}

impl Atom {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Atom::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<&Uuid> {
        match self {
            Atom::Uuid(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Atom::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Atom::String(s) => Value::String(s.clone()),
            Atom::Integer(i) => json!(i),
            Atom::Boolean(b) => Value::Bool(*b),
            Atom::Uuid(u) => u.to_json(),
        }
    }

    pub fn from_json(value: &Value) -> NbResult<Self> {
        match value {
            Value::String(s) => Ok(Atom::String(s.clone())),
            Value::Bool(b) => Ok(Atom::Boolean(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Atom::Integer)
                .ok_or_else(|| NbError::decode("atom", format!("unsupported number {}", n))),
            Value::Array(pair) if pair.len() == 2 => {
                let id = pair[1]
                    .as_str()
                    .ok_or_else(|| NbError::decode("atom", "uuid is not a string"))?;
                match pair[0].as_str() {
                    Some("uuid") => Ok(Atom::Uuid(Uuid::real(id))),
                    Some("named-uuid") => Ok(Atom::Uuid(Uuid::named(id))),
                    _ => Err(NbError::decode("atom", format!("unexpected {}", value))),
                }
            }
            other => Err(NbError::decode("atom", format!("unexpected {}", other))),
        }
    }
}

impl From<&str> for Atom {
    fn from(s: &str) -> Self {
        Atom::String(s.to_string())
    }
}

impl From<String> for Atom {
    fn from(s: String) -> Self {
        Atom::String(s)
    }
}

impl From<bool> for Atom {
    fn from(b: bool) -> Self {
        Atom::Boolean(b)
    }
}

impl From<i64> for Atom {
    fn from(i: i64) -> Self {
        Atom::Integer(i)
    }
}

impl From<Uuid> for Atom {
    fn from(u: Uuid) -> Self {
        Atom::Uuid(u)
    }
}

/// A column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum {
    Atom(Atom),
    Set(BTreeSet<Atom>),
    Map(BTreeMap<Atom, Atom>),
}

impl Datum {
    pub fn string(s: impl Into<String>) -> Self {
        Datum::Atom(Atom::String(s.into()))
    }

    pub fn boolean(b: bool) -> Self {
        Datum::Atom(Atom::Boolean(b))
    }

    pub fn uuid(u: Uuid) -> Self {
        Datum::Atom(Atom::Uuid(u))
    }

    pub fn empty_set() -> Self {
        Datum::Set(BTreeSet::new())
    }

    pub fn string_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Datum::Set(items.into_iter().map(|s| Atom::String(s.into())).collect())
    }

    pub fn uuid_set<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Uuid>,
    {
        Datum::Set(items.into_iter().map(Atom::Uuid).collect())
    }

    pub fn string_map<I, K, V>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Datum::Map(
            items
                .into_iter()
                .map(|(k, v)| (Atom::String(k.into()), Atom::String(v.into())))
                .collect(),
        )
    }

    /// Views the datum as a set; a bare atom is a one-element set.
    pub fn to_set(&self) -> BTreeSet<Atom> {
        match self {
            Datum::Atom(a) => std::iter::once(a.clone()).collect(),
            Datum::Set(s) => s.clone(),
            Datum::Map(m) => m.keys().cloned().collect(),
        }
    }

    /// Views the datum as a map; anything but a map is empty.
    pub fn to_map(&self) -> BTreeMap<Atom, Atom> {
        match self {
            Datum::Map(m) => m.clone(),
            _ => BTreeMap::new(),
        }
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Datum::Atom(a) => Some(a),
            Datum::Set(s) if s.len() == 1 => s.iter().next(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_atom().and_then(Atom::as_str)
    }

    /// String elements of a set column, in order.
    pub fn to_string_vec(&self) -> Vec<String> {
        self.to_set()
            .into_iter()
            .filter_map(|a| a.as_str().map(str::to_string))
            .collect()
    }

    /// UUID elements of a set column, in order.
    pub fn to_uuid_vec(&self) -> Vec<Uuid> {
        self.to_set()
            .into_iter()
            .filter_map(|a| a.as_uuid().cloned())
            .collect()
    }

    /// String pairs of a map column.
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        self.to_map()
            .into_iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
            .collect()
    }

    pub fn to_json(&self) -> Value {
        match self {
            Datum::Atom(a) => a.to_json(),
            Datum::Set(s) if s.len() == 1 => s.iter().next().map(Atom::to_json).unwrap_or(Value::Null),
            Datum::Set(s) => json!(["set", s.iter().map(Atom::to_json).collect::<Vec<_>>()]),
            Datum::Map(m) => json!([
                "map",
                m.iter()
                    .map(|(k, v)| json!([k.to_json(), v.to_json()]))
                    .collect::<Vec<_>>()
            ]),
        }
    }

    pub fn from_json(value: &Value) -> NbResult<Self> {
        if let Value::Array(pair) = value {
            if pair.len() == 2 {
                match (pair[0].as_str(), &pair[1]) {
                    (Some("set"), Value::Array(items)) => {
                        return items
                            .iter()
                            .map(Atom::from_json)
                            .collect::<NbResult<BTreeSet<_>>>()
                            .map(Datum::Set);
                    }
                    (Some("map"), Value::Array(items)) => {
                        let mut map = BTreeMap::new();
                        for item in items {
                            match item {
                                Value::Array(kv) if kv.len() == 2 => {
                                    map.insert(Atom::from_json(&kv[0])?, Atom::from_json(&kv[1])?);
                                }
                                other => {
                                    return Err(NbError::decode(
                                        "map entry",
                                        format!("unexpected {}", other),
                                    ))
                                }
                            }
                        }
                        return Ok(Datum::Map(map));
                    }
                    _ => {}
                }
            }
        }
        Atom::from_json(value).map(Datum::Atom)
    }

    /// Equality as OVSDB compares columns: a bare atom equals a one-element set.
    pub fn same_value(&self, other: &Datum) -> bool {
        match (self, other) {
            (Datum::Map(a), Datum::Map(b)) => a == b,
            (Datum::Map(_), _) | (_, Datum::Map(_)) => false,
            _ => self.to_set() == other.to_set(),
        }
    }

    /// True if every element (or key/value pair) of `other` is in `self`.
    pub fn includes(&self, other: &Datum) -> bool {
        match (self, other) {
            (Datum::Map(a), Datum::Map(b)) => b.iter().all(|(k, v)| a.get(k) == Some(v)),
            (Datum::Map(_), _) | (_, Datum::Map(_)) => false,
            _ => {
                let mine = self.to_set();
                other.to_set().iter().all(|a| mine.contains(a))
            }
        }
    }
}

impl From<Atom> for Datum {
    fn from(a: Atom) -> Self {
        Datum::Atom(a)
    }
}

/// A table row: column name to value.
pub type Row = BTreeMap<String, Datum>;

/// Encodes a row as a JSON object.
pub fn row_to_json(row: &Row) -> Value {
    Value::Object(
        row.iter()
            .map(|(column, datum)| (column.clone(), datum.to_json()))
            .collect(),
    )
}

/// Decodes a JSON object into a row.
pub fn row_from_json(value: &Value) -> NbResult<Row> {
    let object = value
        .as_object()
        .ok_or_else(|| NbError::decode("row", format!("expected object, got {}", value)))?;
    object
        .iter()
        .map(|(column, v)| Ok((column.clone(), Datum::from_json(v)?)))
        .collect()
}

/// Reads a row's `_uuid` column.
pub fn row_uuid(row: &Row) -> Option<Uuid> {
    row.get(UUID_COLUMN)
        .and_then(Datum::as_atom)
        .and_then(Atom::as_uuid)
        .cloned()
}
