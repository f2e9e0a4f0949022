//! Parameter binding
//!
//! Callers pass an associative [`ParamTable`]; [`bind`] turns it into the
//! ordered argument list submitted with the query:
//! - numeric keys become positional arguments
//! - string keys become named arguments, the key being the parameter name
//!
//! Every argument value is coerced to text before submission. Entries whose
//! key or value has no argument form (nil or boolean keys, nil values) are
//! skipped without error.
//!
//! Positional arguments keep the table's enumeration order, which is
//! insertion order. The caller controls it; numeric keys are not sorted.

use crate::types::GenericValue;

/// Ordered associative input, keyed by generic values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    entries: Vec<(GenericValue, GenericValue)>,
}

impl ParamTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn insert(&mut self, key: impl Into<GenericValue>, value: impl Into<GenericValue>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Append an entry (builder form)
    pub fn with(mut self, key: impl Into<GenericValue>, value: impl Into<GenericValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Number of entries
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if table is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in enumeration order
    pub fn iter(&self) -> impl Iterator<Item = (&GenericValue, &GenericValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Build a table from JSON.
    ///
    /// Arrays yield 1-based numeric keys, objects yield string keys in the
    /// map's iteration order. Nested arrays and objects have no scalar form and are
    /// left out; any other top-level JSON value gives an empty table.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut table = Self::new();
        match value {
            serde_json::Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if let Some(v) = json_scalar(item) {
                        table.insert((i + 1) as f64, v);
                    }
                }
            }
            serde_json::Value::Object(map) => {
                for (k, item) in map {
                    if let Some(v) = json_scalar(item) {
                        table.insert(k.as_str(), v);
                    }
                }
            }
            _ => {}
        }
        table
    }
}

fn json_scalar(value: &serde_json::Value) -> Option<GenericValue> {
    match value {
        serde_json::Value::Null => Some(GenericValue::Nil),
        serde_json::Value::Bool(b) => Some(GenericValue::Boolean(*b)),
        serde_json::Value::Number(n) => n.as_f64().map(GenericValue::Number),
        serde_json::Value::String(s) => Some(GenericValue::String(s.clone())),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}

impl<K, V> FromIterator<(K, V)> for ParamTable
where
    K: Into<GenericValue>,
    V: Into<GenericValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<&serde_json::Value> for ParamTable {
    fn from(value: &serde_json::Value) -> Self {
        Self::from_json(value)
    }
}

/// One bound query argument, always text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// Positional argument
    Positional(String),
    /// Named argument
    Named {
        /// Parameter name, as given by the caller
        name: String,
        /// Text value
        value: String,
    },
}

impl Argument {
    /// The text value of this argument
    pub fn value(&self) -> &str {
        match self {
            Self::Positional(value) | Self::Named { value, .. } => value,
        }
    }

    /// The parameter name, for named arguments
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Positional(_) => None,
            Self::Named { name, .. } => Some(name),
        }
    }
}

/// Ordered argument list for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundArgs {
    args: Vec<Argument>,
}

impl BoundArgs {
    /// Create an empty argument list
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of arguments
    #[inline]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Check if there are no arguments
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// All arguments in binding order
    #[inline]
    pub fn as_slice(&self) -> &[Argument] {
        &self.args
    }

    /// Iterate arguments in binding order
    pub fn iter(&self) -> std::slice::Iter<'_, Argument> {
        self.args.iter()
    }

    /// Positional values in binding order
    pub fn positional(&self) -> Vec<&str> {
        self.args
            .iter()
            .filter_map(|a| match a {
                Argument::Positional(v) => Some(v.as_str()),
                Argument::Named { .. } => None,
            })
            .collect()
    }

    /// Named `(name, value)` pairs in binding order
    pub fn named(&self) -> Vec<(&str, &str)> {
        self.args
            .iter()
            .filter_map(|a| match a {
                Argument::Named { name, value } => Some((name.as_str(), value.as_str())),
                Argument::Positional(_) => None,
            })
            .collect()
    }

    /// Check if any argument is named
    pub fn has_named(&self) -> bool {
        self.args.iter().any(|a| matches!(a, Argument::Named { .. }))
    }
}

impl From<Vec<Argument>> for BoundArgs {
    fn from(args: Vec<Argument>) -> Self {
        Self { args }
    }
}

impl<'a> IntoIterator for &'a BoundArgs {
    type Item = &'a Argument;
    type IntoIter = std::slice::Iter<'a, Argument>;

    fn into_iter(self) -> Self::IntoIter {
        self.args.iter()
    }
}

/// Turn an associative parameter table into query arguments.
pub fn bind(params: &ParamTable) -> BoundArgs {
    let mut args = Vec::with_capacity(params.len());

    for (key, value) in params.iter() {
        let Some(text) = value.to_text() else {
            continue;
        };
        match key {
            GenericValue::Number(_) => args.push(Argument::Positional(text)),
            GenericValue::String(name) => args.push(Argument::Named {
                name: name.clone(),
                value: text,
            }),
            GenericValue::Nil | GenericValue::Boolean(_) => {}
        }
    }

    BoundArgs { args }
}
