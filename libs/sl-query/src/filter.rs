use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::QueryError;

/// Operation carried by a filter leaf.
///
/// Most leaves hold an operator string (`"_= web"`, `"orderBy"`, `"in"`);
/// numeric and boolean comparisons travel as bare JSON scalars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl Operation {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Operation::Text(text) => Some(text),
            Operation::Integer(_) | Operation::Boolean(_) => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Operation::Text(text) => Value::String(text.clone()),
            Operation::Integer(n) => Value::from(*n),
            Operation::Boolean(b) => Value::Bool(*b),
        }
    }

    fn from_value(value: &Value, path: &str) -> Result<Self, QueryError> {
        match value {
            Value::String(text) => Ok(Operation::Text(text.clone())),
            Value::Bool(b) => Ok(Operation::Boolean(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Operation::Integer)
                .ok_or_else(|| invalid(path, "operation must be an integer, string or boolean")),
            _ => Err(invalid(path, "operation must be an integer, string or boolean")),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Text(text) => f.write_str(text),
            Operation::Integer(n) => write!(f, "{n}"),
            Operation::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// Named option attached to a leaf, e.g. `{name: "sort", value: ["ASC"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOption {
    pub name: String,
    pub value: Vec<Value>,
}

impl FilterOption {
    pub fn new(name: impl Into<String>, value: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Node of an object filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Leaf {
        operation: Operation,
        options: Vec<FilterOption>,
    },
    Branch(BTreeMap<String, FilterNode>),
}

impl FilterNode {
    /// Leaf without options.
    #[must_use]
    pub fn leaf(operation: Operation) -> Self {
        FilterNode::Leaf {
            operation,
            options: Vec::new(),
        }
    }

    #[must_use]
    pub fn operation(&self) -> Option<&Operation> {
        match self {
            FilterNode::Leaf { operation, .. } => Some(operation),
            FilterNode::Branch(_) => None,
        }
    }

    /// True if this node or any descendant is a leaf whose operation is `op`.
    #[must_use]
    pub fn has_operation(&self, op: &str) -> bool {
        match self {
            FilterNode::Leaf { operation, .. } => operation.as_text() == Some(op),
            FilterNode::Branch(children) => children.values().any(|c| c.has_operation(op)),
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            FilterNode::Leaf { operation, options } => {
                let mut map = Map::new();
                map.insert("operation".to_owned(), operation.to_value());
                if !options.is_empty() {
                    let options = options
                        .iter()
                        .map(|o| serde_json::json!({ "name": o.name, "value": o.value }))
                        .collect();
                    map.insert("options".to_owned(), Value::Array(options));
                }
                Value::Object(map)
            }
            FilterNode::Branch(children) => Value::Object(
                children
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }

    fn from_value_at(value: &Value, path: &str) -> Result<Self, QueryError> {
        let Value::Object(map) = value else {
            return Err(invalid(path, "expected an object"));
        };
        if let Some(operation) = map.get("operation") {
            let operation = Operation::from_value(operation, path)?;
            let options = match map.get("options") {
                None | Some(Value::Null) => Vec::new(),
                Some(options) => serde_json::from_value(options.clone())
                    .map_err(|e| invalid(path, &format!("malformed options: {e}")))?,
            };
            return Ok(FilterNode::Leaf { operation, options });
        }
        let mut children = BTreeMap::new();
        for (key, child) in map {
            let child_path = if path.is_empty() {
                key.clone()
            } else {
                format!("{path}.{key}")
            };
            children.insert(key.clone(), Self::from_value_at(child, &child_path)?);
        }
        Ok(FilterNode::Branch(children))
    }

    /// Deep union. On overlapping keys `overriding` wins unless both sides are
    /// branches, in which case they are merged recursively.
    fn merge_from(&mut self, overriding: &FilterNode) {
        match (self, overriding) {
            (FilterNode::Branch(mine), FilterNode::Branch(theirs)) => {
                for (key, their_child) in theirs {
                    match mine.get_mut(key) {
                        Some(my_child) => my_child.merge_from(their_child),
                        None => {
                            mine.insert(key.clone(), their_child.clone());
                        }
                    }
                }
            }
            (slot, other) => *slot = other.clone(),
        }
    }
}

/// A complete object filter: a branch at the root keyed by property names.
///
/// ```
/// use sl_query::{ObjectFilter, query_filter};
///
/// let filter = ObjectFilter::new()
///     .with("virtualGuests.hostname", query_filter("web*"))
///     .unwrap();
/// assert_eq!(
///     filter.to_value(),
///     serde_json::json!({"virtualGuests": {"hostname": {"operation": "^= web"}}})
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectFilter {
    root: BTreeMap<String, FilterNode>,
}

impl ObjectFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Place `node` at a dotted path, creating intermediate branches.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidPath`] for empty path segments or when an
    /// intermediate segment already holds a leaf.
    pub fn set(&mut self, path: &str, node: FilterNode) -> Result<(), QueryError> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(QueryError::InvalidPath(path.to_owned()));
        }
        let Some((last, parents)) = segments.split_last() else {
            return Err(QueryError::InvalidPath(path.to_owned()));
        };

        let mut level = &mut self.root;
        for segment in parents {
            let entry = level
                .entry((*segment).to_owned())
                .or_insert_with(|| FilterNode::Branch(BTreeMap::new()));
            level = match entry {
                FilterNode::Branch(children) => children,
                FilterNode::Leaf { .. } => return Err(QueryError::InvalidPath(path.to_owned())),
            };
        }
        level.insert((*last).to_owned(), node);
        Ok(())
    }

    /// Builder form of [`set`](Self::set).
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn with(mut self, path: &str, node: FilterNode) -> Result<Self, QueryError> {
        self.set(path, node)?;
        Ok(self)
    }

    /// Look up the node at a dotted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FilterNode> {
        let mut segments = path.split('.');
        let mut node = self.root.get(segments.next()?)?;
        for segment in segments {
            match node {
                FilterNode::Branch(children) => node = children.get(segment)?,
                FilterNode::Leaf { .. } => return None,
            }
        }
        Some(node)
    }

    /// Deep-merge `overriding` into `self`; `overriding` wins on conflicting leaves.
    pub fn merge(&mut self, overriding: &ObjectFilter) {
        for (key, theirs) in &overriding.root {
            match self.root.get_mut(key) {
                Some(mine) => mine.merge_from(theirs),
                None => {
                    self.root.insert(key.clone(), theirs.clone());
                }
            }
        }
    }

    /// Builder form of [`merge`](Self::merge).
    #[must_use]
    pub fn merged(mut self, overriding: &ObjectFilter) -> Self {
        self.merge(overriding);
        self
    }

    /// True if any leaf in the tree carries the given operation string.
    #[must_use]
    pub fn has_operation(&self, op: &str) -> bool {
        self.root.values().any(|node| node.has_operation(op))
    }

    /// Wire form of the filter.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.root
                .iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }

    /// Parse a filter from its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidFilter`] if the value is not an object or a
    /// leaf is malformed.
    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        match FilterNode::from_value_at(value, "")? {
            FilterNode::Branch(root) => Ok(Self { root }),
            FilterNode::Leaf { .. } => Err(invalid("", "a filter root cannot be a leaf")),
        }
    }

    /// Parse a filter from a JSON document, as accepted on the command line.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidFilter`] on malformed JSON or structure.
    pub fn from_json(text: &str) -> Result<Self, QueryError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| invalid("", &format!("malformed JSON: {e}")))?;
        Self::from_value(&value)
    }
}

impl Serialize for ObjectFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ObjectFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ObjectFilter::from_value(&value).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<Value> for ObjectFilter {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        ObjectFilter::from_value(&value)
    }
}

fn invalid(path: &str, reason: &str) -> QueryError {
    QueryError::InvalidFilter {
        path: if path.is_empty() {
            "<root>".to_owned()
        } else {
            path.to_owned()
        },
        reason: reason.to_owned(),
    }
}
