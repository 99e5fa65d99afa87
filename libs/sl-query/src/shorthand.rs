//! Shorthand helpers producing filter leaves.
//!
//! ```
//! use sl_query::query_filter;
//! use serde_json::json;
//!
//! assert_eq!(query_filter("*web*").to_value(), json!({"operation": "~ web"}));
//! assert_eq!(query_filter("web*").to_value(), json!({"operation": "^= web"}));
//! assert_eq!(query_filter("> 10").to_value(), json!({"operation": "> 10"}));
//! ```

use chrono::{Datelike, NaiveDate};
use serde_json::Value;

use crate::error::QueryError;
use crate::filter::{FilterNode, FilterOption, ObjectFilter, Operation};

/// Operators recognised at the start of a shorthand string. Two-character
/// operators precede their one-character prefixes.
const KNOWN_OPERATIONS: [&str; 10] = ["<=", ">=", "<", ">", "~", "!~", "*=", "^=", "$=", "_="];

/// Values accepted by [`query_filter`].
pub trait FilterQuery {
    fn into_operation(self) -> Operation;
}

impl FilterQuery for &str {
    fn into_operation(self) -> Operation {
        normalize(self)
    }
}

impl FilterQuery for String {
    fn into_operation(self) -> Operation {
        normalize(&self)
    }
}

impl FilterQuery for &String {
    fn into_operation(self) -> Operation {
        normalize(self)
    }
}

impl FilterQuery for i64 {
    fn into_operation(self) -> Operation {
        Operation::Integer(self)
    }
}

impl FilterQuery for i32 {
    fn into_operation(self) -> Operation {
        Operation::Integer(i64::from(self))
    }
}

impl FilterQuery for u32 {
    fn into_operation(self) -> Operation {
        Operation::Integer(i64::from(self))
    }
}

impl FilterQuery for bool {
    fn into_operation(self) -> Operation {
        Operation::Boolean(self)
    }
}

/// Normalize a shorthand value into an operation leaf.
///
/// - integers (and strings that parse as one) pass through as numbers;
/// - strings already starting with an operator keep it, with one space after;
/// - `*X*` becomes `~ X`, `X*` becomes `^= X`, `*X` becomes `$= X`;
/// - anything else becomes `_= X` (case-insensitive exact match).
///
/// Applying `query_filter` to the operation of a leaf it produced returns the
/// same leaf.
pub fn query_filter(query: impl FilterQuery) -> FilterNode {
    FilterNode::leaf(query.into_operation())
}

fn normalize(query: &str) -> Operation {
    let query = query.trim();
    if let Ok(n) = query.parse::<i64>() {
        return Operation::Integer(n);
    }

    for op in KNOWN_OPERATIONS {
        if let Some(rest) = query.strip_prefix(op) {
            return Operation::Text(format!("{op} {}", rest.trim()));
        }
    }

    let text = if query.len() > 1 && query.starts_with('*') && query.ends_with('*') {
        format!("~ {}", query.trim_matches('*'))
    } else if query.starts_with('*') {
        format!("$= {}", query.trim_start_matches('*'))
    } else if query.ends_with('*') {
        format!("^= {}", query.trim_end_matches('*'))
    } else {
        format!("_= {query}")
    };
    Operation::Text(text)
}

/// Direction for [`query_filter_orderby`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Canonical `orderBy` leaf.
#[must_use]
pub fn query_filter_orderby(direction: SortDirection) -> FilterNode {
    FilterNode::Leaf {
        operation: Operation::Text("orderBy".to_owned()),
        options: vec![FilterOption::new(
            "sort",
            vec![Value::String(direction.as_str().to_owned())],
        )],
    }
}

/// `in` leaf matching any of `values`.
pub fn query_filter_in<I, V>(values: I) -> FilterNode
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    FilterNode::Leaf {
        operation: Operation::Text("in".to_owned()),
        options: vec![FilterOption::new(
            "data",
            values.into_iter().map(Into::into).collect(),
        )],
    }
}

/// `betweenDate` leaf for two `YYYY-MM-DD` dates.
///
/// # Errors
///
/// Returns [`QueryError::InvalidDate`] if either date does not parse.
pub fn query_filter_date(start: &str, end: &str) -> Result<FilterNode, QueryError> {
    Ok(FilterNode::Leaf {
        operation: Operation::Text("betweenDate".to_owned()),
        options: vec![
            FilterOption::new("startDate", vec![Value::String(service_date(start)?)]),
            FilterOption::new("endDate", vec![Value::String(service_date(end)?)]),
        ],
    })
}

fn service_date(input: &str) -> Result<String, QueryError> {
    let date = NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| {
        QueryError::InvalidDate {
            value: input.to_owned(),
        }
    })?;
    Ok(format!(
        "{}/{}/{} 0:0:0",
        date.month(),
        date.day(),
        date.year()
    ))
}

/// Ensure a deterministic ordering for paginated calls.
///
/// Injects `orderBy id ASC` under `scope` (or at the root when `scope` is
/// `None`) unless some leaf of the caller's filter already orders the result.
#[must_use]
pub fn fix_filter(filter: Option<ObjectFilter>, scope: Option<&str>) -> ObjectFilter {
    let filter = filter.unwrap_or_default();
    if filter.has_operation("orderBy") {
        return filter;
    }

    let path = scope.map_or_else(|| "id".to_owned(), |s| format!("{s}.id"));
    let mut derived = ObjectFilter::new();
    if derived
        .set(&path, query_filter_orderby(SortDirection::Asc))
        .is_err()
    {
        return filter;
    }
    derived.merged(&filter)
}
