//! Object mask model.
//!
//! A mask is kept as an ordered list of top-level field expressions. Nested
//! selections (`operatingSystem[passwords[username,password]]`) and dotted
//! paths (`datacenter.name`) stay textual; only the outermost list is split so
//! that masks from different sources can be merged and de-duplicated.

use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;

/// Wrap a bare field list in `mask[...]` unless it already carries a mask
/// prefix (`mask`, `[` or `filteredMask`).
///
/// ```
/// use sl_query::format_object_mask;
///
/// assert_eq!(format_object_mask("id,hostname"), "mask[id,hostname]");
/// assert_eq!(format_object_mask(" mask[id] "), "mask[id]");
/// ```
#[must_use]
pub fn format_object_mask(mask: &str) -> String {
    let mask = mask.trim();
    if mask.starts_with("mask") || mask.starts_with('[') || mask.starts_with("filteredMask") {
        mask.to_owned()
    } else {
        format!("mask[{mask}]")
    }
}

/// Outer keyword of a mask.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MaskPrefix {
    /// `mask[...]`
    #[default]
    Mask,
    /// `filteredMask[...]`
    Filtered,
    /// `mask(SoftLayer_Type)[...]`
    Typed(String),
}

impl fmt::Display for MaskPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaskPrefix::Mask => f.write_str("mask"),
            MaskPrefix::Filtered => f.write_str("filteredMask"),
            MaskPrefix::Typed(ty) => write!(f, "mask({ty})"),
        }
    }
}

/// A parsed object mask.
///
/// Rendering is idempotent: `ObjectMask::parse(&m.to_string()) == Ok(m)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectMask {
    prefix: MaskPrefix,
    fields: Vec<String>,
}

impl ObjectMask {
    /// Empty `mask[]`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mask from individual field expressions, dropping duplicates.
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut mask = Self::new();
        for field in fields {
            mask.push(field);
        }
        mask
    }

    /// Parse a mask in any of the accepted forms: a bare field list,
    /// `[...]`, `mask[...]`, `mask(Type)[...]` or `filteredMask[...]`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnbalancedMask`] when brackets do not pair up and
    /// [`QueryError::EmptyMaskField`] for inputs such as `mask[id,,name]`.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let trimmed = input.trim();
        check_balanced(trimmed)?;

        let (prefix, body) = split_prefix(trimmed)?;
        let mut mask = Self {
            prefix,
            fields: Vec::new(),
        };
        if body.trim().is_empty() {
            return Ok(mask);
        }
        for field in split_top_level(body) {
            let field = field.trim();
            if field.is_empty() {
                return Err(QueryError::EmptyMaskField(input.to_owned()));
            }
            mask.push(field);
        }
        Ok(mask)
    }

    /// Append a field expression unless an identical one is already present.
    pub fn push(&mut self, field: impl Into<String>) {
        let field = field.into();
        let field = field.trim();
        if !field.is_empty() && !self.fields.iter().any(|f| f == field) {
            self.fields.push(field.to_owned());
        }
    }

    /// Builder form of [`push`](Self::push).
    #[must_use]
    pub fn with(mut self, field: impl Into<String>) -> Self {
        self.push(field);
        self
    }

    /// Merge another mask into this one. Fields keep first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::IncompatibleMasks`] when the prefixes differ,
    /// e.g. a `filteredMask` cannot be folded into a plain `mask`.
    pub fn merge(&mut self, other: &ObjectMask) -> Result<(), QueryError> {
        if self.fields.is_empty() && self.prefix != other.prefix {
            self.prefix = other.prefix.clone();
        } else if !other.fields.is_empty() && self.prefix != other.prefix {
            return Err(QueryError::IncompatibleMasks {
                left: self.prefix.to_string(),
                right: other.prefix.to_string(),
            });
        }
        for field in &other.fields {
            self.push(field.as_str());
        }
        Ok(())
    }

    /// Compose masks from several sources into one top-level mask.
    ///
    /// # Errors
    ///
    /// Fails if any source cannot be parsed or the prefixes disagree.
    pub fn compose<I, S>(sources: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Self::new();
        for source in sources {
            out.merge(&Self::parse(source.as_ref())?)?;
        }
        Ok(out)
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub fn prefix(&self) -> &MaskPrefix {
        &self.prefix
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

impl fmt::Display for ObjectMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.prefix, self.fields.join(","))
    }
}

impl FromStr for ObjectMask {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn check_balanced(input: &str) -> Result<(), QueryError> {
    let mut depth = 0usize;
    for ch in input.chars() {
        match ch {
            '[' | '(' => depth += 1,
            ']' | ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| QueryError::UnbalancedMask(input.to_owned()))?;
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(QueryError::UnbalancedMask(input.to_owned()))
    }
}

/// Split the outer keyword from the bracketed body. Bare lists have no body
/// brackets and are returned whole.
fn split_prefix(input: &str) -> Result<(MaskPrefix, &str), QueryError> {
    if let Some(rest) = input.strip_prefix("filteredMask") {
        return Ok((MaskPrefix::Filtered, bracket_body(rest, input)?));
    }
    if let Some(rest) = input.strip_prefix("mask(") {
        let close = rest
            .find(')')
            .ok_or_else(|| QueryError::UnbalancedMask(input.to_owned()))?;
        let ty = rest[..close].trim().to_owned();
        return Ok((MaskPrefix::Typed(ty), bracket_body(&rest[close + 1..], input)?));
    }
    if let Some(rest) = input.strip_prefix("mask")
        && rest.trim_start().starts_with('[')
    {
        return Ok((MaskPrefix::Mask, bracket_body(rest, input)?));
    }
    if input.starts_with('[') {
        return Ok((MaskPrefix::Mask, bracket_body(input, input)?));
    }
    Ok((MaskPrefix::Mask, input))
}

/// The text between the opening bracket and its matching close, which must
/// end the input.
fn bracket_body<'a>(rest: &'a str, whole: &str) -> Result<&'a str, QueryError> {
    let body = rest
        .trim()
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .ok_or_else(|| QueryError::UnbalancedMask(whole.to_owned()))?;
    check_balanced(body).map_err(|_| QueryError::UnbalancedMask(whole.to_owned()))?;
    Ok(body)
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (idx, ch) in body.char_indices() {
        match ch {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}
