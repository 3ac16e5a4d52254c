//! Name/value tree produced by feed parsers. Lookups by child name are
//! case-insensitive, matching how feed producers are inconsistent about it.

use chrono::{DateTime, Utc};

use crate::errors::{RelayError, RelayResult};

/// One node: an element name, its trimmed text for leaves, and its children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedProperty {
    name: String,
    value: Option<String>,
    properties: Vec<FeedProperty>,
}

impl FeedProperty {
    /// Builds a node.
    pub fn new(name: impl Into<String>, value: Option<String>, properties: Vec<FeedProperty>) -> Self {
        Self { name: name.into(), value, properties }
    }

    /// Builds a leaf with text.
    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, Some(value.into()), Vec::new())
    }

    /// Element name, prefix included (`dc:creator`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Text of a leaf.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Direct children in document order.
    pub fn properties(&self) -> &[FeedProperty] {
        &self.properties
    }

    /// First direct child called `name`.
    pub fn property_with_name(&self, name: &str) -> Option<&FeedProperty> {
        self.properties.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Every direct child called `name`.
    pub fn properties_with_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FeedProperty> + 'a {
        self.properties.iter().filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    /// Text of the first child called `name`, or a parse error naming what was missing.
    pub fn require_text(&self, name: &str) -> RelayResult<&str> {
        self.property_with_name(name)
            .and_then(FeedProperty::value)
            .ok_or_else(|| RelayError::Parse(format!("<{}> has no <{name}> text", self.name)))
    }

    /// The value as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        self.value()?.parse().ok()
    }

    /// The value as a float.
    pub fn as_f64(&self) -> Option<f64> {
        self.value()?.parse().ok()
    }

    /// The value as a boolean (`true`/`false`, any case).
    pub fn as_bool(&self) -> Option<bool> {
        let v = self.value()?;
        if v.eq_ignore_ascii_case("true") {
            Some(true)
        } else if v.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    /// The value as a timestamp. RSS dates are RFC 2822; RFC 3339 is accepted too.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        let v = self.value()?;
        DateTime::parse_from_rfc2822(v)
            .or_else(|_| DateTime::parse_from_rfc3339(v))
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }
}
