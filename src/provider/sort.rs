// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sort requests and their resolution into engine sort lists.

use std::collections::BTreeMap;

use crate::query::{SortDirection, SortField};

/// What a sort attribute expands to.
#[derive(Debug, Clone, PartialEq)]
pub enum SortDefinition {
    Fields(Vec<SortField>),
    /// An order string, `"field [asc|desc]"`
    Text(String),
}

impl SortDefinition {
    pub fn resolve(&self) -> Vec<SortField> {
        match self {
            SortDefinition::Fields(fields) => fields.clone(),
            SortDefinition::Text(text) => parse_order_by(text).into_iter().collect(),
        }
    }
}

impl From<&str> for SortDefinition {
    fn from(text: &str) -> Self {
        SortDefinition::Text(text.to_string())
    }
}

impl From<Vec<SortField>> for SortDefinition {
    fn from(fields: Vec<SortField>) -> Self {
        SortDefinition::Fields(fields)
    }
}

/// A declared sortable attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum SortAttribute {
    /// Sorts on the given engine field
    Field(String),
    /// Per-direction definitions. A missing side sorts on the attribute itself.
    Compound {
        asc: Option<SortDefinition>,
        desc: Option<SortDefinition>,
    },
    /// Not sortable; requests for it are ignored
    Disabled,
}

/// Requested sort plus the attribute declarations it is resolved against.
#[derive(Debug, Clone, Default)]
pub struct Sort {
    /// Requested attributes in priority order
    pub directions: Vec<(String, SortDirection)>,
    /// Declared attributes. Empty means every attribute sorts on itself.
    pub attributes: BTreeMap<String, SortAttribute>,
    /// Order string used when nothing is requested
    pub default_order: Option<String>,
}

impl Sort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn direction(mut self, attribute: impl Into<String>, direction: SortDirection) -> Self {
        self.directions.push((attribute.into(), direction));
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, attribute: SortAttribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn default_order(mut self, order: impl Into<String>) -> Self {
        self.default_order = Some(order.into());
        self
    }

    /// Parse a request parameter such as `"price.desc-name"`: attributes
    /// separated by `-`, each with an optional `.desc`/`.asc` suffix.
    pub fn from_param(param: &str) -> Self {
        let mut sort = Sort::new();
        for part in param.split('-').map(str::trim).filter(|p| !p.is_empty()) {
            let (attribute, direction) = match part.rsplit_once('.') {
                Some((attribute, suffix)) => match SortDirection::parse(suffix) {
                    Some(direction) => (attribute, direction),
                    None => (part, SortDirection::Asc),
                },
                None => (part, SortDirection::Asc),
            };
            sort.directions.push((attribute.to_string(), direction));
        }
        sort
    }

    /// Declaration for `attribute`, `None` when it cannot be sorted on.
    pub fn resolve_attribute(&self, attribute: &str) -> Option<SortAttribute> {
        if self.attributes.is_empty() {
            return Some(SortAttribute::Field(attribute.to_string()));
        }
        match self.attributes.get(attribute)? {
            SortAttribute::Disabled => None,
            other => Some(other.clone()),
        }
    }

    /// Engine sort list for the request, without the score tie-breaker.
    pub fn resolve(&self) -> Vec<SortField> {
        if self.directions.is_empty() {
            return self.default_order.as_deref().and_then(parse_order_by).into_iter().collect();
        }

        let mut fields = Vec::new();
        for (attribute, direction) in &self.directions {
            let Some(definition) = self.resolve_attribute(attribute) else { continue };
            match definition {
                SortAttribute::Field(field) => fields.push(SortField::Field { field, direction: *direction }),
                SortAttribute::Compound { asc, desc } => {
                    let side = match direction {
                        SortDirection::Asc => asc,
                        SortDirection::Desc => desc,
                    };
                    match side {
                        Some(definition) => fields.extend(definition.resolve()),
                        None => fields.push(SortField::Field { field: attribute.clone(), direction: *direction }),
                    }
                }
                SortAttribute::Disabled => {}
            }
        }
        fields
    }
}

/// Parse `"field [direction]"`. The first token is the field, the second
/// (if any) the direction, ascending by default. Blank input yields `None`.
pub fn parse_order_by(text: &str) -> Option<SortField> {
    let mut tokens = text.split_whitespace();
    let field = tokens.next()?;
    let direction = tokens.next().and_then(SortDirection::parse).unwrap_or_default();
    Some(SortField::Field { field: field.to_string(), direction })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order_by() {
        assert_eq!(parse_order_by("price desc"), Some(SortField::desc("price")));
        assert_eq!(parse_order_by("  name "), Some(SortField::asc("name")));
        assert_eq!(parse_order_by("name sideways"), Some(SortField::asc("name")));
        assert_eq!(parse_order_by("   "), None);
    }

    #[test]
    fn test_default_order_when_nothing_requested() {
        let sort = Sort::new().default_order("created_at DESC");
        assert_eq!(sort.resolve(), vec![SortField::desc("created_at")]);
        assert!(Sort::new().resolve().is_empty());
    }

    #[test]
    fn test_compound_attribute() {
        let sort = Sort::new()
            .attribute(
                "maker",
                SortAttribute::Compound {
                    asc: Some(vec![SortField::asc("maker.label"), SortField::asc("name")].into()),
                    desc: Some("maker.label desc".into()),
                },
            )
            .attribute("price", SortAttribute::Field("price".into()))
            .attribute("secret", SortAttribute::Disabled)
            .direction("maker", SortDirection::Asc)
            .direction("secret", SortDirection::Asc)
            .direction("unknown", SortDirection::Asc)
            .direction("price", SortDirection::Desc);

        assert_eq!(
            sort.resolve(),
            vec![SortField::asc("maker.label"), SortField::asc("name"), SortField::desc("price")]
        );
    }

    #[test]
    fn test_compound_missing_side_uses_attribute() {
        let sort = Sort::new()
            .attribute("rank", SortAttribute::Compound { asc: Some("score_a".into()), desc: None })
            .direction("rank", SortDirection::Desc);
        assert_eq!(sort.resolve(), vec![SortField::desc("rank")]);
    }

    #[test]
    fn test_from_param() {
        let sort = Sort::from_param("price.desc-name");
        assert_eq!(
            sort.directions,
            vec![("price".to_string(), SortDirection::Desc), ("name".to_string(), SortDirection::Asc)]
        );
        assert_eq!(sort.resolve(), vec![SortField::desc("price"), SortField::asc("name")]);
    }
}
