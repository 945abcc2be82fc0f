//! Product attributes (colour, size, material ...) and their allowed values.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_core::patch::double_option;
use shopfront_core::{
    is_valid_slug, slugify, AttributeId, AttributeValueId, DomainError, DomainResult,
    ValidationErrors,
};

/// How an attribute's value is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Text,
    Number,
    Boolean,
    Select,
    MultiSelect,
    Color,
}

impl AttributeKind {
    /// Kinds backed by a fixed list of values.
    pub fn has_values(&self) -> bool {
        matches!(
            self,
            AttributeKind::Select | AttributeKind::MultiSelect | AttributeKind::Color
        )
    }

    /// Kinds that accept more than one value per product.
    pub fn is_multi(&self) -> bool {
        matches!(self, AttributeKind::MultiSelect)
    }

    /// Variants are combinations of single-choice listed values.
    pub fn can_be_variant_axis(&self) -> bool {
        matches!(self, AttributeKind::Select | AttributeKind::Color)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::Text => "text",
            AttributeKind::Number => "number",
            AttributeKind::Boolean => "boolean",
            AttributeKind::Select => "select",
            AttributeKind::MultiSelect => "multi_select",
            AttributeKind::Color => "color",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(AttributeKind::Text),
            "number" => Some(AttributeKind::Number),
            "boolean" => Some(AttributeKind::Boolean),
            "select" => Some(AttributeKind::Select),
            "multi_select" => Some(AttributeKind::MultiSelect),
            "color" => Some(AttributeKind::Color),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub id: AttributeValueId,
    /// Stored value (`"xl"`, `"#ff0000"`).
    pub value: String,
    /// Display label (`"Extra large"`, `"Red"`).
    pub label: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttributeId,
    pub name: String,
    pub slug: String,
    pub kind: AttributeKind,
    pub unit: Option<String>,
    pub is_variant_axis: bool,
    pub is_filterable: bool,
    pub values: Vec<AttributeValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attribute {
    pub fn value(&self, id: AttributeValueId) -> Option<&AttributeValue> {
        self.values.iter().find(|v| v.id == id)
    }

    pub fn has_value(&self, id: AttributeValueId) -> bool {
        self.value(id).is_some()
    }

    /// Values in display order (sort_order, then label).
    pub fn sorted_values(&self) -> Vec<&AttributeValue> {
        let mut vals: Vec<&AttributeValue> = self.values.iter().collect();
        vals.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.label.cmp(&b.label)));
        vals
    }

    pub fn apply_update(&mut self, update: AttributeUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let mut errs = ValidationErrors::new();
        if let Some(name) = &update.name {
            check_name(&mut errs, name);
        }
        if let Some(true) = update.is_variant_axis {
            errs.check(
                self.kind.can_be_variant_axis(),
                "is_variant_axis",
                "only select and color attributes can define variants",
            );
        }
        errs.into_result()?;

        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(unit) = update.unit {
            self.unit = unit.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        }
        if let Some(axis) = update.is_variant_axis {
            self.is_variant_axis = axis;
        }
        if let Some(filterable) = update.is_filterable {
            self.is_filterable = filterable;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn add_value(
        &mut self,
        new: NewAttributeValue,
        now: DateTime<Utc>,
    ) -> DomainResult<AttributeValueId> {
        if !self.kind.has_values() {
            return Err(DomainError::validation(
                "values",
                format!("{} attributes do not take listed values", self.kind.as_str()),
            ));
        }
        let value = new.value.trim().to_string();
        if value.is_empty() {
            return Err(DomainError::validation("value", "must not be empty"));
        }
        if self.values.iter().any(|v| v.value.eq_ignore_ascii_case(&value)) {
            return Err(DomainError::conflict(format!(
                "value '{value}' already exists on attribute '{}'",
                self.slug
            )));
        }

        let next_order = self.values.iter().map(|v| v.sort_order).max().map_or(0, |m| m + 1);
        let id = AttributeValueId::new();
        self.values.push(AttributeValue {
            id,
            label: new.label.unwrap_or_else(|| value.clone()),
            value,
            sort_order: new.sort_order.unwrap_or(next_order),
        });
        self.updated_at = now;
        Ok(id)
    }

    /// Remove a listed value. Callers must first check it is not used by a
    /// published product.
    pub fn remove_value(&mut self, id: AttributeValueId, now: DateTime<Utc>) -> DomainResult<()> {
        let before = self.values.len();
        self.values.retain(|v| v.id != id);
        if self.values.len() == before {
            return Err(DomainError::not_found());
        }
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewAttributeValue {
    pub value: String,
    pub label: Option<String>,
    pub sort_order: Option<i32>,
}

/// Create-attribute payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewAttribute {
    pub name: String,
    pub slug: Option<String>,
    pub kind: AttributeKind,
    pub unit: Option<String>,
    #[serde(default)]
    pub is_variant_axis: bool,
    #[serde(default = "default_true")]
    pub is_filterable: bool,
    #[serde(default)]
    pub values: Vec<NewAttributeValue>,
}

fn default_true() -> bool {
    true
}

impl NewAttribute {
    pub fn effective_slug(&self) -> String {
        match &self.slug {
            Some(s) => s.trim().to_string(),
            None => slugify(&self.name),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        let mut errs = ValidationErrors::new();
        check_name(&mut errs, &self.name);
        errs.check(
            is_valid_slug(&self.effective_slug()),
            "slug",
            "must be lowercase letters, digits and single dashes",
        );
        if !self.kind.has_values() {
            errs.check(
                self.values.is_empty(),
                "values",
                format!("{} attributes do not take listed values", self.kind.as_str()),
            );
        }
        if self.is_variant_axis {
            errs.check(
                self.kind.can_be_variant_axis(),
                "is_variant_axis",
                "only select and color attributes can define variants",
            );
        }

        let mut seen = HashSet::new();
        for (i, v) in self.values.iter().enumerate() {
            let key = v.value.trim().to_ascii_lowercase();
            if key.is_empty() {
                errs.push(format!("values[{i}].value"), "must not be empty");
            } else if !seen.insert(key) {
                errs.push(format!("values[{i}].value"), "duplicate value");
            }
        }
        errs.into_result()
    }

    pub fn into_attribute(self, now: DateTime<Utc>) -> DomainResult<Attribute> {
        self.validate()?;
        let slug = self.effective_slug();
        let values = self
            .values
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                let value = v.value.trim().to_string();
                AttributeValue {
                    id: AttributeValueId::new(),
                    label: v.label.unwrap_or_else(|| value.clone()),
                    value,
                    sort_order: v.sort_order.unwrap_or(i as i32),
                }
            })
            .collect();

        Ok(Attribute {
            id: AttributeId::new(),
            name: self.name.trim().to_string(),
            slug,
            kind: self.kind,
            unit: self.unit.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
            is_variant_axis: self.is_variant_axis,
            is_filterable: self.is_filterable,
            values,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update; `unit: null` clears the unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AttributeUpdate {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub unit: Option<Option<String>>,
    pub is_variant_axis: Option<bool>,
    pub is_filterable: Option<bool>,
}

fn check_name(errs: &mut ValidationErrors, name: &str) {
    let len = name.trim().chars().count();
    errs.check((1..=100).contains(&len), "name", "must be 1 to 100 characters");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn size_attribute() -> NewAttribute {
        NewAttribute {
            name: "Size".into(),
            slug: None,
            kind: AttributeKind::Select,
            unit: None,
            is_variant_axis: true,
            is_filterable: true,
            values: vec![
                NewAttributeValue { value: "S".into(), label: Some("Small".into()), sort_order: None },
                NewAttributeValue { value: "M".into(), label: None, sort_order: None },
            ],
        }
    }

    #[test]
    fn create_derives_slug_and_orders_values() {
        let attr = size_attribute().into_attribute(now()).unwrap();
        assert_eq!(attr.slug, "size");
        assert_eq!(attr.values[0].label, "Small");
        assert_eq!(attr.values[1].label, "M");
        assert_eq!(attr.values[1].sort_order, 1);
    }

    #[test]
    fn text_attribute_rejects_values_and_variant_axis() {
        let mut new = size_attribute();
        new.kind = AttributeKind::Text;
        let err = new.validate().unwrap_err();
        match err {
            DomainError::Validation(errs) => {
                assert!(errs.has_field("values"));
                assert!(errs.has_field("is_variant_axis"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn duplicate_values_are_rejected_case_insensitively() {
        let mut new = size_attribute();
        new.values.push(NewAttributeValue { value: "s".into(), label: None, sort_order: None });
        let err = new.validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref e) if e.has_field("values[2].value")));
    }

    #[test]
    fn add_value_appends_after_highest_sort_order() {
        let mut attr = size_attribute().into_attribute(now()).unwrap();
        let id = attr
            .add_value(NewAttributeValue { value: "L".into(), label: None, sort_order: None }, now())
            .unwrap();
        assert_eq!(attr.value(id).unwrap().sort_order, 2);

        let dup = attr.add_value(
            NewAttributeValue { value: "l".into(), label: None, sort_order: None },
            now(),
        );
        assert!(matches!(dup, Err(DomainError::Conflict(_))));
    }

    #[test]
    fn remove_unknown_value_is_not_found() {
        let mut attr = size_attribute().into_attribute(now()).unwrap();
        assert_eq!(attr.remove_value(AttributeValueId::new(), now()), Err(DomainError::NotFound));
    }

    #[test]
    fn update_cannot_make_number_a_variant_axis() {
        let mut attr = NewAttribute {
            name: "Weight".into(),
            slug: None,
            kind: AttributeKind::Number,
            unit: Some("kg".into()),
            is_variant_axis: false,
            is_filterable: false,
            values: vec![],
        }
        .into_attribute(now())
        .unwrap();

        let res = attr.apply_update(
            AttributeUpdate { is_variant_axis: Some(true), ..Default::default() },
            now(),
        );
        assert!(res.is_err());
        assert!(!attr.is_variant_axis);

        attr.apply_update(AttributeUpdate { unit: Some(None), ..Default::default() }, now())
            .unwrap();
        assert_eq!(attr.unit, None);
    }
}
