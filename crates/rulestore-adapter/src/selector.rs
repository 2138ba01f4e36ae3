//! Equality selectors over the rule document schema.
//!
//! A [`Selector`] is a conjunction of `key == value` constraints over the seven
//! document keys. The empty selector matches every document. There is no other
//! query language: no ranges, prefixes, or disjunctions.
use crate::codec::{FIELD_COUNT, FIELD_KEYS, StoredDocument};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    ptype: Option<String>,
    fields: BTreeMap<usize, String>,
}

impl Selector {
    /// Selector matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_ptype(ptype: impl Into<String>) -> Self {
        Self {
            ptype: Some(ptype.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Require `v{index} == value`. Indices past the last field are ignored.
    pub fn with_field(mut self, index: usize, value: impl Into<String>) -> Self {
        if index < FIELD_COUNT {
            self.fields.insert(index, value.into());
        }
        self
    }

    /// Build from a sparse `field index -> required value` mapping.
    pub fn from_fields<I, V>(ptype: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (usize, V)>,
        V: Into<String>,
    {
        fields
            .into_iter()
            .fold(Self::for_ptype(ptype), |selector, (index, value)| {
                selector.with_field(index, value)
            })
    }

    /// Selector pinning every key of `doc`, empty values included.
    ///
    /// Used for single-rule deletes: a stored `("alice", "data1")` rule must not
    /// match a three-field `("alice", "data1", "read")` document.
    pub fn exact(doc: &StoredDocument) -> Self {
        Self::from_fields(doc.ptype.clone(), doc.fields().into_iter().enumerate())
    }

    /// Selector for `values` laid over consecutive fields starting at `field_index`.
    ///
    /// Empty values leave their position unconstrained, and positions outside
    /// `v0..v5` are skipped.
    pub fn field_range(ptype: impl Into<String>, field_index: usize, values: &[String]) -> Self {
        Self::from_fields(
            ptype,
            values
                .iter()
                .enumerate()
                .filter(|(_, value)| !value.is_empty())
                .filter_map(|(offset, value)| {
                    field_index
                        .checked_add(offset)
                        .map(|index| (index, value.as_str()))
                }),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.ptype.is_none() && self.fields.is_empty()
    }

    pub fn ptype(&self) -> Option<&str> {
        self.ptype.as_deref()
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(&index).map(String::as_str)
    }

    pub fn matches(&self, doc: &StoredDocument) -> bool {
        if let Some(ptype) = &self.ptype {
            if doc.ptype != *ptype {
                return false;
            }
        }
        self.fields
            .iter()
            .all(|(index, value)| doc.field(*index) == Some(value.as_str()))
    }

    /// Render as a JSON object, e.g. `{"ptype": "p", "v1": "x"}`.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        if let Some(ptype) = &self.ptype {
            object.insert("ptype".to_string(), Value::String(ptype.clone()));
        }
        for (index, value) in &self.fields {
            object.insert(FIELD_KEYS[*index].to_string(), Value::String(value.clone()));
        }
        Value::Object(object)
    }
}
