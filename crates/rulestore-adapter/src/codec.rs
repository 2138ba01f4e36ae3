//! Rule codec: policy tuples <-> fixed-width rule documents.
//!
//! # Purpose
//! Maps a variable-arity rule (a type tag plus up to six field values) onto the
//! seven-field document shape persisted in the collection, and back.
//!
//! # Key invariants
//! - Every stored document carries all seven keys; absence is `""`, never a missing key.
//! - Decoding stops at the first empty field. A populated field after a gap is
//!   discarded, so `{v0: "a", v1: "", v2: "b"}` decodes to `["a"]`.
//! - The section of a rule is the first character of its type tag (`p2` -> `p`).
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of positional value fields in a stored document (`v0`..`v5`).
pub const FIELD_COUNT: usize = 6;

/// Document key for each positional field, indexed by position.
pub const FIELD_KEYS: [&str; FIELD_COUNT] = ["v0", "v1", "v2", "v3", "v4", "v5"];

/// Persisted shape of one policy rule.
///
/// Deserialization is strict about the seven known keys (all required, all
/// strings) and ignores anything else a backend attaches, such as row ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredDocument {
    pub ptype: String,
    pub v0: String,
    pub v1: String,
    pub v2: String,
    pub v3: String,
    pub v4: String,
    pub v5: String,
}

impl StoredDocument {
    /// Positional field values in `v0..v5` order.
    pub fn fields(&self) -> [&str; FIELD_COUNT] {
        [
            self.v0.as_str(),
            self.v1.as_str(),
            self.v2.as_str(),
            self.v3.as_str(),
            self.v4.as_str(),
            self.v5.as_str(),
        ]
    }

    /// Value stored at `index`, or `None` past the last field.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields().get(index).copied()
    }

    /// Parse a raw JSON document as returned by a JSONB or document backend.
    ///
    /// All seven keys must be present and hold strings; unknown keys are ignored.
    pub fn from_json(value: serde_json::Value) -> Result<Self, DecodeError> {
        Ok(serde_json::from_value(value)?)
    }

    fn field_mut(&mut self, index: usize) -> Option<&mut String> {
        match index {
            0 => Some(&mut self.v0),
            1 => Some(&mut self.v1),
            2 => Some(&mut self.v2),
            3 => Some(&mut self.v3),
            4 => Some(&mut self.v4),
            5 => Some(&mut self.v5),
            _ => None,
        }
    }
}

/// A document decoded back into the model's coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRule {
    pub section: String,
    pub ptype: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("rule document has an empty ptype")]
    EmptyPtype,
    #[error("malformed rule document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode a rule into its stored document.
///
/// Values map positionally onto `v0..v5`; unused positions stay empty. Values
/// past the sixth have no slot and are dropped.
pub fn encode(ptype: &str, rule: &[String]) -> StoredDocument {
    let mut doc = StoredDocument {
        ptype: ptype.to_string(),
        ..StoredDocument::default()
    };
    for (index, value) in rule.iter().enumerate().take(FIELD_COUNT) {
        if let Some(slot) = doc.field_mut(index) {
            slot.clone_from(value);
        }
    }
    doc
}

/// Decode a stored document into `(section, ptype, fields)`.
///
/// A document whose `v0` is empty decodes to a rule with no fields; it is
/// still returned so the caller sees every stored document.
pub fn decode(doc: StoredDocument) -> Result<DecodedRule, DecodeError> {
    let section = doc
        .ptype
        .chars()
        .next()
        .ok_or(DecodeError::EmptyPtype)?
        .to_string();

    let mut fields = Vec::with_capacity(FIELD_COUNT);
    for value in doc.fields() {
        if value.is_empty() {
            break;
        }
        fields.push(value.to_string());
    }

    Ok(DecodedRule {
        section,
        ptype: doc.ptype,
        fields,
    })
}
